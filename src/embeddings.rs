//! Optional semantic layer: deterministic local embeddings.
//!
//! Vectors come from feature hashing (FNV-1a over lowercased tokens, signed
//! by hash parity, L2-normalized) — fully local, reproducible across runs
//! and builds, and cheap enough to run inline during ingest. Stored as
//! little-endian f32 blobs next to the messages they describe.
//!
//! The indexer is fire-and-forget from the pipeline's point of view: it is
//! invoked after a batch commits, and any failure is logged and absorbed.
//! Ingestion never fails because of this layer.

use crate::db::MailDb;

pub const DIMENSION: usize = 384;

pub struct SemanticIndexer {
    dimension: usize,
}

impl Default for SemanticIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticIndexer {
    pub fn new() -> Self {
        Self {
            dimension: DIMENSION,
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        hash_embed(text, self.dimension)
    }

    /// Embed and store one message's text. Never propagates an error.
    pub fn embed_and_index(&self, db: &MailDb, message_id: i64, text: &str) {
        let vector = self.embed(text);
        let blob = f32_vec_to_blob(&vector);
        if let Err(e) = db.insert_embedding(message_id, self.dimension, &blob) {
            log::warn!("Semantic index skipped for message {message_id}: {e}");
        }
    }

    /// Rank stored messages by cosine similarity to the query text.
    pub fn search(&self, db: &MailDb, query: &str, k: usize) -> Result<Vec<(i64, f32)>, String> {
        let query_vec = self.embed(query);
        let mut scored: Vec<(i64, f32)> = Vec::new();
        for (message_id, blob) in db.all_embeddings()? {
            let vector = match blob_to_f32_vec(&blob) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("Skipping undecodable embedding for message {message_id}: {e}");
                    continue;
                }
            };
            scored.push((message_id, cosine_similarity(&query_vec, &vector)));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

/// FNV-1a, fixed constants. `DefaultHasher` is not guaranteed stable across
/// toolchains, and these vectors persist — the hash must never move.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn hash_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0_f32; dimension];
    let mut seen = 0usize;

    for token in text.split_whitespace() {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            continue;
        }
        let hash = fnv1a(token.as_bytes());
        let idx = (hash as usize) % dimension;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vec[idx] += sign;
        seen += 1;
    }

    if seen == 0 {
        return vec;
    }

    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vec {
            *value /= norm;
        }
    }

    vec
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (va, vb) in a.iter().zip(b.iter()) {
        dot += va * vb;
        norm_a += va * va;
        norm_b += vb * vb;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub fn f32_vec_to_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn blob_to_f32_vec(blob: &[u8]) -> Result<Vec<f32>, String> {
    if blob.len() % 4 != 0 {
        return Err("invalid embedding blob length".to_string());
    }

    let mut values = Vec::with_capacity(blob.len() / 4);
    for chunk in blob.chunks_exact(4) {
        values.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_blob_roundtrip() {
        let original = vec![0.1_f32, -0.5_f32, 1.25_f32, 0.0_f32];
        let blob = f32_vec_to_blob(&original);
        let restored = blob_to_f32_vec(&blob).expect("valid blob");
        assert_eq!(original.len(), restored.len());
        for (a, b) in original.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let indexer = SemanticIndexer::new();
        assert_eq!(
            indexer.embed("renewal call with acme"),
            indexer.embed("renewal call with acme")
        );
    }

    #[test]
    fn test_similar_text_ranks_above_unrelated() {
        let indexer = SemanticIndexer::new();
        let query = indexer.embed("acme contract renewal");
        let close = indexer.embed("the acme renewal contract draft");
        let far = indexer.embed("lunch menu for friday");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let indexer = SemanticIndexer::new();
        let vec = indexer.embed("   ");
        assert!(vec.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_search_orders_by_similarity() {
        use crate::db::test_utils::test_db;
        use crate::envelope::MessageEnvelope;

        let db = test_db();
        let indexer = SemanticIndexer::new();
        for (subject, body) in [
            ("renewal", "acme contract renewal pricing"),
            ("lunch", "team lunch menu options"),
        ] {
            let env = MessageEnvelope::build(
                String::new(),
                "a@b.c".to_string(),
                vec![],
                vec![],
                vec![],
                subject.to_string(),
                None,
                body.to_string(),
                vec![],
                "o".to_string(),
            );
            let id = db.insert_message(&env, "a").expect("insert");
            indexer.embed_and_index(&db, id, &env.semantic_text());
        }

        let results = indexer.search(&db, "acme renewal", 2).expect("search");
        assert_eq!(results.len(), 2);
        assert!(results[0].1 >= results[1].1);
    }
}
