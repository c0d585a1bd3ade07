//! The streaming ingest pipeline.
//!
//! One archive flows through a fixed sequence: source reader → normalizer
//! → dedup probe → tagging engine → batched storage write, with the
//! checkpoint advancing only after each batch transaction commits. Records
//! are handled strictly in source order, one at a time — archives far
//! larger than memory stream in constant space.
//!
//! Crash safety rests on two legs. The checkpoint marks the last committed
//! position, so a resume never re-reads what was durably stored. And the
//! content-hash dedup makes the window between data commit and checkpoint
//! advance harmless: replaying those records on resume is a no-op.
//!
//! Independent archives may be ingested on separate threads; the store is
//! behind a mutex so batch transactions serialize, and each archive keeps
//! its own checkpoint.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::checkpoint::{archive_fingerprint, CheckpointStore};
use crate::config::TagConfig;
use crate::db::MailDb;
use crate::embeddings::SemanticIndexer;
use crate::entities::{self, Entity};
use crate::envelope::{self, EventEnvelope, MessageEnvelope};
use crate::error::IngestError;
use crate::source::{self, RawRecord};
use crate::tagging::{self, TagAssociation};

pub const DEFAULT_BATCH_SIZE: usize = 200;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Records per storage transaction. Larger batches amortize commit
    /// cost; smaller ones tighten the resume granularity.
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Per-archive outcome counts reported to the CLI. Duplicate skips and
/// untagged messages are successful outcomes, not errors.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IngestSummary {
    pub archive: String,
    pub kind: String,
    pub run_id: String,
    /// Records read this run (those before the checkpoint are not re-read).
    pub processed: u64,
    pub stored_messages: u64,
    pub stored_events: u64,
    pub skipped_duplicate: u64,
    pub skipped_corrupt: u64,
    pub tagged: u64,
    pub untagged: u64,
    pub resumed_from: u64,
}

enum Pending {
    Message {
        envelope: MessageEnvelope,
        tags: Vec<TagAssociation>,
        entities: Vec<Entity>,
    },
    Event(EventEnvelope),
}

#[derive(Default)]
struct BatchOutcome {
    stored_messages: u64,
    stored_events: u64,
    skipped_duplicate: u64,
    tagged: u64,
    untagged: u64,
    embed_jobs: Vec<(i64, String)>,
}

/// Ingest one archive into the store, resuming from its checkpoint.
pub fn ingest_archive(
    db: &Mutex<MailDb>,
    checkpoints: &CheckpointStore,
    config: &TagConfig,
    archive: &Path,
    options: &IngestOptions,
) -> Result<IngestSummary, IngestError> {
    let fingerprint = archive_fingerprint(archive)?;
    let reader = source::open_archive(archive)?;

    let resumed_from = match checkpoints.load(archive, &fingerprint) {
        Some(checkpoint) => checkpoint.last_committed_position,
        None => {
            // Either first contact or a stale fingerprint; a stale file
            // must not linger once ingestion restarts from zero.
            checkpoints.clear(archive);
            0
        }
    };

    let archive_label = archive.display().to_string();
    let mut summary = IngestSummary {
        archive: archive_label.clone(),
        kind: reader.kind.as_str().to_string(),
        run_id: uuid::Uuid::new_v4().to_string(),
        resumed_from,
        ..Default::default()
    };
    if resumed_from > 0 {
        log::info!("{archive_label}: resuming after position {resumed_from}");
    }

    let semantic = config.semantic.enabled.then(SemanticIndexer::new);

    let mut batch: Vec<(u64, Pending)> = Vec::new();
    let mut position: u64 = 0;

    for record in reader.records {
        position += 1;
        if position <= resumed_from {
            continue;
        }
        summary.processed += 1;

        match record {
            RawRecord::Corrupt { origin, reason } => {
                log::warn!("{archive_label}: skipping corrupt record {origin}: {reason}");
                summary.skipped_corrupt += 1;
            }
            RawRecord::Mail { raw, origin } => {
                if raw.iter().all(|b| b.is_ascii_whitespace()) {
                    log::warn!("{archive_label}: skipping empty record {origin}");
                    summary.skipped_corrupt += 1;
                } else {
                    match envelope::normalize_mail(&raw, &origin) {
                        Some(env) => batch.push((position, pending_message(env, config))),
                        None => {
                            log::warn!("{archive_label}: skipping undecodable record {origin}");
                            summary.skipped_corrupt += 1;
                        }
                    }
                }
            }
            RawRecord::Fielded(fielded) => {
                let env = envelope::normalize_fielded(fielded);
                batch.push((position, pending_message(env, config)));
            }
            RawRecord::Event(raw) => {
                batch.push((position, Pending::Event(envelope::normalize_event(raw))));
            }
        }

        if batch.len() >= options.batch_size {
            let drained = std::mem::take(&mut batch);
            commit_batch(
                db,
                checkpoints,
                archive,
                &fingerprint,
                &archive_label,
                drained,
                semantic.as_ref(),
                &mut summary,
            )?;
        }
    }

    // Positions consumed without any pending rows (all corrupt, or a tail
    // of duplicates) still move the cursor forward.
    commit_batch(
        db,
        checkpoints,
        archive,
        &fingerprint,
        &archive_label,
        std::mem::take(&mut batch),
        semantic.as_ref(),
        &mut summary,
    )?;
    if position > resumed_from {
        checkpoints
            .advance(archive, &fingerprint, position)
            .map_err(IngestError::Storage)?;
    }

    log::info!(
        "{archive_label}: done — {} messages, {} events, {} duplicate, {} corrupt, {} tagged, {} untagged",
        summary.stored_messages,
        summary.stored_events,
        summary.skipped_duplicate,
        summary.skipped_corrupt,
        summary.tagged,
        summary.untagged
    );
    Ok(summary)
}

fn pending_message(envelope: MessageEnvelope, config: &TagConfig) -> Pending {
    let tags = tagging::tag(&envelope, config);
    let entities = entities::extract_entities(&envelope.body);
    Pending::Message {
        envelope,
        tags,
        entities,
    }
}

/// Write one batch in a single transaction, then advance the checkpoint.
/// All-or-nothing: a mid-batch failure rolls the whole batch back and the
/// checkpoint stays put, so the next resume retries it safely.
#[allow(clippy::too_many_arguments)]
fn commit_batch(
    db: &Mutex<MailDb>,
    checkpoints: &CheckpointStore,
    archive: &Path,
    fingerprint: &str,
    archive_label: &str,
    batch: Vec<(u64, Pending)>,
    semantic: Option<&SemanticIndexer>,
    summary: &mut IngestSummary,
) -> Result<(), IngestError> {
    let Some(last_position) = batch.last().map(|(position, _)| *position) else {
        return Ok(());
    };

    let db = db.lock();
    let outcome = db
        .with_transaction(|db| {
            let mut outcome = BatchOutcome::default();
            let mut seen_in_batch: HashSet<String> = HashSet::new();

            for (_, pending) in &batch {
                match pending {
                    Pending::Message {
                        envelope,
                        tags,
                        entities,
                    } => {
                        let duplicate = !seen_in_batch.insert(envelope.content_hash.clone())
                            || db.message_hash_exists(&envelope.content_hash)?;
                        if duplicate {
                            outcome.skipped_duplicate += 1;
                            continue;
                        }

                        let id = db.insert_message(envelope, archive_label)?;
                        for attachment in &envelope.attachments {
                            db.insert_attachment(id, attachment)?;
                        }
                        db.insert_entities(id, entities)?;
                        for tag in tags {
                            db.insert_tag_association(id, tag)?;
                        }

                        outcome.stored_messages += 1;
                        if tags.is_empty() {
                            outcome.untagged += 1;
                        } else {
                            outcome.tagged += 1;
                        }
                        outcome.embed_jobs.push((id, envelope.semantic_text()));
                    }
                    Pending::Event(envelope) => {
                        let duplicate = !seen_in_batch.insert(envelope.content_hash.clone())
                            || db.event_hash_exists(&envelope.content_hash)?;
                        if duplicate {
                            outcome.skipped_duplicate += 1;
                            continue;
                        }
                        db.insert_event(envelope, archive_label)?;
                        outcome.stored_events += 1;
                    }
                }
            }

            Ok(outcome)
        })
        .map_err(IngestError::Storage)?;

    log::debug!(
        "{archive_label}: batch through position {last_position} persisted \
         ({} new, {} duplicate)",
        outcome.stored_messages + outcome.stored_events,
        outcome.skipped_duplicate
    );

    // The batch is durable; only now may the cursor move past it.
    checkpoints
        .advance(archive, fingerprint, last_position)
        .map_err(IngestError::Storage)?;
    log::debug!("{archive_label}: checkpointed at position {last_position}");

    summary.stored_messages += outcome.stored_messages;
    summary.stored_events += outcome.stored_events;
    summary.skipped_duplicate += outcome.skipped_duplicate;
    summary.tagged += outcome.tagged;
    summary.untagged += outcome.untagged;

    // Fire-and-forget semantic indexing, outside the batch transaction.
    // Failures are logged and absorbed; ingestion already succeeded.
    if let Some(indexer) = semantic {
        for (message_id, text) in outcome.embed_jobs {
            indexer.embed_and_index(&db, message_id, &text);
        }
    }

    Ok(())
}

/// Ingest several independent archives, one thread each. An archive-fatal
/// error is reported for its archive; the rest continue.
pub fn ingest_many(
    db: &Mutex<MailDb>,
    checkpoints: &CheckpointStore,
    config: &TagConfig,
    archives: &[PathBuf],
    options: &IngestOptions,
) -> Vec<(PathBuf, Result<IngestSummary, IngestError>)> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = archives
            .iter()
            .map(|archive| {
                scope.spawn(move || ingest_archive(db, checkpoints, config, archive, options))
            })
            .collect();

        handles
            .into_iter()
            .zip(archives.iter())
            .map(|(handle, archive)| {
                let result = handle.join().unwrap_or_else(|_| {
                    Err(IngestError::Storage(format!(
                        "ingest thread for {} panicked",
                        archive.display()
                    )))
                });
                (archive.clone(), result)
            })
            .collect()
    })
}
