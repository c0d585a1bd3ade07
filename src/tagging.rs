//! Account tagging engine.
//!
//! `tag` is a pure function of one message envelope and the config
//! snapshot: identical inputs always produce identical associations, so
//! re-runs and replays are reproducible. Evaluation order is fixed and
//! non-configurable:
//!
//! 1. manual overrides — exact sender/recipient identity, then subject
//!    patterns; first match wins and evaluation stops
//! 2. domain rules — sender/recipient domains against each account's
//!    domain list; first matching account wins and evaluation stops
//! 3. keyword rules — aliases, keywords, and partner names against
//!    subject+body; every matching account is recorded
//!
//! A message with no matching rule is persisted untagged; that is a normal
//! outcome, not an error.

use crate::config::TagConfig;
use crate::envelope::MessageEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Override,
    Domain,
    Keyword,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Override => "override",
            RuleKind::Domain => "domain",
            RuleKind::Keyword => "keyword",
        }
    }
}

/// Why a tag was applied: the audit trail persisted next to each message.
#[derive(Debug, Clone, PartialEq)]
pub struct TagAssociation {
    pub account: String,
    pub rule_kind: RuleKind,
    pub matched_value: String,
}

/// Evaluate the rule stages against one message.
pub fn tag(message: &MessageEnvelope, config: &TagConfig) -> Vec<TagAssociation> {
    if let Some(hit) = match_overrides(message, config) {
        return vec![hit];
    }
    if let Some(hit) = match_domains(message, config) {
        return vec![hit];
    }
    match_keywords(message, config)
}

/// Stage 1: exact identity overrides, then subject patterns.
fn match_overrides(message: &MessageEnvelope, config: &TagConfig) -> Option<TagAssociation> {
    let identities =
        std::iter::once(&message.sender_email).chain(message.recipients());
    for identity in identities {
        if identity.is_empty() {
            continue;
        }
        if let Some(account) = config.address_overrides.get(identity) {
            return Some(TagAssociation {
                account: account.clone(),
                rule_kind: RuleKind::Override,
                matched_value: identity.clone(),
            });
        }
    }

    for so in &config.subject_overrides {
        if so.pattern.is_match(&message.subject) {
            return Some(TagAssociation {
                account: so.account.clone(),
                rule_kind: RuleKind::Override,
                matched_value: so.pattern.as_str().to_string(),
            });
        }
    }

    None
}

/// Stage 2: sender/recipient domains against account domain lists.
/// Subdomains match their parent (`mail.acme.com` hits `acme.com`).
fn match_domains(message: &MessageEnvelope, config: &TagConfig) -> Option<TagAssociation> {
    for account in &config.accounts {
        for domain in &account.domains {
            let identities =
                std::iter::once(&message.sender_email).chain(message.recipients());
            for identity in identities {
                if let Some(identity_domain) = identity.rsplit('@').next().filter(|d| !d.is_empty())
                {
                    if identity.contains('@') && domain_matches(identity_domain, domain) {
                        return Some(TagAssociation {
                            account: account.name.clone(),
                            rule_kind: RuleKind::Domain,
                            matched_value: domain.clone(),
                        });
                    }
                }
            }
        }
    }
    None
}

fn domain_matches(identity_domain: &str, rule_domain: &str) -> bool {
    identity_domain == rule_domain
        || identity_domain
            .strip_suffix(rule_domain)
            .map(|prefix| prefix.ends_with('.'))
            .unwrap_or(false)
}

/// Stage 3: aliases, keywords, and partner names against subject+body.
/// One association per matched account (first matching pattern recorded);
/// partner names tag the partner by name.
fn match_keywords(message: &MessageEnvelope, config: &TagConfig) -> Vec<TagAssociation> {
    let text = format!("{}\n{}", message.subject, message.body).to_lowercase();
    let mut associations: Vec<TagAssociation> = Vec::new();

    for account in &config.accounts {
        let patterns = account.aliases.iter().chain(account.keywords.iter());
        for pattern in patterns {
            if text.contains(pattern.as_str()) {
                associations.push(TagAssociation {
                    account: account.name.clone(),
                    rule_kind: RuleKind::Keyword,
                    matched_value: pattern.clone(),
                });
                break;
            }
        }
        for partner in &account.partners {
            if text.contains(&partner.to_lowercase()) {
                let already = associations.iter().any(|a| a.account == *partner);
                if !already {
                    associations.push(TagAssociation {
                        account: partner.clone(),
                        rule_kind: RuleKind::Keyword,
                        matched_value: partner.to_lowercase(),
                    });
                }
            }
        }
    }

    associations
}
