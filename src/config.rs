//! Tagging configuration: accounts, partners, rules, and overrides.
//!
//! The YAML file is loaded once per ingest run and compiled into an
//! immutable, ordered `TagConfig` snapshot. Nothing mutates the snapshot
//! mid-run; re-running with the same file and the same archives produces
//! the same tags.
//!
//! ```yaml
//! accounts:
//!   - name: Acme Corp
//!     aliases: [acme, acme corp]
//!     domains: [acme.com]
//!     keywords: [renewal, expansion]
//!     partners: [NorthStar Consulting]
//! overrides:
//!   addresses:
//!     bob@acme.com: Acme Corp
//!   subject_patterns:
//!     - pattern: "(?i)acme weekly digest"
//!       account: Acme Corp
//! semantic:
//!   enabled: false
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::IngestError;

#[derive(Debug, Clone, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    accounts: Vec<RawAccount>,
    #[serde(default)]
    overrides: RawOverrides,
    #[serde(default)]
    semantic: SemanticConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAccount {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    partners: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawOverrides {
    #[serde(default)]
    addresses: BTreeMap<String, String>,
    #[serde(default)]
    subject_patterns: Vec<RawSubjectPattern>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSubjectPattern {
    pattern: String,
    account: String,
}

/// Semantic-layer toggle. Disabled by default; when enabled the pipeline
/// hands each stored message to the local embedding indexer after commit.
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// One account's compiled rule set. Pattern lists are lowercased at load
/// time so matching never allocates per record.
#[derive(Debug, Clone)]
pub struct Account {
    pub name: String,
    pub aliases: Vec<String>,
    pub domains: Vec<String>,
    pub keywords: Vec<String>,
    pub partners: Vec<String>,
}

/// A compiled subject override: first matching pattern wins its account.
#[derive(Debug, Clone)]
pub struct SubjectOverride {
    pub pattern: Regex,
    pub account: String,
}

/// Immutable tagging snapshot for one ingest run.
#[derive(Debug, Clone, Default)]
pub struct TagConfig {
    pub accounts: Vec<Account>,
    /// Exact identity → account, keyed by lowercased address.
    pub address_overrides: BTreeMap<String, String>,
    pub subject_overrides: Vec<SubjectOverride>,
    pub semantic: SemanticConfig,
}

impl TagConfig {
    /// Load and compile the config file. Any problem here is config-fatal:
    /// the run aborts before a single record is read.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, IngestError> {
        let raw: RawConfig = serde_yaml::from_str(text)
            .map_err(|e| IngestError::Config(format!("invalid YAML: {e}")))?;
        Self::compile(raw)
    }

    fn compile(raw: RawConfig) -> Result<Self, IngestError> {
        let accounts = raw
            .accounts
            .into_iter()
            .map(|a| Account {
                name: a.name,
                aliases: lower_all(a.aliases),
                domains: lower_all(a.domains),
                keywords: lower_all(a.keywords),
                partners: a.partners,
            })
            .collect();

        let address_overrides = raw
            .overrides
            .addresses
            .into_iter()
            .map(|(addr, account)| (addr.trim().to_lowercase(), account))
            .collect();

        let mut subject_overrides = Vec::new();
        for sp in raw.overrides.subject_patterns {
            let pattern = Regex::new(&sp.pattern).map_err(|e| {
                IngestError::Config(format!("bad subject pattern {:?}: {e}", sp.pattern))
            })?;
            subject_overrides.push(SubjectOverride {
                pattern,
                account: sp.account,
            });
        }

        Ok(Self {
            accounts,
            address_overrides,
            subject_overrides,
            semantic: raw.semantic,
        })
    }
}

fn lower_all(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
accounts:
  - name: Acme Corp
    aliases: [Acme, "ACME Corp"]
    domains: [Acme.com]
    keywords: [renewal]
    partners: [NorthStar Consulting]
  - name: Beta Inc
    domains: [beta.io]
overrides:
  addresses:
    Bob@Acme.com: Acme Corp
  subject_patterns:
    - pattern: "(?i)weekly digest"
      account: Acme Corp
semantic:
  enabled: true
"#;

    #[test]
    fn test_load_and_compile() {
        let cfg = TagConfig::from_yaml(SAMPLE).expect("valid config");
        assert_eq!(cfg.accounts.len(), 2);
        assert_eq!(cfg.accounts[0].aliases, vec!["acme", "acme corp"]);
        assert_eq!(cfg.accounts[0].domains, vec!["acme.com"]);
        // Override addresses are keyed lowercase
        assert_eq!(
            cfg.address_overrides.get("bob@acme.com").map(String::as_str),
            Some("Acme Corp")
        );
        assert_eq!(cfg.subject_overrides.len(), 1);
        assert!(cfg.semantic.enabled);
    }

    #[test]
    fn test_empty_config_is_valid() {
        let cfg = TagConfig::from_yaml("{}").expect("empty config");
        assert!(cfg.accounts.is_empty());
        assert!(!cfg.semantic.enabled);
    }

    #[test]
    fn test_invalid_yaml_is_config_fatal() {
        let err = TagConfig::from_yaml("accounts: [name: {{").unwrap_err();
        assert_eq!(err.reason_code(), "config-invalid");
    }

    #[test]
    fn test_bad_subject_regex_is_config_fatal() {
        let yaml = r#"
overrides:
  subject_patterns:
    - pattern: "("
      account: Acme Corp
"#;
        let err = TagConfig::from_yaml(yaml).unwrap_err();
        assert_eq!(err.reason_code(), "config-invalid");
    }

    #[test]
    fn test_missing_file_is_config_fatal() {
        let err = TagConfig::load(Path::new("/nonexistent/accounts.yml")).unwrap_err();
        assert_eq!(err.reason_code(), "config-invalid");
    }
}
