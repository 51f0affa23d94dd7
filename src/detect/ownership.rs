//! Authoritative prefix ownership and the hard origin-match rule.

use crate::config::OwnershipConfig;
use crate::error::SentinelError;
use crate::feed::RouteUpdate;
use std::collections::HashMap;

/// Prefix -> owning ASN. Loaded once; read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct OwnershipTable {
    owners: HashMap<String, String>,
}

impl OwnershipTable {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            owners: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Inline entries, overlaid by `table_path` (a JSON object) when set.
    pub fn from_config(config: &OwnershipConfig) -> Result<Self, SentinelError> {
        let mut table = Self::new(config.table.clone());
        if let Some(path) = &config.table_path {
            let data = std::fs::read_to_string(path)?;
            let extra: HashMap<String, String> = serde_json::from_str(&data).map_err(|e| {
                SentinelError::Config(format!("ownership table {}: {e}", path.display()))
            })?;
            table.owners.extend(extra);
        }
        Ok(table)
    }

    pub fn owner_of(&self, prefix: &str) -> Option<&str> {
        self.owners.get(prefix).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Match,
    Mismatch { expected: String },
    /// No entry for the resource
    Unknown,
}

pub struct OwnershipRule;

impl OwnershipRule {
    pub fn check(update: &RouteUpdate, table: &OwnershipTable) -> MatchOutcome {
        match table.owner_of(&update.prefix) {
            None => MatchOutcome::Unknown,
            Some(owner) if owner == update.origin() => MatchOutcome::Match,
            Some(owner) => MatchOutcome::Mismatch {
                expected: owner.to_string(),
            },
        }
    }
}
