//! Neighbor check: which network handed the route to the collector.

use super::{EvidenceCollaborator, Registry, ToolId};
use crate::detect::Alert;
use crate::error::EvidenceError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Who handed the route to the collector.
pub struct NeighborCheck {
    registry: Arc<dyn Registry>,
    tier1: Arc<HashSet<String>>,
}

impl NeighborCheck {
    pub fn new(registry: Arc<dyn Registry>, tier1: Arc<HashSet<String>>) -> Self {
        Self { registry, tier1 }
    }
}

#[async_trait]
impl EvidenceCollaborator for NeighborCheck {
    fn tool(&self) -> ToolId {
        ToolId::NeighborCheck
    }

    async fn run_check(&self, alert: &Alert) -> Result<String, EvidenceError> {
        let first = alert.first_hop();
        if first.is_empty() {
            return Ok("SKIPPED: empty AS path.".to_string());
        }
        let holder = self
            .registry
            .as_holder(first)
            .await?
            .unwrap_or_else(|| format!("AS{first}"));
        let class = if self.tier1.contains(first) {
            "a tier-1 transit provider"
        } else {
            "a non-tier-1 network"
        };
        Ok(format!(
            "INFO: route propagated to the collector by {holder} (AS{first}), {class}."
        ))
    }
}
