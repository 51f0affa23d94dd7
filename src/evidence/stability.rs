//! Stability analysis from the live per-resource update counts.

use super::{EvidenceCollaborator, ToolId};
use crate::detect::Alert;
use crate::error::EvidenceError;
use crate::features::FeatureExtractor;
use async_trait::async_trait;
use std::sync::Arc;

/// Updates above this count mark the resource as flapping.
const UNSTABLE_ABOVE: u64 = 10;

/// Reads the live per-resource history kept by feature extraction.
pub struct StabilityCheck {
    history: Arc<FeatureExtractor>,
}

impl StabilityCheck {
    pub fn new(history: Arc<FeatureExtractor>) -> Self {
        Self { history }
    }
}

#[async_trait]
impl EvidenceCollaborator for StabilityCheck {
    fn tool(&self) -> ToolId {
        ToolId::StabilityAnalysis
    }

    async fn run_check(&self, alert: &Alert) -> Result<String, EvidenceError> {
        let count = self.history.update_count(&alert.prefix);
        Ok(match count {
            0 => format!("NEW: {} has not been seen during monitoring.", alert.prefix),
            n if n > UNSTABLE_ABOVE => format!(
                "UNSTABLE: {} received {n} updates during monitoring; route flapping.",
                alert.prefix
            ),
            n => format!(
                "STABLE: {} received {n} updates during monitoring.",
                alert.prefix
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::TriggerReason;
    use crate::feed::RouteUpdate;

    #[tokio::test]
    async fn counts_drive_the_label() {
        let history = Arc::new(FeatureExtractor::with_shards(2));
        let tool = StabilityCheck::new(Arc::clone(&history));
        let update = RouteUpdate::announce("1.0.0.0/24", "174 13335", 0);
        let alert = Alert::from_update(&update, TriggerReason::Novelty, None, None);

        assert!(tool.run_check(&alert).await.unwrap().starts_with("NEW"));
        for _ in 0..3 {
            history.extract(&update);
        }
        assert!(tool.run_check(&alert).await.unwrap().starts_with("STABLE"));
        for _ in 0..8 {
            history.extract(&update);
        }
        assert!(tool.run_check(&alert).await.unwrap().starts_with("UNSTABLE"));
    }
}
