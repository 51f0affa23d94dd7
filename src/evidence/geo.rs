use super::{EvidenceCollaborator, Registry, ToolId};
use crate::detect::Alert;
use crate::error::EvidenceError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Compares where the prefix is registered with where the origin AS is registered.
pub struct GeoCheck {
    registry: Arc<dyn Registry>,
    /// Cross-border announcements inside this region are treated as low risk
    europe: HashSet<String>,
}

impl GeoCheck {
    pub fn new(registry: Arc<dyn Registry>, europe: HashSet<String>) -> Self {
        Self { registry, europe }
    }
}

#[async_trait]
impl EvidenceCollaborator for GeoCheck {
    fn tool(&self) -> ToolId {
        ToolId::GeoCheck
    }

    async fn run_check(&self, alert: &Alert) -> Result<String, EvidenceError> {
        let mut prefix_country = self.registry.country_of(&alert.prefix).await?;
        if prefix_country.is_none() {
            if let Some(owner) = &alert.expected_owner {
                prefix_country = self.registry.country_of(owner).await?;
            }
        }
        let origin_country = self.registry.country_of(&alert.origin).await?;

        let report = match (prefix_country, origin_country) {
            (Some(p), Some(o)) if p == o => format!(
                "MATCH: prefix registered in {p}; origin AS{} also registered in {o}.",
                alert.origin
            ),
            (Some(p), Some(o)) if self.europe.contains(&p) && self.europe.contains(&o) => format!(
                "LOW_RISK: prefix ({p}) and origin AS{} ({o}) differ but are both European; cross-border routing is common there.",
                alert.origin
            ),
            (Some(p), Some(o)) => format!(
                "CONFLICT: prefix registered in {p} but announced by AS{} registered in {o}.",
                alert.origin
            ),
            (p, o) => format!(
                "SKIPPED: registration data missing (prefix: {}, origin AS{}: {}).",
                p.as_deref().unwrap_or("unknown"),
                alert.origin,
                o.as_deref().unwrap_or("unknown")
            ),
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::TriggerReason;
    use crate::evidence::OfflineRegistry;
    use crate::feed::RouteUpdate;
    use std::collections::HashMap;

    fn registry() -> Arc<dyn Registry> {
        let geo: HashMap<String, String> = [
            ("104.244.42.0/24", "US"),
            ("12389", "RU"),
            ("13414", "US"),
            ("5.5.5.0/24", "DE"),
            ("3320", "DE"),
            ("1136", "NL"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Arc::new(OfflineRegistry::new(geo, HashMap::new()))
    }

    fn check(prefix: &str, path: &str) -> Alert {
        Alert::from_update(
            &RouteUpdate::announce(prefix, path, 0),
            TriggerReason::Novelty,
            None,
            None,
        )
    }

    #[tokio::test]
    async fn classifies_country_pairs() {
        let tool = GeoCheck::new(registry(), ["DE".to_string(), "NL".to_string()].into());
        let conflict = tool.run_check(&check("104.244.42.0/24", "174 12389")).await.unwrap();
        assert!(conflict.starts_with("CONFLICT"), "{conflict}");
        let matched = tool.run_check(&check("104.244.42.0/24", "174 13414")).await.unwrap();
        assert!(matched.starts_with("MATCH"));
        let eu = tool.run_check(&check("5.5.5.0/24", "174 1136")).await.unwrap();
        assert!(eu.starts_with("LOW_RISK"));
        let missing = tool.run_check(&check("9.9.9.0/24", "174 9")).await.unwrap();
        assert!(missing.starts_with("SKIPPED"));
    }
}
