use super::{EvidenceCollaborator, Registry, RpkiStatus, ToolId};
use crate::detect::Alert;
use crate::error::EvidenceError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// RPKI origin validation, falling back to recorded prefix origins when the
/// registry has no answer.
pub struct AuthorityCheck {
    registry: Arc<dyn Registry>,
    known_origins: HashMap<String, String>,
}

impl AuthorityCheck {
    pub fn new(registry: Arc<dyn Registry>, known_origins: HashMap<String, String>) -> Self {
        Self {
            registry,
            known_origins,
        }
    }
}

#[async_trait]
impl EvidenceCollaborator for AuthorityCheck {
    fn tool(&self) -> ToolId {
        ToolId::AuthorityCheck
    }

    async fn run_check(&self, alert: &Alert) -> Result<String, EvidenceError> {
        let prefix = &alert.prefix;
        let origin = &alert.origin;
        if origin.is_empty() {
            return Ok("ERROR: the AS path carries no origin AS.".to_string());
        }

        let status = self.registry.rpki_status(prefix, origin).await?;
        let report = match status {
            RpkiStatus::Valid => format!(
                "VALID: RPKI validation passed. AS{origin} holds a ROA authorising {prefix}."
            ),
            RpkiStatus::InvalidAsn => format!(
                "INVALID: RPKI validation failed (invalid_asn). AS{origin} is not authorised to originate {prefix}."
            ),
            RpkiStatus::InvalidLength => format!(
                "INVALID: RPKI validation failed (invalid_length). {prefix} is more specific than the ROA maxLength allows for AS{origin}."
            ),
            RpkiStatus::Unknown | RpkiStatus::Unavailable => {
                let recorded = self
                    .known_origins
                    .get(prefix)
                    .or(alert.expected_owner.as_ref());
                match recorded {
                    Some(owner) if owner != origin => format!(
                        "INVALID (historical): no RPKI answer ({status}), but {prefix} is recorded as belonging to AS{owner}. AS{origin} is not the owner."
                    ),
                    Some(owner) => format!(
                        "VALID (historical): no RPKI answer ({status}); AS{owner} is the recorded origin of {prefix}."
                    ),
                    None => format!(
                        "UNKNOWN: no ROA covers {prefix} (registry answer: {status}) and no origin is on record."
                    ),
                }
            }
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

    fn alert(path: &str, expected: Option<&str>) -> Alert {
        let update = RouteUpdate::announce("104.244.42.0/24", path, 0);
        Alert::from_update(
            &update,
            TriggerReason::OwnershipMismatch,
            expected.map(str::to_string),
            None,
        )
    }

    #[tokio::test]
    async fn falls_back_to_recorded_origin() {
        let tool = AuthorityCheck::new(
            Arc::new(OfflineRegistry::default()),
            [("104.244.42.0/24".to_string(), "13414".to_string())].into(),
        );
        let hijack = tool.run_check(&alert("174 12389", None)).await.unwrap();
        assert!(hijack.starts_with("INVALID (historical)"), "{hijack}");
        let owner = tool.run_check(&alert("174 13414", None)).await.unwrap();
        assert!(owner.starts_with("VALID (historical)"), "{owner}");
    }

    #[tokio::test]
    async fn unknown_without_records() {
        let tool = AuthorityCheck::new(Arc::new(OfflineRegistry::default()), HashMap::new());
        let out = tool.run_check(&alert("174 12389", None)).await.unwrap();
        assert!(out.starts_with("UNKNOWN"));
        let out = tool.run_check(&alert("174 12389", Some("13414"))).await.unwrap();
        assert!(out.starts_with("INVALID (historical)"));
    }
}
