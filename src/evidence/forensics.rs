//! Path forensics: decide whether the path looks like an origin hijack, a route leak,
//! heavy prepending or nothing at all, and name the AS most likely responsible.

use super::topology::valley_free_violation;
use super::{EvidenceCollaborator, ToolId};
use crate::detect::Alert;
use crate::error::EvidenceError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Consecutive repeats of one AS above this count are flagged.
const PREPEND_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    OriginHijack { suspect: String, owner: String },
    RouteLeak { suspect: String, between: (String, String) },
    PathPrepend { asn: String, repeats: usize },
    Consistent,
}

pub struct PathForensics {
    tier1: Arc<HashSet<String>>,
}

impl PathForensics {
    pub fn new(tier1: Arc<HashSet<String>>) -> Self {
        Self { tier1 }
    }

    pub fn classify(&self, alert: &Alert) -> Finding {
        if let Some(owner) = &alert.expected_owner {
            if !alert.origin.is_empty() && &alert.origin != owner {
                return Finding::OriginHijack {
                    suspect: alert.origin.clone(),
                    owner: owner.clone(),
                };
            }
        }
        if let Some((before, leaker, after)) = valley_free_violation(&alert.path, &self.tier1) {
            return Finding::RouteLeak {
                suspect: leaker.to_string(),
                between: (before.to_string(), after.to_string()),
            };
        }
        if let Some((asn, repeats)) = longest_run(&alert.path).filter(|(_, n)| *n > PREPEND_LIMIT)
        {
            return Finding::PathPrepend {
                asn: asn.to_string(),
                repeats,
            };
        }
        Finding::Consistent
    }
}

fn longest_run(path: &[String]) -> Option<(&str, usize)> {
    let mut best: Option<(&str, usize)> = None;
    let mut i = 0;
    while i < path.len() {
        let run = path[i..].iter().take_while(|a| **a == path[i]).count();
        if best.map_or(true, |(_, n)| run > n) {
            best = Some((path[i].as_str(), run));
        }
        i += run;
    }
    best
}

#[async_trait]
impl EvidenceCollaborator for PathForensics {
    fn tool(&self) -> ToolId {
        ToolId::PathForensics
    }

    async fn run_check(&self, alert: &Alert) -> Result<String, EvidenceError> {
        let report = match self.classify(alert) {
            Finding::OriginHijack { suspect, owner } => {
                let upstream = alert.path[..alert.path.len().saturating_sub(1)]
                    .iter()
                    .any(|a| *a == owner);
                let note = if upstream {
                    " The owner appears upstream in the path, which can indicate a customer re-origination."
                } else {
                    ""
                };
                format!(
                    "ORIGIN_HIJACK: AS{suspect} originates {} which is owned by AS{owner}.{note} Primary suspect: AS{suspect}.",
                    alert.prefix
                )
            }
            Finding::RouteLeak { suspect, between } => format!(
                "ROUTE_LEAK: AS{suspect} carries the route between tier-1 AS{} and AS{}. Primary suspect: AS{suspect}.",
                between.0, between.1
            ),
            Finding::PathPrepend { asn, repeats } => format!(
                "PATH_PREPEND: AS{asn} appears {repeats} times in a row; traffic engineering, no origin conflict. Primary suspect: none."
            ),
            Finding::Consistent => format!(
                "CONSISTENT: origin AS{} shows no hijack or leak pattern. Primary suspect: none.",
                alert.origin
            ),
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::TriggerReason;
    use crate::feed::RouteUpdate;

    fn forensics() -> PathForensics {
        PathForensics::new(Arc::new(["174", "3356", "1299"].map(String::from).into()))
    }

    fn alert(path: &str, owner: Option<&str>) -> Alert {
        Alert::from_update(
            &RouteUpdate::announce("104.244.42.0/24", path, 0),
            TriggerReason::Novelty,
            owner.map(str::to_string),
            None,
        )
    }

    #[test]
    fn origin_conflict_names_the_origin() {
        let f = forensics().classify(&alert("174 12389", Some("13414")));
        assert_eq!(
            f,
            Finding::OriginHijack {
                suspect: "12389".into(),
                owner: "13414".into()
            }
        );
    }

    #[test]
    fn leak_names_the_sandwiched_as() {
        let f = forensics().classify(&alert("174 64500 3356 13414", Some("13414")));
        assert!(matches!(f, Finding::RouteLeak { ref suspect, .. } if suspect == "64500"));
    }

    #[test]
    fn prepending_and_clean_paths() {
        let f = forensics().classify(&alert("174 13414 13414 13414 13414", Some("13414")));
        assert_eq!(
            f,
            Finding::PathPrepend {
                asn: "13414".into(),
                repeats: 4
            }
        );
        assert_eq!(
            forensics().classify(&alert("174 13414", Some("13414"))),
            Finding::Consistent
        );
    }

    #[tokio::test]
    async fn report_carries_primary_suspect() {
        let out = forensics()
            .run_check(&alert("174 12389", Some("13414")))
            .await
            .unwrap();
        assert!(out.starts_with("ORIGIN_HIJACK"));
        assert!(out.contains("Primary suspect: AS12389"));
    }
}
