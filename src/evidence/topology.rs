//! Valley-free check: a non-tier-1 AS sandwiched between two tier-1 ASes is carrying
//! transit it has no business carrying.

use super::{EvidenceCollaborator, Registry, ToolId};
use crate::detect::Alert;
use crate::error::EvidenceError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Path with consecutive repeats (prepending) folded to one hop.
pub fn collapse_prepends(path: &[String]) -> Vec<&str> {
    let mut hops: Vec<&str> = Vec::with_capacity(path.len());
    for asn in path {
        if hops.last() != Some(&asn.as_str()) {
            hops.push(asn);
        }
    }
    hops
}

/// First `(tier1_before, leaker, tier1_after)` triple in the collapsed path.
pub fn valley_free_violation<'a>(
    path: &'a [String],
    tier1: &HashSet<String>,
) -> Option<(&'a str, &'a str, &'a str)> {
    let hops = collapse_prepends(path);
    hops.windows(3).find_map(|w| {
        let (prev, curr, next) = (w[0], w[1], w[2]);
        (tier1.contains(prev) && tier1.contains(next) && !tier1.contains(curr))
            .then_some((prev, curr, next))
    })
}

pub struct TopologyCheck {
    registry: Arc<dyn Registry>,
    tier1: Arc<HashSet<String>>,
}

impl TopologyCheck {
    pub fn new(registry: Arc<dyn Registry>, tier1: Arc<HashSet<String>>) -> Self {
        Self { registry, tier1 }
    }
}

#[async_trait]
impl EvidenceCollaborator for TopologyCheck {
    fn tool(&self) -> ToolId {
        ToolId::TopologyCheck
    }

    async fn run_check(&self, alert: &Alert) -> Result<String, EvidenceError> {
        if collapse_prepends(&alert.path).len() < 3 {
            return Ok("NORMAL: path too short for a valley-free check.".to_string());
        }
        let Some((before, leaker, after)) = valley_free_violation(&alert.path, &self.tier1) else {
            return Ok("NORMAL: path is valley-free.".to_string());
        };
        let holder = self
            .registry
            .as_holder(leaker)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| format!("AS{leaker}"));
        Ok(format!(
            "ROUTE_LEAK: traffic passes through non-tier-1 {holder} (AS{leaker}) between tier-1 AS{before} and AS{after}; valley-free violation."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn finds_sandwiched_non_tier1() {
        let tier1: HashSet<String> = ["174", "3356", "1299"].map(String::from).into();
        assert_eq!(
            valley_free_violation(&path("174 64500 3356 13414"), &tier1),
            Some(("174", "64500", "3356"))
        );
        assert_eq!(
            valley_free_violation(&path("174 64500 64500 3356 13414"), &tier1),
            Some(("174", "64500", "3356"))
        );
        assert_eq!(valley_free_violation(&path("174 3356 13414"), &tier1), None);
        assert_eq!(valley_free_violation(&path("64500 174 13414"), &tier1), None);
    }

    #[test]
    fn prepends_collapse() {
        assert_eq!(collapse_prepends(&path("1 1 1 2 2 3")), vec!["1", "2", "3"]);
    }
}
