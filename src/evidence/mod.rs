//! Evidence tools consulted during diagnosis. Tool names from the reasoning step are
//! mapped onto a closed set; anything else becomes a reportable "unsupported" result.

mod authority;
mod forensics;
mod geo;
mod graph;
pub mod knowledge;
mod neighbor;
mod registry;
mod stability;
mod topology;

pub use authority::AuthorityCheck;
pub use forensics::{Finding, PathForensics};
pub use geo::GeoCheck;
pub use graph::{AsGraph, GraphCheck};
pub use knowledge::{CaseLibrary, KnowledgeRetriever, SimilarCase, NO_SIMILAR_CASES};
pub use neighbor::NeighborCheck;
pub use registry::{OfflineRegistry, Registry, RipeStatRegistry, RpkiStatus};
pub use stability::StabilityCheck;
pub use topology::{collapse_prepends, valley_free_violation, TopologyCheck};

use crate::config::EvidenceConfig;
use crate::detect::Alert;
use crate::error::EvidenceError;
use crate::features::FeatureExtractor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    /// RPKI-style origin authorisation
    AuthorityCheck,
    /// Prefix vs origin registration country
    GeoCheck,
    /// First-hop propagation note
    NeighborCheck,
    /// Valley-free violation
    TopologyCheck,
    /// Origin/leak classification with a primary suspect
    PathForensics,
    /// Shortest path between origin and owner in the AS graph
    GraphAnalysis,
    /// Update frequency for the resource
    StabilityAnalysis,
}

impl ToolId {
    pub const ALL: [ToolId; 7] = [
        ToolId::AuthorityCheck,
        ToolId::GeoCheck,
        ToolId::NeighborCheck,
        ToolId::TopologyCheck,
        ToolId::PathForensics,
        ToolId::GraphAnalysis,
        ToolId::StabilityAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::AuthorityCheck => "authority_check",
            ToolId::GeoCheck => "geo_check",
            ToolId::NeighborCheck => "neighbor_check",
            ToolId::TopologyCheck => "topology_check",
            ToolId::PathForensics => "path_forensics",
            ToolId::GraphAnalysis => "graph_analysis",
            ToolId::StabilityAnalysis => "stability_analysis",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ToolId::AuthorityCheck => "RPKI authorisation of the origin AS for the prefix",
            ToolId::GeoCheck => "registration country of the prefix versus the origin AS",
            ToolId::NeighborCheck => "the first-hop network that propagated the route to the collector",
            ToolId::TopologyCheck => "valley-free (commercial relationship) violations along the path",
            ToolId::PathForensics => "origin hijack / route leak classification naming a primary suspect",
            ToolId::GraphAnalysis => "shortest path between the origin and the legitimate owner in the AS graph",
            ToolId::StabilityAnalysis => "update frequency of the prefix during monitoring",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        ToolId::ALL
            .into_iter()
            .find(|t| t.as_str() == key)
            .ok_or(())
    }
}

/// A tool named by the reasoning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    Known(ToolId),
    Unsupported(String),
}

impl ToolRequest {
    pub fn parse(name: &str) -> Self {
        match name.parse::<ToolId>() {
            Ok(id) => ToolRequest::Known(id),
            Err(()) => ToolRequest::Unsupported(name.trim().to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolRequest::Known(id) => id.as_str(),
            ToolRequest::Unsupported(name) => name,
        }
    }
}

/// One evidence tool: alert context in, human-readable report out.
#[async_trait]
pub trait EvidenceCollaborator: Send + Sync {
    fn tool(&self) -> ToolId;

    async fn run_check(&self, alert: &Alert) -> Result<String, EvidenceError>;
}

#[derive(Default)]
pub struct ToolKit {
    tools: HashMap<ToolId, Arc<dyn EvidenceCollaborator>>,
}

impl ToolKit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: Arc<dyn EvidenceCollaborator>) -> Self {
        self.tools.insert(tool.tool(), tool);
        self
    }

    /// Every tool, backed by `registry`, the AS graph and the live feature history.
    pub fn standard(
        config: &EvidenceConfig,
        registry: Arc<dyn Registry>,
        graph: Arc<AsGraph>,
        history: Arc<FeatureExtractor>,
    ) -> Self {
        let tier1: Arc<HashSet<String>> = Arc::new(config.tier1_asns.iter().cloned().collect());
        Self::new()
            .with(Arc::new(AuthorityCheck::new(
                Arc::clone(&registry),
                config.known_prefix_origins.clone().into_iter().collect(),
            )))
            .with(Arc::new(GeoCheck::new(
                Arc::clone(&registry),
                config.europe_region_codes.iter().cloned().collect(),
            )))
            .with(Arc::new(NeighborCheck::new(Arc::clone(&registry), Arc::clone(&tier1))))
            .with(Arc::new(TopologyCheck::new(registry, Arc::clone(&tier1))))
            .with(Arc::new(PathForensics::new(tier1)))
            .with(Arc::new(GraphCheck::new(graph)))
            .with(Arc::new(StabilityCheck::new(history)))
    }

    pub fn available(&self) -> Vec<ToolId> {
        let mut ids: Vec<ToolId> = self.tools.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Run the requested tool under `timeout`. Unknown or unconfigured tools yield a
    /// reportable string, not an error.
    pub async fn run_check(
        &self,
        request: &ToolRequest,
        alert: &Alert,
        timeout: Duration,
    ) -> Result<String, EvidenceError> {
        let id = match request {
            ToolRequest::Known(id) => *id,
            ToolRequest::Unsupported(name) => {
                let known: Vec<&str> = self.available().iter().map(|t| t.as_str()).collect();
                return Ok(format!(
                    "SYSTEM_ERROR: tool '{name}' does not exist. Available tools: {}.",
                    known.join(", ")
                ));
            }
        };
        let Some(tool) = self.tools.get(&id) else {
            return Ok(format!("SYSTEM_ERROR: tool '{id}' is not configured."));
        };
        match tokio::time::timeout(timeout, tool.run_check(alert)).await {
            Ok(Ok(report)) => Ok(format!("[{}]: {report}", id.as_str().to_ascii_uppercase())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EvidenceError::Timeout(timeout)),
        }
    }
}
