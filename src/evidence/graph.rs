//! In-process AS relationship graph. Loaded once from JSON, queried with BFS.

use super::{EvidenceCollaborator, ToolId};
use crate::detect::Alert;
use crate::error::EvidenceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsNode {
    pub asn: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsEdge {
    pub from: String,
    pub to: String,
    /// e.g. "provider", "peer"; informational only
    #[serde(default)]
    pub relation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphFile {
    #[serde(default)]
    nodes: Vec<AsNode>,
    #[serde(default)]
    edges: Vec<AsEdge>,
    /// prefix -> owning ASN
    #[serde(default)]
    prefixes: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct AsGraph {
    nodes: HashMap<String, AsNode>,
    adjacency: HashMap<String, Vec<String>>,
    prefix_owners: HashMap<String, String>,
}

impl AsGraph {
    pub fn new(nodes: Vec<AsNode>, edges: Vec<AsEdge>, prefixes: HashMap<String, String>) -> Self {
        let mut graph = Self {
            nodes: HashMap::new(),
            adjacency: HashMap::new(),
            prefix_owners: prefixes,
        };
        for node in nodes {
            graph.adjacency.entry(node.asn.clone()).or_default();
            graph.nodes.insert(node.asn.clone(), node);
        }
        for edge in edges {
            for (a, b) in [(&edge.from, &edge.to), (&edge.to, &edge.from)] {
                graph.nodes.entry(a.clone()).or_insert_with(|| AsNode {
                    asn: a.clone(),
                    ..AsNode::default()
                });
                let links = graph.adjacency.entry(a.clone()).or_default();
                if !links.contains(b) {
                    links.push(b.clone());
                }
            }
        }
        graph
    }

    pub fn load(path: &Path) -> Result<Self, EvidenceError> {
        let topology = |reason: String| EvidenceError::Topology {
            path: path.display().to_string(),
            reason,
        };
        let data = std::fs::read_to_string(path).map_err(|e| topology(e.to_string()))?;
        let file: GraphFile = serde_json::from_str(&data).map_err(|e| topology(e.to_string()))?;
        Ok(Self::new(file.nodes, file.edges, file.prefixes))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, asn: &str) -> bool {
        self.nodes.contains_key(asn)
    }

    pub fn node(&self, asn: &str) -> Option<&AsNode> {
        self.nodes.get(asn)
    }

    pub fn owner_of(&self, prefix: &str) -> Option<&str> {
        self.prefix_owners.get(prefix).map(String::as_str)
    }

    /// Fewest-hop path from `from` to `to`, both ends included.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        if from == to {
            return Some(vec![from.to_string()]);
        }
        let mut parent: HashMap<&str, &str> = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::from([from]);
        let mut queue: VecDeque<&str> = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            for next in self.adjacency.get(current).into_iter().flatten() {
                if !seen.insert(next.as_str()) {
                    continue;
                }
                parent.insert(next.as_str(), current);
                if next == to {
                    let mut path = vec![to.to_string()];
                    let mut at = to;
                    while let Some(&p) = parent.get(at) {
                        path.push(p.to_string());
                        at = p;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next.as_str());
            }
        }
        None
    }

    fn label(&self, asn: &str) -> String {
        match self.node(asn).and_then(|n| n.name.as_deref()) {
            Some(name) => format!("AS{asn} ({name})"),
            None => format!("AS{asn}"),
        }
    }
}

pub struct GraphCheck {
    graph: Arc<AsGraph>,
}

impl GraphCheck {
    pub fn new(graph: Arc<AsGraph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl EvidenceCollaborator for GraphCheck {
    fn tool(&self) -> ToolId {
        ToolId::GraphAnalysis
    }

    async fn run_check(&self, alert: &Alert) -> Result<String, EvidenceError> {
        let graph = &self.graph;
        let owner = alert
            .expected_owner
            .as_deref()
            .or_else(|| graph.owner_of(&alert.prefix));
        let Some(owner) = owner else {
            return Ok(format!(
                "GRAPH_MISSING: no owner recorded for {}; nothing to compare against.",
                alert.prefix
            ));
        };
        let origin = alert.origin.as_str();
        if origin == owner {
            return Ok(format!(
                "GRAPH_VALID: origin {} is the recorded owner.",
                graph.label(origin)
            ));
        }
        for asn in [origin, owner] {
            if !graph.contains(asn) {
                return Ok(format!(
                    "GRAPH_UNKNOWN: AS{asn} is not in the topology graph; origin AS{origin} differs from owner AS{owner}."
                ));
            }
        }
        let report = match graph.shortest_path(origin, owner) {
            Some(path) => format!(
                "GRAPH_SUSPICIOUS: origin {} is not the owner {}; they are {} hops apart via {}.",
                graph.label(origin),
                graph.label(owner),
                path.len() - 1,
                path.join(" -> ")
            ),
            None => format!(
                "GRAPH_ANOMALY: origin {} has no relationship path to owner {}.",
                graph.label(origin),
                graph.label(owner)
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

    fn graph() -> AsGraph {
        let edge = |a: &str, b: &str| AsEdge {
            from: a.into(),
            to: b.into(),
            relation: None,
        };
        AsGraph::new(
            vec![AsNode {
                asn: "13414".into(),
                name: Some("Twitter".into()),
                country: Some("US".into()),
            }],
            vec![
                edge("13414", "174"),
                edge("174", "3356"),
                edge("3356", "12389"),
                edge("64512", "64513"),
            ],
            [("104.244.42.0/24".to_string(), "13414".to_string())].into(),
        )
    }

    #[test]
    fn load_reads_topology_and_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("topology.json");
        std::fs::write(
            &good,
            r#"{"nodes": [{"asn": "13414", "name": "Twitter"}], "edges": [{"from": "13414", "to": "174"}], "prefixes": {"104.244.42.0/24": "13414"}}"#,
        )
        .unwrap();
        let g = AsGraph::load(&good).unwrap();
        assert!(g.contains("174"));
        assert_eq!(g.owner_of("104.244.42.0/24"), Some("13414"));

        let bad = dir.path().join("broken.json");
        std::fs::write(&bad, "{ nodes: oops").unwrap();
        assert!(matches!(AsGraph::load(&bad), Err(EvidenceError::Topology { .. })));
        let missing = AsGraph::load(&dir.path().join("absent.json"));
        assert!(matches!(missing, Err(EvidenceError::Topology { .. })));
        let top: crate::error::SentinelError = missing.unwrap_err().into();
        assert!(top.to_string().starts_with("topology file"));
    }

    #[test]
    fn bfs_finds_fewest_hops() {
        let g = graph();
        assert_eq!(
            g.shortest_path("12389", "13414").unwrap(),
            vec!["12389", "3356", "174", "13414"]
        );
        assert_eq!(g.shortest_path("64512", "13414"), None);
        assert_eq!(g.shortest_path("99", "13414"), None);
    }

    #[tokio::test]
    async fn outcomes() {
        let tool = GraphCheck::new(Arc::new(graph()));
        let alert = |prefix: &str, path: &str| {
            Alert::from_update(
                &RouteUpdate::announce(prefix, path, 0),
                TriggerReason::Novelty,
                None,
                None,
            )
        };
        let out = tool.run_check(&alert("104.244.42.0/24", "3356 12389")).await.unwrap();
        assert!(out.starts_with("GRAPH_SUSPICIOUS") && out.contains("3 hops"), "{out}");
        let out = tool.run_check(&alert("104.244.42.0/24", "174 13414")).await.unwrap();
        assert!(out.starts_with("GRAPH_VALID"));
        let out = tool.run_check(&alert("104.244.42.0/24", "64513 64512")).await.unwrap();
        assert!(out.starts_with("GRAPH_ANOMALY"));
        let out = tool.run_check(&alert("104.244.42.0/24", "174 7")).await.unwrap();
        assert!(out.starts_with("GRAPH_UNKNOWN"));
        let out = tool.run_check(&alert("9.9.9.0/24", "174 7")).await.unwrap();
        assert!(out.starts_with("GRAPH_MISSING"));
    }
}
