//! Provenance: the timestamp-ordered chain of events for one mission.
//!
//! The model allows multiple parents per node for future branching; today
//! every derived graph is a simple path.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Event;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceNode {
    pub event: Event,
    #[serde(default)]
    pub parents: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceEdge {
    pub from: Uuid,
    pub to: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceGraph {
    pub mission_id: Uuid,
    pub nodes: Vec<ProvenanceNode>,
    pub edges: Vec<ProvenanceEdge>,
}

impl ProvenanceGraph {
    /// Link already-ordered events into a chain.
    pub fn from_events(mission_id: Uuid, events: Vec<Event>) -> Self {
        let edges = events
            .windows(2)
            .map(|pair| ProvenanceEdge {
                from: pair[0].id,
                to: pair[1].id,
            })
            .collect();

        let mut nodes: Vec<ProvenanceNode> = Vec::with_capacity(events.len());
        let mut previous: Option<Uuid> = None;
        for event in events {
            let parents = previous.into_iter().collect();
            previous = Some(event.id);
            nodes.push(ProvenanceNode { event, parents });
        }

        Self {
            mission_id,
            nodes,
            edges,
        }
    }

    /// A well-formed chain: n nodes, n-1 edges, each edge joining adjacent
    /// nodes, timestamps non-decreasing.
    pub fn is_simple_path(&self) -> bool {
        if self.nodes.is_empty() {
            return self.edges.is_empty();
        }
        if self.edges.len() != self.nodes.len() - 1 {
            return false;
        }
        for (idx, edge) in self.edges.iter().enumerate() {
            if edge.from != self.nodes[idx].event.id || edge.to != self.nodes[idx + 1].event.id {
                return false;
            }
        }
        self.nodes
            .windows(2)
            .all(|pair| pair[0].event.timestamp <= pair[1].event.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{EventKind, EvidenceLog};
    use serde_json::json;

    #[test]
    fn graph_is_a_simple_path() {
        let log = EvidenceLog::new();
        let mission = Uuid::new_v4();
        for kind in [
            EventKind::MissionCreated,
            EventKind::CheckpointApproved,
            EventKind::BatchExecuted,
            EventKind::RollbackApplied,
        ] {
            log.append(kind, Some(mission), json!({}));
        }

        let graph = log.provenance(mission);
        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.edges.len(), 3);
        assert!(graph.is_simple_path());
        assert!(graph.nodes[0].parents.is_empty());
        assert_eq!(graph.nodes[1].parents, vec![graph.nodes[0].event.id]);
    }

    #[test]
    fn empty_mission_yields_empty_graph() {
        let log = EvidenceLog::new();
        let graph = log.provenance(Uuid::new_v4());
        assert!(graph.nodes.is_empty());
        assert!(graph.edges.is_empty());
        assert!(graph.is_simple_path());
    }
}
