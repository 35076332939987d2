//! Automation flow documents.
//!
//! A flow is the `{nodes, edges}` graph produced by the visual editor and
//! stored whole. Fields the editor adds that we do not model (styling,
//! handles, viewport) are kept in `extra` maps so a save/load round trip
//! hands the editor back exactly what it stored.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDocument {
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(default)]
    pub position: Position,
    pub data: NodeData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Canvas coordinates, kept as the editor wrote them so integer positions
/// come back as integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: Number,
    pub y: Number,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            x: Number::from(0),
            y: Number::from(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub label: String,
    /// Raw type tag as stored; see [`NodeKind`] for the accepted set.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The closed set of node behaviours a flow may contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Fires when an inbound message contains `pattern`.
    TriggerContains { pattern: Option<String> },
    /// Replies with literal `text` or the template `template_id`.
    ActionReply {
        text: Option<String>,
        template_id: Option<i64>,
    },
    /// Pauses the flow.
    Wait { seconds: Option<u64> },
}

impl NodeKind {
    pub const TAGS: &'static [&'static str] = &["trigger_contains", "action_reply", "wait"];
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("node '{node_id}' has unknown type '{tag}'")]
    UnknownNodeType { node_id: String, tag: String },

    #[error("node '{node_id}' has invalid data: {reason}")]
    InvalidNodeData { node_id: String, reason: String },

    #[error("edge '{edge_id}' references missing node '{node_id}'")]
    DanglingEdge { edge_id: String, node_id: String },
}

impl FlowNode {
    /// Parse the node's data into its typed behaviour.
    pub fn kind(&self) -> Result<NodeKind, FlowError> {
        if !NodeKind::TAGS.contains(&self.data.kind.as_str()) {
            return Err(FlowError::UnknownNodeType {
                node_id: self.id.clone(),
                tag: self.data.kind.clone(),
            });
        }

        let invalid = |reason: String| FlowError::InvalidNodeData {
            node_id: self.id.clone(),
            reason,
        };
        let value = serde_json::to_value(&self.data).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
    }
}

impl FlowDocument {
    /// Check the document before it is stored.
    ///
    /// Node ids must be unique, every node must carry a known type with
    /// well-formed data, and every edge must connect existing nodes.
    /// Cycles and unreachable nodes are allowed.
    pub fn validate(&self) -> Result<(), FlowError> {
        let mut ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(FlowError::DuplicateNode(node.id.clone()));
            }
            node.kind()?;
        }

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(FlowError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn editor_flow() -> Value {
        json!({
            "nodes": [
                {
                    "id": "n1",
                    "position": { "x": 100.0, "y": 80.0 },
                    "data": { "label": "trigger contains", "type": "trigger_contains", "pattern": "price" },
                    "style": { "padding": 8, "border": "1px solid #cbd5e1" }
                },
                {
                    "id": "n2",
                    "position": { "x": 140.0, "y": 100.0 },
                    "data": { "label": "wait", "type": "wait", "seconds": 30 }
                },
                {
                    "id": "n3",
                    "position": { "x": 180.0, "y": 120.0 },
                    "data": { "label": "action reply", "type": "action_reply", "text": "Thanks!" }
                }
            ],
            "edges": [
                { "id": "e1", "source": "n1", "target": "n2" },
                { "id": "e2", "source": "n2", "target": "n3", "animated": true }
            ],
            "viewport": { "zoom": 1.5 }
        })
    }

    #[test]
    fn editor_document_validates() {
        let doc: FlowDocument = serde_json::from_value(editor_flow()).unwrap();
        assert_eq!(doc.nodes.len(), 3);
        assert_eq!(doc.edges.len(), 2);
        doc.validate().unwrap();

        assert_eq!(
            doc.nodes[0].kind().unwrap(),
            NodeKind::TriggerContains { pattern: Some("price".into()) }
        );
        assert_eq!(doc.nodes[1].kind().unwrap(), NodeKind::Wait { seconds: Some(30) });
        assert_eq!(
            doc.nodes[2].kind().unwrap(),
            NodeKind::ActionReply { text: Some("Thanks!".into()), template_id: None }
        );
    }

    #[test]
    fn unmodelled_fields_survive_roundtrip() {
        let original = editor_flow();
        let doc: FlowDocument = serde_json::from_value(original.clone()).unwrap();
        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn integer_positions_stay_integers() {
        let original = json!({
            "nodes": [
                { "id": "a", "position": { "x": 100, "y": 80 }, "data": { "label": "wait", "type": "wait" } },
                { "id": "b", "position": { "x": -12, "y": 40.5 }, "data": { "label": "reply", "type": "action_reply" } }
            ],
            "edges": [{ "id": "e1", "source": "a", "target": "b" }]
        });
        let doc: FlowDocument = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(doc.nodes[0].position.x.as_i64(), Some(100));

        let stored = serde_json::to_string(&doc).unwrap();
        assert!(stored.contains(r#""position":{"x":100,"y":80}"#));
        assert_eq!(serde_json::from_str::<Value>(&stored).unwrap(), original);
    }

    #[test]
    fn bare_nodes_from_the_editor_are_accepted() {
        // The editor only sets label and type when a node is first added.
        let doc: FlowDocument = serde_json::from_value(json!({
            "nodes": [{ "id": "a", "position": { "x": 1.0, "y": 2.0 }, "data": { "label": "wait", "type": "wait" } }],
            "edges": []
        }))
        .unwrap();
        doc.validate().unwrap();
        assert_eq!(doc.nodes[0].kind().unwrap(), NodeKind::Wait { seconds: None });
    }

    #[test]
    fn unknown_type_is_rejected() {
        let doc: FlowDocument = serde_json::from_value(json!({
            "nodes": [{ "id": "a", "position": { "x": 0.0, "y": 0.0 }, "data": { "label": "x", "type": "send_email" } }],
            "edges": []
        }))
        .unwrap();
        assert_eq!(
            doc.validate(),
            Err(FlowError::UnknownNodeType { node_id: "a".into(), tag: "send_email".into() })
        );
    }

    #[test]
    fn malformed_node_data_is_rejected() {
        let doc: FlowDocument = serde_json::from_value(json!({
            "nodes": [{ "id": "a", "position": { "x": 0.0, "y": 0.0 }, "data": { "type": "wait", "seconds": "soon" } }],
            "edges": []
        }))
        .unwrap();
        assert!(matches!(doc.validate(), Err(FlowError::InvalidNodeData { .. })));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let doc: FlowDocument = serde_json::from_value(json!({
            "nodes": [{ "id": "a", "position": { "x": 0.0, "y": 0.0 }, "data": { "type": "wait" } }],
            "edges": [{ "id": "e1", "source": "a", "target": "ghost" }]
        }))
        .unwrap();
        assert_eq!(
            doc.validate(),
            Err(FlowError::DanglingEdge { edge_id: "e1".into(), node_id: "ghost".into() })
        );
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let doc: FlowDocument = serde_json::from_value(json!({
            "nodes": [
                { "id": "a", "position": { "x": 0.0, "y": 0.0 }, "data": { "type": "wait" } },
                { "id": "a", "position": { "x": 5.0, "y": 5.0 }, "data": { "type": "wait" } }
            ],
            "edges": []
        }))
        .unwrap();
        assert_eq!(doc.validate(), Err(FlowError::DuplicateNode("a".into())));
    }

    #[test]
    fn cycles_are_allowed() {
        let doc: FlowDocument = serde_json::from_value(json!({
            "nodes": [
                { "id": "a", "position": { "x": 0.0, "y": 0.0 }, "data": { "type": "wait" } },
                { "id": "b", "position": { "x": 0.0, "y": 0.0 }, "data": { "type": "action_reply" } }
            ],
            "edges": [
                { "id": "e1", "source": "a", "target": "b" },
                { "id": "e2", "source": "b", "target": "a" }
            ]
        }))
        .unwrap();
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn empty_document_is_valid() {
        let doc: FlowDocument = serde_json::from_value(json!({})).unwrap();
        assert!(doc.nodes.is_empty());
        assert!(doc.validate().is_ok());
    }
}
