use crate::error::DegreesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the bipartite graph a node lives on.
///
/// Determines which provider lookup is used to expand the node: a person
/// expands to the works they appear in, a work expands to the people
/// credited on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Person,
    Work,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Person => "person",
            NodeKind::Work => "work",
        }
    }

    /// The kind a neighbor of this kind always has (the graph is bipartite).
    pub fn opposite(&self) -> NodeKind {
        match self {
            NodeKind::Person => NodeKind::Work,
            NodeKind::Work => NodeKind::Person,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = DegreesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(NodeKind::Person),
            "work" => Ok(NodeKind::Work),
            other => Err(DegreesError::InvalidNode(format!(
                "unrecognized node kind: {}",
                other
            ))),
        }
    }
}

/// Canonical node key, the store's primary key.
///
/// A pure function of (kind, raw id): equal pairs always produce equal
/// keys and vice versa. No random or time-based component, so keys are
/// stable across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(String);

impl NodeKey {
    pub fn new(kind: NodeKind, raw_id: &str) -> Self {
        NodeKey(format!("{}-{}", kind.as_str(), raw_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An unexpanded reference to a node, as returned by the graph provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub kind: NodeKind,
    pub raw_id: String,
}

impl NodeRef {
    pub fn new(kind: NodeKind, raw_id: impl Into<String>) -> Self {
        Self {
            kind,
            raw_id: raw_id.into(),
        }
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.kind, &self.raw_id)
    }
}

/// A discovered node as persisted in the distance store.
///
/// There is no record at all for an undiscovered node; "Infinity" is the
/// absence of a row, not a sentinel value. `distance` only ever decreases
/// once the record exists. `expanded` records whether fan-out for the
/// current distance completed, so a redelivered task knows whether its
/// neighbors still need submitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub kind: NodeKind,
    pub raw_id: String,
    pub key: NodeKey,
    pub distance: u32,
    pub expanded: bool,
}
