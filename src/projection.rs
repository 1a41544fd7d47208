//! Adjacency-list projections of a graph snapshot.

use ahash::AHashMap;
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{errors::DagStoreError, model::GraphSnapshot};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AdjacencyDirection {
    /// `source -> [targets]`
    #[default]
    Outgoing,
    /// `target -> [sources]`
    Incoming,
}

impl AdjacencyDirection {
    pub fn from_reversed(reversed: bool) -> Self {
        if reversed {
            AdjacencyDirection::Incoming
        } else {
            AdjacencyDirection::Outgoing
        }
    }
}

/// Node name to neighbour names, keyed in snapshot node order.
///
/// Serializes as a JSON object.
#[derive(Clone, Debug, Default)]
pub struct AdjacencyList {
    entries: Vec<(String, Vec<String>)>,
    index: AHashMap<String, usize>,
}

impl AdjacencyList {
    fn with_nodes<'a>(nodes: impl ExactSizeIterator<Item = &'a String>) -> Self {
        let mut list = Self {
            entries: Vec::with_capacity(nodes.len()),
            index: AHashMap::with_capacity(nodes.len()),
        };
        for name in nodes {
            if list.index.contains_key(name) {
                continue;
            }
            list.index.insert(name.clone(), list.entries.len());
            list.entries.push((name.clone(), Vec::new()));
        }
        list
    }

    fn push_neighbour(&mut self, key: &str, neighbour: &str) -> bool {
        match self.index.get(key) {
            Some(&slot) => {
                self.entries[slot].1.push(neighbour.to_string());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.index
            .get(name)
            .map(|&slot| self.entries[slot].1.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, neighbours)| (name.as_str(), neighbours.as_slice()))
    }

    pub fn into_entries(self) -> Vec<(String, Vec<String>)> {
        self.entries
    }
}

impl PartialEq for AdjacencyList {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for AdjacencyList {}

impl Serialize for AdjacencyList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, neighbours) in &self.entries {
            map.serialize_entry(name, neighbours)?;
        }
        map.end()
    }
}

/// Builds the forward or reverse adjacency list of `snapshot`.
///
/// Every node appears as a key, including isolated ones. Neighbour order
/// follows edge order in the snapshot. An edge naming a node outside the
/// snapshot means the store broke referential integrity and is reported as
/// [`DagStoreError::IntegrityError`].
pub fn build_adjacency(
    snapshot: &GraphSnapshot,
    direction: AdjacencyDirection,
) -> Result<AdjacencyList, DagStoreError> {
    let mut list = AdjacencyList::with_nodes(snapshot.nodes.iter());
    for edge in &snapshot.edges {
        let (key, neighbour) = match direction {
            AdjacencyDirection::Outgoing => (&edge.source, &edge.target),
            AdjacencyDirection::Incoming => (&edge.target, &edge.source),
        };
        if !list.contains_key(neighbour) || !list.push_neighbour(key, neighbour) {
            return Err(DagStoreError::integrity(format!(
                "graph {} has edge {}->{} with an endpoint outside its node set",
                snapshot.id, edge.source, edge.target
            )));
        }
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeSpec, GraphId};

    fn snapshot(nodes: &[&str], edges: &[(&str, &str)]) -> GraphSnapshot {
        GraphSnapshot {
            id: GraphId(1),
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            edges: edges.iter().map(|(s, t)| EdgeSpec::new(*s, *t)).collect(),
        }
    }

    #[test]
    fn forward_keeps_isolated_nodes() {
        let snap = snapshot(&["a", "b", "c"], &[("a", "b")]);
        let adj = build_adjacency(&snap, AdjacencyDirection::Outgoing).unwrap();
        assert_eq!(adj.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(adj.get("a").unwrap(), ["b".to_string()]);
        assert!(adj.get("b").unwrap().is_empty());
        assert!(adj.get("c").unwrap().is_empty());
    }

    #[test]
    fn reverse_lists_sources_in_edge_order() {
        let snap = snapshot(&["a", "b", "c"], &[("b", "c"), ("a", "c")]);
        let adj = build_adjacency(&snap, AdjacencyDirection::Incoming).unwrap();
        assert_eq!(adj.get("c").unwrap(), ["b".to_string(), "a".to_string()]);
        assert!(adj.get("a").unwrap().is_empty());
    }

    #[test]
    fn dangling_edge_is_integrity_error() {
        let snap = snapshot(&["a"], &[("a", "zz")]);
        let err = build_adjacency(&snap, AdjacencyDirection::Outgoing).unwrap_err();
        assert!(matches!(err, DagStoreError::IntegrityError(_)));
    }

    #[test]
    fn serializes_as_ordered_object() {
        let snap = snapshot(&["b", "a"], &[("b", "a")]);
        let adj = build_adjacency(&snap, AdjacencyDirection::Outgoing).unwrap();
        let json = serde_json::to_string(&adj).unwrap();
        assert_eq!(json, r#"{"b":["a"],"a":[]}"#);
    }
}
