//! Node name rules applied at the request boundary.
//!
//! The service trusts names it receives; transports call
//! [`GraphCreate::validate_names`] (or [`validate_node_name`] for path
//! parameters) before handing a request to it.

use crate::{errors::GraphError, model::GraphCreate};

pub const MAX_NODE_NAME_LENGTH: usize = 255;

pub fn is_valid_node_name(name: &str) -> bool {
    name_violation(name).is_none()
}

pub fn validate_node_name(name: &str, loc: &[&str]) -> Result<(), GraphError> {
    match name_violation(name) {
        None => Ok(()),
        Some(reason) => Err(GraphError::InvalidName {
            loc: loc.iter().map(|part| part.to_string()).collect(),
            name: name.to_string(),
            reason,
        }),
    }
}

impl GraphCreate {
    /// Checks every node name and edge endpoint, reporting the first offender.
    pub fn validate_names(&self) -> Result<(), GraphError> {
        for (idx, name) in self.nodes.iter().enumerate() {
            let idx = idx.to_string();
            validate_node_name(name, &["body", "nodes", &idx, "name"])?;
        }
        for (idx, edge) in self.edges.iter().enumerate() {
            let idx = idx.to_string();
            validate_node_name(&edge.source, &["body", "edges", &idx, "source"])?;
            validate_node_name(&edge.target, &["body", "edges", &idx, "target"])?;
        }
        Ok(())
    }
}

fn name_violation(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("node name must not be empty");
    }
    if !name.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Some("node name must match ^[a-zA-Z]+$");
    }
    // ASCII only from here on, so byte length equals character count.
    if name.len() > MAX_NODE_NAME_LENGTH {
        return Some("node name must be at most 255 characters");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_letters() {
        assert!(is_valid_node_name("a"));
        assert!(is_valid_node_name("NodeName"));
        assert!(is_valid_node_name(&"z".repeat(MAX_NODE_NAME_LENGTH)));
    }

    #[test]
    fn rejects_empty_long_and_non_alpha() {
        assert!(!is_valid_node_name(""));
        assert!(!is_valid_node_name(&"z".repeat(MAX_NODE_NAME_LENGTH + 1)));
        assert!(!is_valid_node_name("a1"));
        assert!(!is_valid_node_name("a b"));
        assert!(!is_valid_node_name("ä"));
    }

    #[test]
    fn create_request_reports_edge_location() {
        let request = GraphCreate::new(["a", "b"], [("a", "b"), ("b", "c_d")]);
        let err = request.validate_names().unwrap_err();
        assert_eq!(err.field_path(), vec!["body", "edges", "1", "target"]);
        match err {
            GraphError::InvalidName { name, .. } => assert_eq!(name, "c_d"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn create_request_reports_node_location() {
        let request = GraphCreate::new(["a", ""], Vec::<(&str, &str)>::new());
        let err = request.validate_names().unwrap_err();
        assert_eq!(err.field_path(), vec!["body", "nodes", "1", "name"]);
    }
}
