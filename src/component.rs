//! Workflow step nodes.
//!
//! A [`Component`] is one step of the workflow (train, deploy or predict) plus
//! the ids of the steps that run after it. Nodes live in the arena owned by
//! [`crate::pipeline::Pipeline`]; children are referenced by [`ComponentId`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a component inside one pipeline.
///
/// Real steps are numbered from 0 in creation order; the synthetic root is -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub i64);

impl ComponentId {
    pub const ROOT: ComponentId = ComponentId(-1);

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Start,
    Train,
    Deploy,
    Predict,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Start => "start",
            Role::Train => "train",
            Role::Deploy => "deploy",
            Role::Predict => "predict",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sparse parameter map of a step. Only supplied arguments appear as keys.
pub type Params = BTreeMap<String, Value>;

/// Build a [`Params`] map from `(key, Option<value>)` pairs, keeping exactly the
/// entries whose value was supplied. Falsy values such as `0` or `""` are kept.
pub fn sparse_params<I>(entries: I) -> Params
where
    I: IntoIterator<Item = (&'static str, Option<Value>)>,
{
    entries
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    pub role: Role,
    pub id: ComponentId,
    pub params: Params,
    pub children: Vec<ComponentId>,
}

impl Component {
    pub fn new(role: Role, id: ComponentId, params: Params) -> Self {
        Self {
            role,
            id,
            params,
            children: Vec::new(),
        }
    }

    /// The synthetic `start` node every pipeline hangs its top-level steps from.
    pub fn root() -> Self {
        Self::new(Role::Start, ComponentId::ROOT, Params::new())
    }

    /// Append a child; order of insertion is preserved.
    pub fn add_child(&mut self, child: ComponentId) {
        self.children.push(child);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_sparse_params_drops_only_unset() {
        let params = sparse_params([
            ("model_uri", None),
            ("wait_interval", Some(json!(0))),
            ("version_id", Some(json!(""))),
        ]);
        assert_eq!(params.len(), 2);
        assert_eq!(params["wait_interval"], json!(0));
        assert_eq!(params["version_id"], json!(""));
        assert!(!params.contains_key("model_uri"));
    }

    #[test]
    fn test_add_child_keeps_insertion_order() {
        let mut root = Component::root();
        root.add_child(ComponentId(2));
        root.add_child(ComponentId(0));
        assert_eq!(root.children, vec![ComponentId(2), ComponentId(0)]);
        assert!(root.id.is_root());
        assert_eq!(root.role, Role::Start);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let c = Component::new(Role::Deploy, ComponentId(3), Params::new());
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["role"], json!("deploy"));
        assert_eq!(v["id"], json!(3));
    }
}
