//! The polymorphic value tree.
//!
//! A [`MappingNode`] is the unified value representation flowing through the
//! resolver: every schema property that may hold nested structure is a
//! mapping node, and every resolved output is one. A node is exactly one of
//! a scalar, an ordered item sequence, a string-keyed field map, a
//! string-with-substitutions awaiting resolution, or `Null` for a slot that
//! could not be resolved at the current stage.
//!
//! Trees are bounded at [`MAPPING_NODE_MAX_TRAVERSE_DEPTH`]; deeper trees
//! are refused with a typed error before any work happens on them.

use std::collections::HashMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::scalar::ScalarValue;
use crate::errors::{ReasonCode, RunError};
use crate::paths::PathSegment;
use crate::subs::StringWithSubstitutions;

/// Maximum depth a mapping-node tree may reach before traversal refuses it.
pub const MAPPING_NODE_MAX_TRAVERSE_DEPTH: usize = 20;

/// A recursive, polymorphic blueprint value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MappingNode {
    /// An unresolved slot; stands in for values deferred to deployment.
    #[default]
    Null,
    Scalar(ScalarValue),
    Items(Vec<MappingNode>),
    Fields(HashMap<String, MappingNode>),
    /// A string field still carrying `${…}` expressions.
    SubstitutionStr(StringWithSubstitutions),
}

impl MappingNode {
    pub fn str(value: impl Into<String>) -> Self {
        MappingNode::Scalar(ScalarValue::str(value))
    }

    pub fn int(value: i64) -> Self {
        MappingNode::Scalar(ScalarValue::int(value))
    }

    pub fn float(value: f64) -> Self {
        MappingNode::Scalar(ScalarValue::float(value))
    }

    pub fn bool(value: bool) -> Self {
        MappingNode::Scalar(ScalarValue::bool(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MappingNode::Null)
    }

    /// Whether the node is fully resolved: no substitution string and no
    /// null slot anywhere in the tree.
    pub fn is_resolved(&self) -> bool {
        match self {
            MappingNode::Null => false,
            MappingNode::Scalar(_) => true,
            MappingNode::Items(items) => items.iter().all(MappingNode::is_resolved),
            MappingNode::Fields(fields) => fields.values().all(MappingNode::is_resolved),
            MappingNode::SubstitutionStr(_) => false,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            MappingNode::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_items(&self) -> Option<&[MappingNode]> {
        match self {
            MappingNode::Items(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_fields(&self) -> Option<&HashMap<String, MappingNode>> {
        match self {
            MappingNode::Fields(fields) => Some(fields),
            _ => None,
        }
    }

    /// Walk `segments` into the tree, returning the node at the path.
    pub fn get_path(&self, segments: &[PathSegment]) -> Option<&MappingNode> {
        let mut current = self;
        for segment in segments {
            current = match (segment, current) {
                (PathSegment::Field(name), MappingNode::Fields(fields)) => fields.get(name)?,
                (PathSegment::Index(i), MappingNode::Items(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Depth of the deepest leaf, counting the root as 1.
    pub fn depth(&self) -> usize {
        match self {
            MappingNode::Items(items) => {
                1 + items.iter().map(MappingNode::depth).max().unwrap_or(0)
            }
            MappingNode::Fields(fields) => {
                1 + fields.values().map(MappingNode::depth).max().unwrap_or(0)
            }
            _ => 1,
        }
    }

    /// Refuse trees deeper than [`MAPPING_NODE_MAX_TRAVERSE_DEPTH`].
    pub fn ensure_within_depth(&self) -> Result<(), RunError> {
        let depth = self.depth();
        if depth > MAPPING_NODE_MAX_TRAVERSE_DEPTH {
            return Err(RunError::new(
                ReasonCode::MaxTraverseDepthExceeded,
                format!(
                    "mapping node tree depth {} exceeds the maximum traversal depth of {}",
                    depth, MAPPING_NODE_MAX_TRAVERSE_DEPTH
                ),
            ));
        }
        Ok(())
    }

    /// Build a node from a parsed schema document value.
    ///
    /// Strings containing `${` are parsed as substitution strings; all other
    /// values map structurally. This is what schema deserialization uses, so
    /// blueprint JSON stays plain JSON.
    pub fn from_schema_value(value: &serde_json::Value) -> Result<Self, String> {
        match value {
            serde_json::Value::Null => Ok(MappingNode::Null),
            serde_json::Value::String(s) if s.contains("${") => {
                let parsed = crate::subs::parse::parse_string(s).map_err(|e| e.to_string())?;
                if parsed.has_substitutions() {
                    Ok(MappingNode::SubstitutionStr(parsed))
                } else {
                    Ok(MappingNode::Scalar(ScalarValue::str(
                        parsed.as_literal().unwrap_or_else(|| s.clone()),
                    )))
                }
            }
            serde_json::Value::Array(items) => {
                let mut nodes = Vec::with_capacity(items.len());
                for item in items {
                    nodes.push(MappingNode::from_schema_value(item)?);
                }
                Ok(MappingNode::Items(nodes))
            }
            serde_json::Value::Object(fields) => {
                let mut map = HashMap::with_capacity(fields.len());
                for (key, field) in fields {
                    map.insert(key.clone(), MappingNode::from_schema_value(field)?);
                }
                Ok(MappingNode::Fields(map))
            }
            other => ScalarValue::from_json(other)
                .map(MappingNode::Scalar)
                .ok_or_else(|| format!("unsupported schema value: {}", other)),
        }
    }

    /// Convert to a JSON value; substitution strings render to their source
    /// form and null slots become JSON null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            MappingNode::Null => serde_json::Value::Null,
            MappingNode::Scalar(scalar) => scalar.to_json(),
            MappingNode::Items(items) => {
                serde_json::Value::Array(items.iter().map(MappingNode::to_json).collect())
            }
            MappingNode::Fields(fields) => {
                let mut map = serde_json::Map::new();
                for (key, field) in fields {
                    map.insert(key.clone(), field.to_json());
                }
                serde_json::Value::Object(map)
            }
            MappingNode::SubstitutionStr(value) => serde_json::Value::String(value.render()),
        }
    }
}

impl From<ScalarValue> for MappingNode {
    fn from(scalar: ScalarValue) -> Self {
        MappingNode::Scalar(scalar)
    }
}

impl Serialize for MappingNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MappingNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        MappingNode::from_schema_value(&value).map_err(D::Error::custom)
    }
}
