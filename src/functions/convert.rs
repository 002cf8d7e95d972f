//! Bridging between mapping nodes and native function values.
//!
//! Function implementations work with `serde_json::Value`; the resolver
//! works with [`MappingNode`]. Scalars map directly, sequences and maps
//! recurse, and arbitrary native types (structs included) route through
//! serde, which is the crate's stand-in for runtime reflection: any
//! `Serialize` return type becomes a field-keyed node tree.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::MappingNode;
use crate::errors::{ReasonCode, RunError};

/// Convert a resolved mapping node into a native value.
///
/// `Null` maps to JSON null so partially-resolved slots stay visible to
/// argument emptiness checks; a substitution string is refused since it has
/// not been resolved yet.
pub fn node_to_value(node: &MappingNode) -> Result<Value, RunError> {
    match node {
        MappingNode::Null => Ok(Value::Null),
        MappingNode::Scalar(scalar) => Ok(scalar.to_json()),
        MappingNode::Items(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(node_to_value(item)?);
            }
            Ok(Value::Array(values))
        }
        MappingNode::Fields(fields) => {
            let mut map = serde_json::Map::new();
            for (key, field) in fields {
                map.insert(key.clone(), node_to_value(field)?);
            }
            Ok(Value::Object(map))
        }
        MappingNode::SubstitutionStr(value) => Err(RunError::new(
            ReasonCode::InvalidResolvedSubValue,
            format!(
                "unresolved substitution \"{}\" cannot be converted to a native value",
                value.render()
            ),
        )),
    }
}

/// Convert a native value into a mapping node.
///
/// All signed integer widths land in the int scalar; unsigned values that do
/// not fit fold into the float scalar.
pub fn value_to_node(value: &Value) -> MappingNode {
    match value {
        Value::Null => MappingNode::Null,
        Value::Bool(b) => MappingNode::bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                MappingNode::int(i)
            } else {
                MappingNode::float(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => MappingNode::str(s.clone()),
        Value::Array(items) => MappingNode::Items(items.iter().map(value_to_node).collect()),
        Value::Object(fields) => MappingNode::Fields(
            fields
                .iter()
                .map(|(key, field)| (key.clone(), value_to_node(field)))
                .collect(),
        ),
    }
}

/// Convert any serializable native type into a mapping node.
pub fn to_mapping_node<T: Serialize>(value: &T) -> Result<MappingNode, RunError> {
    let json = serde_json::to_value(value).map_err(|err| {
        RunError::new(
            ReasonCode::FunctionCall,
            format!("failed to convert native value to a mapping node: {}", err),
        )
    })?;
    Ok(value_to_node(&json))
}

/// Deserialize a resolved mapping node into a native type.
pub fn from_mapping_node<T: DeserializeOwned>(node: &MappingNode) -> Result<T, RunError> {
    let json = node_to_value(node)?;
    serde_json::from_value(json).map_err(|err| {
        RunError::new(
            ReasonCode::FunctionCall,
            format!("failed to convert mapping node to a native value: {}", err),
        )
    })
}
