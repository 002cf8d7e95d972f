//! Parsed blueprint schema entities.
//!
//! These types mirror the blueprint document after parsing: string fields
//! that accept `${…}` expressions are [`StringWithSubstitutions`], nested
//! free-form structure is [`MappingNode`]. The resolver consumes this tree
//! read-only; resolution output lives in [`resolved`].

pub mod resolved;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{MappingNode, ScalarValue};
use crate::subs::StringWithSubstitutions;

/// A parsed blueprint document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Blueprint {
    pub version: Option<String>,
    pub variables: HashMap<String, VariableSchema>,
    pub values: HashMap<String, ValueSchema>,
    pub include: HashMap<String, IncludeSchema>,
    pub resources: HashMap<String, ResourceSchema>,
    #[serde(rename = "datasources")]
    pub data_sources: HashMap<String, DataSourceSchema>,
    pub exports: HashMap<String, ExportSchema>,
    pub metadata: Option<MappingNode>,
}

/// A declared blueprint variable.
///
/// Variables are supplied by the caller at run time; the declaration only
/// contributes the type, a default and the allowed values, none of which may
/// contain substitutions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariableSchema {
    #[serde(rename = "type")]
    pub variable_type: Option<String>,
    pub description: Option<String>,
    pub secret: bool,
    pub default: Option<ScalarValue>,
    pub allowed_values: Vec<ScalarValue>,
}

/// A derived value computed from other elements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValueSchema {
    #[serde(rename = "type")]
    pub value_type: Option<String>,
    pub value: Option<MappingNode>,
    pub description: Option<StringWithSubstitutions>,
    pub secret: bool,
}

/// A child blueprint inclusion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncludeSchema {
    pub path: Option<StringWithSubstitutions>,
    pub variables: Option<MappingNode>,
    pub metadata: Option<MappingNode>,
    pub description: Option<StringWithSubstitutions>,
}

/// A resource definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceSchema {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub description: Option<StringWithSubstitutions>,
    pub metadata: Option<ResourceMetadataSchema>,
    /// When set, the resource is a template expanded into one instance per
    /// item of the resolved array.
    pub each: Option<StringWithSubstitutions>,
    pub condition: Option<ResourceConditionSchema>,
    pub link_selector: Option<LinkSelector>,
    pub spec: Option<MappingNode>,
}

/// Resource metadata block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceMetadataSchema {
    pub display_name: Option<StringWithSubstitutions>,
    /// Annotation values may carry substitutions and are resolved
    /// individually so a single deferred annotation does not hold the
    /// others back.
    pub annotations: HashMap<String, StringWithSubstitutions>,
    /// Labels are plain strings and pass through resolution untouched.
    pub labels: HashMap<String, String>,
    pub custom: Option<MappingNode>,
}

/// A resource condition; `string_value` and the combinators are mutually
/// exclusive in well-formed documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceConditionSchema {
    pub string_value: Option<StringWithSubstitutions>,
    pub and: Vec<ResourceConditionSchema>,
    pub or: Vec<ResourceConditionSchema>,
    pub not: Option<Box<ResourceConditionSchema>>,
}

/// Label selector used to link resources; no substitutions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkSelector {
    pub by_label: HashMap<String, String>,
}

/// A data source definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSourceSchema {
    #[serde(rename = "type")]
    pub data_source_type: String,
    pub description: Option<StringWithSubstitutions>,
    pub metadata: Option<DataSourceMetadataSchema>,
    pub filter: Option<DataSourceFilterSchema>,
    pub exports: HashMap<String, DataSourceFieldExportSchema>,
}

/// Data source metadata block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSourceMetadataSchema {
    pub display_name: Option<StringWithSubstitutions>,
    pub annotations: HashMap<String, StringWithSubstitutions>,
}

/// Filter narrowing what a data source fetches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSourceFilterSchema {
    pub field: String,
    pub operator: String,
    pub search: Vec<StringWithSubstitutions>,
}

/// A field a data source exposes to substitutions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSourceFieldExportSchema {
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    /// When set, references to this export read the aliased field of the
    /// fetched data instead.
    pub alias_for: Option<String>,
    pub description: Option<StringWithSubstitutions>,
}

/// A blueprint export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportSchema {
    #[serde(rename = "type")]
    pub export_type: Option<String>,
    pub field: Option<StringWithSubstitutions>,
    pub description: Option<StringWithSubstitutions>,
}
