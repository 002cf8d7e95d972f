//! Resolved mirrors of the schema entities.
//!
//! Each type mirrors its schema counterpart with every
//! `StringWithSubstitutions` replaced by a [`MappingNode`]. Slots that could
//! not be resolved at the current stage are `None` (or a `Null` node inside
//! nested trees) and have a matching entry in the `resolve_on_deploy` list
//! of the operation that produced them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::MappingNode;
use crate::schema::{DataSourceFieldExportSchema, LinkSelector};

/// A resource after substitution resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub description: Option<MappingNode>,
    pub metadata: Option<ResolvedResourceMetadata>,
    pub condition: Option<ResolvedResourceCondition>,
    pub link_selector: Option<LinkSelector>,
    pub spec: Option<MappingNode>,
}

/// Resolved resource metadata.
///
/// Annotation slots are `None` when the annotation deferred; labels pass
/// through from the schema unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedResourceMetadata {
    pub display_name: Option<MappingNode>,
    pub annotations: HashMap<String, Option<MappingNode>>,
    pub labels: HashMap<String, String>,
    pub custom: Option<MappingNode>,
}

/// A resolved resource condition mirroring the schema combinators.
///
/// Condition resolution is all-or-nothing: when any sub-expression defers
/// the whole condition is dropped and the condition path is deferred, so a
/// present `ResolvedResourceCondition` is always fully resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedResourceCondition {
    pub string_value: Option<MappingNode>,
    pub and: Vec<ResolvedResourceCondition>,
    pub or: Vec<ResolvedResourceCondition>,
    pub not: Option<Box<ResolvedResourceCondition>>,
}

/// A data source after substitution resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedDataSource {
    #[serde(rename = "type")]
    pub data_source_type: String,
    pub description: Option<MappingNode>,
    pub metadata: Option<ResolvedDataSourceMetadata>,
    pub filter: Option<ResolvedDataSourceFilter>,
    /// Export declarations pass through untouched apart from their
    /// descriptions, which are dropped here; the fetch only needs the field
    /// names and aliases.
    pub exports: HashMap<String, DataSourceFieldExportSchema>,
}

/// Resolved data source metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedDataSourceMetadata {
    pub display_name: Option<MappingNode>,
    pub annotations: HashMap<String, Option<MappingNode>>,
}

/// A resolved data source filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedDataSourceFilter {
    pub field: String,
    pub operator: String,
    pub search: Vec<MappingNode>,
}

/// A value after substitution resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedValue {
    #[serde(rename = "type")]
    pub value_type: Option<String>,
    pub value: Option<MappingNode>,
    pub description: Option<MappingNode>,
    pub secret: bool,
}

/// An include after substitution resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedInclude {
    pub path: Option<MappingNode>,
    pub variables: Option<MappingNode>,
    pub metadata: Option<MappingNode>,
    pub description: Option<MappingNode>,
}

/// An export after substitution resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedExport {
    #[serde(rename = "type")]
    pub export_type: Option<String>,
    pub field: Option<MappingNode>,
    pub description: Option<MappingNode>,
}
