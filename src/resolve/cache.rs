//! Per-resolver memoization.
//!
//! All caches are owned by one resolver instance and discarded with it;
//! nothing here is shared or thread-safe. The resource and child-export
//! caches are primed by the deploy driver in dependency order, the rest are
//! populated on demand during resolution.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::MappingNode;
use crate::ports::ResourceState;
use crate::resolve::context::ResolveOutput;
use crate::schema::resolved::{ResolvedDataSource, ResolvedResource, ResolvedValue};

/// A staged child blueprint export, primed by the driver after the child's
/// own change-staging completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChildExportEntry {
    pub value: Option<MappingNode>,
    /// The export is being removed by the staged change set.
    pub removed: bool,
    /// The child could not resolve the export during staging.
    pub resolve_on_deploy: bool,
}

/// Cache key for a child export field.
pub(crate) fn child_export_key(child: &str, field: &str) -> String {
    format!("{}::{}", child, field)
}

#[derive(Debug, Default)]
pub(crate) struct ResolverCaches {
    /// Fully-resolved values by name; only complete resolutions are cached.
    pub values: HashMap<String, ResolvedValue>,
    /// Values currently being resolved, for cycle detection.
    pub values_in_progress: HashSet<String>,
    /// Data source definition resolutions by name.
    pub data_source_results: HashMap<String, ResolveOutput<ResolvedDataSource>>,
    /// Fetched data source contents by name.
    pub data_source_data: HashMap<String, HashMap<String, MappingNode>>,
    /// Resolved resources by instance name, primed by the driver before any
    /// reference to them resolves.
    pub resources: HashMap<String, ResolvedResource>,
    /// Resolved `each` arrays by template name.
    pub template_elems: HashMap<String, Vec<MappingNode>>,
    /// Staged child exports by `child::field`.
    pub child_exports: HashMap<String, ChildExportEntry>,
    /// Deployed resource state by name, populated on demand at deployment.
    pub resource_states: HashMap<String, ResourceState>,
}
