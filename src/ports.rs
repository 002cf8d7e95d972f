//! Interfaces to the external collaborators the resolver consumes.
//!
//! The resolver never fetches data, executes function bodies, loads plugins
//! or persists state itself; those concerns live behind the traits here and
//! are injected at construction. Implementations are shared across resolver
//! instances and must be read-only from the resolver's point of view.
//!
//! Every operation that may suspend (a network hop to a plugin, a state
//! read) receives the ambient [`CancelToken`]; implementations are expected
//! to observe it and bail out early.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::{MappingNode, ScalarValue};
use crate::functions::{CallStack, FunctionArgs, FunctionOutput};
use crate::schema::resolved::ResolvedDataSource;
use crate::schema::{Blueprint, ResourceSchema};

/// Cooperative cancellation flag shared between the deploy driver, the
/// resolver and the ports.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// One function invocation as seen by a registry implementation.
pub struct FunctionCallRequest<'a> {
    pub function_name: &'a str,
    pub args: &'a FunctionArgs,
    /// The chain of nested calls, innermost last; includes this call.
    pub call_stack: &'a CallStack,
    pub params: &'a dyn BlueprintParams,
}

/// Registry of the functions provider plugins expose.
pub trait FunctionRegistry: Send + Sync {
    fn has_function(&self, name: &str) -> bool;

    /// Execute a function. Errors are propagated to the caller with the
    /// resolver's element context prepended.
    fn call(
        &self,
        cancel: &CancelToken,
        request: FunctionCallRequest<'_>,
    ) -> anyhow::Result<FunctionOutput>;
}

/// The spec definition a resource provider declares for a resource type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceSpecDefinition {
    /// Shape of the spec as declared by the provider; `None` marks a broken
    /// provider response and is rejected as an invalid definition.
    pub schema: Option<MappingNode>,
    /// Dotted spec paths (e.g. `spec.arn`) whose values only exist after
    /// deployment.
    pub computed_fields: Vec<String>,
}

impl ResourceSpecDefinition {
    /// Whether the dotted rendering of a referenced path is computed.
    pub fn is_computed(&self, dotted_path: &str) -> bool {
        self.computed_fields.iter().any(|f| f == dotted_path)
    }
}

/// Registry of resource providers.
pub trait ResourceRegistry: Send + Sync {
    /// Fetch the spec definition for a resource type; `Ok(None)` when the
    /// type has no definition.
    fn spec_definition(
        &self,
        cancel: &CancelToken,
        resource_type: &str,
        params: &dyn BlueprintParams,
    ) -> anyhow::Result<Option<ResourceSpecDefinition>>;
}

/// One data source fetch as seen by a registry implementation.
pub struct DataSourceFetchRequest<'a> {
    pub resolved: &'a ResolvedDataSource,
    pub params: &'a dyn BlueprintParams,
}

/// Registry of data source providers.
pub trait DataSourceRegistry: Send + Sync {
    /// Fetch the exported fields of a data source. Performed at either
    /// stage; failures propagate as hard errors.
    fn fetch(
        &self,
        cancel: &CancelToken,
        data_source_type: &str,
        request: DataSourceFetchRequest<'_>,
    ) -> anyhow::Result<DataSourceData>;
}

/// Fetched data source contents, keyed by exported field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSourceData {
    pub fields: HashMap<String, MappingNode>,
}

/// Deployed state of a resource as persisted by the deploy engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceState {
    pub resource_id: String,
    pub name: String,
    pub spec_data: Option<MappingNode>,
}

/// Deployed state of a child blueprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChildState {
    pub exports: HashMap<String, MappingNode>,
}

/// Read access to the persisted state of the current blueprint instance.
///
/// Shared by many resolvers; this core only ever reads.
pub trait StateContainer: Send + Sync {
    /// Look up a deployed resource by its name within an instance;
    /// `Ok(None)` when the resource has not been deployed.
    fn resource_by_name(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        resource_name: &str,
    ) -> anyhow::Result<Option<ResourceState>>;

    /// Look up the state of a deployed child blueprint.
    fn child(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        child_name: &str,
    ) -> anyhow::Result<Option<ChildState>>;
}

/// Access to the parsed blueprint driving the current operation.
pub trait BlueprintSpec: Send + Sync {
    fn schema(&self) -> &Blueprint;

    /// Schema of a named resource; the default implementation reads from
    /// [`BlueprintSpec::schema`].
    fn resource_schema(&self, name: &str) -> Option<&ResourceSchema> {
        self.schema().resources.get(name)
    }
}

/// Runtime parameters of the current blueprint operation.
pub trait BlueprintParams: Send + Sync {
    /// A caller-supplied blueprint variable.
    fn variable(&self, name: &str) -> Option<&ScalarValue>;

    /// A context-scoped variable supplied by the enclosing host rather than
    /// the blueprint document.
    fn context_variable(&self, name: &str) -> Option<&ScalarValue>;
}
