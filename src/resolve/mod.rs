//! The blueprint substitution resolver.
//!
//! A [`SubstitutionResolver`] is created per blueprint operation (a
//! change-staging pass or a deployment) and owns all memoization for that
//! operation. The deploy driver walks elements in dependency order, primes
//! the resource and child-export caches as it goes, and calls one
//! `resolve_in_*` entry point per element.
//!
//! Inside an element, sub-resolutions that cannot complete during
//! change-staging raise deferrals; these are collected per element and
//! returned as canonical property paths in
//! [`ResolveOutput::resolve_on_deploy`] while sibling work continues. Hard
//! errors abort the element immediately.

pub mod cache;
pub mod context;
mod substitution;

pub use cache::ChildExportEntry;
pub use context::{ResolveOutput, ResolveStage, ResolveTarget};
pub use substitution::LINK_FUNCTION_NAME;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::{MAPPING_NODE_MAX_TRAVERSE_DEPTH, MappingNode};
use crate::errors::{DeferredPaths, ReasonCode, ResolveError, ResolveResult, RunError};
use crate::paths::{self, ElementType, PathSegment};
use crate::ports::{
    BlueprintParams, BlueprintSpec, CancelToken, DataSourceRegistry, FunctionRegistry,
    ResourceRegistry, StateContainer,
};
use crate::schema::resolved::{
    ResolvedDataSource, ResolvedDataSourceFilter, ResolvedDataSourceMetadata, ResolvedExport,
    ResolvedInclude, ResolvedResource, ResolvedResourceCondition, ResolvedResourceMetadata,
    ResolvedValue,
};
use crate::schema::{
    DataSourceSchema, ExportSchema, IncludeSchema, ResourceConditionSchema, ResourceMetadataSchema,
    ResourceSchema, ValueSchema,
};
use crate::subs::{StringPart, StringWithSubstitutions, SubstitutionExpr};
use cache::ResolverCaches;
use context::ResolveContext;

/// The external collaborators a resolver consumes, injected at construction
/// and shared read-only across resolver instances.
#[derive(Clone)]
pub struct ResolverServices {
    pub functions: Arc<dyn FunctionRegistry>,
    pub resources: Arc<dyn ResourceRegistry>,
    pub data_sources: Arc<dyn DataSourceRegistry>,
    pub state: Arc<dyn StateContainer>,
    pub spec: Arc<dyn BlueprintSpec>,
    pub params: Arc<dyn BlueprintParams>,
}

/// Resolves `${…}` substitutions across the elements of one blueprint
/// operation.
///
/// Not safe for concurrent use; a resolver is single-threaded by design and
/// encodes that in its `&mut self` operations. Run independent operations
/// with independent resolver instances.
pub struct SubstitutionResolver {
    pub(crate) services: ResolverServices,
    pub(crate) instance_id: String,
    pub(crate) cancel: CancelToken,
    pub(crate) caches: ResolverCaches,
}

impl SubstitutionResolver {
    pub fn new(
        instance_id: impl Into<String>,
        services: ResolverServices,
        cancel: CancelToken,
    ) -> Self {
        Self {
            services,
            instance_id: instance_id.into(),
            cancel,
            caches: ResolverCaches::default(),
        }
    }

    /// The blueprint instance this resolver operates on.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    // ============================================================
    // Cache priming (driver-facing)
    // ============================================================

    /// Record a resolved resource so later elements can reference it.
    ///
    /// The driver must prime every resource before anything that references
    /// it resolves; a reference to an unprimed resource fails with
    /// `resource-not-resolved`.
    pub fn prime_resource(&mut self, name: impl Into<String>, resolved: ResolvedResource) {
        self.caches.resources.insert(name.into(), resolved);
    }

    /// Record a staged child export so `${children.*}` references resolve
    /// without consulting the state container.
    pub fn prime_child_export(
        &mut self,
        child: &str,
        field: &str,
        entry: ChildExportEntry,
    ) {
        self.caches
            .child_exports
            .insert(cache::child_export_key(child, field), entry);
    }

    // ============================================================
    // Element entry points
    // ============================================================

    /// Resolve every substitution in a resource definition.
    ///
    /// Resolution order: description, metadata (display name, annotations,
    /// labels passthrough, custom), condition, spec. Deferrals accumulate
    /// across all of them and the resource is returned partially resolved.
    pub fn resolve_in_resource(
        &mut self,
        name: &str,
        schema: &ResourceSchema,
        target: &ResolveTarget<ResolvedResource>,
    ) -> Result<ResolveOutput<ResolvedResource>, ResolveError> {
        let element = paths::element_id(ElementType::Resource, name);
        let base = ResolveContext::new(&element, name, &element, target.resolve_for);
        let partial = target.partially_resolved.as_ref();
        let mut deferred = DeferredPaths::new();

        let description = self.resolve_optional_string_field(
            &base.with_property(format!("{}.description", element)),
            schema.description.as_ref(),
            partial.and_then(|p| p.description.as_ref()),
            &mut deferred,
        )?;

        let metadata = match &schema.metadata {
            Some(metadata_schema) => Some(self.resolve_resource_metadata(
                &base,
                &element,
                metadata_schema,
                partial.and_then(|p| p.metadata.as_ref()),
                &mut deferred,
            )?),
            None => None,
        };

        let condition = match &schema.condition {
            Some(condition_schema) => self.resolve_condition_root(
                &base,
                &element,
                condition_schema,
                partial.and_then(|p| p.condition.as_ref()),
                &mut deferred,
            )?,
            None => None,
        };

        let spec = match &schema.spec {
            Some(spec_node) => Some(self.resolve_node(
                &base.with_property(format!("{}.spec", element)),
                spec_node,
                partial.and_then(|p| p.spec.as_ref()),
                &mut deferred,
                1,
            )?),
            None => None,
        };

        Ok(ResolveOutput {
            value: ResolvedResource {
                resource_type: schema.resource_type.clone(),
                description,
                metadata,
                condition,
                link_selector: schema.link_selector.clone(),
                spec,
            },
            resolve_on_deploy: deferred.into_vec(),
        })
    }

    /// Resolve every substitution in a data source definition.
    pub fn resolve_in_data_source(
        &mut self,
        name: &str,
        schema: &DataSourceSchema,
        target: &ResolveTarget<ResolvedDataSource>,
    ) -> Result<ResolveOutput<ResolvedDataSource>, ResolveError> {
        let element = paths::element_id(ElementType::DataSource, name);
        let base = ResolveContext::new(&element, name, &element, target.resolve_for);
        let partial = target.partially_resolved.as_ref();
        let mut deferred = DeferredPaths::new();

        let description = self.resolve_optional_string_field(
            &base.with_property(format!("{}.description", element)),
            schema.description.as_ref(),
            partial.and_then(|p| p.description.as_ref()),
            &mut deferred,
        )?;

        let metadata = match &schema.metadata {
            Some(metadata_schema) => {
                let display_name = self.resolve_optional_string_field(
                    &base.with_property(format!("{}.metadata.displayName", element)),
                    metadata_schema.display_name.as_ref(),
                    partial
                        .and_then(|p| p.metadata.as_ref())
                        .and_then(|m| m.display_name.as_ref()),
                    &mut deferred,
                )?;

                let mut annotations = HashMap::with_capacity(metadata_schema.annotations.len());
                for (key, value) in &metadata_schema.annotations {
                    let prior = partial
                        .and_then(|p| p.metadata.as_ref())
                        .and_then(|m| m.annotations.get(key));
                    if let Some(Some(resolved)) = prior {
                        annotations.insert(key.clone(), Some(resolved.clone()));
                        continue;
                    }
                    let mut property = format!("{}.metadata.annotations", element);
                    PathSegment::field(key.clone()).render_onto(&mut property);
                    let resolved = deferred.absorb(self.resolve_string_field(
                        &base.with_property(property),
                        value,
                        None,
                    ))?;
                    annotations.insert(key.clone(), resolved);
                }

                Some(ResolvedDataSourceMetadata {
                    display_name,
                    annotations,
                })
            }
            None => None,
        };

        let filter = match &schema.filter {
            Some(filter_schema) => {
                let mut search = Vec::with_capacity(filter_schema.search.len());
                for (i, value) in filter_schema.search.iter().enumerate() {
                    let partial_item = partial
                        .and_then(|p| p.filter.as_ref())
                        .and_then(|f| f.search.get(i));
                    let resolved = deferred.absorb(self.resolve_string_field(
                        &base.with_property(format!("{}.filter.search[{}]", element, i)),
                        value,
                        partial_item,
                    ))?;
                    search.push(resolved.unwrap_or(MappingNode::Null));
                }
                Some(ResolvedDataSourceFilter {
                    field: filter_schema.field.clone(),
                    operator: filter_schema.operator.clone(),
                    search,
                })
            }
            None => None,
        };

        Ok(ResolveOutput {
            value: ResolvedDataSource {
                data_source_type: schema.data_source_type.clone(),
                description,
                metadata,
                filter,
                exports: schema.exports.clone(),
            },
            resolve_on_deploy: deferred.into_vec(),
        })
    }

    /// Resolve a value definition.
    ///
    /// Complete resolutions are memoized so shared values are only
    /// evaluated once per operation.
    pub fn resolve_in_value(
        &mut self,
        name: &str,
        schema: &ValueSchema,
        target: &ResolveTarget<ResolvedValue>,
    ) -> Result<ResolveOutput<ResolvedValue>, ResolveError> {
        if let Some(cached) = self.caches.values.get(name) {
            return Ok(ResolveOutput::complete(cached.clone()));
        }
        let output = self.resolve_in_value_inner(name, schema, target, None)?;
        if output.is_complete() {
            self.caches
                .values
                .insert(name.to_string(), output.value.clone());
        }
        Ok(output)
    }

    /// `origin` is the referencing context when the value is being resolved
    /// on behalf of a `${values.*}` reference; it keeps the root element of
    /// the surrounding resolution for error reporting.
    pub(crate) fn resolve_in_value_inner(
        &mut self,
        name: &str,
        schema: &ValueSchema,
        target: &ResolveTarget<ResolvedValue>,
        origin: Option<&ResolveContext>,
    ) -> Result<ResolveOutput<ResolvedValue>, ResolveError> {
        let element = paths::element_id(ElementType::Value, name);
        let base = match origin {
            Some(origin) => origin.for_element(&element, name, &element),
            None => ResolveContext::new(&element, name, &element, target.resolve_for),
        };
        let partial = target.partially_resolved.as_ref();
        let mut deferred = DeferredPaths::new();

        let description = self.resolve_optional_string_field(
            &base.with_property(format!("{}.description", element)),
            schema.description.as_ref(),
            partial.and_then(|p| p.description.as_ref()),
            &mut deferred,
        )?;

        // The content path of a value is the element identifier itself.
        let value = match &schema.value {
            Some(value_node) => Some(self.resolve_node(
                &base,
                value_node,
                partial.and_then(|p| p.value.as_ref()),
                &mut deferred,
                1,
            )?),
            None => None,
        };

        Ok(ResolveOutput {
            value: ResolvedValue {
                value_type: schema.value_type.clone(),
                value,
                description,
                secret: schema.secret,
            },
            resolve_on_deploy: deferred.into_vec(),
        })
    }

    /// Resolve a child blueprint include. Includes are addressed as
    /// `children.NAME` in canonical paths.
    pub fn resolve_in_include(
        &mut self,
        name: &str,
        schema: &IncludeSchema,
        target: &ResolveTarget<ResolvedInclude>,
    ) -> Result<ResolveOutput<ResolvedInclude>, ResolveError> {
        let element = paths::element_id(ElementType::Child, name);
        let base = ResolveContext::new(&element, name, &element, target.resolve_for);
        let partial = target.partially_resolved.as_ref();
        let mut deferred = DeferredPaths::new();

        let path = self.resolve_optional_string_field(
            &base.with_property(format!("{}.path", element)),
            schema.path.as_ref(),
            partial.and_then(|p| p.path.as_ref()),
            &mut deferred,
        )?;

        let variables = match &schema.variables {
            Some(node) => Some(self.resolve_node(
                &base.with_property(format!("{}.variables", element)),
                node,
                partial.and_then(|p| p.variables.as_ref()),
                &mut deferred,
                1,
            )?),
            None => None,
        };

        let metadata = match &schema.metadata {
            Some(node) => Some(self.resolve_node(
                &base.with_property(format!("{}.metadata", element)),
                node,
                partial.and_then(|p| p.metadata.as_ref()),
                &mut deferred,
                1,
            )?),
            None => None,
        };

        let description = self.resolve_optional_string_field(
            &base.with_property(format!("{}.description", element)),
            schema.description.as_ref(),
            partial.and_then(|p| p.description.as_ref()),
            &mut deferred,
        )?;

        Ok(ResolveOutput {
            value: ResolvedInclude {
                path,
                variables,
                metadata,
                description,
            },
            resolve_on_deploy: deferred.into_vec(),
        })
    }

    /// Resolve an export.
    ///
    /// The exported field is addressed by the export's element identifier
    /// itself, so a deferred field appears as `exports.NAME` in the
    /// deferred-path list.
    pub fn resolve_in_export(
        &mut self,
        name: &str,
        schema: &ExportSchema,
        target: &ResolveTarget<ResolvedExport>,
    ) -> Result<ResolveOutput<ResolvedExport>, ResolveError> {
        let element = paths::element_id(ElementType::Export, name);
        let base = ResolveContext::new(&element, name, &element, target.resolve_for);
        let partial = target.partially_resolved.as_ref();
        let mut deferred = DeferredPaths::new();

        let description = self.resolve_optional_string_field(
            &base.with_property(format!("{}.description", element)),
            schema.description.as_ref(),
            partial.and_then(|p| p.description.as_ref()),
            &mut deferred,
        )?;

        let field = self.resolve_optional_string_field(
            &base,
            schema.field.as_ref(),
            partial.and_then(|p| p.field.as_ref()),
            &mut deferred,
        )?;

        Ok(ResolveOutput {
            value: ResolvedExport {
                export_type: schema.export_type.clone(),
                field,
                description,
            },
            resolve_on_deploy: deferred.into_vec(),
        })
    }

    /// Resolve an arbitrary mapping node addressed by `element_name` (a
    /// canonical element identifier or property path), e.g. the blueprint
    /// metadata block.
    pub fn resolve_in_mapping_node(
        &mut self,
        element_name: &str,
        node: &MappingNode,
        target: &ResolveTarget<MappingNode>,
    ) -> Result<ResolveOutput<MappingNode>, ResolveError> {
        let bare = bare_element_name(element_name);
        let base = ResolveContext::new(element_name, bare, element_name, target.resolve_for);
        let mut deferred = DeferredPaths::new();
        let value = self.resolve_node(
            &base,
            node,
            target.partially_resolved.as_ref(),
            &mut deferred,
            1,
        )?;
        Ok(ResolveOutput {
            value,
            resolve_on_deploy: deferred.into_vec(),
        })
    }

    /// Resolve a resource template's `each` into its element list and prime
    /// the template elem cache with it.
    ///
    /// Within `each`, references to `resources.*` and `children.*` are
    /// disallowed. The result must be a non-empty array.
    pub fn resolve_resource_each(
        &mut self,
        name: &str,
        schema: &ResourceSchema,
        stage: ResolveStage,
    ) -> Result<Vec<MappingNode>, ResolveError> {
        let element = paths::element_id(ElementType::Resource, name);
        let each = schema.each.as_ref().ok_or_else(|| {
            ResolveError::Run(
                RunError::new(
                    ReasonCode::ResourceEachEmpty,
                    format!("resource \"{}\" has no `each` definition", name),
                )
                .with_element(element.clone()),
            )
        })?;

        let property = format!("{}.each", element);
        let ctx = ResolveContext::new(&element, name, &property, stage).with_disallowed(
            HashSet::from([ElementType::Resource, ElementType::Child]),
        );

        let node = self.resolve_string_field(&ctx, each, None)?;
        match node {
            MappingNode::Items(items) if items.is_empty() => Err(self.ctx_error(
                &ctx,
                RunError::new(
                    ReasonCode::ResourceEachEmpty,
                    format!(
                        "the `each` of resource template \"{}\" resolved to an empty array",
                        name
                    ),
                ),
            )),
            MappingNode::Items(items) => {
                self.caches
                    .template_elems
                    .insert(name.to_string(), items.clone());
                Ok(items)
            }
            other => Err(self.ctx_error(
                &ctx,
                RunError::new(
                    ReasonCode::ResourceEachInvalidType,
                    format!(
                        "the `each` of resource template \"{}\" must resolve to an array, got {}",
                        name,
                        node_kind(&other)
                    ),
                ),
            )),
        }
    }

    /// Resolve one string-with-substitutions in the context of the given
    /// element and property path.
    ///
    /// A fully deferred value yields a `Null` node plus the property path in
    /// `resolve_on_deploy`.
    pub fn resolve_substitution(
        &mut self,
        value: &StringWithSubstitutions,
        in_element: &str,
        in_property: &str,
        target: &ResolveTarget<MappingNode>,
    ) -> Result<ResolveOutput<MappingNode>, ResolveError> {
        let bare = bare_element_name(in_element);
        let ctx = ResolveContext::new(in_element, bare, in_property, target.resolve_for);
        let mut deferred = DeferredPaths::new();
        let resolved = deferred.absorb(self.resolve_string_field(
            &ctx,
            value,
            target.partially_resolved.as_ref(),
        ))?;
        Ok(ResolveOutput {
            value: resolved.unwrap_or(MappingNode::Null),
            resolve_on_deploy: deferred.into_vec(),
        })
    }

    // ============================================================
    // Shared field/tree resolution
    // ============================================================

    fn resolve_optional_string_field(
        &mut self,
        ctx: &ResolveContext,
        field: Option<&StringWithSubstitutions>,
        partial: Option<&MappingNode>,
        deferred: &mut DeferredPaths,
    ) -> ResolveResult<Option<MappingNode>> {
        match field {
            Some(value) => deferred.absorb(self.resolve_string_field(ctx, value, partial)),
            None => Ok(None),
        }
    }

    fn resolve_resource_metadata(
        &mut self,
        base: &ResolveContext,
        element: &str,
        schema: &ResourceMetadataSchema,
        partial: Option<&ResolvedResourceMetadata>,
        deferred: &mut DeferredPaths,
    ) -> ResolveResult<ResolvedResourceMetadata> {
        let display_name = self.resolve_optional_string_field(
            &base.with_property(format!("{}.metadata.displayName", element)),
            schema.display_name.as_ref(),
            partial.and_then(|p| p.display_name.as_ref()),
            deferred,
        )?;

        // Partially-resolved annotations win; only keys with no resolved
        // entry in the partial result are re-evaluated.
        let mut annotations = HashMap::with_capacity(schema.annotations.len());
        for (key, value) in &schema.annotations {
            if let Some(Some(resolved)) = partial.and_then(|p| p.annotations.get(key)) {
                annotations.insert(key.clone(), Some(resolved.clone()));
                continue;
            }
            let mut property = format!("{}.metadata.annotations", element);
            PathSegment::field(key.clone()).render_onto(&mut property);
            let resolved = deferred.absorb(self.resolve_string_field(
                &base.with_property(property),
                value,
                None,
            ))?;
            annotations.insert(key.clone(), resolved);
        }

        let custom = match &schema.custom {
            Some(custom_node) => Some(self.resolve_node(
                &base.with_property(format!("{}.metadata.custom", element)),
                custom_node,
                partial.and_then(|p| p.custom.as_ref()),
                deferred,
                1,
            )?),
            None => None,
        };

        Ok(ResolvedResourceMetadata {
            display_name,
            annotations,
            labels: schema.labels.clone(),
            custom,
        })
    }

    /// Resolve a condition all-or-nothing: if any sub-expression defers the
    /// whole condition defers under the condition's own path.
    fn resolve_condition_root(
        &mut self,
        base: &ResolveContext,
        element: &str,
        schema: &ResourceConditionSchema,
        partial: Option<&ResolvedResourceCondition>,
        deferred: &mut DeferredPaths,
    ) -> ResolveResult<Option<ResolvedResourceCondition>> {
        if let Some(resolved) = partial {
            // A present partial condition is always fully resolved.
            return Ok(Some(resolved.clone()));
        }
        let property = format!("{}.condition", element);
        let ctx = base.with_property(property.clone());
        match self.resolve_condition(&ctx, schema) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(ResolveError::Deferred(_)) => {
                deferred.push(property);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn resolve_condition(
        &mut self,
        ctx: &ResolveContext,
        schema: &ResourceConditionSchema,
    ) -> ResolveResult<ResolvedResourceCondition> {
        let string_value = match &schema.string_value {
            Some(value) => Some(self.resolve_string_field(ctx, value, None)?),
            None => None,
        };

        let mut and = Vec::with_capacity(schema.and.len());
        for (i, sub) in schema.and.iter().enumerate() {
            let sub_ctx = ctx.with_property(format!("{}.and[{}]", ctx.current_property, i));
            and.push(self.resolve_condition(&sub_ctx, sub)?);
        }

        let mut or = Vec::with_capacity(schema.or.len());
        for (i, sub) in schema.or.iter().enumerate() {
            let sub_ctx = ctx.with_property(format!("{}.or[{}]", ctx.current_property, i));
            or.push(self.resolve_condition(&sub_ctx, sub)?);
        }

        let not = match &schema.not {
            Some(sub) => {
                let sub_ctx = ctx.with_property(format!("{}.not", ctx.current_property));
                Some(Box::new(self.resolve_condition(&sub_ctx, sub)?))
            }
            None => None,
        };

        Ok(ResolvedResourceCondition {
            string_value,
            and,
            or,
            not,
        })
    }

    /// Walk a mapping node, resolving every substitution-string leaf.
    ///
    /// Deferred leaves become `Null` slots with their paths recorded;
    /// resolved sub-trees of `partial` are reused instead of re-computed.
    pub(crate) fn resolve_node(
        &mut self,
        ctx: &ResolveContext,
        node: &MappingNode,
        partial: Option<&MappingNode>,
        deferred: &mut DeferredPaths,
        depth: usize,
    ) -> ResolveResult<MappingNode> {
        if self.cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        if depth > MAPPING_NODE_MAX_TRAVERSE_DEPTH {
            return Err(self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::MaxTraverseDepthExceeded,
                    format!(
                        "mapping node at \"{}\" exceeds the maximum traversal depth of {}",
                        ctx.current_property, MAPPING_NODE_MAX_TRAVERSE_DEPTH
                    ),
                ),
            ));
        }

        match node {
            MappingNode::Null => Ok(MappingNode::Null),
            MappingNode::Scalar(scalar) => Ok(MappingNode::Scalar(scalar.clone())),
            MappingNode::Items(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let item_ctx =
                        ctx.with_property(format!("{}[{}]", ctx.current_property, i));
                    let partial_item = partial.and_then(|p| p.as_items()).and_then(|p| p.get(i));
                    resolved.push(self.resolve_node(
                        &item_ctx,
                        item,
                        partial_item,
                        deferred,
                        depth + 1,
                    )?);
                }
                Ok(MappingNode::Items(resolved))
            }
            MappingNode::Fields(fields) => {
                let mut resolved = HashMap::with_capacity(fields.len());
                for (key, field) in fields {
                    let mut property = ctx.current_property.clone();
                    PathSegment::field(key.clone()).render_onto(&mut property);
                    let field_ctx = ctx.with_property(property);
                    let partial_field =
                        partial.and_then(|p| p.as_fields()).and_then(|p| p.get(key));
                    resolved.insert(
                        key.clone(),
                        self.resolve_node(&field_ctx, field, partial_field, deferred, depth + 1)?,
                    );
                }
                Ok(MappingNode::Fields(resolved))
            }
            MappingNode::SubstitutionStr(value) => {
                match deferred.absorb(self.resolve_string_field(ctx, value, partial))? {
                    Some(resolved) => Ok(resolved),
                    None => Ok(MappingNode::Null),
                }
            }
        }
    }

    /// Resolve one string field against the current context.
    ///
    /// A single-substitution string may resolve to any node shape; multiple
    /// fragments concatenate and every fragment must resolve to a scalar.
    pub(crate) fn resolve_string_field(
        &mut self,
        ctx: &ResolveContext,
        value: &StringWithSubstitutions,
        partial: Option<&MappingNode>,
    ) -> ResolveResult<MappingNode> {
        if self.cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        if let Some(prior) = partial {
            if prior.is_resolved() {
                return Ok(prior.clone());
            }
        }
        if value.parts.is_empty() {
            return Err(self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::EmptySubstitution,
                    format!("\"{}\" is an empty substitution", ctx.current_property),
                ),
            ));
        }
        if let Some(sub) = value.as_single_substitution() {
            return self.resolve_substitution_value(ctx, sub);
        }

        let mut out = String::new();
        for part in &value.parts {
            match part {
                StringPart::Literal(text) => out.push_str(text),
                StringPart::Substitution(sub) => {
                    let node = self.resolve_substitution_value(ctx, sub)?;
                    match node.as_scalar() {
                        Some(scalar) => out.push_str(&scalar.to_fragment()),
                        None => {
                            return Err(self.ctx_error(
                                ctx,
                                RunError::new(
                                    ReasonCode::InvalidResolvedSubValue,
                                    format!(
                                        "substitution \"{}\" in \"{}\" must resolve to a scalar \
                                         to take part in string concatenation",
                                        sub.render(),
                                        ctx.current_property
                                    ),
                                ),
                            ));
                        }
                    }
                }
            }
        }
        Ok(MappingNode::str(out))
    }

    /// Attach the current element and property path to a hard error.
    pub(crate) fn ctx_error(&self, ctx: &ResolveContext, mut err: RunError) -> ResolveError {
        if err.element.is_none() {
            err.element = Some(ctx.current_element.clone());
        }
        if err.path.is_none() {
            err.path = Some(ctx.current_property.clone());
        }
        ResolveError::Run(err)
    }
}

/// The bare element name of a canonical identifier, e.g. `ordersTable_0`
/// for `resources.ordersTable_0.spec`.
fn bare_element_name(element: &str) -> &str {
    element.split('.').nth(1).unwrap_or(element)
}

fn node_kind(node: &MappingNode) -> &'static str {
    match node {
        MappingNode::Null => "null",
        MappingNode::Scalar(_) => "a scalar",
        MappingNode::Items(_) => "an array",
        MappingNode::Fields(_) => "an object",
        MappingNode::SubstitutionStr(_) => "an unresolved substitution",
    }
}
