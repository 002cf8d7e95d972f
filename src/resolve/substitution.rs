//! Resolution of individual `${…}` expressions.
//!
//! [`SubstitutionResolver::resolve_substitution_value`] dispatches on the
//! expression variant: literals wrap directly, references consult the
//! blueprint schema, the caches and the external ports, and function calls
//! go through a fresh call scope per expression so nested calls share one
//! bounded stack.

use std::sync::Arc;

use crate::core::{MappingNode, ScalarKind, ScalarValue};
use crate::errors::{Deferral, ReasonCode, ResolveError, ResolveResult, RunError};
use crate::functions::convert::{node_to_value, value_to_node};
use crate::functions::{FunctionArg, FunctionArgs, FunctionInfo, ScopedFunctions};
use crate::paths::{self, ElementType, PathSegment};
use crate::ports::{DataSourceFetchRequest, ResourceState};
use crate::resolve::context::{ResolveContext, ResolveTarget};
use crate::resolve::{SubstitutionResolver, cache};
use crate::schema::DataSourceSchema;
use crate::subs::{
    Substitution, SubstitutionChild, SubstitutionDataSourceProperty, SubstitutionElemRef,
    SubstitutionExpr, SubstitutionFunctionCall, SubstitutionResourceProperty,
    SubstitutionValueRef, SubstitutionVariable,
};

/// The name reserved for the link function, which requires deployed
/// resources and therefore always defers during change-staging.
pub const LINK_FUNCTION_NAME: &str = "link";

/// What a function call produced for its surrounding position: a concrete
/// node, or a partial function only usable as a higher-order argument.
enum CallValue {
    Node(MappingNode),
    Partial(FunctionInfo),
}

impl SubstitutionResolver {
    /// Resolve one substitution expression to a mapping node.
    pub(crate) fn resolve_substitution_value(
        &mut self,
        ctx: &ResolveContext,
        sub: &Substitution,
    ) -> ResolveResult<MappingNode> {
        if self.cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        let result = match sub {
            Substitution::StringLiteral(lit) => Ok(MappingNode::Scalar(ScalarValue {
                kind: ScalarKind::Str(lit.value.clone()),
                span: Some(lit.span.clone()),
            })),
            Substitution::IntLiteral(lit) => Ok(MappingNode::Scalar(ScalarValue {
                kind: ScalarKind::Int(lit.value),
                span: Some(lit.span.clone()),
            })),
            Substitution::FloatLiteral(lit) => Ok(MappingNode::Scalar(ScalarValue {
                kind: ScalarKind::Float(lit.value),
                span: Some(lit.span.clone()),
            })),
            Substitution::BoolLiteral(lit) => Ok(MappingNode::Scalar(ScalarValue {
                kind: ScalarKind::Bool(lit.value),
                span: Some(lit.span.clone()),
            })),
            Substitution::Variable(variable) => self.resolve_variable(ctx, variable),
            Substitution::ValueRef(value_ref) => self.resolve_value_ref(ctx, value_ref),
            Substitution::ElemRef(elem_ref) => self.resolve_elem_ref(ctx, elem_ref),
            Substitution::ElemIndexRef(_) => self.resolve_elem_index(ctx),
            Substitution::DataSourceProperty(prop) => {
                self.resolve_data_source_property(ctx, prop)
            }
            Substitution::ResourceProperty(prop) => self.resolve_resource_property(ctx, prop),
            Substitution::Child(child) => self.resolve_child_ref(ctx, child),
            Substitution::FunctionCall(call) => self.resolve_function_call_root(ctx, call),
        };
        // Hard errors surface with the element and canonical path they
        // occurred at, filled in once at this choke point.
        result.map_err(|err| match err {
            ResolveError::Run(mut run) => {
                if run.element.is_none() {
                    run.element = Some(ctx.current_element.clone());
                }
                if run.path.is_none() {
                    run.path = Some(ctx.current_property.clone());
                }
                ResolveError::Run(run)
            }
            other => other,
        })
    }

    // ============================================================
    // Variables and values
    // ============================================================

    fn resolve_variable(
        &mut self,
        ctx: &ResolveContext,
        variable: &SubstitutionVariable,
    ) -> ResolveResult<MappingNode> {
        if let Some(value) = self.services.params.variable(&variable.name) {
            return Ok(MappingNode::Scalar(value.clone()));
        }
        let spec = Arc::clone(&self.services.spec);
        if let Some(declaration) = spec.schema().variables.get(&variable.name) {
            if let Some(default) = &declaration.default {
                return Ok(MappingNode::Scalar(default.clone()));
            }
        }
        Err(self.ctx_error(
            ctx,
            RunError::new(
                ReasonCode::MissingVariable,
                format!(
                    "variable \"{}\" is not supplied and has no default",
                    variable.name
                ),
            ),
        ))
    }

    fn resolve_value_ref(
        &mut self,
        ctx: &ResolveContext,
        value_ref: &SubstitutionValueRef,
    ) -> ResolveResult<MappingNode> {
        if ctx.is_disallowed(ElementType::Value) {
            return Err(self.disallowed_error(ctx, "values", value_ref.render()));
        }

        let resolved = match self.caches.values.get(&value_ref.name) {
            Some(cached) => cached.clone(),
            None => {
                if self.caches.values_in_progress.contains(&value_ref.name) {
                    return Err(self.ctx_error(
                        ctx,
                        RunError::new(
                            ReasonCode::CircularValueReference,
                            format!(
                                "value \"{}\" transitively references itself (reached from \"{}\")",
                                value_ref.name, ctx.root_element
                            ),
                        ),
                    ));
                }
                let spec = Arc::clone(&self.services.spec);
                let Some(schema) = spec.schema().values.get(&value_ref.name) else {
                    return Err(self.ctx_error(
                        ctx,
                        RunError::new(
                            ReasonCode::MissingValue,
                            format!("value \"{}\" is not defined in the blueprint", value_ref.name),
                        ),
                    ));
                };

                self.caches.values_in_progress.insert(value_ref.name.clone());
                let result = self.resolve_in_value_inner(
                    &value_ref.name,
                    schema,
                    &ResolveTarget {
                        resolve_for: ctx.resolve_for,
                        partially_resolved: None,
                    },
                    Some(ctx),
                );
                self.caches.values_in_progress.remove(&value_ref.name);
                let output = result?;

                if !output.resolve_on_deploy.is_empty() {
                    // A deferring value defers the referencing location too.
                    let mut deferred_paths = output.resolve_on_deploy;
                    deferred_paths.push(ctx.current_property.clone());
                    return Err(ResolveError::Deferred(Deferral {
                        paths: deferred_paths,
                    }));
                }
                self.caches
                    .values
                    .insert(value_ref.name.clone(), output.value.clone());
                output.value
            }
        };

        let content = resolved.value.as_ref().ok_or_else(|| {
            self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::MissingValue,
                    format!("value \"{}\" has no content", value_ref.name),
                ),
            )
        })?;
        content.get_path(&value_ref.path).cloned().ok_or_else(|| {
            self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::MissingValue,
                    format!(
                        "\"{}\" does not exist in value \"{}\"",
                        paths::render_path(&format!("values.{}", value_ref.name), &value_ref.path),
                        value_ref.name
                    ),
                ),
            )
        })
    }

    // ============================================================
    // Resource template locals
    // ============================================================

    fn resolve_elem_ref(
        &mut self,
        ctx: &ResolveContext,
        elem_ref: &SubstitutionElemRef,
    ) -> ResolveResult<MappingNode> {
        let Some((template, index)) = paths::split_template_instance(&ctx.current_element_name)
        else {
            return Err(self.not_in_template_error(ctx));
        };
        let Some(elems) = self.caches.template_elems.get(template) else {
            return Err(self.not_in_template_error(ctx));
        };
        let Some(elem) = elems.get(index) else {
            let count = elems.len();
            return Err(self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::ResourceEachIndexOutOfBounds,
                    format!(
                        "instance index {} is out of bounds for resource template \"{}\" \
                         ({} elements)",
                        index, template, count
                    ),
                ),
            ));
        };
        elem.get_path(&elem_ref.path).cloned().ok_or_else(|| {
            self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::InvalidResolvedSubValue,
                    format!(
                        "\"{}\" does not exist in element {} of resource template \"{}\"",
                        elem_ref.render(),
                        index,
                        template
                    ),
                ),
            )
        })
    }

    fn resolve_elem_index(&mut self, ctx: &ResolveContext) -> ResolveResult<MappingNode> {
        let Some((template, index)) = paths::split_template_instance(&ctx.current_element_name)
        else {
            return Err(self.not_in_template_error(ctx));
        };
        if !self.caches.template_elems.contains_key(template) {
            return Err(self.not_in_template_error(ctx));
        }
        Ok(MappingNode::int(index as i64))
    }

    fn not_in_template_error(&self, ctx: &ResolveContext) -> ResolveError {
        self.ctx_error(
            ctx,
            RunError::new(
                ReasonCode::DisallowedElementType,
                format!(
                    "\"{}\" is not a resource template instance; elem and i references are \
                     only valid within one",
                    ctx.current_element_name
                ),
            ),
        )
    }

    // ============================================================
    // Data source properties
    // ============================================================

    fn resolve_data_source_property(
        &mut self,
        ctx: &ResolveContext,
        prop: &SubstitutionDataSourceProperty,
    ) -> ResolveResult<MappingNode> {
        if ctx.is_disallowed(ElementType::DataSource) {
            return Err(self.disallowed_error(ctx, "datasources", prop.render()));
        }

        let spec = Arc::clone(&self.services.spec);
        let Some(schema) = spec.schema().data_sources.get(&prop.data_source_name) else {
            return Err(self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::MissingDataSource,
                    format!(
                        "data source \"{}\" is not defined in the blueprint",
                        prop.data_source_name
                    ),
                ),
            ));
        };

        self.ensure_data_source_data(ctx, &prop.data_source_name, schema)?;

        // Field aliases redirect the read to the aliased field of the data.
        let field = schema
            .exports
            .get(&prop.field)
            .and_then(|e| e.alias_for.as_deref())
            .unwrap_or(prop.field.as_str());

        let Some(data) = self.caches.data_source_data.get(&prop.data_source_name) else {
            return Err(self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::EmptyDataSourceData,
                    format!(
                        "no data was fetched for data source \"{}\"",
                        prop.data_source_name
                    ),
                ),
            ));
        };
        if data.is_empty() {
            return Err(self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::EmptyDataSourceData,
                    format!("data source \"{}\" returned no data", prop.data_source_name),
                ),
            ));
        }

        let node = data.get(field).ok_or_else(|| {
            self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::MissingDataSourceProp,
                    format!(
                        "data source \"{}\" does not expose a field named \"{}\"",
                        prop.data_source_name, field
                    ),
                ),
            )
        })?;

        match prop.array_index {
            None => Ok(node.clone()),
            Some(index) => match node {
                MappingNode::Items(items) => items.get(index).cloned().ok_or_else(|| {
                    self.ctx_error(
                        ctx,
                        RunError::new(
                            ReasonCode::DataSourcePropArrayIndexOutOfBounds,
                            format!(
                                "index {} is out of bounds for field \"{}\" of data source \
                                 \"{}\" ({} items)",
                                index,
                                field,
                                prop.data_source_name,
                                items.len()
                            ),
                        ),
                    )
                }),
                _ => Err(self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::DataSourcePropNotArray,
                        format!(
                            "field \"{}\" of data source \"{}\" is not an array",
                            field, prop.data_source_name
                        ),
                    ),
                )),
            },
        }
    }

    /// Resolve the data source definition (memoized) and fetch its data
    /// (memoized) through the data source registry port.
    fn ensure_data_source_data(
        &mut self,
        ctx: &ResolveContext,
        name: &str,
        schema: &DataSourceSchema,
    ) -> ResolveResult<()> {
        if self.caches.data_source_data.contains_key(name) {
            return Ok(());
        }

        let output = match self.caches.data_source_results.get(name) {
            Some(cached) => cached.clone(),
            None => {
                let resolved = self.resolve_in_data_source(
                    name,
                    schema,
                    &ResolveTarget {
                        resolve_for: ctx.resolve_for,
                        partially_resolved: None,
                    },
                )?;
                self.caches
                    .data_source_results
                    .insert(name.to_string(), resolved.clone());
                resolved
            }
        };

        if !output.resolve_on_deploy.is_empty() {
            let mut deferred_paths = output.resolve_on_deploy;
            deferred_paths.push(ctx.current_property.clone());
            return Err(ResolveError::Deferred(Deferral {
                paths: deferred_paths,
            }));
        }

        let fetched = self
            .services
            .data_sources
            .fetch(
                &self.cancel,
                &schema.data_source_type,
                DataSourceFetchRequest {
                    resolved: &output.value,
                    params: self.services.params.as_ref(),
                },
            )
            .map_err(|err| {
                ResolveError::port(
                    format!(
                        "resolving \"{}\": fetching data source \"{}\" referenced by \"{}\"",
                        ctx.root_property, name, ctx.current_property
                    ),
                    err,
                )
            })?;
        self.caches
            .data_source_data
            .insert(name.to_string(), fetched.fields);
        Ok(())
    }

    // ============================================================
    // Resource properties
    // ============================================================

    fn resolve_resource_property(
        &mut self,
        ctx: &ResolveContext,
        prop: &SubstitutionResourceProperty,
    ) -> ResolveResult<MappingNode> {
        if ctx.is_disallowed(ElementType::Resource) {
            return Err(self.disallowed_error(ctx, "resources", prop.render()));
        }

        let name = prop.resource_name.as_str();
        let spec = Arc::clone(&self.services.spec);
        let schema = match spec.resource_schema(name) {
            Some(schema) => schema,
            None => {
                // Template instance names fall back to the template schema,
                // but only when the template's elem cache confirms it.
                let template_schema = paths::split_template_instance(name)
                    .filter(|(base, _)| self.caches.template_elems.contains_key(*base))
                    .and_then(|(base, _)| spec.resource_schema(base));
                match template_schema {
                    Some(schema) => schema,
                    None => {
                        return Err(self.ctx_error(
                            ctx,
                            RunError::new(
                                ReasonCode::ResourceMissing,
                                format!("resource \"{}\" is not defined in the blueprint", name),
                            ),
                        ));
                    }
                }
            }
        };

        match prop.path.first() {
            // A bare reference is the resource identity, used by link
            // expressions; it only exists once the resource is deployed.
            None => self.resolve_resource_identity(ctx, name),
            Some(PathSegment::Field(first)) if first == "spec" => {
                self.resolve_resource_spec_property(ctx, name, &schema.resource_type, &prop.path)
            }
            Some(PathSegment::Field(first)) if first == "metadata" => {
                self.resolve_resource_metadata_property(ctx, name, &prop.path)
            }
            _ => Err(self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::InvalidResourceSpecProperty,
                    format!(
                        "\"{}\" is not a valid resource property reference; \
                         expected a spec.* or metadata.* path",
                        prop.render()
                    ),
                ),
            )),
        }
    }

    fn resolve_resource_identity(
        &mut self,
        ctx: &ResolveContext,
        name: &str,
    ) -> ResolveResult<MappingNode> {
        if ctx.resolve_for.is_staging() {
            return Err(ResolveError::defer(ctx.current_property.clone()));
        }
        let state = self.resource_state(ctx, name)?;
        let mut fields = std::collections::HashMap::new();
        fields.insert("name".to_string(), MappingNode::str(state.name.clone()));
        fields.insert(
            "resourceId".to_string(),
            MappingNode::str(state.resource_id.clone()),
        );
        fields.insert(
            "spec".to_string(),
            state.spec_data.clone().unwrap_or(MappingNode::Null),
        );
        Ok(MappingNode::Fields(fields))
    }

    fn resolve_resource_spec_property(
        &mut self,
        ctx: &ResolveContext,
        name: &str,
        resource_type: &str,
        path: &[PathSegment],
    ) -> ResolveResult<MappingNode> {
        let definition = self
            .services
            .resources
            .spec_definition(&self.cancel, resource_type, self.services.params.as_ref())
            .map_err(|err| {
                ResolveError::port(
                    format!(
                        "resolving \"{}\": fetching the spec definition for resource type \"{}\"",
                        ctx.root_property, resource_type
                    ),
                    err,
                )
            })?
            .ok_or_else(|| {
                self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::ResourceSpecDefinitionMissing,
                        format!("resource type \"{}\" has no spec definition", resource_type),
                    ),
                )
            })?;
        if definition.schema.is_none() {
            return Err(self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::InvalidResourceSpecDefinition,
                    format!(
                        "resource type \"{}\" has an invalid spec definition with no schema",
                        resource_type
                    ),
                ),
            ));
        }

        // Computed fields only exist once deployed.
        let dotted = paths::render_fields_only(path);
        if ctx.resolve_for.is_staging() && definition.is_computed(&dotted) {
            return Err(ResolveError::defer(ctx.current_property.clone()));
        }

        if ctx.resolve_for.is_staging() {
            let resolved = self.caches.resources.get(name).ok_or_else(|| {
                self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::ResourceNotResolved,
                        format!(
                            "resource \"{}\" has not been resolved yet; the deploy driver must \
                             resolve it before anything that references it",
                            name
                        ),
                    ),
                )
            })?;
            let spec_node = resolved.spec.as_ref().ok_or_else(|| {
                self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::MissingResourceSpecProperty,
                        format!("resource \"{}\" has no spec", name),
                    ),
                )
            })?;
            let node = spec_node.get_path(&path[1..]).ok_or_else(|| {
                self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::MissingResourceSpecProperty,
                        format!(
                            "\"{}\" does not exist in the resolved spec of resource \"{}\"",
                            paths::render_path("spec", &path[1..]),
                            name
                        ),
                    ),
                )
            })?;
            if !node.is_resolved() {
                // The referenced slot itself deferred; so does this read.
                return Err(ResolveError::defer(ctx.current_property.clone()));
            }
            Ok(node.clone())
        } else {
            let state = self.resource_state(ctx, name)?;
            let spec_data = state.spec_data.as_ref().ok_or_else(|| {
                self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::MissingResourceSpecProperty,
                        format!("resource \"{}\" has no deployed spec data", name),
                    ),
                )
            })?;
            spec_data.get_path(&path[1..]).cloned().ok_or_else(|| {
                self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::MissingResourceSpecProperty,
                        format!(
                            "\"{}\" does not exist in the deployed spec data of resource \"{}\"",
                            paths::render_path("spec", &path[1..]),
                            name
                        ),
                    ),
                )
            })
        }
    }

    fn resolve_resource_metadata_property(
        &mut self,
        ctx: &ResolveContext,
        name: &str,
        path: &[PathSegment],
    ) -> ResolveResult<MappingNode> {
        let resolved = self.caches.resources.get(name).ok_or_else(|| {
            self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::ResourceNotResolved,
                    format!(
                        "resource \"{}\" has not been resolved yet; the deploy driver must \
                         resolve it before anything that references it",
                        name
                    ),
                ),
            )
        })?;
        let metadata = resolved.metadata.as_ref().ok_or_else(|| {
            self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::InvalidResourceMetadataNotSet,
                    format!("resource \"{}\" has no metadata", name),
                ),
            )
        })?;

        match path.get(1) {
            Some(PathSegment::Field(field)) if field == "displayName" => {
                if path.len() > 2 {
                    return Err(self.invalid_metadata_property(ctx, name, path));
                }
                metadata.display_name.clone().ok_or_else(|| {
                    self.ctx_error(
                        ctx,
                        RunError::new(
                            ReasonCode::MissingResourceMetadataProperty,
                            format!("resource \"{}\" has no display name", name),
                        ),
                    )
                })
            }
            Some(PathSegment::Field(field)) if field == "annotations" => {
                let Some(PathSegment::Field(key)) = path.get(2) else {
                    return Err(self.invalid_metadata_property(ctx, name, path));
                };
                match metadata.annotations.get(key) {
                    Some(Some(value)) => Ok(value.clone()),
                    Some(None) => Err(self.ctx_error(
                        ctx,
                        RunError::new(
                            ReasonCode::MissingResourceMetadataProperty,
                            format!(
                                "annotation \"{}\" of resource \"{}\" has not been resolved",
                                key, name
                            ),
                        ),
                    )),
                    None => Err(self.ctx_error(
                        ctx,
                        RunError::new(
                            ReasonCode::MissingResourceMetadataProperty,
                            format!("annotation \"{}\" is not set on resource \"{}\"", key, name),
                        ),
                    )),
                }
            }
            Some(PathSegment::Field(field)) if field == "labels" => {
                let Some(PathSegment::Field(key)) = path.get(2) else {
                    return Err(self.invalid_metadata_property(ctx, name, path));
                };
                metadata
                    .labels
                    .get(key)
                    .map(|value| MappingNode::str(value.clone()))
                    .ok_or_else(|| {
                        self.ctx_error(
                            ctx,
                            RunError::new(
                                ReasonCode::MissingResourceMetadataProperty,
                                format!("label \"{}\" is not set on resource \"{}\"", key, name),
                            ),
                        )
                    })
            }
            Some(PathSegment::Field(field)) if field == "custom" => {
                let custom = metadata.custom.as_ref().ok_or_else(|| {
                    self.ctx_error(
                        ctx,
                        RunError::new(
                            ReasonCode::MissingResourceMetadataProperty,
                            format!("resource \"{}\" has no custom metadata", name),
                        ),
                    )
                })?;
                custom.get_path(&path[2..]).cloned().ok_or_else(|| {
                    self.ctx_error(
                        ctx,
                        RunError::new(
                            ReasonCode::MissingResourceMetadataProperty,
                            format!(
                                "\"{}\" does not exist in the custom metadata of resource \"{}\"",
                                paths::render_path("metadata.custom", &path[2..]),
                                name
                            ),
                        ),
                    )
                })
            }
            _ => Err(self.invalid_metadata_property(ctx, name, path)),
        }
    }

    fn invalid_metadata_property(
        &self,
        ctx: &ResolveContext,
        name: &str,
        path: &[PathSegment],
    ) -> ResolveError {
        self.ctx_error(
            ctx,
            RunError::new(
                ReasonCode::InvalidResourceMetadataProperty,
                format!(
                    "\"{}\" is not a valid metadata property of resource \"{}\"; expected \
                     displayName, annotations.KEY, labels.KEY or custom.*",
                    paths::render_path(&format!("resources.{}", name), path),
                    name
                ),
            ),
        )
    }

    fn resource_state(
        &mut self,
        ctx: &ResolveContext,
        name: &str,
    ) -> ResolveResult<ResourceState> {
        if let Some(state) = self.caches.resource_states.get(name) {
            return Ok(state.clone());
        }
        let state = self
            .services
            .state
            .resource_by_name(&self.cancel, &self.instance_id, name)
            .map_err(|err| {
                ResolveError::port(
                    format!(
                        "resolving \"{}\": reading the state of resource \"{}\"",
                        ctx.root_property, name
                    ),
                    err,
                )
            })?
            .ok_or_else(|| {
                self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::ResourceNotResolved,
                        format!("resource \"{}\" has no deployed state", name),
                    ),
                )
            })?;
        self.caches
            .resource_states
            .insert(name.to_string(), state.clone());
        Ok(state)
    }

    // ============================================================
    // Child exports
    // ============================================================

    fn resolve_child_ref(
        &mut self,
        ctx: &ResolveContext,
        child: &SubstitutionChild,
    ) -> ResolveResult<MappingNode> {
        if ctx.is_disallowed(ElementType::Child) {
            return Err(self.disallowed_error(ctx, "children", child.render()));
        }

        let Some(PathSegment::Field(field)) = child.path.first() else {
            return Err(self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::EmptyChildPath,
                    format!(
                        "child reference \"{}\" must name an export field",
                        child.render()
                    ),
                ),
            ));
        };

        let key = cache::child_export_key(&child.child_name, field);
        if let Some(entry) = self.caches.child_exports.get(&key) {
            if entry.resolve_on_deploy {
                return Err(ResolveError::defer(ctx.current_property.clone()));
            }
            if entry.removed {
                return Err(self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::MissingChildExport,
                        format!(
                            "export \"{}\" of child \"{}\" is being removed",
                            field, child.child_name
                        ),
                    ),
                ));
            }
            let value = entry.value.as_ref().ok_or_else(|| {
                self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::MissingChildExport,
                        format!(
                            "child \"{}\" does not export \"{}\"",
                            child.child_name, field
                        ),
                    ),
                )
            })?;
            return value.get_path(&child.path[1..]).cloned().ok_or_else(|| {
                self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::MissingChildExportProperty,
                        format!(
                            "\"{}\" does not exist in export \"{}\" of child \"{}\"",
                            child.render(),
                            field,
                            child.child_name
                        ),
                    ),
                )
            });
        }

        // No staged export: during change-staging the child has not been
        // staged yet, so the reference is deferred to deployment.
        if ctx.resolve_for.is_staging() {
            return Err(ResolveError::defer(ctx.current_property.clone()));
        }

        let state = self
            .services
            .state
            .child(&self.cancel, &self.instance_id, &child.child_name)
            .map_err(|err| {
                ResolveError::port(
                    format!(
                        "resolving \"{}\": reading the state of child \"{}\"",
                        ctx.root_property, child.child_name
                    ),
                    err,
                )
            })?
            .ok_or_else(|| {
                self.ctx_error(
                    ctx,
                    RunError::new(
                        ReasonCode::MissingChildExport,
                        format!("child \"{}\" has no deployed state", child.child_name),
                    ),
                )
            })?;
        let export = state.exports.get(field).ok_or_else(|| {
            self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::MissingChildExport,
                    format!(
                        "child \"{}\" does not export \"{}\"",
                        child.child_name, field
                    ),
                ),
            )
        })?;
        export.get_path(&child.path[1..]).cloned().ok_or_else(|| {
            self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::MissingChildExportProperty,
                    format!(
                        "\"{}\" does not exist in export \"{}\" of child \"{}\"",
                        child.render(),
                        field,
                        child.child_name
                    ),
                ),
            )
        })
    }

    // ============================================================
    // Function calls
    // ============================================================

    /// Resolve a function call in value position.
    fn resolve_function_call_root(
        &mut self,
        ctx: &ResolveContext,
        call: &SubstitutionFunctionCall,
    ) -> ResolveResult<MappingNode> {
        // Fresh scope per ${…} expression: one call stack shared by every
        // nested call.
        let mut scope = ScopedFunctions::new(
            Arc::clone(&self.services.functions),
            Arc::clone(&self.services.params),
        );
        match self.resolve_function_call(ctx, call, &mut scope)? {
            CallValue::Node(node) => Ok(node),
            CallValue::Partial(info) => Err(self.ctx_error(
                ctx,
                RunError::new(
                    ReasonCode::HigherOrderFunctionNotSupported,
                    format!(
                        "function \"{}\" returned a reference to function \"{}\"; partial \
                         functions are only usable as arguments to other function calls",
                        call.function_name, info.function_name
                    ),
                ),
            )),
        }
    }

    fn resolve_function_call(
        &mut self,
        ctx: &ResolveContext,
        call: &SubstitutionFunctionCall,
        scope: &mut ScopedFunctions,
    ) -> ResolveResult<CallValue> {
        // Resolving a link requires deployed resources.
        if call.function_name == LINK_FUNCTION_NAME && ctx.resolve_for.is_staging() {
            return Err(ResolveError::defer(ctx.current_property.clone()));
        }

        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            match arg {
                // Nested calls recurse through the function path so they may
                // yield a partial function for higher-order arguments.
                Substitution::FunctionCall(nested) => {
                    match self.resolve_function_call(ctx, nested, scope)? {
                        CallValue::Node(node) => {
                            args.push(FunctionArg::Value(
                                node_to_value(&node).map_err(|err| self.ctx_error(ctx, err))?,
                            ));
                        }
                        CallValue::Partial(info) => args.push(FunctionArg::Function(info)),
                    }
                }
                other => {
                    let node = self.resolve_substitution_value(ctx, other)?;
                    args.push(FunctionArg::Value(
                        node_to_value(&node).map_err(|err| self.ctx_error(ctx, err))?,
                    ));
                }
            }
        }

        let output = scope.call(
            &self.cancel,
            &call.function_name,
            FunctionArgs::positional(args),
            &call.span,
        )?;
        match output.function_info {
            Some(info) => Ok(CallValue::Partial(info)),
            None => Ok(CallValue::Node(value_to_node(
                &output.data.unwrap_or(serde_json::Value::Null),
            ))),
        }
    }

    fn disallowed_error(
        &self,
        ctx: &ResolveContext,
        kind: &str,
        rendered: String,
    ) -> ResolveError {
        self.ctx_error(
            ctx,
            RunError::new(
                ReasonCode::DisallowedElementType,
                format!(
                    "references to {} are not allowed in \"{}\": \"{}\"",
                    kind, ctx.current_property, rendered
                ),
            ),
        )
    }
}
