//! blueprint-resolve - substitution resolver core for declarative
//! infrastructure blueprints.
//!
//! Given an already-parsed blueprint schema tree and a runtime parameter
//! set, the resolver walks every element (resources, data sources, values,
//! includes, exports, metadata) and recursively resolves embedded `${…}`
//! expressions into concrete values, coordinating cross-element lookups
//! through injected registries and classifying everything that cannot be
//! resolved during change-staging as a deferred property path to re-resolve
//! at deployment.
//!
//! ## Module Structure
//!
//! - `core`: scalars, source metadata and the mapping-node value tree
//! - `paths`: canonical element identifiers and property-path rendering
//! - `subs`: the `${…}` substitution AST and its parser
//! - `schema`: parsed blueprint entities and their resolved mirrors
//! - `errors`: reason-coded errors and the deferral machinery
//! - `functions`: the function call protocol and native-value bridging
//! - `ports`: interfaces to the external collaborators (registries, state)
//! - `resolve`: the per-operation substitution resolver

pub mod core;
pub mod errors;
pub mod functions;
pub mod paths;
pub mod ports;
pub mod resolve;
pub mod schema;
pub mod subs;

pub use crate::core::{MAPPING_NODE_MAX_TRAVERSE_DEPTH, MappingNode, ScalarKind, ScalarValue};
pub use crate::errors::{Deferral, ReasonCode, ResolveError, ResolveResult, RunError};
pub use crate::resolve::{
    ChildExportEntry, ResolveOutput, ResolveStage, ResolveTarget, ResolverServices,
    SubstitutionResolver,
};
