//! Typed errors and the deferral machinery.
//!
//! Failures fall into three bands:
//!
//! 1. **Deferrals** ([`Deferral`]) - "resolve on deploy" conditions raised
//!    while change-staging. They are caught at element boundaries and turned
//!    into the `resolve_on_deploy` path list of the result; they never reach
//!    the caller as errors.
//! 2. **Hard run errors** ([`RunError`]) - carry a stable [`ReasonCode`]
//!    plus the element and canonical property path they occurred at. Never
//!    retried by the resolver.
//! 3. **Propagated port errors** - failures from external collaborators
//!    (registries, state container), forwarded as a [`RunError`] source with
//!    the resolver's element context prepended to the message.
//!
//! The resolver never logs; everything the deploy driver needs to produce a
//! user-facing response is on these types.

use std::collections::HashSet;

use thiserror::Error;

/// Stable machine-readable reason for a hard resolution failure.
///
/// The rendered form (see [`ReasonCode::as_str`]) is part of the crate's
/// contract with the deploy driver and must not change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    InvalidResolvedSubValue,
    EmptySubstitution,
    MissingVariable,
    MissingValue,
    MissingDataSource,
    EmptyDataSourceData,
    MissingDataSourceProp,
    DataSourcePropNotArray,
    DataSourcePropArrayIndexOutOfBounds,
    ResourceNotResolved,
    ResourceEachIndexOutOfBounds,
    ResourceEachEmpty,
    ResourceEachInvalidType,
    MissingFunction,
    FunctionCall,
    EmptyPositionalFunctionArgument,
    EmptyNamedFunctionArgument,
    EmptyFunctionOutput,
    HigherOrderFunctionNotSupported,
    ResourceMissing,
    ResourceSpecDefinitionMissing,
    InvalidResourceSpecDefinition,
    InvalidResourceSpecProperty,
    MissingResourceSpecProperty,
    InvalidResourceMetadataProperty,
    MissingResourceMetadataProperty,
    InvalidResourceMetadataNotSet,
    EmptyChildPath,
    MissingChildExport,
    MissingChildExportProperty,
    DisallowedElementType,
    /// A mapping-node tree exceeded the bounded traversal depth.
    MaxTraverseDepthExceeded,
    /// A value definition transitively referenced itself before its cache
    /// slot was populated.
    CircularValueReference,
}

impl ReasonCode {
    /// The stable kebab-case rendering used in reports and over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InvalidResolvedSubValue => "invalid-resolved-sub-value",
            ReasonCode::EmptySubstitution => "empty-substitution",
            ReasonCode::MissingVariable => "missing-variable",
            ReasonCode::MissingValue => "missing-value",
            ReasonCode::MissingDataSource => "missing-data-source",
            ReasonCode::EmptyDataSourceData => "empty-data-source-data",
            ReasonCode::MissingDataSourceProp => "missing-data-source-prop",
            ReasonCode::DataSourcePropNotArray => "data-source-prop-not-array",
            ReasonCode::DataSourcePropArrayIndexOutOfBounds => {
                "data-source-prop-array-index-out-of-bounds"
            }
            ReasonCode::ResourceNotResolved => "resource-not-resolved",
            ReasonCode::ResourceEachIndexOutOfBounds => "resource-each-index-out-of-bounds",
            ReasonCode::ResourceEachEmpty => "resource-each-empty",
            ReasonCode::ResourceEachInvalidType => "resource-each-invalid-type",
            ReasonCode::MissingFunction => "missing-function",
            ReasonCode::FunctionCall => "function-call",
            ReasonCode::EmptyPositionalFunctionArgument => "empty-positional-function-argument",
            ReasonCode::EmptyNamedFunctionArgument => "empty-named-function-argument",
            ReasonCode::EmptyFunctionOutput => "empty-function-output",
            ReasonCode::HigherOrderFunctionNotSupported => "higher-order-function-not-supported",
            ReasonCode::ResourceMissing => "resource-missing",
            ReasonCode::ResourceSpecDefinitionMissing => "resource-spec-definition-missing",
            ReasonCode::InvalidResourceSpecDefinition => "invalid-resource-spec-definition",
            ReasonCode::InvalidResourceSpecProperty => "invalid-resource-spec-property",
            ReasonCode::MissingResourceSpecProperty => "missing-resource-spec-property",
            ReasonCode::InvalidResourceMetadataProperty => "invalid-resource-metadata-property",
            ReasonCode::MissingResourceMetadataProperty => "missing-resource-metadata-property",
            ReasonCode::InvalidResourceMetadataNotSet => "invalid-resource-metadata-not-set",
            ReasonCode::EmptyChildPath => "empty-child-path",
            ReasonCode::MissingChildExport => "missing-child-export",
            ReasonCode::MissingChildExportProperty => "missing-child-export-property",
            ReasonCode::DisallowedElementType => "disallowed-element-type",
            ReasonCode::MaxTraverseDepthExceeded => "max-traverse-depth-exceeded",
            ReasonCode::CircularValueReference => "circular-value-reference",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A hard resolution failure.
#[derive(Debug, Error)]
#[error("{message} [{reason}]")]
pub struct RunError {
    pub reason: ReasonCode,
    pub message: String,
    /// Canonical identifier of the element being resolved, when known.
    pub element: Option<String>,
    /// Rendered canonical property path the failure occurred at, when known.
    pub path: Option<String>,
    /// Underlying cause, for failures propagated from external ports.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RunError {
    pub fn new(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            element: None,
            path: None,
            source: None,
        }
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Wrap a failure from an external collaborator port, prepending the
    /// element context to the message and keeping the cause chained.
    pub fn from_port(reason: ReasonCode, context: impl Into<String>, err: anyhow::Error) -> Self {
        let context = context.into();
        Self {
            reason,
            message: format!("{}: {}", context, err),
            element: None,
            path: None,
            source: Some(err.into()),
        }
    }
}

/// Paths that could not be resolved during change-staging and must be
/// re-resolved at deployment.
///
/// Raised internally as [`ResolveError::Deferred`] and recovered at each
/// element boundary; set semantics on the collected output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deferral {
    pub paths: Vec<String>,
}

impl Deferral {
    pub fn single(path: impl Into<String>) -> Self {
        Self {
            paths: vec![path.into()],
        }
    }
}

impl std::fmt::Display for Deferral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "must be resolved on deploy: {}", self.paths.join(", "))
    }
}

/// Any failure surfaced by a resolution call.
///
/// `Deferred` never escapes the public element entry points; they convert it
/// into the `resolve_on_deploy` output list.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Run(#[from] RunError),
    /// A failure from an external collaborator port, forwarded unchanged
    /// with the resolver's element context prepended.
    #[error(transparent)]
    Port(anyhow::Error),
    #[error("{0}")]
    Deferred(Deferral),
    #[error("resolution cancelled")]
    Cancelled,
}

impl ResolveError {
    /// Shorthand for deferring the given canonical property path.
    pub fn defer(path: impl Into<String>) -> Self {
        ResolveError::Deferred(Deferral::single(path))
    }

    /// Forward a port failure, prepending the resolver's element context.
    pub fn port(context: impl Into<String>, err: anyhow::Error) -> Self {
        ResolveError::Port(err.context(context.into()))
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Order-preserving, deduplicating accumulator for deferred paths.
#[derive(Debug, Default)]
pub struct DeferredPaths {
    seen: HashSet<String>,
    paths: Vec<String>,
}

impl DeferredPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>) {
        let path = path.into();
        if self.seen.insert(path.clone()) {
            self.paths.push(path);
        }
    }

    pub fn extend(&mut self, deferral: Deferral) {
        for path in deferral.paths {
            self.push(path);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.paths
    }

    /// Run a sub-resolution, absorbing a deferral into the accumulator.
    ///
    /// `Ok(None)` means the sub-tree deferred and its slot must stay
    /// unresolved; hard errors pass through untouched.
    pub fn absorb<T>(&mut self, result: ResolveResult<T>) -> ResolveResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(ResolveError::Deferred(deferral)) => {
                self.extend(deferral);
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }
}
