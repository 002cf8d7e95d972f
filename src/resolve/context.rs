//! Resolution stages, targets and the ambient resolve context.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::paths::ElementType;

/// Which evaluation stage a resolution runs for.
///
/// Change-staging is the planning pass where values that require deployed
/// infrastructure may be deferred; at deployment everything must resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolveStage {
    ChangeStaging,
    Deployment,
}

impl ResolveStage {
    pub fn is_staging(&self) -> bool {
        matches!(self, ResolveStage::ChangeStaging)
    }
}

/// What a `resolve_in_*` call should produce: the stage to resolve for and
/// an optional prior result whose resolved sub-trees are reused instead of
/// being re-computed.
#[derive(Debug, Clone, Default)]
pub struct ResolveTarget<T> {
    pub resolve_for: ResolveStage,
    pub partially_resolved: Option<T>,
}

impl<T> ResolveTarget<T> {
    pub fn staging() -> Self {
        Self {
            resolve_for: ResolveStage::ChangeStaging,
            partially_resolved: None,
        }
    }

    pub fn deployment() -> Self {
        Self {
            resolve_for: ResolveStage::Deployment,
            partially_resolved: None,
        }
    }

    pub fn with_partial(mut self, partial: T) -> Self {
        self.partially_resolved = Some(partial);
        self
    }
}

impl Default for ResolveStage {
    fn default() -> Self {
        ResolveStage::ChangeStaging
    }
}

/// The result of resolving one element: the resolved tree plus the
/// canonical property paths that must be re-resolved at deployment.
///
/// An empty `resolve_on_deploy` list means the element resolved fully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveOutput<T> {
    pub value: T,
    pub resolve_on_deploy: Vec<String>,
}

impl<T> ResolveOutput<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            resolve_on_deploy: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.resolve_on_deploy.is_empty()
    }
}

/// The ambient frame threaded through every recursive resolution call.
///
/// Tracks where resolution started (`root_*`), where it currently is
/// (`current_*`), the stage, and the element kinds the current expression
/// is forbidden from referencing (e.g. `resources` and `children` inside a
/// resource template's `each`).
#[derive(Debug, Clone)]
pub(crate) struct ResolveContext {
    pub root_element: String,
    pub root_property: String,
    /// Canonical identifier of the element being resolved.
    pub current_element: String,
    /// Bare name of the element, used to recover template instance indices.
    pub current_element_name: String,
    /// Full canonical path of the property being resolved.
    pub current_property: String,
    pub resolve_for: ResolveStage,
    pub disallowed: HashSet<ElementType>,
}

impl ResolveContext {
    pub fn new(
        element: impl Into<String>,
        element_name: impl Into<String>,
        property: impl Into<String>,
        resolve_for: ResolveStage,
    ) -> Self {
        let element = element.into();
        let property = property.into();
        Self {
            root_element: element.clone(),
            root_property: property.clone(),
            current_element: element,
            current_element_name: element_name.into(),
            current_property: property,
            resolve_for,
            disallowed: HashSet::new(),
        }
    }

    /// Same element, different property path.
    pub fn with_property(&self, property: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.current_property = property.into();
        ctx
    }

    /// Step into another element (e.g. a referenced value definition),
    /// keeping the root for reporting.
    pub fn for_element(
        &self,
        element: impl Into<String>,
        element_name: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        let mut ctx = self.clone();
        ctx.current_element = element.into();
        ctx.current_element_name = element_name.into();
        ctx.current_property = property.into();
        ctx
    }

    pub fn with_disallowed(mut self, disallowed: HashSet<ElementType>) -> Self {
        self.disallowed = disallowed;
        self
    }

    pub fn is_disallowed(&self, element_type: ElementType) -> bool {
        self.disallowed.contains(&element_type)
    }
}
