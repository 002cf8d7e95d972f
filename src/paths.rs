//! Canonical element and property addressing.
//!
//! Every top-level blueprint element has a canonical identifier of the form
//! `resources.NAME`, `datasources.NAME`, `values.NAME`, `children.NAME` or
//! `exports.NAME`. Property paths extend an identifier with `.field`,
//! `[index]` and `["key"]` fragments; the same syntax is used for the
//! deferred-path lists handed back to the deploy driver, so it has to stay
//! stable.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The kind of a top-level blueprint element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementType {
    Resource,
    DataSource,
    Value,
    Child,
    Export,
}

impl ElementType {
    /// The canonical identifier prefix for this element kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            ElementType::Resource => "resources",
            ElementType::DataSource => "datasources",
            ElementType::Value => "values",
            ElementType::Child => "children",
            ElementType::Export => "exports",
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// One fragment of a property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathSegment {
    /// A field access (`.name` or `["name"]` when not an identifier).
    Field(String),
    /// An array index (`[3]`).
    Index(usize),
}

impl PathSegment {
    pub fn field(name: impl Into<String>) -> Self {
        PathSegment::Field(name.into())
    }

    /// Append this segment to a rendered path.
    pub fn render_onto(&self, out: &mut String) {
        match self {
            PathSegment::Field(name) if is_identifier(name) => {
                out.push('.');
                out.push_str(name);
            }
            PathSegment::Field(name) => {
                out.push_str("[\"");
                out.push_str(&name.replace('\\', "\\\\").replace('"', "\\\""));
                out.push_str("\"]");
            }
            PathSegment::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
}

/// Build the canonical identifier for an element, e.g. `resources.ordersTable`.
pub fn element_id(kind: ElementType, name: &str) -> String {
    format!("{}.{}", kind.prefix(), name)
}

/// Render a property path rooted at `base` (an element identifier or an
/// already-rendered path).
pub fn render_path(base: &str, segments: &[PathSegment]) -> String {
    let mut out = String::from(base);
    for segment in segments {
        segment.render_onto(&mut out);
    }
    out
}

/// Render path segments without a base, e.g. `spec.arn` for error messages
/// and computed-field comparison. Index segments are dropped so that
/// `spec.endpoints[2]` compares equal to the declared `spec.endpoints`.
pub fn render_fields_only(segments: &[PathSegment]) -> String {
    let mut parts = Vec::new();
    for segment in segments {
        if let PathSegment::Field(name) = segment {
            parts.push(name.as_str());
        }
    }
    parts.join(".")
}

fn identifier_re() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid regex"))
}

fn template_instance_re() -> &'static Regex {
    static TEMPLATE_INSTANCE: OnceLock<Regex> = OnceLock::new();
    TEMPLATE_INSTANCE.get_or_init(|| Regex::new(r"^(.+)_(\d+)$").expect("valid regex"))
}

/// Whether a field name can be rendered with dot syntax.
pub fn is_identifier(name: &str) -> bool {
    identifier_re().is_match(name)
}

/// Split a resource-template instance name into `(template, index)`.
///
/// `ordersTable_2` yields `("ordersTable", 2)`. Returns `None` when the name
/// carries no `_N` suffix. A `Some` result only means the name LOOKS like a
/// template instance; callers must confirm the template against the elem
/// cache before treating it as one, since a plain resource is allowed (but
/// discouraged) to end in `_N`.
pub fn split_template_instance(name: &str) -> Option<(&str, usize)> {
    let captures = template_instance_re().captures(name)?;
    let base = captures.get(1)?;
    let index: usize = captures.get(2)?.as_str().parse().ok()?;
    Some((&name[..base.end()], index))
}

/// Build the instance name for the `index`-th expansion of a resource template.
pub fn template_instance_name(template: &str, index: usize) -> String {
    format!("{}_{}", template, index)
}
