//! The substitution expression AST.
//!
//! A substitution is a single `${…}` expression embedded in a blueprint
//! string field. This module defines the AST using a struct-per-variant
//! layout: each expression kind is its own struct, the [`Substitution`] enum
//! wraps them all, and the [`SubstitutionExpr`] trait provides the shared
//! accessors (source span and a render back to source text) dispatched with
//! `enum_dispatch`.
//!
//! The AST is produced by the blueprint loader (or [`parse`] for tests and
//! tooling) and consumed by the resolver; nothing here evaluates anything.

pub mod parse;

use enum_dispatch::enum_dispatch;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::source::SourceSpan;
use crate::paths::PathSegment;

/// Shared surface of every substitution variant.
#[enum_dispatch]
pub trait SubstitutionExpr {
    /// Source span of the expression within its string field.
    fn span(&self) -> &SourceSpan;

    /// Render the expression back to its source form (without `${}`).
    fn render(&self) -> String;
}

/// A quoted string literal: `${"fallback"}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionStringLiteral {
    pub value: String,
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionStringLiteral {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        format!("\"{}\"", self.value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// An integer literal: `${42}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionIntLiteral {
    pub value: i64,
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionIntLiteral {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        self.value.to_string()
    }
}

/// A float literal: `${1.5}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionFloatLiteral {
    pub value: f64,
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionFloatLiteral {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        let rendered = self.value.to_string();
        // Keep the float shape stable so a render/parse round trip stays a float.
        if rendered.contains('.') || rendered.contains('e') {
            rendered
        } else {
            format!("{}.0", rendered)
        }
    }
}

/// A boolean literal: `${true}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionBoolLiteral {
    pub value: bool,
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionBoolLiteral {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        self.value.to_string()
    }
}

/// A variable reference: `${variables.environment}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionVariable {
    pub name: String,
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionVariable {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        format!("variables.{}", self.name)
    }
}

/// A value reference with an optional path into the value's tree:
/// `${values.networkConfig.subnets[0]}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionValueRef {
    pub name: String,
    pub path: Vec<PathSegment>,
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionValueRef {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        crate::paths::render_path(&format!("values.{}", self.name), &self.path)
    }
}

/// A reference to the current resource-template element: `${elem.region}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionElemRef {
    pub path: Vec<PathSegment>,
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionElemRef {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        crate::paths::render_path("elem", &self.path)
    }
}

/// The index of the current resource-template element: `${i}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionElemIndexRef {
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionElemIndexRef {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        "i".to_string()
    }
}

/// A data source exported field, with an optional single top-level array
/// index: `${datasources.network.subnetIds[1]}`.
///
/// Deeper array navigation is not part of the substitution grammar; anything
/// beyond one index must go through function calls.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionDataSourceProperty {
    pub data_source_name: String,
    pub field: String,
    pub array_index: Option<usize>,
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionDataSourceProperty {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        let mut out = format!("datasources.{}.{}", self.data_source_name, self.field);
        if let Some(index) = self.array_index {
            out.push('[');
            out.push_str(&index.to_string());
            out.push(']');
        }
        out
    }
}

/// A resource property reference: `${resources.ordersTable.spec.arn}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionResourceProperty {
    pub resource_name: String,
    pub path: Vec<PathSegment>,
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionResourceProperty {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        crate::paths::render_path(&format!("resources.{}", self.resource_name), &self.path)
    }
}

/// A child blueprint export reference: `${children.coreInfra.region}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionChild {
    pub child_name: String,
    pub path: Vec<PathSegment>,
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionChild {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        crate::paths::render_path(&format!("children.{}", self.child_name), &self.path)
    }
}

/// A function call: `${jsondecode(variables.regions)}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstitutionFunctionCall {
    pub function_name: String,
    pub args: Vec<Substitution>,
    pub span: SourceSpan,
}

impl SubstitutionExpr for SubstitutionFunctionCall {
    fn span(&self) -> &SourceSpan {
        &self.span
    }

    fn render(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|a| a.render()).collect();
        format!("{}({})", self.function_name, args.join(", "))
    }
}

/// One parsed `${…}` expression.
#[enum_dispatch(SubstitutionExpr)]
#[derive(Debug, Clone, PartialEq)]
pub enum Substitution {
    StringLiteral(SubstitutionStringLiteral),
    IntLiteral(SubstitutionIntLiteral),
    FloatLiteral(SubstitutionFloatLiteral),
    BoolLiteral(SubstitutionBoolLiteral),
    Variable(SubstitutionVariable),
    ValueRef(SubstitutionValueRef),
    ElemRef(SubstitutionElemRef),
    ElemIndexRef(SubstitutionElemIndexRef),
    DataSourceProperty(SubstitutionDataSourceProperty),
    ResourceProperty(SubstitutionResourceProperty),
    Child(SubstitutionChild),
    FunctionCall(SubstitutionFunctionCall),
}

/// One fragment of a string field: literal text or a substitution.
#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Literal(String),
    Substitution(Substitution),
}

/// An ordered sequence of literal and substitution fragments.
///
/// When more than one fragment is present the resolved value is the string
/// concatenation of all fragments; a single substitution fragment may
/// resolve to any mapping-node shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringWithSubstitutions {
    pub parts: Vec<StringPart>,
    pub span: Option<SourceSpan>,
}

impl StringWithSubstitutions {
    /// A plain literal string with no substitutions.
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            parts: vec![StringPart::Literal(value.into())],
            span: None,
        }
    }

    /// A single-substitution string, the common `"${expr}"` shape.
    pub fn substitution(sub: Substitution) -> Self {
        Self {
            parts: vec![StringPart::Substitution(sub)],
            span: None,
        }
    }

    /// The sole substitution when this string is exactly one `${…}` fragment.
    pub fn as_single_substitution(&self) -> Option<&Substitution> {
        match self.parts.as_slice() {
            [StringPart::Substitution(sub)] => Some(sub),
            _ => None,
        }
    }

    /// The literal string when no fragment is a substitution.
    pub fn as_literal(&self) -> Option<String> {
        if self.parts.iter().any(|p| matches!(p, StringPart::Substitution(_))) {
            return None;
        }
        let mut out = String::new();
        for part in &self.parts {
            if let StringPart::Literal(text) = part {
                out.push_str(text);
            }
        }
        Some(out)
    }

    pub fn has_substitutions(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, StringPart::Substitution(_)))
    }

    /// Render back to source form, e.g. `prefix-${variables.env}`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                StringPart::Literal(text) => out.push_str(&text.replace("${", "\\${")),
                StringPart::Substitution(sub) => {
                    out.push_str("${");
                    out.push_str(&sub.render());
                    out.push('}');
                }
            }
        }
        out
    }
}

impl std::fmt::Display for StringWithSubstitutions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

// Serialized as the source string form so that schema documents stay plain
// JSON; deserialization re-parses the `${…}` grammar.
impl Serialize for StringWithSubstitutions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.render())
    }
}

impl<'de> Deserialize<'de> for StringWithSubstitutions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse::parse_string(&raw).map_err(D::Error::custom)
    }
}
