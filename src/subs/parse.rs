//! Parser for the `${…}` substitution grammar.
//!
//! Turns the raw text of a blueprint string field into a
//! [`StringWithSubstitutions`]: literal fragments interleaved with parsed
//! substitution expressions. The grammar covers scalar literals, the five
//! reference families (`variables.*`, `values.*`, `datasources.*`,
//! `resources.*`, `children.*`), the template locals `elem` and `i`, and
//! nested function calls.
//!
//! `\${` escapes a literal `${` in the surrounding text. Data source fields
//! accept a single top-level `[index]`; deeper array navigation is not part
//! of the grammar and has to go through function calls.

use thiserror::Error;

use crate::core::source::{SourcePos, SourceSpan};
use crate::paths::PathSegment;
use crate::subs::{
    StringPart, StringWithSubstitutions, Substitution, SubstitutionBoolLiteral, SubstitutionChild,
    SubstitutionDataSourceProperty, SubstitutionElemIndexRef, SubstitutionElemRef,
    SubstitutionFloatLiteral, SubstitutionFunctionCall, SubstitutionIntLiteral,
    SubstitutionResourceProperty, SubstitutionStringLiteral, SubstitutionValueRef,
    SubstitutionVariable,
};

/// Failure to parse a string field into substitution fragments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("substitution parse error at line {line}, column {col}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

/// Parse the full text of a string field.
pub fn parse_string(input: &str) -> Result<StringWithSubstitutions, ParseError> {
    let mut cursor = Cursor::new(input);
    let mut parts = Vec::new();
    let mut literal = String::new();

    while let Some(ch) = cursor.peek() {
        if ch == '\\' && cursor.peek_ahead(1) == Some('$') && cursor.peek_ahead(2) == Some('{') {
            cursor.advance();
            cursor.advance();
            literal.push_str("${");
            continue;
        }
        if ch == '$' && cursor.peek_ahead(1) == Some('{') {
            if !literal.is_empty() {
                parts.push(StringPart::Literal(std::mem::take(&mut literal)));
            }
            cursor.advance();
            cursor.advance();
            let sub = parse_substitution_body(&mut cursor)?;
            parts.push(StringPart::Substitution(sub));
            continue;
        }
        literal.push(ch);
        cursor.advance();
    }

    if !literal.is_empty() {
        parts.push(StringPart::Literal(literal));
    }

    Ok(StringWithSubstitutions { parts, span: None })
}

/// Parse the expression between `${` and `}`, consuming the closing brace.
fn parse_substitution_body(cursor: &mut Cursor<'_>) -> Result<Substitution, ParseError> {
    cursor.skip_whitespace();
    if cursor.peek() == Some('}') {
        return Err(cursor.error("empty substitution"));
    }
    let expr = parse_expr(cursor)?;
    cursor.skip_whitespace();
    match cursor.peek() {
        Some('}') => {
            cursor.advance();
            Ok(expr)
        }
        Some(other) => Err(cursor.error(format!("expected '}}', found '{}'", other))),
        None => Err(cursor.error("unterminated substitution, expected '}'")),
    }
}

fn parse_expr(cursor: &mut Cursor<'_>) -> Result<Substitution, ParseError> {
    cursor.skip_whitespace();
    let start = cursor.pos();
    match cursor.peek() {
        Some('"') => parse_string_literal(cursor, start),
        Some(ch) if ch.is_ascii_digit() || ch == '-' => parse_number_literal(cursor, start),
        Some(ch) if is_ident_start(ch) => parse_reference_or_call(cursor, start),
        Some(other) => Err(cursor.error(format!("unexpected character '{}'", other))),
        None => Err(cursor.error("unexpected end of input")),
    }
}

fn parse_string_literal(cursor: &mut Cursor<'_>, start: SourcePos) -> Result<Substitution, ParseError> {
    let value = parse_quoted(cursor)?;
    Ok(Substitution::StringLiteral(SubstitutionStringLiteral {
        value,
        span: cursor.span_from(start),
    }))
}

fn parse_quoted(cursor: &mut Cursor<'_>) -> Result<String, ParseError> {
    cursor.advance(); // opening quote
    let mut value = String::new();
    loop {
        match cursor.peek() {
            Some('"') => {
                cursor.advance();
                return Ok(value);
            }
            Some('\\') => {
                cursor.advance();
                match cursor.peek() {
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => return Err(cursor.error("unterminated string literal")),
                }
                cursor.advance();
            }
            Some(other) => {
                value.push(other);
                cursor.advance();
            }
            None => return Err(cursor.error("unterminated string literal")),
        }
    }
}

fn parse_number_literal(cursor: &mut Cursor<'_>, start: SourcePos) -> Result<Substitution, ParseError> {
    let mut raw = String::new();
    if cursor.peek() == Some('-') {
        raw.push('-');
        cursor.advance();
    }
    let mut is_float = false;
    while let Some(ch) = cursor.peek() {
        if ch.is_ascii_digit() {
            raw.push(ch);
            cursor.advance();
        } else if ch == '.' && !is_float && cursor.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            raw.push(ch);
            cursor.advance();
        } else {
            break;
        }
    }
    if raw.is_empty() || raw == "-" {
        return Err(cursor.error("expected a number"));
    }
    let span = cursor.span_from(start);
    if is_float {
        let value: f64 = raw
            .parse()
            .map_err(|_| cursor.error(format!("invalid float literal '{}'", raw)))?;
        Ok(Substitution::FloatLiteral(SubstitutionFloatLiteral { value, span }))
    } else {
        let value: i64 = raw
            .parse()
            .map_err(|_| cursor.error(format!("invalid int literal '{}'", raw)))?;
        Ok(Substitution::IntLiteral(SubstitutionIntLiteral { value, span }))
    }
}

fn parse_reference_or_call(cursor: &mut Cursor<'_>, start: SourcePos) -> Result<Substitution, ParseError> {
    let ident = parse_ident(cursor)?;
    cursor.skip_whitespace();

    if cursor.peek() == Some('(') {
        return parse_function_call(cursor, ident, start);
    }

    match ident.as_str() {
        "true" | "false" => Ok(Substitution::BoolLiteral(SubstitutionBoolLiteral {
            value: ident == "true",
            span: cursor.span_from(start),
        })),
        "variables" => {
            let name = parse_dot_ident(cursor, "variables")?;
            Ok(Substitution::Variable(SubstitutionVariable {
                name,
                span: cursor.span_from(start),
            }))
        }
        "values" => {
            let name = parse_dot_ident(cursor, "values")?;
            let path = parse_path(cursor)?;
            Ok(Substitution::ValueRef(SubstitutionValueRef {
                name,
                path,
                span: cursor.span_from(start),
            }))
        }
        "datasources" => {
            let data_source_name = parse_dot_ident(cursor, "datasources")?;
            let field = parse_dot_ident(cursor, "data source field")?;
            let array_index = parse_optional_index(cursor)?;
            Ok(Substitution::DataSourceProperty(SubstitutionDataSourceProperty {
                data_source_name,
                field,
                array_index,
                span: cursor.span_from(start),
            }))
        }
        "resources" => {
            let resource_name = parse_dot_ident(cursor, "resources")?;
            let path = parse_path(cursor)?;
            Ok(Substitution::ResourceProperty(SubstitutionResourceProperty {
                resource_name,
                path,
                span: cursor.span_from(start),
            }))
        }
        "children" => {
            let child_name = parse_dot_ident(cursor, "children")?;
            let path = parse_path(cursor)?;
            Ok(Substitution::Child(SubstitutionChild {
                child_name,
                path,
                span: cursor.span_from(start),
            }))
        }
        "elem" => {
            let path = parse_path(cursor)?;
            Ok(Substitution::ElemRef(SubstitutionElemRef {
                path,
                span: cursor.span_from(start),
            }))
        }
        "i" => Ok(Substitution::ElemIndexRef(SubstitutionElemIndexRef {
            span: cursor.span_from(start),
        })),
        other => Err(cursor.error(format!(
            "unknown reference '{}'; expected a literal, a function call, \
             variables.*, values.*, datasources.*, resources.*, children.*, elem or i",
            other
        ))),
    }
}

fn parse_function_call(
    cursor: &mut Cursor<'_>,
    function_name: String,
    start: SourcePos,
) -> Result<Substitution, ParseError> {
    cursor.advance(); // '('
    let mut args = Vec::new();
    cursor.skip_whitespace();
    if cursor.peek() == Some(')') {
        cursor.advance();
        return Ok(Substitution::FunctionCall(SubstitutionFunctionCall {
            function_name,
            args,
            span: cursor.span_from(start),
        }));
    }
    loop {
        args.push(parse_expr(cursor)?);
        cursor.skip_whitespace();
        match cursor.peek() {
            Some(',') => {
                cursor.advance();
                cursor.skip_whitespace();
            }
            Some(')') => {
                cursor.advance();
                return Ok(Substitution::FunctionCall(SubstitutionFunctionCall {
                    function_name,
                    args,
                    span: cursor.span_from(start),
                }));
            }
            Some(other) => {
                return Err(cursor.error(format!("expected ',' or ')', found '{}'", other)));
            }
            None => return Err(cursor.error("unterminated function call, expected ')'")),
        }
    }
}

fn parse_dot_ident(cursor: &mut Cursor<'_>, context: &str) -> Result<String, ParseError> {
    if cursor.peek() != Some('.') {
        return Err(cursor.error(format!("expected '.' after {}", context)));
    }
    cursor.advance();
    parse_ident(cursor)
}

fn parse_ident(cursor: &mut Cursor<'_>) -> Result<String, ParseError> {
    let mut ident = String::new();
    match cursor.peek() {
        Some(ch) if is_ident_start(ch) => {
            ident.push(ch);
            cursor.advance();
        }
        _ => return Err(cursor.error("expected an identifier")),
    }
    while let Some(ch) = cursor.peek() {
        if is_ident_part(ch) {
            ident.push(ch);
            cursor.advance();
        } else {
            break;
        }
    }
    Ok(ident)
}

/// `.field`, `[3]` and `["key"]` fragments following a reference.
fn parse_path(cursor: &mut Cursor<'_>) -> Result<Vec<PathSegment>, ParseError> {
    let mut segments = Vec::new();
    loop {
        match cursor.peek() {
            Some('.') => {
                cursor.advance();
                segments.push(PathSegment::Field(parse_ident(cursor)?));
            }
            Some('[') => {
                cursor.advance();
                cursor.skip_whitespace();
                match cursor.peek() {
                    Some('"') => {
                        let key = parse_quoted(cursor)?;
                        segments.push(PathSegment::Field(key));
                    }
                    Some(ch) if ch.is_ascii_digit() => {
                        let mut raw = String::new();
                        while let Some(digit) = cursor.peek() {
                            if digit.is_ascii_digit() {
                                raw.push(digit);
                                cursor.advance();
                            } else {
                                break;
                            }
                        }
                        let index: usize = raw
                            .parse()
                            .map_err(|_| cursor.error(format!("invalid array index '{}'", raw)))?;
                        segments.push(PathSegment::Index(index));
                    }
                    _ => return Err(cursor.error("expected an array index or quoted key after '['")),
                }
                cursor.skip_whitespace();
                if cursor.peek() != Some(']') {
                    return Err(cursor.error("expected ']'"));
                }
                cursor.advance();
            }
            _ => return Ok(segments),
        }
    }
}

fn parse_optional_index(cursor: &mut Cursor<'_>) -> Result<Option<usize>, ParseError> {
    if cursor.peek() != Some('[') {
        return Ok(None);
    }
    cursor.advance();
    cursor.skip_whitespace();
    let mut raw = String::new();
    while let Some(ch) = cursor.peek() {
        if ch.is_ascii_digit() {
            raw.push(ch);
            cursor.advance();
        } else {
            break;
        }
    }
    if raw.is_empty() {
        return Err(cursor.error("expected an array index after '['"));
    }
    let index: usize = raw
        .parse()
        .map_err(|_| cursor.error(format!("invalid array index '{}'", raw)))?;
    cursor.skip_whitespace();
    if cursor.peek() != Some(']') {
        return Err(cursor.error("expected ']'"));
    }
    cursor.advance();
    Ok(Some(index))
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

/// Character cursor with line/column tracking.
struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    _input: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            _input: input,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek() {
            self.pos += 1;
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn pos(&self) -> SourcePos {
        SourcePos::new(self.line, self.col)
    }

    fn span_from(&self, start: SourcePos) -> SourceSpan {
        SourceSpan {
            file: None,
            start: Some(start),
            end: Some(self.pos()),
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line,
            col: self.col,
        }
    }
}
