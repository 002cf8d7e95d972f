//! The function call protocol.
//!
//! Every `${…}` expression that contains function calls gets a fresh call
//! scope: a bounded [`CallStack`] shared by all nested calls in the
//! expression, and a [`ScopedFunctions`] façade over the injected function
//! registry that pushes a stack frame around every invocation. Function
//! implementations receive native `serde_json::Value` arguments (or partial
//! function references for higher-order calls) and respond with either a
//! native value or a [`FunctionInfo`] partial.

pub mod convert;

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::SourceSpan;
use crate::errors::{ReasonCode, ResolveError, ResolveResult, RunError};
use crate::ports::{BlueprintParams, CancelToken, FunctionCallRequest, FunctionRegistry};

/// Maximum depth of nested function calls within one `${…}` expression.
pub const MAX_CALL_STACK_DEPTH: usize = 10;

/// One frame of the call stack: the function name and where the call
/// appears in the blueprint document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStackEntry {
    pub function_name: String,
    pub span: SourceSpan,
}

/// The chain of nested function invocations in one expression.
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    entries: Vec<CallStackEntry>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[CallStackEntry] {
        &self.entries
    }

    /// Push a frame, refusing chains deeper than [`MAX_CALL_STACK_DEPTH`].
    pub fn push(&mut self, entry: CallStackEntry) -> Result<(), RunError> {
        if self.entries.len() >= MAX_CALL_STACK_DEPTH {
            let mut chain = self.render_chain();
            chain.push_str(" -> ");
            chain.push_str(&entry.function_name);
            return Err(RunError::new(
                ReasonCode::FunctionCall,
                format!(
                    "function call depth exceeds the maximum of {}: {}",
                    MAX_CALL_STACK_DEPTH, chain
                ),
            ));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<CallStackEntry> {
        self.entries.pop()
    }

    /// `outer -> inner` rendering for error messages.
    pub fn render_chain(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.function_name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// A partial function reference returned by a higher-order function, or
/// supplied to one as an argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInfo {
    pub function_name: String,
    /// Number of arguments already bound by the call that produced this
    /// partial; the eventual invocation appends its own after them.
    pub arg_offset: usize,
}

/// One argument handed to a function implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArg {
    Value(Value),
    /// A partial function, only meaningful to higher-order functions.
    Function(FunctionInfo),
}

/// What a function invocation produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionOutput {
    pub data: Option<Value>,
    pub function_info: Option<FunctionInfo>,
}

impl FunctionOutput {
    pub fn value(data: Value) -> Self {
        Self {
            data: Some(data),
            function_info: None,
        }
    }

    pub fn partial(info: FunctionInfo) -> Self {
        Self {
            data: None,
            function_info: Some(info),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.function_info.is_none()
    }
}

/// Argument accessor offered to function implementations.
///
/// Supports positional read-by-index, typed reads and batch arity checks;
/// all failures are `function-call` errors apart from the empty-argument
/// cases which carry their own reason codes.
#[derive(Debug, Clone, Default)]
pub struct FunctionArgs {
    positional: Vec<FunctionArg>,
    named: HashMap<String, Value>,
}

impl FunctionArgs {
    pub fn positional(args: Vec<FunctionArg>) -> Self {
        Self {
            positional: args,
            named: HashMap::new(),
        }
    }

    pub fn with_named(mut self, name: impl Into<String>, value: Value) -> Self {
        self.named.insert(name.into(), value);
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn args(&self) -> &[FunctionArg] {
        &self.positional
    }

    /// Exact-arity check for batch reads.
    pub fn expect_len(&self, expected: usize) -> Result<(), RunError> {
        if self.positional.len() != expected {
            return Err(RunError::new(
                ReasonCode::FunctionCall,
                format!(
                    "{} arguments expected, but {} were passed",
                    expected,
                    self.positional.len()
                ),
            ));
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<&FunctionArg, RunError> {
        self.positional.get(index).ok_or_else(|| {
            RunError::new(
                ReasonCode::FunctionCall,
                format!(
                    "at least {} arguments expected, but {} were passed",
                    index + 1,
                    self.positional.len()
                ),
            )
        })
    }

    /// Positional argument as a native value.
    pub fn value(&self, index: usize) -> Result<&Value, RunError> {
        match self.get(index)? {
            FunctionArg::Value(Value::Null) => Err(RunError::new(
                ReasonCode::EmptyPositionalFunctionArgument,
                format!("argument {} must not be empty", index),
            )),
            FunctionArg::Value(value) => Ok(value),
            FunctionArg::Function(info) => Err(RunError::new(
                ReasonCode::HigherOrderFunctionNotSupported,
                format!(
                    "argument {} is a reference to function \"{}\" where a value was expected",
                    index, info.function_name
                ),
            )),
        }
    }

    /// Positional argument deserialized into a target type.
    pub fn value_as<T: DeserializeOwned>(&self, index: usize) -> Result<T, RunError> {
        let value = self.value(index)?;
        serde_json::from_value(value.clone()).map_err(|err| {
            RunError::new(
                ReasonCode::FunctionCall,
                format!("argument {} has an unexpected type: {}", index, err),
            )
        })
    }

    /// Positional argument as a partial function reference.
    pub fn function(&self, index: usize) -> Result<&FunctionInfo, RunError> {
        match self.get(index)? {
            FunctionArg::Function(info) => Ok(info),
            FunctionArg::Value(_) => Err(RunError::new(
                ReasonCode::FunctionCall,
                format!("argument {} must be a function reference", index),
            )),
        }
    }

    /// Named argument as a native value.
    pub fn named(&self, name: &str) -> Result<&Value, RunError> {
        match self.named.get(name) {
            Some(Value::Null) | None => Err(RunError::new(
                ReasonCode::EmptyNamedFunctionArgument,
                format!("named argument \"{}\" must not be empty", name),
            )),
            Some(value) => Ok(value),
        }
    }
}

/// Function-calling façade scoped to one `${…}` expression.
///
/// Owns the expression's call stack; every call pushes a frame so that depth
/// is enforced across nesting and failures can name the full chain.
pub struct ScopedFunctions {
    registry: Arc<dyn FunctionRegistry>,
    params: Arc<dyn BlueprintParams>,
    stack: CallStack,
}

impl ScopedFunctions {
    pub fn new(registry: Arc<dyn FunctionRegistry>, params: Arc<dyn BlueprintParams>) -> Self {
        Self {
            registry,
            params,
            stack: CallStack::new(),
        }
    }

    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    /// Invoke `function_name` with already-resolved arguments.
    pub fn call(
        &mut self,
        cancel: &CancelToken,
        function_name: &str,
        args: FunctionArgs,
        span: &SourceSpan,
    ) -> ResolveResult<FunctionOutput> {
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        if !self.registry.has_function(function_name) {
            return Err(RunError::new(
                ReasonCode::MissingFunction,
                format!("function \"{}\" is not provided by any loaded plugin", function_name),
            )
            .into());
        }

        self.stack.push(CallStackEntry {
            function_name: function_name.to_string(),
            span: span.clone(),
        })?;

        let result = self.registry.call(
            cancel,
            FunctionCallRequest {
                function_name,
                args: &args,
                call_stack: &self.stack,
                params: self.params.as_ref(),
            },
        );
        self.stack.pop();

        let output = result.map_err(|err| {
            RunError::from_port(
                ReasonCode::FunctionCall,
                format!("call to function \"{}\" failed", function_name),
                err,
            )
        })?;

        if output.is_empty() {
            return Err(RunError::new(
                ReasonCode::EmptyFunctionOutput,
                format!("function \"{}\" returned no output", function_name),
            )
            .into());
        }
        Ok(output)
    }
}
