//! Function call protocol: nesting, higher-order partials and failure
//! classification.

use blueprint_resolve::core::{MappingNode, ScalarValue};
use blueprint_resolve::errors::ReasonCode;
use blueprint_resolve::resolve::ResolveTarget;
use blueprint_resolve::subs::parse::parse_string;
use pretty_assertions::assert_eq;

use crate::fixtures::{EnvBuilder, blueprint};
use crate::run_reason;

fn env_with_regions() -> crate::fixtures::TestEnv {
    EnvBuilder::new(blueprint(serde_json::json!({
        "variables": {"regions": {"type": "string"}}
    })))
    .with_variable("regions", ScalarValue::str("[\" us-west-2 \",\"eu-west-1\"]"))
    .build()
}

#[test]
fn test_nested_function_calls_feed_outer_arguments() {
    let mut env = env_with_regions();
    let value = parse_string("${trim(jsondecode(\"\\\" padded \\\"\"))}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap();
    assert_eq!(output.value, MappingNode::str("padded"));
}

#[test]
fn test_higher_order_function_argument() {
    let mut env = env_with_regions();
    // `to_upper()` with no arguments yields a partial consumed by `map`.
    let value = parse_string("${map(jsondecode(variables.regions), to_upper())}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap();
    assert_eq!(
        output.value,
        MappingNode::Items(vec![
            MappingNode::str(" US-WEST-2 "),
            MappingNode::str("EU-WEST-1"),
        ])
    );
}

#[test]
fn test_partial_function_in_value_position_is_rejected() {
    let mut env = env_with_regions();
    let value = parse_string("${to_upper()}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(
        run_reason(&err),
        Some(ReasonCode::HigherOrderFunctionNotSupported)
    );
}

#[test]
fn test_missing_function() {
    let mut env = env_with_regions();
    let value = parse_string("${definitely_not_registered()}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(run_reason(&err), Some(ReasonCode::MissingFunction));
}

#[test]
fn test_function_arity_failure_is_a_function_call_error() {
    let mut env = env_with_regions();
    let value = parse_string("${eq(\"only-one\")}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    match &err {
        blueprint_resolve::errors::ResolveError::Run(run) => {
            assert_eq!(run.reason, ReasonCode::FunctionCall);
            assert!(run.to_string().contains("2 arguments expected, but 1 were passed"));
        }
        other => panic!("expected a run error, got {:?}", other),
    }
}

#[test]
fn test_function_literals_as_arguments() {
    let mut env = env_with_regions();
    let value = parse_string("${eq(2, 2)}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap();
    assert_eq!(output.value, MappingNode::bool(true));
}
