//! Individual substitution behaviors: reference families, deferral rules,
//! caches, cancellation and error classification.

use blueprint_resolve::core::{MappingNode, ScalarValue};
use blueprint_resolve::errors::{ReasonCode, ResolveError};
use blueprint_resolve::ports::{ChildState, ResourceState};
use blueprint_resolve::resolve::{ChildExportEntry, ResolveTarget};
use blueprint_resolve::subs::parse::parse_string;
use pretty_assertions::assert_eq;

use crate::fixtures::{EnvBuilder, blueprint, spec_definition};
use crate::run_reason;

#[test]
fn test_link_defers_while_staging_and_resolves_at_deployment() {
    let doc = blueprint(serde_json::json!({
        "resources": {
            "a": {"type": "test/base", "spec": {"name": "a"}},
            "b": {"type": "test/base", "spec": {"name": "b"}},
            "app": {
                "type": "test/app",
                "metadata": {
                    "custom": {"connection": "${link(resources.a, resources.b)}"}
                },
                "spec": {"name": "app"}
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_spec_definition("test/base", spec_definition(&[]))
        .with_spec_definition("test/app", spec_definition(&[]))
        .with_resource_state(
            "a",
            ResourceState {
                resource_id: "a-1".to_string(),
                name: "a".to_string(),
                spec_data: Some(serde_json::from_value(serde_json::json!({"name": "a"})).unwrap()),
            },
        )
        .with_resource_state(
            "b",
            ResourceState {
                resource_id: "b-1".to_string(),
                name: "b".to_string(),
                spec_data: Some(serde_json::from_value(serde_json::json!({"name": "b"})).unwrap()),
            },
        )
        .build();

    let staged = env
        .resolver
        .resolve_in_resource("app", &doc.resources["app"], &ResolveTarget::staging())
        .unwrap();
    assert_eq!(
        staged.resolve_on_deploy,
        vec!["resources.app.metadata.custom.connection".to_string()]
    );
    let custom = staged.value.metadata.as_ref().unwrap().custom.as_ref().unwrap();
    assert_eq!(
        custom.as_fields().unwrap()["connection"],
        MappingNode::Null
    );

    let deployed = env
        .resolver
        .resolve_in_resource(
            "app",
            &doc.resources["app"],
            &ResolveTarget::deployment().with_partial(staged.value),
        )
        .unwrap();
    assert!(deployed.is_complete());

    let custom = deployed.value.metadata.as_ref().unwrap().custom.as_ref().unwrap();
    let connection = custom.as_fields().unwrap()["connection"].as_fields().unwrap();
    assert_eq!(
        connection["from"].as_fields().unwrap()["resourceId"],
        MappingNode::str("a-1")
    );
    assert_eq!(
        connection["to"].as_fields().unwrap()["resourceId"],
        MappingNode::str("b-1")
    );
}

#[test]
fn test_child_export_cache_hit_skips_state_container() {
    // The state container has no entry for the child; resolution still
    // succeeds because the primed export cache answers first.
    let doc = blueprint(serde_json::json!({}));
    let mut env = EnvBuilder::new(doc).build();
    env.resolver.prime_child_export(
        "coreInfra",
        "region",
        ChildExportEntry {
            value: Some(MappingNode::str("eu-west-1")),
            removed: false,
            resolve_on_deploy: false,
        },
    );

    let value = parse_string("${children.coreInfra.region}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.region", "values.region", &ResolveTarget::staging())
        .unwrap();

    assert_eq!(output.value, MappingNode::str("eu-west-1"));
    assert!(output.is_complete());
}

#[test]
fn test_child_export_cache_miss_defers_while_staging() {
    let doc = blueprint(serde_json::json!({}));
    let mut env = EnvBuilder::new(doc).build();

    let value = parse_string("${children.coreInfra.region}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.region", "values.region", &ResolveTarget::staging())
        .unwrap();

    assert_eq!(output.value, MappingNode::Null);
    assert_eq!(output.resolve_on_deploy, vec!["values.region".to_string()]);
}

#[test]
fn test_child_export_reads_state_at_deployment() {
    let doc = blueprint(serde_json::json!({}));
    let mut env = EnvBuilder::new(doc)
        .with_child_state(
            "coreInfra",
            ChildState {
                exports: [(
                    "network".to_string(),
                    serde_json::from_value(serde_json::json!({"region": "eu-west-1"})).unwrap(),
                )]
                .into_iter()
                .collect(),
            },
        )
        .build();

    let value = parse_string("${children.coreInfra.network.region}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(
            &value,
            "values.region",
            "values.region",
            &ResolveTarget::deployment(),
        )
        .unwrap();
    assert_eq!(output.value, MappingNode::str("eu-west-1"));
}

#[test]
fn test_child_export_marked_resolve_on_deploy_defers() {
    let doc = blueprint(serde_json::json!({}));
    let mut env = EnvBuilder::new(doc).build();
    env.resolver.prime_child_export(
        "coreInfra",
        "region",
        ChildExportEntry {
            value: None,
            removed: false,
            resolve_on_deploy: true,
        },
    );

    let value = parse_string("${children.coreInfra.region}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.region", "values.region", &ResolveTarget::staging())
        .unwrap();
    assert_eq!(output.resolve_on_deploy, vec!["values.region".to_string()]);
}

#[test]
fn test_removed_child_export_is_a_hard_error() {
    let doc = blueprint(serde_json::json!({}));
    let mut env = EnvBuilder::new(doc).build();
    env.resolver.prime_child_export(
        "coreInfra",
        "region",
        ChildExportEntry {
            value: Some(MappingNode::str("eu-west-1")),
            removed: true,
            resolve_on_deploy: false,
        },
    );

    let value = parse_string("${children.coreInfra.region}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.region", "values.region", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(run_reason(&err), Some(ReasonCode::MissingChildExport));
}

#[test]
fn test_data_source_property_respects_alias_and_index() {
    let doc = blueprint(serde_json::json!({
        "datasources": {
            "network": {
                "type": "aws/vpc",
                "exports": {
                    "subnets": {"type": "array", "aliasFor": "subnetIds"},
                    "vpcId": {"type": "string"}
                }
            }
        }
    }));
    let mut env = EnvBuilder::new(doc)
        .with_data(
            "aws/vpc",
            vec![
                (
                    "subnetIds",
                    MappingNode::Items(vec![
                        MappingNode::str("subnet-1"),
                        MappingNode::str("subnet-2"),
                    ]),
                ),
                ("vpcId", MappingNode::str("vpc-1")),
            ],
        )
        .build();

    let value = parse_string("${datasources.network.subnets[1]}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.subnet", "values.subnet", &ResolveTarget::staging())
        .unwrap();
    assert_eq!(output.value, MappingNode::str("subnet-2"));

    // Second reference re-uses the fetched data.
    let value = parse_string("${datasources.network.vpcId}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.vpc", "values.vpc", &ResolveTarget::staging())
        .unwrap();
    assert_eq!(output.value, MappingNode::str("vpc-1"));
    assert_eq!(env.data_sources.fetches(), 1);
}

#[test]
fn test_data_source_property_error_classification() {
    let build = || {
        EnvBuilder::new(blueprint(serde_json::json!({
            "datasources": {
                "network": {
                    "type": "aws/vpc",
                    "exports": {
                        "subnetIds": {"type": "array"},
                        "vpcId": {"type": "string"}
                    }
                }
            }
        })))
        .with_data(
            "aws/vpc",
            vec![
                (
                    "subnetIds",
                    MappingNode::Items(vec![MappingNode::str("subnet-1")]),
                ),
                ("vpcId", MappingNode::str("vpc-1")),
            ],
        )
        .build()
    };

    // Unknown data source.
    let mut env = build();
    let value = parse_string("${datasources.missing.vpcId}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(run_reason(&err), Some(ReasonCode::MissingDataSource));

    // Unknown field.
    let mut env = build();
    let value = parse_string("${datasources.network.missingField}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(run_reason(&err), Some(ReasonCode::MissingDataSourceProp));

    // Indexing a non-array field.
    let mut env = build();
    let value = parse_string("${datasources.network.vpcId[0]}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(run_reason(&err), Some(ReasonCode::DataSourcePropNotArray));

    // Index out of bounds.
    let mut env = build();
    let value = parse_string("${datasources.network.subnetIds[5]}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(
        run_reason(&err),
        Some(ReasonCode::DataSourcePropArrayIndexOutOfBounds)
    );
}

#[test]
fn test_data_source_with_no_fields_is_empty_data() {
    let doc = blueprint(serde_json::json!({
        "datasources": {
            "network": {"type": "aws/vpc", "exports": {"vpcId": {"type": "string"}}}
        }
    }));
    let mut env = EnvBuilder::new(doc).with_data("aws/vpc", vec![]).build();

    let value = parse_string("${datasources.network.vpcId}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(run_reason(&err), Some(ReasonCode::EmptyDataSourceData));
}

#[test]
fn test_data_source_fetch_failure_propagates_as_port_error() {
    // No canned data for the type: the registry port fails the fetch.
    let doc = blueprint(serde_json::json!({
        "datasources": {
            "network": {"type": "aws/vpc", "exports": {"vpcId": {"type": "string"}}}
        }
    }));
    let mut env = EnvBuilder::new(doc).build();

    let value = parse_string("${datasources.network.vpcId}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    assert!(matches!(err, ResolveError::Port(_)));
    assert!(err.to_string().contains("values.v"));
}

#[test]
fn test_value_reference_with_path_walks_into_content() {
    let doc = blueprint(serde_json::json!({
        "values": {
            "networkConfig": {
                "value": {"subnets": ["subnet-1", "subnet-2"], "cidr": "10.0.0.0/16"}
            }
        }
    }));
    let mut env = EnvBuilder::new(doc).build();

    let value = parse_string("${values.networkConfig.subnets[0]}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.primary", "values.primary", &ResolveTarget::staging())
        .unwrap();
    assert_eq!(output.value, MappingNode::str("subnet-1"));

    let value = parse_string("${values.networkConfig.missing}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.primary", "values.primary", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(run_reason(&err), Some(ReasonCode::MissingValue));
}

#[test]
fn test_cyclic_value_references_are_detected() {
    let doc = blueprint(serde_json::json!({
        "values": {
            "a": {"value": "${values.b}"},
            "b": {"value": "${values.a}"}
        }
    }));
    let mut env = EnvBuilder::new(doc.clone()).build();

    let err = env
        .resolver
        .resolve_in_value("a", &doc.values["a"], &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(run_reason(&err), Some(ReasonCode::CircularValueReference));
}

#[test]
fn test_deferring_value_defers_the_referencing_location() {
    let doc = blueprint(serde_json::json!({
        "resources": {
            "base": {"type": "test/base", "spec": {"name": "base"}}
        },
        "values": {
            "baseArn": {"value": "${resources.base.spec.arn}"}
        }
    }));
    let mut env = EnvBuilder::new(doc)
        .with_spec_definition("test/base", spec_definition(&["spec.arn"]))
        .build();

    let value = parse_string("${values.baseArn}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "exports.arn", "exports.arn", &ResolveTarget::staging())
        .unwrap();

    assert_eq!(output.value, MappingNode::Null);
    // Both the value's own deferred path and the referencing location are
    // reported.
    assert!(output.resolve_on_deploy.contains(&"values.baseArn".to_string()));
    assert!(output.resolve_on_deploy.contains(&"exports.arn".to_string()));
}

#[test]
fn test_string_concatenation_requires_scalar_fragments() {
    let doc = blueprint(serde_json::json!({
        "variables": {
            "environment": {"type": "string"},
            "regions": {"type": "string"}
        }
    }));
    let mut env = EnvBuilder::new(doc)
        .with_variable("environment", ScalarValue::str("production"))
        .with_variable("regions", ScalarValue::str("[\"us-west-2\"]"))
        .build();

    let value = parse_string("orders-${variables.environment}-v2").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.name", "values.name", &ResolveTarget::staging())
        .unwrap();
    assert_eq!(output.value, MappingNode::str("orders-production-v2"));

    // An array fragment cannot take part in concatenation.
    let value = parse_string("prefix-${jsondecode(variables.regions)}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.name", "values.name", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(run_reason(&err), Some(ReasonCode::InvalidResolvedSubValue));
}

#[test]
fn test_missing_variable_is_a_hard_error_with_context() {
    let doc = blueprint(serde_json::json!({}));
    let mut env = EnvBuilder::new(doc).build();

    let value = parse_string("${variables.missing}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    match err {
        ResolveError::Run(run) => {
            assert_eq!(run.reason, ReasonCode::MissingVariable);
            assert_eq!(run.element.as_deref(), Some("values.v"));
            assert_eq!(run.path.as_deref(), Some("values.v"));
        }
        other => panic!("expected a run error, got {:?}", other),
    }
}

#[test]
fn test_reference_to_unresolved_resource_is_a_hard_error() {
    // The driver did not prime the referenced resource, violating the
    // ordering invariant.
    let doc = blueprint(serde_json::json!({
        "resources": {
            "base": {"type": "test/base", "spec": {"name": "base"}}
        }
    }));
    let mut env = EnvBuilder::new(doc)
        .with_spec_definition("test/base", spec_definition(&[]))
        .build();

    let value = parse_string("${resources.base.spec.name}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(run_reason(&err), Some(ReasonCode::ResourceNotResolved));
}

#[test]
fn test_primed_resource_spec_and_metadata_reads() {
    let doc = blueprint(serde_json::json!({
        "resources": {
            "base": {
                "type": "test/base",
                "metadata": {"labels": {"app": "orders"}},
                "spec": {"name": "base"}
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_spec_definition("test/base", spec_definition(&[]))
        .build();

    let staged = env
        .resolver
        .resolve_in_resource("base", &doc.resources["base"], &ResolveTarget::staging())
        .unwrap();
    env.resolver.prime_resource("base", staged.value);

    let value = parse_string("${resources.base.spec.name}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap();
    assert_eq!(output.value, MappingNode::str("base"));

    let value = parse_string("${resources.base.metadata.labels.app}").unwrap();
    let output = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap();
    assert_eq!(output.value, MappingNode::str("orders"));

    let value = parse_string("${resources.base.metadata.displayName}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(
        run_reason(&err),
        Some(ReasonCode::MissingResourceMetadataProperty)
    );
}

#[test]
fn test_mapping_node_depth_bound_is_enforced() {
    let mut nested = serde_json::json!("leaf");
    for _ in 0..24 {
        nested = serde_json::json!([nested]);
    }
    let node: MappingNode = serde_json::from_value(nested).unwrap();

    let doc = blueprint(serde_json::json!({}));
    let mut env = EnvBuilder::new(doc).build();
    let err = env
        .resolver
        .resolve_in_mapping_node("metadata", &node, &ResolveTarget::staging())
        .unwrap_err();
    assert_eq!(run_reason(&err), Some(ReasonCode::MaxTraverseDepthExceeded));
}

#[test]
fn test_cancellation_aborts_resolution() {
    let doc = blueprint(serde_json::json!({
        "variables": {"environment": {"type": "string"}}
    }));
    let mut env = EnvBuilder::new(doc)
        .with_variable("environment", ScalarValue::str("production"))
        .build();
    env.cancel.cancel();

    let value = parse_string("${variables.environment}").unwrap();
    let err = env
        .resolver
        .resolve_substitution(&value, "values.v", "values.v", &ResolveTarget::staging())
        .unwrap_err();
    assert!(matches!(err, ResolveError::Cancelled));
}
