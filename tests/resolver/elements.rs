//! Element-level resolution: values, resources, data sources, includes and
//! exports, partial re-resolution and deferral collection.

use std::collections::HashMap;

use blueprint_resolve::core::{MappingNode, ScalarValue};
use blueprint_resolve::ports::ResourceState;
use blueprint_resolve::resolve::ResolveTarget;
use blueprint_resolve::schema::resolved::ResolvedResourceMetadata;
use pretty_assertions::assert_eq;

use crate::fixtures::{EnvBuilder, blueprint, spec_definition};

#[test]
fn test_value_resolves_variable_substitution() {
    let doc = blueprint(serde_json::json!({
        "variables": {"environment": {"type": "string"}},
        "values": {"env": {"type": "string", "value": "${variables.environment}"}}
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_variable("environment", ScalarValue::str("production"))
        .build();

    let output = env
        .resolver
        .resolve_in_value("env", &doc.values["env"], &ResolveTarget::staging())
        .unwrap();

    assert_eq!(output.value.value, Some(MappingNode::str("production")));
    assert_eq!(output.resolve_on_deploy, Vec::<String>::new());
}

#[test]
fn test_value_uses_declared_default_when_param_missing() {
    let doc = blueprint(serde_json::json!({
        "variables": {"environment": {"type": "string", "default": "staging"}},
        "values": {"env": {"value": "${variables.environment}"}}
    }));
    let mut env = EnvBuilder::new(doc.clone()).build();

    let output = env
        .resolver
        .resolve_in_value("env", &doc.values["env"], &ResolveTarget::staging())
        .unwrap();
    assert_eq!(output.value.value, Some(MappingNode::str("staging")));
}

#[test]
fn test_export_defers_computed_spec_property_while_staging() {
    let doc = blueprint(serde_json::json!({
        "resources": {
            "ordersTable": {"type": "aws/dynamodb/table", "spec": {"tableName": "orders"}}
        },
        "exports": {
            "tableArn": {
                "type": "string",
                "field": "${resources.ordersTable.spec.arn}",
                "description": "ARN of the orders table"
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_spec_definition("aws/dynamodb/table", spec_definition(&["spec.arn"]))
        .build();

    let output = env
        .resolver
        .resolve_in_export(
            "tableArn",
            &doc.exports["tableArn"],
            &ResolveTarget::staging(),
        )
        .unwrap();

    assert_eq!(
        output.value.description,
        Some(MappingNode::str("ARN of the orders table"))
    );
    assert_eq!(output.value.field, None);
    assert_eq!(output.resolve_on_deploy, vec!["exports.tableArn".to_string()]);
}

#[test]
fn test_export_resolves_computed_property_from_state_at_deployment() {
    let doc = blueprint(serde_json::json!({
        "resources": {
            "ordersTable": {"type": "aws/dynamodb/table", "spec": {"tableName": "orders"}}
        },
        "exports": {
            "tableArn": {"type": "string", "field": "${resources.ordersTable.spec.arn}"}
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_spec_definition("aws/dynamodb/table", spec_definition(&["spec.arn"]))
        .with_resource_state(
            "ordersTable",
            ResourceState {
                resource_id: "table-1".to_string(),
                name: "ordersTable".to_string(),
                spec_data: Some(
                    serde_json::from_value(serde_json::json!({
                        "tableName": "orders",
                        "arn": "arn:aws:dynamodb:us-west-2:123456789012:table/orders"
                    }))
                    .unwrap(),
                ),
            },
        )
        .build();

    // Re-drive resolution at deployment with the staging output as the
    // partial result.
    let staged = env
        .resolver
        .resolve_in_export(
            "tableArn",
            &doc.exports["tableArn"],
            &ResolveTarget::staging(),
        )
        .unwrap();
    let output = env
        .resolver
        .resolve_in_export(
            "tableArn",
            &doc.exports["tableArn"],
            &ResolveTarget::deployment().with_partial(staged.value),
        )
        .unwrap();

    assert_eq!(
        output.value.field,
        Some(MappingNode::str(
            "arn:aws:dynamodb:us-west-2:123456789012:table/orders"
        ))
    );
    assert_eq!(output.resolve_on_deploy, Vec::<String>::new());
}

#[test]
fn test_resource_resolution_is_idempotent_with_partial() {
    let doc = blueprint(serde_json::json!({
        "variables": {"environment": {"type": "string"}},
        "resources": {
            "ordersTable": {
                "type": "aws/dynamodb/table",
                "description": "Orders for ${variables.environment}",
                "metadata": {
                    "displayName": "Orders (${variables.environment})",
                    "labels": {"app": "orders"}
                },
                "spec": {"tableName": "orders-${variables.environment}"}
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_variable("environment", ScalarValue::str("production"))
        .build();
    let schema = &doc.resources["ordersTable"];

    let first = env
        .resolver
        .resolve_in_resource("ordersTable", schema, &ResolveTarget::staging())
        .unwrap();
    assert!(first.is_complete());

    let second = env
        .resolver
        .resolve_in_resource(
            "ordersTable",
            schema,
            &ResolveTarget::staging().with_partial(first.value.clone()),
        )
        .unwrap();

    assert_eq!(second.value, first.value);
    assert!(second.is_complete());

    let spec_fields = second.value.spec.as_ref().unwrap().as_fields().unwrap();
    assert_eq!(spec_fields["tableName"], MappingNode::str("orders-production"));
    assert_eq!(
        second.value.metadata.as_ref().unwrap().labels["app"],
        "orders".to_string()
    );
}

#[test]
fn test_resource_collects_deferrals_and_keeps_resolving_siblings() {
    let doc = blueprint(serde_json::json!({
        "variables": {"environment": {"type": "string"}},
        "resources": {
            "base": {"type": "test/base", "spec": {"name": "base"}},
            "app": {
                "type": "test/app",
                "spec": {
                    "stage": "${variables.environment}",
                    "baseArn": "${resources.base.spec.arn}",
                    "limits": {"read": 5}
                }
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_variable("environment", ScalarValue::str("production"))
        .with_spec_definition("test/base", spec_definition(&["spec.arn"]))
        .with_spec_definition("test/app", spec_definition(&[]))
        .build();

    let output = env
        .resolver
        .resolve_in_resource("app", &doc.resources["app"], &ResolveTarget::staging())
        .unwrap();

    let spec_fields = output.value.spec.as_ref().unwrap().as_fields().unwrap();
    // Siblings of the deferred slot are resolved; the deferred slot is null
    // and listed in resolve_on_deploy.
    assert_eq!(spec_fields["stage"], MappingNode::str("production"));
    assert_eq!(spec_fields["baseArn"], MappingNode::Null);
    assert_eq!(
        spec_fields["limits"].as_fields().unwrap()["read"],
        MappingNode::int(5)
    );
    assert_eq!(
        output.resolve_on_deploy,
        vec!["resources.app.spec.baseArn".to_string()]
    );
}

#[test]
fn test_annotation_partial_merge_prefers_partial_entries() {
    let doc = blueprint(serde_json::json!({
        "variables": {"y": {"type": "string"}},
        "resources": {
            "app": {
                "type": "test/app",
                "metadata": {
                    "annotations": {
                        "a": "${variables.x}",
                        "b": "${variables.y}"
                    }
                },
                "spec": {"name": "app"}
            }
        }
    }));
    // `x` is not supplied: resolving annotation `a` would fail, proving the
    // partial entry short-circuits re-evaluation.
    let mut env = EnvBuilder::new(doc.clone())
        .with_variable("y", ScalarValue::str("resolved-b"))
        .with_spec_definition("test/app", spec_definition(&[]))
        .build();

    let partial_metadata = ResolvedResourceMetadata {
        annotations: HashMap::from([(
            "a".to_string(),
            Some(MappingNode::str("resolved-a")),
        )]),
        ..Default::default()
    };
    let partial = blueprint_resolve::schema::resolved::ResolvedResource {
        resource_type: "test/app".to_string(),
        metadata: Some(partial_metadata),
        ..Default::default()
    };

    let output = env
        .resolver
        .resolve_in_resource(
            "app",
            &doc.resources["app"],
            &ResolveTarget::staging().with_partial(partial),
        )
        .unwrap();

    let annotations = &output.value.metadata.as_ref().unwrap().annotations;
    assert_eq!(annotations["a"], Some(MappingNode::str("resolved-a")));
    assert_eq!(annotations["b"], Some(MappingNode::str("resolved-b")));
    assert!(output.is_complete());
}

#[test]
fn test_annotation_deferral_keeps_partial_and_records_path() {
    let doc = blueprint(serde_json::json!({
        "resources": {
            "base": {"type": "test/base", "spec": {"name": "base"}},
            "app": {
                "type": "test/app",
                "metadata": {
                    "annotations": {
                        "a": "${variables.x}",
                        "b": "${resources.base.spec.arn}"
                    }
                },
                "spec": {"name": "app"}
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_spec_definition("test/base", spec_definition(&["spec.arn"]))
        .with_spec_definition("test/app", spec_definition(&[]))
        .build();

    let partial = blueprint_resolve::schema::resolved::ResolvedResource {
        resource_type: "test/app".to_string(),
        metadata: Some(ResolvedResourceMetadata {
            annotations: HashMap::from([(
                "a".to_string(),
                Some(MappingNode::str("resolved-a")),
            )]),
            ..Default::default()
        }),
        ..Default::default()
    };

    let output = env
        .resolver
        .resolve_in_resource(
            "app",
            &doc.resources["app"],
            &ResolveTarget::staging().with_partial(partial),
        )
        .unwrap();

    let annotations = &output.value.metadata.as_ref().unwrap().annotations;
    assert_eq!(annotations["a"], Some(MappingNode::str("resolved-a")));
    assert_eq!(annotations["b"], None);
    assert_eq!(
        output.resolve_on_deploy,
        vec!["resources.app.metadata.annotations.b".to_string()]
    );
}

#[test]
fn test_condition_is_all_or_nothing() {
    let doc = blueprint(serde_json::json!({
        "variables": {"environment": {"type": "string"}},
        "resources": {
            "base": {"type": "test/base", "spec": {"name": "base"}},
            "app": {
                "type": "test/app",
                "condition": {
                    "and": [
                        {"stringValue": "${eq(variables.environment, \"production\")}"},
                        {"stringValue": "${eq(resources.base.spec.arn, \"x\")}"}
                    ]
                },
                "spec": {"name": "app"}
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_variable("environment", ScalarValue::str("production"))
        .with_spec_definition("test/base", spec_definition(&["spec.arn"]))
        .with_spec_definition("test/app", spec_definition(&[]))
        .build();

    let output = env
        .resolver
        .resolve_in_resource("app", &doc.resources["app"], &ResolveTarget::staging())
        .unwrap();

    // One branch defers on the computed property, so the whole condition is
    // dropped and deferred under the condition path.
    assert_eq!(output.value.condition, None);
    assert_eq!(
        output.resolve_on_deploy,
        vec!["resources.app.condition".to_string()]
    );
}

#[test]
fn test_condition_resolves_fully_when_all_branches_do() {
    let doc = blueprint(serde_json::json!({
        "variables": {"environment": {"type": "string"}},
        "resources": {
            "app": {
                "type": "test/app",
                "condition": {
                    "not": {"stringValue": "${eq(variables.environment, \"dev\")}"}
                },
                "spec": {"name": "app"}
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_variable("environment", ScalarValue::str("production"))
        .with_spec_definition("test/app", spec_definition(&[]))
        .build();

    let output = env
        .resolver
        .resolve_in_resource("app", &doc.resources["app"], &ResolveTarget::staging())
        .unwrap();

    assert!(output.is_complete());
    let condition = output.value.condition.unwrap();
    assert_eq!(
        condition.not.unwrap().string_value,
        Some(MappingNode::bool(false))
    );
}

#[test]
fn test_include_resolves_path_variables_and_metadata() {
    let doc = blueprint(serde_json::json!({
        "variables": {"environment": {"type": "string"}},
        "include": {
            "coreInfra": {
                "path": "blueprints/core-${variables.environment}.json",
                "variables": {"region": "${variables.environment}"},
                "metadata": {"sourceType": "local"},
                "description": "Core infrastructure"
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_variable("environment", ScalarValue::str("production"))
        .build();

    let output = env
        .resolver
        .resolve_in_include(
            "coreInfra",
            &doc.include["coreInfra"],
            &ResolveTarget::staging(),
        )
        .unwrap();

    assert_eq!(
        output.value.path,
        Some(MappingNode::str("blueprints/core-production.json"))
    );
    let variables = output.value.variables.as_ref().unwrap().as_fields().unwrap();
    assert_eq!(variables["region"], MappingNode::str("production"));
    assert_eq!(
        output.value.metadata.as_ref().unwrap().as_fields().unwrap()["sourceType"],
        MappingNode::str("local")
    );
    assert!(output.is_complete());
}

#[test]
fn test_data_source_filter_and_metadata_resolution() {
    let doc = blueprint(serde_json::json!({
        "variables": {"environment": {"type": "string"}},
        "datasources": {
            "network": {
                "type": "aws/vpc",
                "metadata": {"displayName": "Network (${variables.environment})"},
                "filter": {
                    "field": "tags.env",
                    "operator": "=",
                    "search": ["${variables.environment}"]
                },
                "exports": {"vpcId": {"type": "string"}}
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_variable("environment", ScalarValue::str("production"))
        .build();

    let output = env
        .resolver
        .resolve_in_data_source(
            "network",
            &doc.data_sources["network"],
            &ResolveTarget::staging(),
        )
        .unwrap();

    let filter = output.value.filter.as_ref().unwrap();
    assert_eq!(filter.field, "tags.env");
    assert_eq!(filter.search, vec![MappingNode::str("production")]);
    assert_eq!(
        output.value.metadata.as_ref().unwrap().display_name,
        Some(MappingNode::str("Network (production)"))
    );
    assert!(output.is_complete());
}

#[test]
fn test_resolve_in_mapping_node_for_blueprint_metadata() {
    let doc = blueprint(serde_json::json!({
        "variables": {"environment": {"type": "string"}},
        "metadata": {
            "build": "orders-${variables.environment}",
            "pipeline": {"stages": ["plan", "deploy"]}
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_variable("environment", ScalarValue::str("production"))
        .build();

    let metadata = doc.metadata.as_ref().unwrap();
    let output = env
        .resolver
        .resolve_in_mapping_node("metadata", metadata, &ResolveTarget::staging())
        .unwrap();

    let fields = output.value.as_fields().unwrap();
    assert_eq!(fields["build"], MappingNode::str("orders-production"));
    assert_eq!(
        fields["pipeline"].as_fields().unwrap()["stages"],
        MappingNode::Items(vec![MappingNode::str("plan"), MappingNode::str("deploy")])
    );
}

#[test]
fn test_value_cache_prevents_repeated_evaluation() {
    let doc = blueprint(serde_json::json!({
        "values": {
            "subnet": {"value": "${datasources.network.subnetIds[0]}"}
        },
        "datasources": {
            "network": {"type": "aws/vpc", "exports": {"subnetIds": {"type": "array"}}}
        },
        "resources": {
            "app": {
                "type": "test/app",
                "spec": {
                    "primary": "${values.subnet}",
                    "secondary": "${values.subnet}"
                }
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_spec_definition("test/app", spec_definition(&[]))
        .with_data(
            "aws/vpc",
            vec![(
                "subnetIds",
                MappingNode::Items(vec![
                    MappingNode::str("subnet-1"),
                    MappingNode::str("subnet-2"),
                ]),
            )],
        )
        .build();

    let output = env
        .resolver
        .resolve_in_resource("app", &doc.resources["app"], &ResolveTarget::staging())
        .unwrap();

    let spec_fields = output.value.spec.as_ref().unwrap().as_fields().unwrap();
    assert_eq!(spec_fields["primary"], MappingNode::str("subnet-1"));
    assert_eq!(spec_fields["secondary"], MappingNode::str("subnet-1"));
    assert_eq!(env.data_sources.fetches(), 1);
}

#[test]
fn test_staging_then_deployment_resolves_remaining_slots_only() {
    let doc = blueprint(serde_json::json!({
        "variables": {"environment": {"type": "string"}},
        "resources": {
            "base": {"type": "test/base", "spec": {"name": "base"}},
            "app": {
                "type": "test/app",
                "spec": {
                    "stage": "${variables.environment}",
                    "baseArn": "${resources.base.spec.arn}"
                }
            }
        }
    }));
    let mut env = EnvBuilder::new(doc.clone())
        .with_variable("environment", ScalarValue::str("production"))
        .with_spec_definition("test/base", spec_definition(&["spec.arn"]))
        .with_spec_definition("test/app", spec_definition(&[]))
        .with_resource_state(
            "base",
            ResourceState {
                resource_id: "base-1".to_string(),
                name: "base".to_string(),
                spec_data: Some(
                    serde_json::from_value(
                        serde_json::json!({"name": "base", "arn": "arn:test:base"}),
                    )
                    .unwrap(),
                ),
            },
        )
        .build();

    let staged = env
        .resolver
        .resolve_in_resource("app", &doc.resources["app"], &ResolveTarget::staging())
        .unwrap();
    assert_eq!(
        staged.resolve_on_deploy,
        vec!["resources.app.spec.baseArn".to_string()]
    );

    let deployed = env
        .resolver
        .resolve_in_resource(
            "app",
            &doc.resources["app"],
            &ResolveTarget::deployment().with_partial(staged.value),
        )
        .unwrap();

    let spec_fields = deployed.value.spec.as_ref().unwrap().as_fields().unwrap();
    assert_eq!(spec_fields["stage"], MappingNode::str("production"));
    assert_eq!(spec_fields["baseArn"], MappingNode::str("arn:test:base"));
    assert!(deployed.is_complete());
}
