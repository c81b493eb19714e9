//! Replays the bundled scenario files

use std::path::PathBuf;

use zeratul_delegation::{scenario, DelegationConfig, Scenario, ScenarioError};

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

#[test]
fn test_lifecycle_scenario() {
    let config = DelegationConfig::from_file(scenario_path("config.yaml")).unwrap();
    assert_eq!(config, DelegationConfig::default());

    let scenario = Scenario::from_file(scenario_path("lifecycle.yaml")).unwrap();
    let report = scenario::run(config, &scenario).unwrap();

    assert_eq!(report.expected_failures, 4);
    assert_eq!(report.epoch, 5);
    assert_eq!(report.delegations, 3);

    let alice = &report.holders[0];
    assert_eq!(alice.name, "alice");
    assert_eq!(alice.balance, 1_000);
    assert_eq!(alice.locked, 0);
    assert_eq!(alice.slashed, 0);

    let bob = &report.holders[1];
    assert_eq!(bob.delegated, 1_800);
    assert_eq!(bob.locked, 2_000);
    assert_eq!(bob.slashed, 200);

    assert_eq!(report.validators[0].delegated, 1_800);
    assert_eq!(report.validators[1].delegated, 0);
}

#[test]
fn test_failing_step_is_reported() {
    let scenario = Scenario::from_yaml_str(
        r#"
validators:
  - name: node-1
holders:
  - name: alice
    balance: 100
steps:
  - op: delegate
    holder: alice
    validator: node-1
    amount: 100
    period: 3
  - op: accept
    validator: alice
    delegation: 0
"#,
    )
    .unwrap();

    let err = scenario::run(DelegationConfig::default(), &scenario).unwrap_err();
    match err {
        ScenarioError::Step { step, source } => {
            assert_eq!(step, 1);
            assert!(source.to_string().contains("not a registered validator"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_unknown_validator_name() {
    let scenario = Scenario::from_yaml_str(
        r#"
steps:
  - op: slash
    validator: nobody
    amount: 1
"#,
    )
    .unwrap();

    assert!(matches!(
        scenario::run(DelegationConfig::default(), &scenario),
        Err(ScenarioError::UnknownValidator(name)) if name == "nobody"
    ));
}
