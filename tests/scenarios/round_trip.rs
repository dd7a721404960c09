//! Test: the demo document parses, validates, lints clean and re-emits losslessly

use crate::helpers::*;
use drover::core::config::{EnvValue, Port, SettingValue};
use drover::core::lint::{lint, LintOptions};
use drover::DocumentConfig;

#[test]
fn test_parse_emit_parse_is_lossless() {
    let document = DocumentConfig::from_yaml(GAME_DOCUMENT).unwrap();
    let emitted = document.to_yaml().unwrap();
    let reparsed = DocumentConfig::from_yaml(&emitted).unwrap();

    assert_eq!(document, reparsed);
    assert_eq!(emitted, reparsed.to_yaml().unwrap());
}

#[test]
fn test_declared_fields_survive_round_trip() {
    let emitted = DocumentConfig::from_yaml(GAME_DOCUMENT)
        .unwrap()
        .to_yaml()
        .unwrap();
    let document = DocumentConfig::from_yaml(&emitted).unwrap();

    let test = document.pipeline("test").unwrap();
    assert_eq!(test.pipeline_type.as_deref(), Some("docker"));
    assert_eq!(
        test.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        vec!["client-unit-tests", "backend-unit-tests", "end-to-end-tests", "notify"]
    );
    assert_eq!(test.services[0].image, "postgres:12");
    assert_eq!(test.services[0].ports, vec![Port::Number(5432)]);
    assert_eq!(
        test.volume("dockersock")
            .and_then(|v| v.host.as_ref())
            .map(|h| h.path.as_str()),
        Some("/var/run/docker.sock")
    );

    let backend = test.step("backend-unit-tests").unwrap();
    assert_eq!(
        backend.environment["SECRET_KEY"].secret(),
        Some("django_secret_key")
    );
    assert!(matches!(backend.environment["DATABASE_PORT"], EnvValue::Number(_)));

    let e2e = test.step("end-to-end-tests").unwrap();
    assert_eq!(e2e.volumes[0].name, "dockersock");
    assert_eq!(e2e.volumes[0].path, "/var/run/docker.sock");

    let notify = test.step("notify").unwrap();
    let settings = notify.settings.as_ref().unwrap();
    assert!(matches!(settings["token"], SettingValue::Secret(_)));
    assert_eq!(
        notify.when.status.as_ref().unwrap().include(),
        vec!["success", "failure"]
    );

    let deploy = document.pipeline("deploy").unwrap();
    assert_eq!(deploy.depends_on, vec!["test"]);
    assert_eq!(deploy.trigger.branch.as_ref().unwrap().include(), vec!["master"]);
    assert_eq!(deploy.trigger.event.as_ref().unwrap().include(), vec!["push"]);
    assert_eq!(deploy.trigger.status.as_ref().unwrap().include(), vec!["success"]);
}

#[test]
fn test_demo_document_lints_clean() {
    let document = DocumentConfig::from_yaml(GAME_DOCUMENT).unwrap();
    let findings = lint(&document, &LintOptions::default());
    assert!(findings.is_empty(), "{:?}", findings);

    // A different release branch flags the deploy gate
    let options = LintOptions {
        release_branch: "main".to_string(),
    };
    let findings = lint(&document, &options);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].pipeline, "deploy");
}

#[test]
fn test_undeclared_volume_is_rejected() {
    let broken = GAME_DOCUMENT.replace("- name: dockersock\n        path:", "- name: docker\n        path:");
    let err = DocumentConfig::from_yaml(&broken).unwrap_err();
    assert!(format!("{:#}", err).contains("docker"));
}
