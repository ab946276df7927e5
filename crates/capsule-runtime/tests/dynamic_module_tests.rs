//! End-to-end tests: load a module from a packaged artifact and drive it

mod common;

use capsule_api::testing::{CollectingListener, LifecycleProbe};
use capsule_api::{ParameterMap, Value};
use capsule_runtime::{
    launch, ArtifactLoader, ConfigFormat, DynamicModule, HostConfig, RetryingDynamicModule,
    RuntimeError,
};
use common::{echo_catalog, vault_catalog, zip_artifact, ECHO_ENTRIES, VAULT_ENTRIES};
use std::sync::Arc;
use std::time::Duration;

fn load_echo(dir: &std::path::Path, probe: LifecycleProbe, failures: usize) -> capsule_runtime::Module {
    let artifact = zip_artifact(dir, "echo-module.zip", &ECHO_ENTRIES);
    ArtifactLoader::new(echo_catalog(probe, failures))
        .load(&[artifact])
        .unwrap()
}

#[tokio::test]
async fn test_echo_uses_default_greeting() {
    let dir = tempfile::tempdir().unwrap();
    let module = load_echo(dir.path(), LifecycleProbe::new(), 0);
    assert_eq!(module.name(), "echo");

    let dynamic = DynamicModule::new(module, ParameterMap::new(), DynamicModule::DEFAULT_RETRY_MAX)
        .await
        .unwrap();
    let first = dynamic.invoke("echo", ParameterMap::new()).await.unwrap();
    let second = dynamic.invoke("echo", ParameterMap::new()).await.unwrap();

    assert_eq!(first, Value::from("hi"));
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_echo_uses_override() {
    let dir = tempfile::tempdir().unwrap();
    let module = load_echo(dir.path(), LifecycleProbe::new(), 0);

    let mut overrides = ParameterMap::new();
    overrides.insert("greeting".into(), Value::from("bye"));
    let dynamic = DynamicModule::new(module, overrides, 5).await.unwrap();

    assert_eq!(
        dynamic.invoke("echo", ParameterMap::new()).await.unwrap(),
        Value::from("bye")
    );
}

#[tokio::test]
async fn test_invoker_starts_once() {
    let dir = tempfile::tempdir().unwrap();
    let probe = LifecycleProbe::new();
    let module = load_echo(dir.path(), probe.clone(), 0);
    let dynamic = DynamicModule::new(module, ParameterMap::new(), 5).await.unwrap();

    for _ in 0..5 {
        dynamic.invoke("echo", ParameterMap::new()).await.unwrap();
    }
    assert_eq!(probe.initialise_count(), 1);
    assert_eq!(probe.start_count(), 1);

    dynamic.dispose().await.unwrap();
    assert_eq!(probe.stop_count(), 1);
    assert_eq!(probe.dispose_count(), 1);
}

#[tokio::test]
async fn test_missing_required_parameter() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = zip_artifact(dir.path(), "vault-connector.zip", &VAULT_ENTRIES);
    let module = ArtifactLoader::new(vault_catalog()).load(&[artifact]).unwrap();

    let err = DynamicModule::new(module, ParameterMap::new(), 5)
        .await
        .unwrap_err();
    match err {
        RuntimeError::MissingParameter(names) => assert_eq!(names, vec!["apiKey".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_connection_manager_receives_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = zip_artifact(dir.path(), "vault-connector.zip", &VAULT_ENTRIES);
    let module = ArtifactLoader::new(vault_catalog()).load(&[artifact]).unwrap();
    module.set_username("svc-capsule").await.unwrap();

    let mut overrides = ParameterMap::new();
    overrides.insert("apiKey".into(), Value::from("s3cret"));
    let dynamic = DynamicModule::new(module, overrides, 5).await.unwrap();

    assert_eq!(
        dynamic.module().module_object().get("apiKey").await.unwrap(),
        Value::from("s3cret")
    );
    assert_eq!(
        dynamic.invoke("whoami", ParameterMap::new()).await.unwrap(),
        Value::from("svc-capsule")
    );
}

#[tokio::test]
async fn test_subscription_delivers_events() {
    let dir = tempfile::tempdir().unwrap();
    let probe = LifecycleProbe::new();
    let module = load_echo(dir.path(), probe.clone(), 0);
    let dynamic = DynamicModule::new(module, ParameterMap::new(), 5).await.unwrap();

    let listener = CollectingListener::new();
    let sink = listener.clone();
    dynamic
        .subscribe(
            "ticks",
            ParameterMap::new(),
            Arc::new(move |payload: Value| sink.record(payload)),
        )
        .await
        .unwrap();

    assert!(listener.wait_for(3, Duration::from_secs(2)).await);
    assert_eq!(
        listener.payloads(),
        vec![Value::Int(1), Value::Int(2), Value::Int(3)]
    );

    let err = dynamic
        .subscribe("ticks", ParameterMap::new(), Arc::new(|_: Value| {}))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Conflict(_)));

    dynamic.unsubscribe("ticks").await.unwrap();
    dynamic.dispose().await.unwrap();
    assert_eq!(probe.stop_count(), 1);
}

#[tokio::test]
async fn test_unsubscribe_without_subscribe() {
    let dir = tempfile::tempdir().unwrap();
    let module = load_echo(dir.path(), LifecycleProbe::new(), 0);
    let dynamic = DynamicModule::new(module, ParameterMap::new(), 5).await.unwrap();

    let err = dynamic.unsubscribe("ticks").await.unwrap_err();
    assert!(matches!(err, RuntimeError::NotSubscribed(_)));

    let err = dynamic.unsubscribe("nothing").await.unwrap_err();
    assert!(matches!(err, RuntimeError::NotFound { kind: "Source", .. }));
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_when_budget_exceeds_failures() {
    let dir = tempfile::tempdir().unwrap();
    let module = load_echo(dir.path(), LifecycleProbe::new(), 2);
    let dynamic = RetryingDynamicModule::with_simple_policy(
        module,
        ParameterMap::new(),
        3,
        Duration::from_millis(50),
    )
    .await
    .unwrap();

    assert_eq!(
        dynamic.invoke("flaky", ParameterMap::new()).await.unwrap(),
        Value::from("done")
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_raises_last_failure_when_budget_is_spent() {
    let dir = tempfile::tempdir().unwrap();
    let module = load_echo(dir.path(), LifecycleProbe::new(), 3);
    let dynamic = RetryingDynamicModule::with_simple_policy(
        module,
        ParameterMap::new(),
        3,
        Duration::from_millis(50),
    )
    .await
    .unwrap();

    let err = dynamic.invoke("flaky", ParameterMap::new()).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Invocation { ref operation, .. } if operation == "flaky"));
    assert!(err.to_string().contains("attempt 3"));
}

#[tokio::test]
async fn test_launch_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = zip_artifact(dir.path(), "echo-module.zip", &ECHO_ENTRIES);
    let yaml = format!(
        "artifacts:\n  - {}\nretry_max: 2\nretry:\n  policy: simple\n  frequency: 10ms\nparameters:\n  greeting: hello\n",
        artifact.display()
    );
    let config = HostConfig::parse(&yaml, ConfigFormat::Yaml).unwrap();

    let dynamic = launch(echo_catalog(LifecycleProbe::new(), 0), &config)
        .await
        .unwrap();
    assert_eq!(dynamic.inner().retry_max(), 2);
    assert_eq!(
        dynamic.invoke("echo", ParameterMap::new()).await.unwrap(),
        Value::from("hello")
    );
    dynamic.dispose().await.unwrap();
}
