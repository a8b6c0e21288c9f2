//! Integration tests for the deployment lifecycle: create, update,
//! replace, failure reporting and the info/remove/invoke operations.

mod common;

use common::fixtures::{live_function, upload_env, DeclarationBuilder, REGION};
use common::TestDeployer;
use severe_deploy::{
    DeployError, FunctionAction, MemoryPlatform, Phase, PhaseKind, PlatformError,
};

const ENTRY: &str = "export const handler = async () => ({ statusCode: 200 });\n";

fn position(calls: &[String], call: &str) -> usize {
    calls
        .iter()
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("{call} not in {calls:?}"))
}

#[tokio::test]
async fn first_deploy_creates_function() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    let decl = DeclarationBuilder::new("mailer")
        .with_env("API_TOKEN", "token")
        .timeout(30)
        .build();

    let report = t.deployer.deploy(&decl).await.unwrap();

    assert_eq!(report.action, FunctionAction::Create);
    assert_eq!(report.function_arn, MemoryPlatform::function_arn(REGION, "mailer"));
    assert_eq!(report.artifact_key, "mailer.zip");
    assert!(report.rules.is_empty());
    assert!(report.destination_queue_url.is_none());
    assert!(report.source_mapping.is_none());

    let live = t.platform.function("mailer").unwrap();
    assert_eq!(live.runtime.as_deref(), Some("nodejs18.x"));
    assert_eq!(live.handler.as_deref(), Some("lambda/handler.handler"));
    assert_eq!(live.timeout, Some(30));
    assert_eq!(live.environment.get("API_TOKEN").map(String::as_str), Some("token"));

    let code = t.platform.function_code("mailer").unwrap();
    assert_eq!(code.bucket, "artifacts");
    assert_eq!(code.key, "mailer.zip");
    assert!(t.platform.object("mailer.zip").is_some());
}

#[tokio::test]
async fn phases_run_in_order() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    let decl = DeclarationBuilder::new("mailer").build();

    t.deployer.deploy(&decl).await.unwrap();

    let started: Vec<Phase> = t
        .progress
        .events()
        .into_iter()
        .filter(|e| e.kind == PhaseKind::Start)
        .map(|e| e.phase)
        .collect();
    assert_eq!(
        started,
        vec![
            Phase::Validate,
            Phase::FunctionCheck,
            Phase::Teardown,
            Phase::Build,
            Phase::Upload,
            Phase::FunctionApply,
            Phase::Triggers,
        ]
    );
    assert!(t
        .progress
        .events()
        .iter()
        .all(|e| e.function == "mailer" && !matches!(e.kind, PhaseKind::Error(_))));
}

#[tokio::test]
async fn redeploy_updates_in_place() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    let decl = DeclarationBuilder::new("mailer").hourly(15).build();

    t.deployer.deploy(&decl).await.unwrap();
    let function = t.platform.function("mailer").unwrap();
    let rules = t.platform.rule_names();
    let permissions = t.platform.permissions("mailer");
    t.platform.clear_calls();

    let report = t.deployer.deploy(&decl).await.unwrap();

    assert_eq!(report.action, FunctionAction::Update);
    assert_eq!(t.platform.function("mailer").unwrap(), function);
    assert_eq!(t.platform.rule_names(), rules);
    assert_eq!(t.platform.permissions("mailer"), permissions);
    assert_eq!(t.platform.rule("mailer_hourly_at_15").unwrap().1.len(), 1);

    let calls = t.platform.calls();
    assert!(!calls.iter().any(|c| c.starts_with("DeleteFunction")));
    assert!(!calls.iter().any(|c| c.starts_with("CreateFunction")));
    assert!(
        position(&calls, "UpdateFunctionCode mailer")
            < position(&calls, "UpdateFunctionConfiguration mailer")
    );
}

#[tokio::test]
async fn runtime_change_replaces_function() {
    let t = TestDeployer::with_slow_deletions();
    t.write_source("mailer.js", ENTRY);
    t.platform
        .seed_function(live_function("mailer", "python3.9", REGION));
    let uuid = t
        .platform
        .seed_mapping("mailer", "arn:aws:sqs:eu-west-1:000000000000:inbox");
    let decl = DeclarationBuilder::new("mailer").build();

    let report = t.deployer.deploy(&decl).await.unwrap();

    assert_eq!(report.action, FunctionAction::Replace);
    let live = t.platform.function("mailer").unwrap();
    assert_eq!(live.runtime.as_deref(), Some("nodejs18.x"));
    assert!(t.platform.mappings("mailer").is_empty());

    let calls = t.platform.calls();
    let unmapped = position(&calls, &format!("DeleteEventSourceMapping {uuid}"));
    let deleted = position(&calls, "DeleteFunction mailer");
    let created = position(&calls, "CreateFunction mailer");
    assert!(unmapped < deleted);
    assert!(deleted < created);
    // The deletion was re-probed until it settled.
    let probes = calls[deleted..created]
        .iter()
        .filter(|c| *c == "GetFunction mailer")
        .count();
    assert!(probes >= 2, "expected repeated probes, got {calls:?}");
}

#[tokio::test]
async fn region_change_replaces_function() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    t.platform
        .seed_function(live_function("mailer", "nodejs18.x", "us-east-1"));
    let decl = DeclarationBuilder::new("mailer").build();

    let report = t.deployer.deploy(&decl).await.unwrap();

    assert_eq!(report.action, FunctionAction::Replace);
    assert_eq!(
        t.platform.function("mailer").unwrap().region(),
        Some(REGION)
    );
}

#[tokio::test]
async fn distinct_bucket_region_converges() {
    // Clients are built in the bucket region, so that is where the platform lives.
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    let mut env = upload_env();
    env.region = "us-east-1".to_string();
    env.bucket_region = Some(REGION.to_string());
    let decl = DeclarationBuilder::new("mailer").upload_env(env).build();

    let mut actions = Vec::new();
    for _ in 0..3 {
        actions.push(t.deployer.deploy(&decl).await.unwrap().action);
    }

    assert_eq!(
        actions,
        vec![
            FunctionAction::Create,
            FunctionAction::Update,
            FunctionAction::Update
        ]
    );
    assert!(!t
        .platform
        .calls()
        .iter()
        .any(|c| c.starts_with("DeleteFunction")));
    assert_eq!(
        t.platform.function("mailer").unwrap().region(),
        Some(REGION)
    );
}

#[tokio::test]
async fn missing_upload_env_fails_before_remote_calls() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    let mut env = upload_env();
    env.secret_access_key.clear();
    let decl = DeclarationBuilder::new("mailer").upload_env(env).build();

    let err = t.deployer.deploy(&decl).await.unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(err.phase(), Some(Phase::Validate));
    assert!(matches!(
        err.root(),
        DeployError::MissingEnv { scope: "upload_env", key } if key == "aws_secret_access_key"
    ));
    assert!(t.platform.calls().is_empty());
    assert!(t.toolchain.calls().is_empty());
}

#[tokio::test]
async fn empty_exe_env_value_fails_before_remote_calls() {
    let t = TestDeployer::new();
    let decl = DeclarationBuilder::new("mailer")
        .with_env("API_TOKEN", "")
        .build();

    let err = t.deployer.deploy(&decl).await.unwrap_err();

    assert!(matches!(
        err.root(),
        DeployError::MissingEnv { scope: "exe_env", key } if key == "API_TOKEN"
    ));
    assert!(t.platform.calls().is_empty());
}

#[tokio::test]
async fn platform_failure_names_phase_and_stops() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    let decl = DeclarationBuilder::new("mailer").hourly(0).build();
    t.deployer.deploy(&decl).await.unwrap();

    t.platform.fail_next(
        "UpdateFunctionCode",
        PlatformError::service("UpdateFunctionCode", "rate exceeded"),
    );
    t.platform.clear_calls();
    let err = t.deployer.deploy(&decl).await.unwrap_err();

    assert_eq!(err.phase(), Some(Phase::FunctionApply));
    assert!(!err.is_configuration());
    let message = err.to_string();
    assert!(message.contains("mailer"), "{message}");
    assert!(message.contains("function_apply"), "{message}");

    let last = t.progress.events().pop().unwrap();
    assert_eq!(last.phase, Phase::FunctionApply);
    assert!(matches!(last.kind, PhaseKind::Error(ref m) if m.contains("rate exceeded")));
    assert!(!t
        .platform
        .calls()
        .iter()
        .any(|c| c.starts_with("PutRule") || c.starts_with("UpdateFunctionConfiguration")));
}

#[tokio::test]
async fn build_failure_is_reported_in_build_phase() {
    let t = TestDeployer::new();
    // No source module written, so transpiling fails.
    let decl = DeclarationBuilder::new("mailer").build();

    let err = t.deployer.deploy(&decl).await.unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Build));
    assert!(t.platform.function("mailer").is_none());
    assert!(t.platform.object("mailer.zip").is_none());
}

#[tokio::test]
async fn info_describes_live_function() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    let decl = DeclarationBuilder::new("mailer").daily(3, 30).build();
    t.deployer.deploy(&decl).await.unwrap();

    let info = t.deployer.info("mailer").await.unwrap();

    assert_eq!(info.configuration.name, "mailer");
    assert_eq!(info.rules.len(), 1);
    assert_eq!(info.rules[0].name, "mailer_daily_at_3_30");
    assert_eq!(
        info.rules[0].schedule_expression.as_deref(),
        Some("cron(30 3 * * ? *)")
    );
    assert!(info.mappings.is_empty());
}

#[tokio::test]
async fn info_on_unknown_function_is_not_found() {
    let t = TestDeployer::new();

    let err = t.deployer.info("ghost").await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::Platform(PlatformError::NotFound { kind: "function", .. })
    ));
}

#[tokio::test]
async fn remove_detaches_and_deletes() {
    let t = TestDeployer::with_slow_deletions();
    t.write_source("mailer.js", ENTRY);
    let decl = DeclarationBuilder::new("mailer").hourly(5).daily(1, 0).build();
    t.deployer.deploy(&decl).await.unwrap();

    let report = t.deployer.remove("mailer").await.unwrap();

    assert_eq!(
        report.detached_rules,
        vec!["mailer_daily_at_1_0".to_string(), "mailer_hourly_at_5".to_string()]
    );
    assert_eq!(report.deleted_mappings, 0);
    assert!(t.platform.function("mailer").is_none());
    // Rules survive without targets.
    assert!(t.platform.rule("mailer_hourly_at_5").unwrap().1.is_empty());
}

#[tokio::test]
async fn invoke_passes_payload_through() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    t.deployer
        .deploy(&DeclarationBuilder::new("mailer").build())
        .await
        .unwrap();

    let outcome = t
        .deployer
        .invoke("mailer", Some(br#"{"to":"ops"}"#.to_vec()))
        .await
        .unwrap();

    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.payload, br#"{"to":"ops"}"#.to_vec());
    assert_eq!(t.platform.invocations().len(), 1);
}
