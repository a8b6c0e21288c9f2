//! Integration tests for schedule rule convergence.

mod common;

use common::fixtures::{live_function, DeclarationBuilder, REGION};
use common::TestDeployer;
use severe_deploy::platform::RuleTarget;
use severe_deploy::MemoryPlatform;

const ENTRY: &str = "export const handler = async () => null;\n";

fn target(function: &str) -> RuleTarget {
    RuleTarget {
        id: function.to_string(),
        arn: MemoryPlatform::function_arn(REGION, function),
    }
}

#[tokio::test]
async fn stale_rule_loses_only_this_function() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    t.platform
        .seed_function(live_function("mailer", "nodejs18.x", REGION));
    t.platform.seed_rule(
        "nightly_batch",
        "cron(0 3 * * ? *)",
        vec![target("mailer"), target("billing")],
    );
    let decl = DeclarationBuilder::new("mailer").hourly(15).build();

    let report = t.deployer.deploy(&decl).await.unwrap();

    let (_, shared) = t.platform.rule("nightly_batch").unwrap();
    assert_eq!(shared, vec![target("billing")]);

    let (cron, targets) = t.platform.rule("mailer_hourly_at_15").unwrap();
    assert_eq!(cron, "cron(15 * * * ? *)");
    assert_eq!(targets, vec![target("mailer")]);

    assert_eq!(report.rules.len(), 1);
    assert_eq!(report.rules[0].name, "mailer_hourly_at_15");
}

#[tokio::test]
async fn each_schedule_gets_rule_and_permission() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    let decl = DeclarationBuilder::new("mailer")
        .hourly(0)
        .daily(6, 45)
        .build();

    t.deployer.deploy(&decl).await.unwrap();

    assert_eq!(
        t.platform.rule_names(),
        vec!["mailer_daily_at_6_45".to_string(), "mailer_hourly_at_0".to_string()]
    );
    let mut permissions = t.platform.permissions("mailer");
    permissions.sort_by(|a, b| a.statement_id.cmp(&b.statement_id));
    assert_eq!(permissions.len(), 2);
    assert_eq!(permissions[0].statement_id, "mailer_daily_at_6_45_invoke");
    assert_eq!(permissions[0].principal, "events.amazonaws.com");
    assert_eq!(
        permissions[0].source_arn,
        "arn:aws:events:eu-west-1:000000000000:rule/mailer_daily_at_6_45"
    );
}

#[tokio::test]
async fn dropping_schedules_detaches_but_keeps_rules() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    t.deployer
        .deploy(&DeclarationBuilder::new("mailer").hourly(30).build())
        .await
        .unwrap();

    let report = t
        .deployer
        .deploy(&DeclarationBuilder::new("mailer").build())
        .await
        .unwrap();

    assert!(report.rules.is_empty());
    let (_, targets) = t.platform.rule("mailer_hourly_at_30").unwrap();
    assert!(targets.is_empty());
    assert!(!t
        .platform
        .calls()
        .iter()
        .any(|c| c.starts_with("DeleteRule")));
}

#[tokio::test]
async fn changed_schedule_moves_target() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    t.deployer
        .deploy(&DeclarationBuilder::new("mailer").daily(3, 0).build())
        .await
        .unwrap();

    t.deployer
        .deploy(&DeclarationBuilder::new("mailer").hourly(15).build())
        .await
        .unwrap();

    let (daily_cron, daily_targets) = t.platform.rule("mailer_daily_at_3_0").unwrap();
    assert_eq!(daily_cron, "cron(0 3 * * ? *)");
    assert!(daily_targets.is_empty());
    assert_eq!(
        t.platform.rule("mailer_hourly_at_15").unwrap().1,
        vec![target("mailer")]
    );
}

#[tokio::test]
async fn target_removal_precedes_rule_creation() {
    let t = TestDeployer::new();
    t.write_source("mailer.js", ENTRY);
    t.platform
        .seed_function(live_function("mailer", "nodejs18.x", REGION));
    t.platform
        .seed_rule("legacy", "cron(0 0 * * ? *)", vec![target("mailer")]);
    let decl = DeclarationBuilder::new("mailer").hourly(10).build();

    t.deployer.deploy(&decl).await.unwrap();

    let calls = t.platform.calls();
    let removed = calls.iter().position(|c| c == "RemoveTargets legacy").unwrap();
    let put = calls
        .iter()
        .position(|c| c == "PutRule mailer_hourly_at_10")
        .unwrap();
    assert!(removed < put);
}
