//! Schedule trigger reconciliation.
//!
//! Rule names are derived from the function name and the schedule, so
//! convergence needs no bookkeeping: every target pointing at the
//! function is removed from whatever rules hold it, then one rule per
//! declared schedule is put, granted invoke permission and targeted at
//! the function. Rules are never deleted because other functions may
//! share them.

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::declaration::Schedule;
use crate::error::DeployResult;
use crate::platform::{FunctionApi, InvokePermission, RuleApi, RuleTarget, RULE_PRINCIPAL};

/// A schedule rule derived from one declared schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerRule {
    /// Deterministic rule name.
    pub name: String,
    /// Cron expression.
    pub cron_expression: String,
    /// Function the rule invokes.
    pub target_arn: String,
}

impl TriggerRule {
    /// Derive the rule for `schedule` on a function.
    #[must_use]
    pub fn new(function_name: &str, function_arn: &str, schedule: &Schedule) -> Self {
        Self {
            name: rule_name(function_name, schedule),
            cron_expression: cron_expression(schedule),
            target_arn: function_arn.to_owned(),
        }
    }

    /// Permission statement id granting this rule invoke access.
    #[must_use]
    pub fn statement_id(&self) -> String {
        format!("{}_invoke", self.name)
    }
}

/// Deterministic rule name for a schedule.
#[must_use]
pub fn rule_name(function_name: &str, schedule: &Schedule) -> String {
    match schedule {
        Schedule::Hourly { minute } => format!("{function_name}_hourly_at_{minute}"),
        Schedule::Daily { hour, minute } => {
            format!("{function_name}_daily_at_{hour}_{minute}")
        }
    }
}

/// Cron expression for a schedule.
#[must_use]
pub fn cron_expression(schedule: &Schedule) -> String {
    match schedule {
        Schedule::Hourly { minute } => format!("cron({minute} * * * ? *)"),
        Schedule::Daily { hour, minute } => format!("cron({minute} {hour} * * ? *)"),
    }
}

/// Converges the schedule rules targeting one function.
pub struct TriggerReconciler<'a> {
    functions: &'a dyn FunctionApi,
    rules: &'a dyn RuleApi,
}

impl<'a> TriggerReconciler<'a> {
    /// Create a reconciler.
    #[must_use]
    pub fn new(functions: &'a dyn FunctionApi, rules: &'a dyn RuleApi) -> Self {
        Self { functions, rules }
    }

    /// Remove every target pointing at `function_arn`, leaving the rules in
    /// place. Returns the names of the rules that were touched.
    pub async fn detach(&self, function_arn: &str) -> DeployResult<Vec<String>> {
        let names = self.rules.list_rule_names_by_target(function_arn).await?;
        let mut touched = Vec::with_capacity(names.len());

        for rule in names {
            let ids: Vec<String> = self
                .rules
                .list_targets_by_rule(&rule)
                .await?
                .into_iter()
                .filter(|target| target.arn == function_arn)
                .map(|target| target.id)
                .collect();
            if ids.is_empty() {
                continue;
            }

            self.rules.remove_targets(&rule, &ids).await?;
            debug!(rule = %rule, targets = ids.len(), "removed stale targets");
            touched.push(rule);
        }

        Ok(touched)
    }

    /// Make the declared schedules the only rules targeting the function.
    #[instrument(skip(self, schedules), fields(schedules = schedules.len()))]
    pub async fn converge(
        &self,
        function_name: &str,
        function_arn: &str,
        schedules: &[Schedule],
    ) -> DeployResult<Vec<TriggerRule>> {
        let stale = self.detach(function_arn).await?;
        if !stale.is_empty() {
            info!(rules = ?stale, "detached function from existing rules");
        }

        let mut applied = Vec::with_capacity(schedules.len());
        for schedule in schedules {
            let rule = TriggerRule::new(function_name, function_arn, schedule);
            self.apply(function_name, &rule).await?;
            applied.push(rule);
        }

        info!(rules = applied.len(), "schedules converged");
        Ok(applied)
    }

    async fn apply(&self, function_name: &str, rule: &TriggerRule) -> DeployResult<()> {
        let rule_arn = self
            .rules
            .put_rule(&rule.name, &rule.cron_expression)
            .await?;

        let grant = InvokePermission {
            function_name: function_name.to_owned(),
            statement_id: rule.statement_id(),
            principal: RULE_PRINCIPAL.to_owned(),
            source_arn: rule_arn,
        };
        match self.functions.add_permission(&grant).await {
            Ok(()) => {}
            Err(err) if err.is_conflict() => {
                debug!(statement = %grant.statement_id, "invoke permission already granted");
            }
            Err(err) => return Err(err.into()),
        }

        let target = RuleTarget {
            id: function_name.to_owned(),
            arn: rule.target_arn.clone(),
        };
        self.rules.put_targets(&rule.name, &[target]).await?;

        debug!(rule = %rule.name, cron = %rule.cron_expression, "rule applied");
        Ok(())
    }
}
