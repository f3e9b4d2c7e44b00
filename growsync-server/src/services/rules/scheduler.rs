use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration as StdDuration;

use futures::future::BoxFuture;
use growsync_api::models::{
    Action, Alert, Branch, EngineEvent, Id, OutcomeKind, Rule, RuleHistoryEntry, RuleOutcome, RuleResult,
    RuleStats, RuleTargetAction, SensorSample, SimulationResult, TickReport,
};
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::condition::evaluate_conditions;
use super::dispatch::translate_command;
use crate::configs::Engine;
use crate::errors::EngineError;
use crate::services::{Clock, Dispatcher, RuleStore, with_timeout};

/// Most recent sample seen by the orchestrator, tagged with whether it
/// tripped the safety interlock.
#[derive(Debug, Clone)]
pub struct LatestSample {
    pub sample: SensorSample,
    pub safety_tripped: bool,
}

#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    pub max_trigger_depth: u8,
    pub max_delay: StdDuration,
    pub persistence_timeout: StdDuration,
    pub pwm_native_max: u16,
}

impl From<&Engine> for SchedulerLimits {
    fn from(engine: &Engine) -> Self {
        Self {
            max_trigger_depth: engine.max_trigger_depth,
            max_delay: StdDuration::from_secs(engine.max_delay_seconds),
            persistence_timeout: engine.persistence_timeout(),
            pwm_native_max: engine.pwm_native_max,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerSummary {
    pub tick_count: u64,
    pub last_tick: Option<OffsetDateTime>,
    pub last_outcomes: Vec<RuleOutcome>,
}

/// State guarded by the tick lock.
#[derive(Default)]
struct SchedulerState {
    /// Stats whose save failed; authoritative until a save succeeds
    unsaved: HashMap<Id, RuleStats>,
}

/// Rules seen during one tick, including ones pulled in by dependency,
/// conflict or trigger lookups.
struct TickContext {
    now: OffsetDateTime,
    sample: SensorSample,
    rules: HashMap<Id, Rule>,
}

fn outcome(rule: &Rule, kind: OutcomeKind) -> RuleOutcome {
    RuleOutcome { rule_id: rule.id, rule_name: rule.name.clone(), kind }
}

pub struct RuleScheduler {
    store: Arc<dyn RuleStore>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    latest: watch::Receiver<Option<LatestSample>>,
    limits: SchedulerLimits,
    conflict_window_seconds: AtomicU64,
    state: Mutex<SchedulerState>,
    summary: RwLock<SchedulerSummary>,
}

impl RuleScheduler {
    pub fn new(
        store: Arc<dyn RuleStore>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        latest: watch::Receiver<Option<LatestSample>>,
        limits: SchedulerLimits,
        conflict_window_seconds: u64,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            latest,
            limits,
            conflict_window_seconds: AtomicU64::new(conflict_window_seconds),
            state: Mutex::new(SchedulerState::default()),
            summary: RwLock::new(SchedulerSummary::default()),
        }
    }

    pub fn set_conflict_window(&self, seconds: u64) {
        self.conflict_window_seconds.store(seconds, Ordering::Relaxed);
    }

    fn conflict_window(&self) -> Duration {
        let seconds = self.conflict_window_seconds.load(Ordering::Relaxed);
        Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
    }

    /// Counters of completed ticks. Never waits on a running tick.
    pub fn summary(&self) -> SchedulerSummary {
        match self.summary.read() {
            Ok(summary) => summary.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Runs one scheduling tick over every enabled rule against the latest
    /// sample. Ticks are serialized; a second caller waits for the first.
    pub async fn process_rules(&self) -> Result<TickReport, EngineError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let latest = self.latest.borrow().clone();
        let sample = match latest {
            Some(LatestSample { sample, safety_tripped: false }) => sample,
            Some(_) => {
                tracing::debug!("latest sample tripped the safety interlock, skipping rules");
                return Ok(TickReport { timestamp: now, evaluated: false, outcomes: Vec::new() });
            }
            None => {
                tracing::debug!("no sample received yet, skipping rules");
                return Ok(TickReport { timestamp: now, evaluated: false, outcomes: Vec::new() });
            }
        };

        self.flush_unsaved(&mut state).await;

        let mut rules = with_timeout(
            "rule load",
            self.limits.persistence_timeout,
            self.store.load_enabled_rules(),
        )
        .await?;
        rules.sort_by(Rule::evaluation_order);

        for rule in &mut rules {
            if let Some(stats) = state.unsaved.get(&rule.id) {
                rule.stats = stats.clone();
            }
        }

        let order: Vec<Id> = rules.iter().map(|rule| rule.id).collect();
        let mut ctx = TickContext {
            now,
            sample,
            rules: rules.into_iter().map(|rule| (rule.id, rule)).collect(),
        };

        let mut outcomes = Vec::with_capacity(order.len());
        for id in order {
            let result = self.evaluate_rule(&mut state, &mut ctx, id, 0).await;
            if !matches!(result.kind, OutcomeKind::NotTriggered | OutcomeKind::Blocked { .. }) {
                self.dispatcher.publish(EngineEvent::RuleOutcome(result.clone()));
            }
            outcomes.push(result);
        }

        match self.summary.write() {
            Ok(mut summary) => {
                summary.tick_count += 1;
                summary.last_tick = Some(now);
                summary.last_outcomes = outcomes.clone();
            }
            Err(e) => tracing::error!("scheduler summary poisoned: {}", e),
        }

        Ok(TickReport { timestamp: now, evaluated: true, outcomes })
    }

    /// Evaluates one rule through the gates, condition fold and branch
    /// execution. Boxed so trigger actions can recurse.
    fn evaluate_rule<'a>(
        &'a self,
        state: &'a mut SchedulerState,
        ctx: &'a mut TickContext,
        id: Id,
        depth: u8,
    ) -> BoxFuture<'a, RuleOutcome> {
        Box::pin(async move {
            let rule = match self.load_rule(state, ctx, id).await {
                Ok(Some(rule)) => rule,
                Ok(None) => {
                    return RuleOutcome {
                        rule_id: id,
                        rule_name: String::new(),
                        kind: OutcomeKind::Invalid { error: EngineError::RuleNotFound(id).to_string() },
                    };
                }
                Err(e) => {
                    return RuleOutcome {
                        rule_id: id,
                        rule_name: String::new(),
                        kind: OutcomeKind::Invalid { error: e.to_string() },
                    };
                }
            };

            if let Err(e) = rule.validate() {
                tracing::warn!("Skipping invalid rule {} ({}): {}", rule.id, rule.name, e);
                return outcome(&rule, OutcomeKind::Invalid { error: e.to_string() });
            }

            if let Err(block) = rule.can_execute(ctx.now) {
                tracing::trace!("rule {} blocked: {}", rule.id, block);
                return outcome(&rule, OutcomeKind::Blocked { reason: block.to_string() });
            }

            for dependency in &rule.depends_on {
                if !self.is_enabled(state, ctx, *dependency).await {
                    let reason = format!("dependency {dependency} is not enabled");
                    self.record_skip(state, ctx, rule.id, &reason).await;
                    return outcome(&rule, OutcomeKind::Skipped { reason });
                }
            }

            for conflict in &rule.conflicts_with {
                if self.executed_recently(state, ctx, *conflict).await {
                    let reason = format!("conflicting rule {conflict} executed recently");
                    self.record_skip(state, ctx, rule.id, &reason).await;
                    return outcome(&rule, OutcomeKind::Skipped { reason });
                }
            }

            let evaluation = evaluate_conditions(&rule.conditions, &ctx.sample, ctx.now);
            let selected = if evaluation.met {
                Some((Branch::Then, rule.actions.clone()))
            } else {
                rule.else_actions.clone().map(|actions| (Branch::Else, actions))
            };

            if rule.test_mode {
                let entry = RuleHistoryEntry {
                    timestamp: ctx.now,
                    conditions_met: evaluation.met,
                    actions: selected.map(|(_, actions)| actions).unwrap_or_default(),
                };
                self.record_history(ctx, rule.id, entry).await;
                return outcome(&rule, OutcomeKind::TestLogged { conditions_met: evaluation.met });
            }

            let Some((branch, actions)) = selected else {
                return outcome(&rule, OutcomeKind::NotTriggered);
            };

            let started = ctx.now;
            let result = self.execute_actions(state, ctx, &rule, &actions, depth).await;

            let Some(current) = ctx.rules.get_mut(&rule.id) else {
                return outcome(&rule, OutcomeKind::Invalid { error: EngineError::RuleNotFound(rule.id).to_string() });
            };
            current.stats.execution_count += 1;
            current.stats.last_executed = Some(started);
            current.stats.last_result = Some(if result.is_ok() { RuleResult::Success } else { RuleResult::Failed });
            let stats = current.stats.clone();
            self.save_stats(state, rule.id, stats).await;

            match result {
                Ok(count) => {
                    tracing::info!("rule {} ({}) executed {} actions", rule.id, rule.name, count);
                    outcome(&rule, OutcomeKind::Executed { branch, actions: count })
                }
                Err(e) => {
                    tracing::warn!("rule {} ({}) failed: {}", rule.id, rule.name, e);
                    outcome(&rule, OutcomeKind::Failed { branch, error: e.to_string() })
                }
            }
        })
    }

    /// Runs the action list in order. The first failure aborts the rest.
    async fn execute_actions(
        &self,
        state: &mut SchedulerState,
        ctx: &mut TickContext,
        rule: &Rule,
        actions: &[Action],
        depth: u8,
    ) -> Result<usize, EngineError> {
        for action in actions {
            match action {
                Action::Mqtt { device, command, value } => {
                    let command = translate_command(device, command, value, self.limits.pwm_native_max);
                    self.dispatcher.send(command).await?;
                }
                Action::Delay { seconds } => {
                    let delay = StdDuration::from_secs(*seconds).min(self.limits.max_delay);
                    tokio::time::sleep(delay).await;
                }
                Action::Notification { message, severity } => {
                    self.dispatcher.alert(Alert::new(rule.name.clone(), message.clone(), *severity, ctx.now));
                }
                Action::Rule { target_rule, target_action: RuleTargetAction::Trigger } => {
                    if depth >= self.limits.max_trigger_depth {
                        tracing::warn!(
                            "rule {} cannot trigger rule {}: depth limit {} reached",
                            rule.id,
                            target_rule,
                            self.limits.max_trigger_depth
                        );
                        continue;
                    }
                    let triggered = self.evaluate_rule(state, ctx, *target_rule, depth + 1).await;
                    tracing::debug!("rule {} triggered {:?}", rule.id, triggered);
                    self.dispatcher.publish(EngineEvent::RuleOutcome(triggered));
                }
                Action::Rule { target_rule, target_action } => {
                    let enabled = *target_action == RuleTargetAction::Enable;
                    with_timeout(
                        "rule enable update",
                        self.limits.persistence_timeout,
                        self.store.set_rule_enabled(*target_rule, enabled),
                    )
                    .await?;
                    if let Some(target) = ctx.rules.get_mut(target_rule) {
                        target.enabled = enabled;
                    }
                    tracing::info!("rule {} set rule {} enabled={}", rule.id, target_rule, enabled);
                }
            }
        }

        Ok(actions.len())
    }

    /// Rule as seen by this tick, loading it from the store on first use.
    async fn load_rule(
        &self,
        state: &SchedulerState,
        ctx: &mut TickContext,
        id: Id,
    ) -> Result<Option<Rule>, EngineError> {
        if let Some(rule) = ctx.rules.get(&id) {
            return Ok(Some(rule.clone()));
        }

        let found = with_timeout("rule lookup", self.limits.persistence_timeout, self.store.find_rule(id)).await?;
        let Some(mut rule) = found else {
            return Ok(None);
        };
        if let Some(stats) = state.unsaved.get(&id) {
            rule.stats = stats.clone();
        }

        ctx.rules.insert(id, rule.clone());
        Ok(Some(rule))
    }

    async fn is_enabled(&self, state: &SchedulerState, ctx: &mut TickContext, id: Id) -> bool {
        match self.load_rule(state, ctx, id).await {
            Ok(rule) => rule.is_some_and(|rule| rule.enabled),
            Err(e) => {
                tracing::warn!("Failed to look up rule {}: {}", id, e);
                false
            }
        }
    }

    async fn executed_recently(&self, state: &SchedulerState, ctx: &mut TickContext, id: Id) -> bool {
        let window = self.conflict_window();
        match self.load_rule(state, ctx, id).await {
            Ok(rule) => rule
                .and_then(|rule| rule.stats.last_executed)
                .is_some_and(|last| ctx.now - last < window),
            Err(e) => {
                tracing::warn!("Failed to look up rule {}: {}", id, e);
                false
            }
        }
    }

    /// Marks a dependency or conflict skip. Counters stay untouched and
    /// the store is only written when the result changes.
    async fn record_skip(&self, state: &mut SchedulerState, ctx: &mut TickContext, id: Id, reason: &str) {
        tracing::debug!("rule {} skipped: {}", id, reason);

        let Some(rule) = ctx.rules.get_mut(&id) else {
            return;
        };
        if rule.test_mode || rule.stats.last_result == Some(RuleResult::Skipped) {
            return;
        }

        rule.stats.last_result = Some(RuleResult::Skipped);
        let stats = rule.stats.clone();
        self.save_stats(state, id, stats).await;
    }

    async fn record_history(&self, ctx: &mut TickContext, id: Id, entry: RuleHistoryEntry) {
        if let Err(e) = with_timeout(
            "rule history append",
            self.limits.persistence_timeout,
            self.store.append_rule_history(id, &entry),
        )
        .await
        {
            tracing::warn!("Failed to record test run of rule {}: {}", id, e);
        }

        if let Some(rule) = ctx.rules.get_mut(&id) {
            rule.push_history(entry);
        }
    }

    async fn save_stats(&self, state: &mut SchedulerState, id: Id, stats: RuleStats) {
        match with_timeout(
            "rule stats save",
            self.limits.persistence_timeout,
            self.store.save_rule_stats(id, &stats),
        )
        .await
        {
            Ok(()) => {
                state.unsaved.remove(&id);
            }
            Err(e) => {
                tracing::warn!("Failed to save stats of rule {}: {}", id, e);
                state.unsaved.insert(id, stats);
            }
        }
    }

    async fn flush_unsaved(&self, state: &mut SchedulerState) {
        let pending: Vec<(Id, RuleStats)> = state.unsaved.iter().map(|(id, stats)| (*id, stats.clone())).collect();
        for (id, stats) in pending {
            self.save_stats(state, id, stats).await;
        }
    }

    /// Dry run of one rule against `sample`, or the latest sample when none
    /// is given. Dispatches nothing and records nothing.
    pub async fn simulate(&self, id: Id, sample: Option<SensorSample>) -> Result<SimulationResult, EngineError> {
        let now = self.clock.now();
        let rule = with_timeout("rule lookup", self.limits.persistence_timeout, self.store.find_rule(id))
            .await?
            .ok_or(EngineError::RuleNotFound(id))?;
        rule.validate()?;

        let sample = match sample {
            Some(sample) => sample,
            None => {
                let latest = self.latest.borrow().clone();
                latest.map(|latest| latest.sample).unwrap_or_else(|| SensorSample::new(now))
            }
        };

        let evaluation = evaluate_conditions(&rule.conditions, &sample, now);
        let actions = if evaluation.met {
            rule.actions.clone()
        } else {
            rule.else_actions.clone().unwrap_or_default()
        };
        let block = rule.can_execute(now).err();

        Ok(SimulationResult {
            rule_id: rule.id,
            condition_results: evaluation.results,
            conditions_met: evaluation.met,
            actions,
            can_execute: block.is_none(),
            blocked_reason: block.map(|block| block.to_string()),
        })
    }

    /// Fixed-period driver. The stop signal ends scheduling between ticks;
    /// a tick already running is allowed to finish.
    pub fn spawn(self: Arc<Self>, period: StdDuration, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("rule scheduler started, period {:?}", period);

            loop {
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match self.process_rules().await {
                            Ok(report) if report.evaluated => {
                                tracing::trace!("tick evaluated {} rules", report.outcomes.len());
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!("Rule tick failed: {}", e),
                        }
                    }
                }
            }

            tracing::info!("rule scheduler stopped");
        })
    }
}
