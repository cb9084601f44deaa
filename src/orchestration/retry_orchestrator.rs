//! # Retry Orchestrator
//!
//! Drives one platform branch through allocate / execute / evaluate until it
//! succeeds or terminates.
//!
//! ## Decision table
//!
//! | error kind                               | decision                                         |
//! |------------------------------------------|--------------------------------------------------|
//! | `login_required`, `account_blocked`      | switch if allowed, else terminate `unrecoverable` |
//! | `permission_denied`, `captcha_required`  | switch if allowed and a replacement exists, else retry in place |
//! | anything else                            | retry in place while budget remains               |
//!
//! Same-lease retry counts are tracked per error kind and reset on every
//! switch. The switch count is branch-global. A hard ceiling of
//! `max_retries + max_resource_switches + 1` adapter invocations applies on
//! top of both counters.
//!
//! ## Lease handling
//!
//! Every acquired lease is released before `run_branch` returns, including on
//! cancellation. The adapter's `close` is called once for each execution
//! context the branch stops using.

use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::adapter::{CrawlOperation, ExecutionContext, PlatformAdapter};
use super::backoff_calculator::BackoffCalculator;
use super::error_classifier::{AdapterError, ErrorClassifier, KeywordErrorClassifier};
use crate::config::RetryPolicy;
use crate::constants::events;
use crate::logging::{log_branch_operation, log_error};
use crate::models::{
    AccountStrategy, BranchResult, ErrorKind, ErrorRecord, ResourceKind, ResourceLease,
};
use crate::resources::{Acquisition, ResourcePoolManager};
use crate::state_machine::{BranchEvent, BranchStateMachine, TerminationReason};

/// One platform's work within a task
#[derive(Debug, Clone)]
pub struct BranchSpec {
    pub task_id: Uuid,
    pub platform: String,
    pub operation: CrawlOperation,
    pub strategy: AccountStrategy,
}

/// What the orchestrator decided after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum RetryDecision {
    Retry,
    Switch,
    GiveUp(TerminationReason),
}

/// Which lease an error is charged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blame {
    Account,
    Proxy,
}

/// A decision with its replacement lease already in hand
#[derive(Debug)]
enum NextStep {
    Retry,
    Switch(ResourceKind, ResourceLease),
    GiveUp(TerminationReason),
}

impl From<RetryDecision> for NextStep {
    /// `Switch` without a lease in hand degrades to a retry
    fn from(decision: RetryDecision) -> Self {
        match decision {
            RetryDecision::Retry | RetryDecision::Switch => Self::Retry,
            RetryDecision::GiveUp(reason) => Self::GiveUp(reason),
        }
    }
}

/// Audit trail of one adapter invocation
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub account_id: Uuid,
    pub proxy_id: Option<Uuid>,
    pub item_count: Option<u32>,
    pub error: Option<ErrorRecord>,
    pub decision: Option<RetryDecision>,
}

#[derive(Debug, Clone)]
pub struct BranchOutcome {
    pub result: BranchResult,
    /// Every attempt in order, including the error history
    pub history: Vec<AttemptRecord>,
}

impl BranchOutcome {
    pub fn errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.history.iter().filter_map(|a| a.error.as_ref())
    }
}

/// Counters that bound the branch loop
#[derive(Debug, Default)]
struct BranchBudget {
    attempts: u32,
    switches: u32,
    retries_by_kind: HashMap<ErrorKind, u32>,
}

impl BranchBudget {
    fn retries_for(&self, kind: ErrorKind) -> u32 {
        self.retries_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

pub struct RetryOrchestrator {
    pool: Arc<ResourcePoolManager>,
    classifier: Arc<dyn ErrorClassifier>,
    policy: RetryPolicy,
    backoff: BackoffCalculator,
}

impl std::fmt::Debug for RetryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOrchestrator")
            .field("classifier", &self.classifier.classifier_name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl RetryOrchestrator {
    pub fn new(pool: Arc<ResourcePoolManager>, policy: RetryPolicy) -> Self {
        Self::with_classifier(pool, Arc::new(KeywordErrorClassifier::new()), policy)
    }

    pub fn with_classifier(
        pool: Arc<ResourcePoolManager>,
        classifier: Arc<dyn ErrorClassifier>,
        policy: RetryPolicy,
    ) -> Self {
        let backoff = BackoffCalculator::from_policy(&policy);
        Self {
            pool,
            classifier,
            policy,
            backoff,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn pool(&self) -> &Arc<ResourcePoolManager> {
        &self.pool
    }

    /// Pure decision after a failed attempt.
    ///
    /// `attempts` counts invocations already made, including the failed one.
    pub fn decide(
        &self,
        kind: ErrorKind,
        retries_for_kind: u32,
        switches: u32,
        attempts: u32,
        switching_allowed: bool,
    ) -> RetryDecision {
        let can_switch = switching_allowed && self.policy.can_switch(switches);

        if attempts >= self.policy.max_attempts() {
            return RetryDecision::GiveUp(if kind.invalidates_identity() {
                TerminationReason::Unrecoverable
            } else {
                TerminationReason::MaxRetriesExceeded
            });
        }

        if kind.invalidates_identity() {
            return if can_switch {
                RetryDecision::Switch
            } else {
                RetryDecision::GiveUp(TerminationReason::Unrecoverable)
            };
        }

        if kind.prefers_switch() && can_switch {
            return RetryDecision::Switch;
        }

        self.decide_without_switch(kind, retries_for_kind)
    }

    /// Decision when no replacement lease can be had. Identity errors end the
    /// branch; everything else retries in place while its budget lasts.
    pub fn decide_without_switch(&self, kind: ErrorKind, retries_for_kind: u32) -> RetryDecision {
        if kind.invalidates_identity() {
            RetryDecision::GiveUp(TerminationReason::Unrecoverable)
        } else if retries_for_kind < self.policy.max_retries {
            RetryDecision::Retry
        } else {
            RetryDecision::GiveUp(TerminationReason::MaxRetriesExceeded)
        }
    }

    /// Run one branch to a terminal outcome. Never panics on adapter or pool
    /// failures; they become the branch result.
    pub async fn run_branch(
        &self,
        adapter: Arc<dyn PlatformAdapter>,
        spec: BranchSpec,
        cancel: CancellationToken,
    ) -> BranchOutcome {
        let platform = spec.platform.clone();
        let switching_allowed =
            self.policy.resource_switch_enabled && spec.strategy.allows_switching();
        let mut machine = BranchStateMachine::new(&platform);
        let mut budget = BranchBudget::default();
        let mut history: Vec<AttemptRecord> = Vec::new();
        let mut last_error: Option<ErrorRecord> = None;
        let mut tried_accounts: HashSet<Uuid> = HashSet::new();
        let mut tried_proxies: HashSet<Uuid> = HashSet::new();

        log_branch_operation(
            events::BRANCH_STARTED,
            spec.task_id,
            &platform,
            0,
            &machine.current_state().to_string(),
            Some(&format!("strategy={}", spec.strategy)),
        );

        if cancel.is_cancelled() {
            self.transition(&mut machine, BranchEvent::Cancelled);
            return self.finish_failure(&spec, TerminationReason::Cancelled, None, &budget, history);
        }

        let Some(mut account) = self
            .acquire(&platform, ResourceKind::Account, spec.strategy, &tried_accounts)
            .await
        else {
            self.transition(&mut machine, BranchEvent::NoResource);
            return self.finish_failure(&spec, TerminationReason::NoResource, None, &budget, history);
        };
        tried_accounts.insert(account.lease_id);

        let mut proxy = None;
        if spec.operation.use_proxy {
            match self
                .acquire(&platform, ResourceKind::Proxy, AccountStrategy::Lru, &tried_proxies)
                .await
            {
                Some(lease) => {
                    tried_proxies.insert(lease.lease_id);
                    proxy = Some(lease);
                }
                None => {
                    self.pool.release(account.lease_id).await;
                    self.transition(&mut machine, BranchEvent::NoResource);
                    return self.finish_failure(
                        &spec,
                        TerminationReason::NoResource,
                        None,
                        &budget,
                        history,
                    );
                }
            }
        }
        self.transition(&mut machine, BranchEvent::LeaseAcquired);

        loop {
            budget.attempts += 1;
            let ctx = ExecutionContext {
                task_id: spec.task_id,
                platform: platform.clone(),
                attempt: budget.attempts,
                account: account.clone(),
                proxy: proxy.clone(),
                cancel: cancel.clone(),
            };

            let execution = AssertUnwindSafe(adapter.execute(&ctx, &spec.operation))
                .catch_unwind()
                .map(|caught| caught.unwrap_or_else(|payload| Err(panicked(&*payload))));
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = execution => Some(result),
            };

            let error = match outcome {
                None => {
                    self.teardown(adapter.as_ref(), &ctx).await;
                    self.transition(&mut machine, BranchEvent::Cancelled);
                    return self.finish_failure(
                        &spec,
                        TerminationReason::Cancelled,
                        last_error,
                        &budget,
                        history,
                    );
                }
                Some(Ok(result)) => {
                    self.transition(&mut machine, BranchEvent::AttemptSucceeded);
                    self.feedback_success(account.lease_id).await;
                    if let Some(proxy) = &proxy {
                        self.feedback_success(proxy.lease_id).await;
                    }
                    self.teardown(adapter.as_ref(), &ctx).await;

                    history.push(AttemptRecord {
                        attempt: budget.attempts,
                        account_id: account.lease_id,
                        proxy_id: proxy.as_ref().map(|p| p.lease_id),
                        item_count: Some(result.item_count),
                        error: None,
                        decision: None,
                    });
                    log_branch_operation(
                        events::BRANCH_SUCCEEDED,
                        spec.task_id,
                        &platform,
                        budget.attempts,
                        &machine.current_state().to_string(),
                        Some(&format!("items={}", result.item_count)),
                    );
                    return BranchOutcome {
                        result: BranchResult::success(
                            &platform,
                            result.item_count,
                            budget.attempts,
                            budget.switches,
                        ),
                        history,
                    };
                }
                Some(Err(error)) => error,
            };

            self.transition(&mut machine, BranchEvent::AttemptFailed);
            let classification = self.classifier.classify_error(&error);
            let kind = classification.kind;
            let blame = blame_for(kind, proxy.is_some());
            let blamed_id = match (blame, &proxy) {
                (Blame::Proxy, Some(p)) => p.lease_id,
                _ => account.lease_id,
            };

            let record = ErrorRecord::new(
                kind,
                error.message(),
                &platform,
                Some(blamed_id),
                budget.retries_for(kind),
            );
            self.feedback_failure(blamed_id, &record).await;

            // A switch only stands once the replacement is checked out
            let (decision, next) = match self.decide(
                kind,
                budget.retries_for(kind),
                budget.switches,
                budget.attempts,
                switching_allowed,
            ) {
                RetryDecision::Switch => {
                    let (kind_to_swap, exclude, strategy) = match blame {
                        Blame::Proxy if proxy.is_some() => {
                            (ResourceKind::Proxy, &mut tried_proxies, AccountStrategy::Lru)
                        }
                        _ => (ResourceKind::Account, &mut tried_accounts, spec.strategy),
                    };
                    match self.acquire(&platform, kind_to_swap, strategy, exclude).await {
                        Some(replacement) => {
                            exclude.insert(replacement.lease_id);
                            (
                                RetryDecision::Switch,
                                NextStep::Switch(kind_to_swap, replacement),
                            )
                        }
                        None => {
                            let fallback = self.decide_without_switch(kind, budget.retries_for(kind));
                            debug!(
                                platform = %platform,
                                kind = %kind_to_swap,
                                decision = ?fallback,
                                "🔄 BRANCH: No replacement lease, falling back"
                            );
                            (fallback, NextStep::from(fallback))
                        }
                    }
                }
                decision => (decision, NextStep::from(decision)),
            };

            warn!(
                task_id = %spec.task_id,
                platform = %platform,
                attempt = budget.attempts,
                error_kind = %kind,
                classified_by = ?classification.source,
                decision = ?decision,
                error = %error,
                "⚠️ BRANCH: Attempt failed"
            );

            history.push(AttemptRecord {
                attempt: budget.attempts,
                account_id: account.lease_id,
                proxy_id: proxy.as_ref().map(|p| p.lease_id),
                item_count: None,
                error: Some(record.clone()),
                decision: Some(decision),
            });
            last_error = Some(record);

            match next {
                NextStep::Retry => {
                    let retry_index = budget.retries_for(kind);
                    *budget.retries_by_kind.entry(kind).or_insert(0) += 1;
                    self.transition(&mut machine, BranchEvent::Retry);

                    let delay = self.backoff.delay_for(retry_index);
                    debug!(
                        platform = %platform,
                        retry = retry_index + 1,
                        delay_ms = delay.as_millis() as u64,
                        "🔁 BRANCH: Backing off before retry"
                    );

                    let cancelled = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => true,
                        _ = tokio::time::sleep(delay) => false,
                    };
                    if cancelled {
                        self.teardown(adapter.as_ref(), &ctx).await;
                        self.transition(&mut machine, BranchEvent::Cancelled);
                        return self.finish_failure(
                            &spec,
                            TerminationReason::Cancelled,
                            last_error,
                            &budget,
                            history,
                        );
                    }

                    // Same leases; allocation is a no-op on retry
                    self.transition(&mut machine, BranchEvent::BackoffElapsed);
                    self.transition(&mut machine, BranchEvent::LeaseAcquired);
                }
                NextStep::Switch(kind_to_swap, replacement) => {
                    self.transition(&mut machine, BranchEvent::Switch);
                    adapter.close(&ctx).await;
                    self.pool.release(blamed_id).await;
                    budget.switches += 1;
                    budget.retries_by_kind.clear();

                    info!(
                        task_id = %spec.task_id,
                        platform = %platform,
                        kind = %kind_to_swap,
                        from = %blamed_id,
                        to = %replacement.lease_id,
                        switches = budget.switches,
                        "🔄 BRANCH: Switched resource"
                    );
                    match kind_to_swap {
                        ResourceKind::Account => account = replacement,
                        ResourceKind::Proxy => proxy = Some(replacement),
                    }
                    self.transition(&mut machine, BranchEvent::LeaseAcquired);
                }
                NextStep::GiveUp(reason) => {
                    self.transition(&mut machine, BranchEvent::GiveUp(reason));
                    self.teardown(adapter.as_ref(), &ctx).await;
                    return self.finish_failure(&spec, reason, last_error, &budget, history);
                }
            }
        }
    }

    async fn acquire(
        &self,
        platform: &str,
        kind: ResourceKind,
        strategy: AccountStrategy,
        exclude: &HashSet<Uuid>,
    ) -> Option<ResourceLease> {
        match self.pool.acquire_with(platform, kind, strategy, exclude).await {
            Ok(Acquisition::Acquired(lease)) => Some(lease),
            Ok(Acquisition::NotAvailable) => None,
            Err(e) => {
                log_error(
                    "retry_orchestrator",
                    "acquire",
                    &e.to_string(),
                    Some(&format!("platform={platform} kind={kind}")),
                );
                None
            }
        }
    }

    async fn feedback_success(&self, lease_id: Uuid) {
        if let Err(e) = self.pool.report_success(lease_id).await {
            log_error("retry_orchestrator", "report_success", &e.to_string(), None);
        }
    }

    async fn feedback_failure(&self, lease_id: Uuid, record: &ErrorRecord) {
        if let Err(e) = self.pool.report_failure(lease_id, record).await {
            log_error("retry_orchestrator", "report_failure", &e.to_string(), None);
        }
    }

    /// Close the adapter context and return every lease it holds
    async fn teardown(&self, adapter: &dyn PlatformAdapter, ctx: &ExecutionContext) {
        adapter.close(ctx).await;
        self.pool.release(ctx.account.lease_id).await;
        if let Some(proxy) = &ctx.proxy {
            self.pool.release(proxy.lease_id).await;
        }
    }

    fn transition(&self, machine: &mut BranchStateMachine, event: BranchEvent) {
        if let Err(e) = machine.transition(event) {
            // Only reachable through a bug in the loop above
            warn!(error = %e, event = event.event_type(), "Unexpected branch transition");
        }
    }

    fn finish_failure(
        &self,
        spec: &BranchSpec,
        reason: TerminationReason,
        last_error: Option<ErrorRecord>,
        budget: &BranchBudget,
        history: Vec<AttemptRecord>,
    ) -> BranchOutcome {
        log_branch_operation(
            events::BRANCH_TERMINATED,
            spec.task_id,
            &spec.platform,
            budget.attempts,
            &reason.to_string(),
            last_error.as_ref().map(|e| e.summary()).as_deref(),
        );
        BranchOutcome {
            result: BranchResult::failure(
                &spec.platform,
                reason,
                last_error,
                budget.attempts,
                budget.switches,
            ),
            history,
        }
    }
}

/// Egress failures are charged to the proxy when one is in use
fn blame_for(kind: ErrorKind, has_proxy: bool) -> Blame {
    if has_proxy && kind.is_egress_related() {
        Blame::Proxy
    } else {
        Blame::Account
    }
}

/// Adapter panics become ordinary failures so the leases are still returned
fn panicked(payload: &(dyn std::any::Any + Send)) -> AdapterError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    AdapterError::other(format!("adapter panicked: {message}"))
}
