//! End-to-end crawl scenarios through the coordinator with scripted adapters.

mod common;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{build_system, seed_accounts, submit, test_config, wait_for_terminal, ScriptedAdapter, Step};
use mediacrawl_core::config::ResourcePoolConfig;
use mediacrawl_core::error::Result;
use mediacrawl_core::models::{
    AccountStrategy, ErrorKind, ErrorRecord, ExecutionMode, ResourceKind, ResourceLease,
};
use mediacrawl_core::orchestration::{
    AdapterError, BranchSpec, CrawlOperation, RetryOrchestrator, TaskRequest,
};
use mediacrawl_core::resources::{
    Acquisition, InMemoryLeaseStore, ResourcePoolManager, ResourceProvisioner,
};
use mediacrawl_core::state_machine::{TaskState, TerminationReason};
use mediacrawl_core::CrawlError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(30);

#[tokio::test]
async fn scenario_a_parallel_all_succeed() {
    let xhs = ScriptedAdapter::new("xhs", vec![Step::Items(10)]);
    let dy = ScriptedAdapter::new("dy", vec![Step::Items(5)]);
    let ks = ScriptedAdapter::new("ks", vec![Step::Items(7)]);
    let system = build_system(test_config(), &[xhs.clone(), dy.clone(), ks.clone()]);
    for platform in ["xhs", "dy", "ks"] {
        seed_accounts(&system, platform, 1).await;
    }

    let task_id = submit(&system, TaskRequest::new(["xhs", "dy", "ks"])).await;
    let task = wait_for_terminal(&system, task_id, WAIT).await;

    assert_eq!(task.status, TaskState::Completed);
    assert_eq!(task.total_items(), 22);
    assert_eq!(task.progress, 100);
    assert_eq!(task.platform_results.get("dy"), Some(&5));
    assert!(task.platform_errors.is_empty());
    assert!(task.completed_at.is_some());
    for adapter in [&xhs, &dy, &ks] {
        assert_eq!(adapter.call_count(), 1);
        assert_eq!(adapter.close_count(), 1);
    }
    assert_eq!(system.pool.checked_out_count(), 0);
}

#[tokio::test]
async fn scenario_b_sequential_partial_failure() {
    let xhs = ScriptedAdapter::always(
        "xhs",
        Step::Fail(AdapterError::declared(ErrorKind::AccountBlocked, "account suspended")),
    );
    let dy = ScriptedAdapter::new("dy", vec![Step::Items(4)]);
    let system = build_system(test_config(), &[xhs.clone(), dy.clone()]);
    let blocked = seed_accounts(&system, "xhs", 1).await;
    seed_accounts(&system, "dy", 1).await;

    let task_id = submit(&system, TaskRequest::new(["xhs", "dy"]).sequential()).await;
    let task = wait_for_terminal(&system, task_id, WAIT).await;

    assert_eq!(task.execution_mode, ExecutionMode::Sequential);
    assert_eq!(task.status, TaskState::CompletedWithErrors);
    assert_eq!(task.platform_results.get("dy"), Some(&4));

    let failed = &task.branch_results["xhs"];
    assert_eq!(failed.reason, Some(TerminationReason::Unrecoverable));
    assert_eq!(
        failed.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::AccountBlocked)
    );
    assert!(task.platform_errors["xhs"].contains("account_blocked"));

    // Identity errors are never retried in place
    assert_eq!(xhs.call_count(), 1);
    let lease = system.pool.get(blocked[0].lease_id).await.unwrap().unwrap();
    assert_eq!(lease.fail_count, 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_network_errors_back_off_then_fail() {
    let mut config = test_config();
    config.retry.base_delay_ms = 2_000;
    config.retry.max_delay_ms = 30_000;
    config.retry.exponential_base = 2.0;
    config.retry.jitter = false;

    let xhs = ScriptedAdapter::always("xhs", Step::Fail(AdapterError::Transport("connection reset".into())));
    let system = build_system(config, &[xhs.clone()]);
    let accounts = seed_accounts(&system, "xhs", 2).await;

    let task_id = submit(&system, TaskRequest::new(["xhs"])).await;
    let task = wait_for_terminal(&system, task_id, Duration::from_secs(120)).await;

    assert_eq!(task.status, TaskState::Failed);
    let branch = &task.branch_results["xhs"];
    assert_eq!(branch.reason, Some(TerminationReason::MaxRetriesExceeded));
    assert_eq!(branch.attempts, 4);
    assert_eq!(branch.error.as_ref().map(|e| e.kind), Some(ErrorKind::NetworkError));

    let calls = xhs.calls.lock().clone();
    assert_eq!(calls.len(), 4);
    // Network errors stay on the same lease
    assert!(calls.iter().all(|c| c.account_id == calls[0].account_id));
    assert!(accounts.iter().any(|a| a.lease_id == calls[0].account_id));

    let gaps: Vec<u64> = calls
        .windows(2)
        .map(|w| (w[1].at - w[0].at).as_millis() as u64)
        .collect();
    assert_eq!(gaps, vec![2_000, 4_000, 8_000]);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_backoff_is_capped() {
    let mut config = test_config();
    config.retry.base_delay_ms = 2_000;
    config.retry.max_delay_ms = 5_000;
    config.retry.jitter = false;

    let xhs = ScriptedAdapter::always("xhs", Step::Fail(AdapterError::http(503, "upstream busy")));
    let system = build_system(config, &[xhs.clone()]);
    seed_accounts(&system, "xhs", 1).await;

    let task_id = submit(&system, TaskRequest::new(["xhs"])).await;
    wait_for_terminal(&system, task_id, Duration::from_secs(120)).await;

    let calls = xhs.calls.lock().clone();
    let gaps: Vec<u64> = calls
        .windows(2)
        .map(|w| (w[1].at - w[0].at).as_millis() as u64)
        .collect();
    assert_eq!(gaps, vec![2_000, 4_000, 5_000]);
}

/// Upstream that always errors
#[derive(Debug)]
struct BrokenProvisioner;

#[async_trait]
impl ResourceProvisioner for BrokenProvisioner {
    async fn provision(&self, _platform: &str, _kind: ResourceKind) -> Result<Option<ResourceLease>> {
        Err(CrawlError::Provisioning("provider down".into()))
    }

    fn provisioner_name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn scenario_d_no_resource_means_no_invocations() {
    let pool = Arc::new(ResourcePoolManager::new(
        Arc::new(InMemoryLeaseStore::new()),
        Arc::new(BrokenProvisioner),
        &ResourcePoolConfig::default(),
    ));

    let acquired = pool.acquire("xhs", ResourceKind::Proxy).await.unwrap();
    assert_eq!(acquired, Acquisition::NotAvailable);

    let adapter = ScriptedAdapter::always("xhs", Step::Items(1));
    let orchestrator = RetryOrchestrator::new(pool.clone(), test_config().retry);
    let outcome = orchestrator
        .run_branch(
            adapter.clone(),
            BranchSpec {
                task_id: Uuid::new_v4(),
                platform: "xhs".into(),
                operation: CrawlOperation::default(),
                strategy: AccountStrategy::Smart,
            },
            CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.result.reason, Some(TerminationReason::NoResource));
    assert_eq!(outcome.result.attempts, 0);
    assert_eq!(adapter.call_count(), 0);
    assert_eq!(adapter.close_count(), 0);
}

#[tokio::test]
async fn scenario_d_through_the_coordinator() {
    let xhs = ScriptedAdapter::always("xhs", Step::Items(3));
    let system = build_system(test_config(), &[xhs.clone()]);

    let task_id = submit(&system, TaskRequest::new(["xhs"])).await;
    let task = wait_for_terminal(&system, task_id, WAIT).await;

    assert_eq!(task.status, TaskState::Failed);
    assert_eq!(
        task.branch_results["xhs"].reason,
        Some(TerminationReason::NoResource)
    );
    assert!(task.message.as_deref().unwrap_or_default().contains("xhs"));
    assert_eq!(xhs.call_count(), 0);
}

#[tokio::test]
async fn scenario_e_exhausted_lease_is_never_reacquired() {
    let pool = ResourcePoolManager::with_store(Arc::new(InMemoryLeaseStore::new()));
    let worn = pool.register(ResourceLease::account("xhs", "worn")).await.unwrap();
    let fresh = pool.register(ResourceLease::account("xhs", "fresh")).await.unwrap();

    for _ in 0..3 {
        let error = ErrorRecord::new(ErrorKind::NetworkError, "timeout", "xhs", Some(worn.lease_id), 0);
        pool.report_failure(worn.lease_id, &error).await.unwrap();
    }
    let audit = pool.audit_log(worn.lease_id).await.unwrap();
    assert_eq!(audit.len(), 1);

    let mut seen = HashSet::new();
    for _ in 0..10 {
        let lease = pool
            .acquire("xhs", ResourceKind::Account)
            .await
            .unwrap()
            .into_lease()
            .expect("fresh lease stays available");
        seen.insert(lease.lease_id);
        pool.release(lease.lease_id).await;
    }
    assert_eq!(seen, HashSet::from([fresh.lease_id]));

    // Only an explicit enable brings it back
    pool.enable(worn.lease_id).await.unwrap();
    pool.disable(fresh.lease_id, Some("rotated out")).await.unwrap();
    let lease = pool
        .acquire("xhs", ResourceKind::Account)
        .await
        .unwrap()
        .into_lease()
        .unwrap();
    assert_eq!(lease.lease_id, worn.lease_id);
    assert_eq!(lease.fail_count, 0);
}

#[tokio::test]
async fn switch_on_captcha_moves_to_another_account() {
    let xhs = ScriptedAdapter::new(
        "xhs",
        vec![
            Step::Fail(AdapterError::http(461, "slide to verify")),
            Step::Items(9),
        ],
    );
    let system = build_system(test_config(), &[xhs.clone()]);
    seed_accounts(&system, "xhs", 2).await;

    let task_id = submit(
        &system,
        TaskRequest::new(["xhs"]).with_strategy(AccountStrategy::RoundRobin),
    )
    .await;
    let task = wait_for_terminal(&system, task_id, WAIT).await;

    assert_eq!(task.status, TaskState::Completed);
    let branch = &task.branch_results["xhs"];
    assert_eq!(branch.switches, 1);
    assert_eq!(branch.attempts, 2);

    let calls = xhs.calls.lock().clone();
    assert_ne!(calls[0].account_id, calls[1].account_id);
    // One close per account the branch stopped using
    assert_eq!(xhs.close_count(), 2);
}

#[tokio::test]
async fn captcha_with_single_account_retries_in_place() {
    let xhs = ScriptedAdapter::new(
        "xhs",
        vec![
            Step::Fail(AdapterError::http(461, "slide to verify")),
            Step::Items(9),
        ],
    );
    let system = build_system(test_config(), &[xhs.clone()]);
    let accounts = seed_accounts(&system, "xhs", 1).await;

    let task_id = submit(&system, TaskRequest::new(["xhs"])).await;
    let task = wait_for_terminal(&system, task_id, WAIT).await;

    assert_eq!(task.status, TaskState::Completed);
    assert_eq!(task.platform_results.get("xhs"), Some(&9));
    let branch = &task.branch_results["xhs"];
    assert_eq!(branch.switches, 0);
    assert_eq!(branch.attempts, 2);

    let calls = xhs.calls.lock().clone();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.account_id == accounts[0].lease_id));
    assert_eq!(system.pool.checked_out_count(), 0);
}

#[tokio::test]
async fn panicking_adapter_releases_leases() {
    let xhs = ScriptedAdapter::always("xhs", Step::Panic("element not found"));
    let dy = ScriptedAdapter::new("dy", vec![Step::Items(2)]);
    let system = build_system(test_config(), &[xhs.clone(), dy]);
    let accounts = seed_accounts(&system, "xhs", 1).await;
    seed_accounts(&system, "dy", 1).await;

    let task_id = submit(&system, TaskRequest::new(["xhs", "dy"])).await;
    let task = wait_for_terminal(&system, task_id, WAIT).await;

    assert_eq!(task.status, TaskState::CompletedWithErrors);
    assert!(task.platform_errors["xhs"].contains("adapter panicked"));
    assert!(xhs.call_count() as u32 <= test_config().retry.max_attempts());
    assert_eq!(system.pool.checked_out_count(), 0);
    assert!(!system.pool.is_checked_out(accounts[0].lease_id));
}
