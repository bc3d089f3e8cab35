use hub_core::{
    config::LockFallback,
    models::JobStatus,
    traits::{CronJobRepository, TriggerScheduler},
};
use hub_dispatcher::JobRecoveryService;
use hub_infrastructure::{DistributedNameLock, InMemoryCoordinationStore};
use hub_testing_utils::{CronJobBuilder, MockCronJobRepository, MockTriggerScheduler};
use std::sync::Arc;
use std::time::Duration;

async fn seeded_repo() -> Arc<MockCronJobRepository> {
    let repo = Arc::new(MockCronJobRepository::new());
    for name in ["daily", "weekly", "monthly"] {
        repo.create(&CronJobBuilder::new().with_name(name).with_status(JobStatus::Start).build())
            .await
            .unwrap();
    }
    repo.create(&CronJobBuilder::new().with_name("draft").build()).await.unwrap();
    repo
}

fn service(
    repo: Arc<MockCronJobRepository>,
    scheduler: Arc<MockTriggerScheduler>,
    store: &InMemoryCoordinationStore,
    fallback: LockFallback,
) -> JobRecoveryService {
    JobRecoveryService::new(
        repo,
        scheduler,
        DistributedNameLock::new(Arc::new(store.clone()), "hub:"),
        Duration::from_secs(300),
        fallback,
    )
}

#[tokio::test]
async fn test_two_nodes_recover_each_job_once() {
    let repo = seeded_repo().await;
    let store = InMemoryCoordinationStore::new();
    let scheduler_a = Arc::new(MockTriggerScheduler::new());
    let scheduler_b = Arc::new(MockTriggerScheduler::new());
    let node_a = service(repo.clone(), scheduler_a.clone(), &store, LockFallback::Proceed);
    let node_b = service(repo.clone(), scheduler_b.clone(), &store, LockFallback::Proceed);

    let (a, b) = tokio::join!(node_a.recover_started_jobs(), node_b.recover_started_jobs());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.registered.len() + b.registered.len(), 3);
    assert_eq!(a.skipped.len() + b.skipped.len(), 3);
    assert_eq!(scheduler_a.add_count() + scheduler_b.add_count(), 3);
    for id in a.registered.iter() {
        assert!(!b.registered.contains(id));
    }
}

#[tokio::test]
async fn test_failed_registration_marks_job_failed() {
    let repo = seeded_repo().await;
    let store = InMemoryCoordinationStore::new();
    let failing_id = repo.find_by_name(1, "weekly").await.unwrap().unwrap().id;
    let scheduler = Arc::new(MockTriggerScheduler::new().failing_for(failing_id));

    let report = service(repo.clone(), scheduler.clone(), &store, LockFallback::Proceed)
        .recover_started_jobs()
        .await
        .unwrap();

    assert_eq!(report.registered.len(), 2);
    assert_eq!(report.failed.len(), 1);
    let job = repo.get_by_id(failing_id).await.unwrap().unwrap();
    assert_eq!(job.job_status, JobStatus::Failed);
    assert!(job.failure_reason.is_some());
    assert!(!scheduler.contains(failing_id).await);
}

#[tokio::test]
async fn test_unreachable_lock_store_follows_fallback() {
    let repo = seeded_repo().await;
    let store = InMemoryCoordinationStore::new();
    store.set_available(false);

    let scheduler = Arc::new(MockTriggerScheduler::new());
    let report = service(repo.clone(), scheduler.clone(), &store, LockFallback::Reject)
        .recover_started_jobs()
        .await
        .unwrap();
    assert!(report.registered.is_empty());
    assert_eq!(report.skipped.len(), 3);

    let report = service(repo, scheduler.clone(), &store, LockFallback::Proceed)
        .recover_started_jobs()
        .await
        .unwrap();
    assert_eq!(report.registered.len(), 3);
    assert_eq!(scheduler.add_count(), 3);
}
