//! Integration tests for the job store contract.
//!
//! The memory store tests run everywhere. The PostgreSQL tests need a live
//! database via `DATABASE_URL` and run with `cargo test -- --ignored`.

use chrono::{Duration, Utc};
use gas_core::events::SubmissionEvent;
use gas_core::job::{Completion, JobRecord, JobStatus, Transition};
use gas_db::{Claim, JobStore, MemoryJobStore, PgJobStore, StoreError};
use rand::Rng;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn pending(job_id: &str) -> JobRecord {
    let event = SubmissionEvent {
        job_id: job_id.into(),
        user_id: "u1".into(),
        user_name: "Ada".into(),
        user_email: "ada@example.com".into(),
        user_role: "free_user".into(),
        input_file_name: "sample.vcf".into(),
        s3_inputs_bucket: "in-bkt".into(),
        s3_key_input_file: format!("u1/{job_id}~sample.vcf"),
    };
    JobRecord::pending(&event, Utc::now())
}

fn completion(job_id: &str) -> Completion {
    Completion {
        complete_time: Utc::now(),
        result_bucket: "gas-results".into(),
        result_key: format!("u1/{job_id}/sample.annot.vcf"),
        log_key: format!("u1/{job_id}/sample.vcf.count.log"),
    }
}

fn claim(owner: &str, lease_secs: Option<i64>) -> Claim {
    Claim {
        owner: owner.into(),
        lease_expires_at: lease_secs.map(|s| Utc::now() + Duration::seconds(s)),
    }
}

/// Race `contenders` claims for one job, each after a random number of
/// scheduler yields, and return how many won.
async fn race_claims<S>(store: S, job_id: &str, contenders: usize) -> usize
where
    S: JobStore + Clone + 'static,
{
    let delays: Vec<u32> = {
        let mut rng = rand::rng();
        (0..contenders).map(|_| rng.random_range(0..8)).collect()
    };

    let mut handles = Vec::with_capacity(contenders);
    for (i, yields) in delays.into_iter().enumerate() {
        let store = store.clone();
        let job_id = job_id.to_string();
        handles.push(tokio::spawn(async move {
            for _ in 0..yields {
                tokio::task::yield_now().await;
            }
            store
                .claim(&job_id, &claim(&format!("attempt-{i}"), Some(300)))
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_applied() {
            winners += 1;
        }
    }
    winners
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_exactly_one_winner() {
    for round in 0..50 {
        let store = MemoryJobStore::new();
        let job_id = format!("J{round}");
        store.create(&pending(&job_id)).await.unwrap();

        let contenders = rand::rng().random_range(2..12);
        let winners = race_claims(store.clone(), &job_id, contenders).await;
        assert_eq!(winners, 1, "round {round} with {contenders} contenders");

        let record = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(record.attempts, 1);
    }
}

#[tokio::test]
async fn status_never_moves_backwards() {
    let store = MemoryJobStore::new();
    store.create(&pending("J1")).await.unwrap();
    store.claim("J1", &claim("a", None)).await.unwrap();
    store.complete("J1", "a", &completion("J1")).await.unwrap();

    let again = store.claim("J1", &claim("b", None)).await.unwrap();
    assert_eq!(
        again,
        Transition::Contended {
            observed: Some(JobStatus::Completed)
        }
    );
    let record = store.get("J1").await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.is_consistent());
}

// ---------------------------------------------------------------------------
// PostgreSQL store
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn pg_bootstrap(pool: PgPool) {
    gas_db::health_check(&pool).await.unwrap();
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM annotation_jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn pg_create_and_get(pool: PgPool) {
    let store = PgJobStore::new(pool);
    store.create(&pending("J1")).await.unwrap();

    let record = store.get("J1").await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.input_key, "u1/J1~sample.vcf");
    assert!(store.get("missing").await.unwrap().is_none());

    let dup = store.create(&pending("J1")).await;
    assert!(matches!(dup, Err(StoreError::AlreadyExists(id)) if id == "J1"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn pg_concurrent_claims_have_exactly_one_winner(pool: PgPool) {
    let store = PgJobStore::new(pool);
    store.create(&pending("J1")).await.unwrap();
    let winners = race_claims(store.clone(), "J1", 8).await;
    assert_eq!(winners, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn pg_complete_writes_all_fields_atomically(pool: PgPool) {
    let store = PgJobStore::new(pool);
    store.create(&pending("J1")).await.unwrap();
    store.claim("J1", &claim("a", Some(300))).await.unwrap();

    let stale = store.complete("J1", "b", &completion("J1")).await.unwrap();
    assert!(!stale.is_applied());

    let done = store.complete("J1", "a", &completion("J1")).await.unwrap();
    let Transition::Applied(record) = done else {
        panic!("completion by the lease owner must apply");
    };
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(
        record.completion.as_ref().map(|c| c.result_key.as_str()),
        Some("u1/J1/sample.annot.vcf")
    );
    assert!(record.lease_expires_at.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn pg_expired_lease_can_be_released_and_reclaimed(pool: PgPool) {
    let store = PgJobStore::new(pool);
    store.create(&pending("J1")).await.unwrap();
    store.claim("J1", &claim("a", Some(-5))).await.unwrap();

    let now = Utc::now();
    let expired = store.list_expired_leases(now).await.unwrap();
    assert_eq!(expired.len(), 1);

    assert!(store.release_expired("J1", "a", now).await.unwrap().is_applied());
    assert!(!store.renew_lease("J1", "a", now).await.unwrap());

    let reclaimed = store.claim("J1", &claim("b", Some(300))).await.unwrap();
    let Transition::Applied(record) = reclaimed else {
        panic!("released job must be claimable");
    };
    assert_eq!(record.attempts, 2);
    assert_eq!(record.lease_owner.as_deref(), Some("b"));

    let stuck = store
        .list_stuck(Utc::now() - Duration::hours(1), Utc::now())
        .await
        .unwrap();
    assert!(stuck.is_empty());
}
