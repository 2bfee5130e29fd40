//! Startup recovery against a database file that outlives the process

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mintel_common::events::EventBus;
use mintel_ri::config::{ServiceConfig, VendorConfig};
use mintel_ri::db;
use mintel_ri::models::{OnboardingRequest, RunStatus, WorkflowRun};
use mintel_ri::services::{recover_runs, JobQueue, RecoveryReport, WorkerPool, WorkflowOrchestrator};

async fn llm_only_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "{\"executive_summary\":\"Recovered\",\"recommendations\":[]}" } }]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    server
}

fn config_for(base_url: &str) -> ServiceConfig {
    let vendor = VendorConfig {
        api_key: Some("test-key".to_string()),
        base_url: Some(base_url.to_string()),
        ..Default::default()
    };
    let mut config = ServiceConfig::default();
    config.http.backoff_ms = 1;
    config.vendors.openai = vendor.clone();
    config.vendors.perplexity = vendor;
    config
}

async fn seed_profile(pool: &sqlx::SqlitePool, user_id: &str, url: &str) {
    let profile = OnboardingRequest {
        full_name: Some("Jane Doe".to_string()),
        website_url: Some(url.to_string()),
        industry: Some("SaaS".to_string()),
        location: Some("United States".to_string()),
        ..Default::default()
    }
    .into_profile(user_id)
    .unwrap();
    db::profiles::upsert_profile(pool, &profile).await.unwrap();
}

#[tokio::test]
async fn test_restart_requeues_queued_and_fails_running() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("mintel.db");

    // Previous process: one run waiting, one cut off mid-execution
    let (queued, running) = {
        let pool = db::init_database_pool(&db_path).await.unwrap();
        seed_profile(&pool, "user_a", "https://a.example.com").await;

        let queued = WorkflowRun::new("user_a", "https://a.example.com");
        db::runs::insert_run(&pool, &queued).await.unwrap();

        let mut running = WorkflowRun::new("user_b", "https://b.example.com");
        db::runs::insert_run(&pool, &running).await.unwrap();
        running.transition_to(RunStatus::Running).unwrap();
        db::runs::update_run(&pool, &running).await.unwrap();

        pool.close().await;
        (queued, running)
    };

    let server = llm_only_server().await;
    let pool = db::init_database_pool(&db_path).await.unwrap();
    let orchestrator = Arc::new(
        WorkflowOrchestrator::new(pool.clone(), EventBus::new(100), &config_for(&server.uri())).unwrap(),
    );

    let shutdown = CancellationToken::new();
    let (queue, receiver) = JobQueue::new(8);
    let workers = WorkerPool::start(orchestrator, receiver, 2, shutdown.clone());

    let report = recover_runs(&pool, &queue).await.unwrap();
    assert_eq!(report, RecoveryReport { requeued: 1, interrupted: 1 });

    let interrupted = db::runs::load_run(&pool, running.id).await.unwrap().unwrap();
    assert_eq!(interrupted.status, RunStatus::Failed);
    assert!(interrupted.metadata.interrupted);

    let mut finished = None;
    for _ in 0..200 {
        let run = db::runs::load_run(&pool, queued.id).await.unwrap().unwrap();
        if run.is_terminal() {
            finished = Some(run);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let finished = finished.expect("requeued run did not finish");
    assert_eq!(finished.status, RunStatus::Completed);
    assert!(db::reports::load_report(&pool, queued.id).await.unwrap().is_some());

    shutdown.cancel();
    workers.join().await;
}
