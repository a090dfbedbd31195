use std::sync::Arc;

use actix_web::{HttpResponse, Responder, get, web};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::correlator::CallbackCorrelator;
use crate::dispatcher::TaskDispatcher;
use crate::registry::{ValidatorRegistry, ValidatorSummary};
use crate::stats::UptimeSummary;
use crate::store::TickReader;

const DEFAULT_SUMMARY_LIMIT: usize = 100;
const MAX_SUMMARY_LIMIT: usize = 10_000;

/// Shared handles the read-only routes look into
#[derive(Clone)]
pub struct StatusState {
    pub registry: Arc<ValidatorRegistry>,
    pub correlator: Arc<CallbackCorrelator>,
    pub dispatcher: Arc<TaskDispatcher>,
    pub ticks: Arc<dyn TickReader>,
}

#[derive(Debug, Serialize)]
struct HubStatus {
    validators: Vec<ValidatorSummary>,
    pending_tasks: usize,
    rounds_completed: u64,
}

#[derive(Debug, Deserialize)]
struct SummaryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct TargetSummary {
    target_id: Uuid,
    #[serde(flatten)]
    summary: UptimeSummary,
}

#[get("/status")]
pub async fn status_route(state: web::Data<StatusState>) -> impl Responder {
    HttpResponse::Ok().json(HubStatus {
        validators: state.registry.summaries().await,
        pending_tasks: state.correlator.len().await,
        rounds_completed: state.dispatcher.rounds_completed(),
    })
}

#[get("/targets/{id}/summary")]
pub async fn target_summary_route(
    state: web::Data<StatusState>,
    path: web::Path<Uuid>,
    query: web::Query<SummaryQuery>,
) -> impl Responder {
    let target_id = path.into_inner();
    let limit = query.limit.unwrap_or(DEFAULT_SUMMARY_LIMIT).clamp(1, MAX_SUMMARY_LIMIT);

    match state.ticks.recent_ticks(target_id, limit).await {
        Ok(ticks) => HttpResponse::Ok().json(TargetSummary {
            target_id,
            summary: UptimeSummary::from_ticks(&ticks),
        }),
        Err(e) => {
            warn!("Failed to load ticks for {}: {:#}", target_id, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::entry;
    use crate::store::{MemoryStore, MonitoredTarget, NewTick, ResultSink};
    use actix_web::{App, test};
    use guardian_proto::TickStatus;
    use guardian_proto::crypto::generate_keypair;
    use std::time::{Duration, SystemTime};

    fn state(store: Arc<MemoryStore>, registry: Arc<ValidatorRegistry>) -> StatusState {
        let correlator = Arc::new(CallbackCorrelator::new());
        let dispatcher = Arc::new(TaskDispatcher::new(
            store.clone(),
            registry.clone(),
            correlator.clone(),
            Duration::from_secs(30),
        ));
        StatusState { registry, correlator, dispatcher, ticks: store }
    }

    #[actix_web::test]
    async fn test_health() {
        let store = Arc::new(MemoryStore::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(store, Arc::new(ValidatorRegistry::new()))))
                .configure(crate::routes::routes),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_status_lists_validators() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ValidatorRegistry::new());
        let key = generate_keypair().public_key();
        let (v, _rx) = entry(key);
        registry.admit(v).await;

        let app = test::init_service(
            App::new().app_data(web::Data::new(state(store, registry))).configure(crate::routes::routes),
        )
        .await;

        let body: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/status").to_request()).await;

        assert_eq!(body["validators"].as_array().unwrap().len(), 1);
        assert_eq!(body["validators"][0]["public_key"], key.to_hex());
        assert_eq!(body["pending_tasks"], 0);
        assert_eq!(body["rounds_completed"], 0);
    }

    #[actix_web::test]
    async fn test_target_summary() {
        let target = MonitoredTarget::new("https://a.example", "acct");
        let store = Arc::new(MemoryStore::with_targets(vec![target.clone()]));

        for (status, latency) in [(TickStatus::Good, 100), (TickStatus::Good, 200), (TickStatus::Bad, 0)] {
            store
                .record(NewTick {
                    validator_id: Uuid::new_v4(),
                    target_id: target.id,
                    status,
                    latency_ms: latency,
                    status_code: 200,
                    timestamp: SystemTime::now(),
                })
                .await
                .unwrap();
        }

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(store, Arc::new(ValidatorRegistry::new()))))
                .configure(crate::routes::routes),
        )
        .await;

        let uri = format!("/targets/{}/summary?limit=2", target.id);
        let body: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri(&uri).to_request()).await;

        assert_eq!(body["samples"], 2);
        assert_eq!(body["uptime_percent"], 50);
        assert_eq!(body["latest"], "Bad");
        assert_eq!(body["distribution"]["good"], 1);
    }

    #[actix_web::test]
    async fn test_unknown_target_has_empty_summary() {
        let store = Arc::new(MemoryStore::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(store, Arc::new(ValidatorRegistry::new()))))
                .configure(crate::routes::routes),
        )
        .await;

        let uri = format!("/targets/{}/summary", Uuid::new_v4());
        let body: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri(&uri).to_request()).await;

        assert_eq!(body["samples"], 0);
        assert_eq!(body["uptime_percent"], 0);
        assert!(body["average_latency_ms"].is_null());
    }
}
