use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use serde_json::Value;

use crate::app::services::{
    CycleCommandHandler, CycleQueryHandler, CycleWriteDispatcher, ReplicaQueryService,
    ServiceError,
};
use crate::domain::cycle_payload::map_payload;
use crate::domain::models::CycleRecord;

/// Upper bound on a collected ingest body. Larger bodies are dropped with a warning.
pub const MAX_INGEST_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct ApiState {
    pub owner_id: i64,
    pub cycle_commands: CycleWriteDispatcher,
    pub cycle_queries: ReplicaQueryService,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsDbResponse {
    pub schema_version: u32,
    pub objects_count: i64,
    pub pending_tasks: usize,
    pub subscriptions: Vec<String>,
    pub latest_object: Option<CycleRecord>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, ingest_path: &str) {
    cfg.service(health)
        .service(get_db_diagnostics_endpoint)
        .service(web::resource(ingest_path).route(web::put().to(put_cycles_endpoint)));
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Always answers `200 {}`; problems with the body or the write are only logged.
async fn put_cycles_endpoint(state: web::Data<ApiState>, payload: web::Payload) -> HttpResponse {
    match payload.to_bytes_limited(MAX_INGEST_BODY_BYTES).await {
        Ok(Ok(body)) => ingest_body(&state, &body).await,
        Ok(Err(error)) => {
            tracing::warn!(error = %error, "failed to read request body");
        }
        Err(_) => {
            tracing::warn!(
                limit = MAX_INGEST_BODY_BYTES,
                "request body exceeds the ingest limit"
            );
        }
    }

    HttpResponse::Ok().json(serde_json::json!({}))
}

async fn ingest_body(state: &ApiState, body: &[u8]) {
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(error = %error, bytes = body.len(), "request body is not valid JSON");
                return;
            }
        }
    };

    let batch = map_payload(&payload, state.owner_id);
    for (index, error) in &batch.rejected {
        tracing::warn!(index, error = %error, "rejected cycle record");
    }

    if batch.records.is_empty() {
        return;
    }

    match state.cycle_commands.submit(batch.records).wait().await {
        Ok(stored) => {
            tracing::info!(
                count = stored.len(),
                rejected = batch.rejected.len(),
                "cycle records stored"
            );
        }
        Err(error) => {
            tracing::error!(error = %error, "failed to store cycle records");
        }
    }
}

#[get("/diagnostics/db")]
async fn get_db_diagnostics_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let schema_version = match state.cycle_queries.get_schema_version() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let objects_count = match state.cycle_queries.count_objects() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let subscriptions = match state.cycle_queries.list_subscriptions() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let latest_object = match state.cycle_queries.get_latest_object() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };

    HttpResponse::Ok().json(DiagnosticsDbResponse {
        schema_version,
        objects_count,
        pending_tasks: state.cycle_commands.pending_writes(),
        subscriptions: subscriptions
            .into_iter()
            .map(|subscription| subscription.name)
            .collect(),
        latest_object,
    })
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::Database(error) => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("database query failed: {error}")
            }))
        }
        ServiceError::DispatchDropped => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "write task was dropped"
            }))
        }
    }
}
