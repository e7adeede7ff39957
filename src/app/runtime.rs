use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;
use std::time::Duration;

use actix_web::{App, HttpServer, web};

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::db::{LocalReplica, ReplicaConfig, open_connection, run_migrations};
use crate::adapters::sync_auth::{Credentials, SyncAuthClient};
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::services::{CycleWriteDispatcher, ReplicaQueryService};
use crate::domain::invocation_queue::{InvocationQueue, TaskOutcome};
use crate::domain::models::{
    ALL_OBJECTS_QUERY, ALL_OBJECTS_SUBSCRIPTION, OBJECT_TYPE, UserSession,
};

/// Spawns the single consumer of `queue`. It drains whenever tasks arrive and
/// once more after `stop_flag` is raised.
pub fn start_consumer(
    queue: Arc<InvocationQueue>,
    drain_interval: Duration,
    stop_flag: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, AppError> {
    std::thread::Builder::new()
        .name("invocation-queue".to_string())
        .spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                if queue.wait_for_tasks(drain_interval) {
                    drain(&queue);
                }
            }
            drain(&queue);
        })
        .map_err(AppError::runtime)
}

fn drain(queue: &InvocationQueue) {
    let outcomes = queue.invoke_all();
    let failed = outcomes.iter().filter(|outcome| outcome.is_failure()).count();

    for (position, outcome) in outcomes.iter().enumerate() {
        if let TaskOutcome::Failed(error) = outcome {
            tracing::warn!(position, error = %error, "queued task failed");
        }
    }

    tracing::debug!(executed = outcomes.len(), failed, "invocation queue drained");
}

async fn authenticate(config: &AppConfig) -> Result<UserSession, AppError> {
    if config.sync_offline {
        tracing::warn!("sync service login skipped; running with an offline session");
        return Ok(UserSession::offline());
    }

    let client = SyncAuthClient::new(
        &config.sync_base_url,
        Duration::from_millis(config.sync_timeout_ms),
    )
    .map_err(AppError::auth)?;

    let credentials = match &config.sync_api_key {
        Some(key) => Credentials::ApiKey(key.clone()),
        None => Credentials::Anonymous,
    };

    client
        .login(&config.app_id, &credentials)
        .await
        .map_err(AppError::auth)
}

/// Migrates the replica, remembers the session and makes sure the
/// `all_objects` subscription exists.
pub fn prepare_replica(config: &AppConfig, session: UserSession) -> Result<ReplicaConfig, AppError> {
    if let Some(parent) = Path::new(&config.db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(AppError::database_init)?;
    }

    let replica = ReplicaConfig {
        db_path: config.db_path.clone(),
        app_id: config.app_id.clone(),
        session,
    };

    let mut connection = open_connection(&replica.db_path).map_err(AppError::database_init)?;
    run_migrations(&mut connection).map_err(AppError::database_init)?;

    let mut handle = LocalReplica::from_connection(connection);
    handle
        .record_session(&replica)
        .map_err(AppError::database_init)?;
    let created = handle
        .ensure_subscription(ALL_OBJECTS_SUBSCRIPTION, OBJECT_TYPE, ALL_OBJECTS_QUERY)
        .map_err(AppError::database_init)?;

    tracing::info!(
        subscription = ALL_OBJECTS_SUBSCRIPTION,
        created,
        "subscription set ready"
    );

    Ok(replica)
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let system = actix_web::rt::System::new();

    let session = system.block_on(authenticate(&config))?;
    tracing::info!(user_id = %session.user_id, app_id = %config.app_id, "sync session established");

    let replica = prepare_replica(&config, session)?;

    let queue = Arc::new(InvocationQueue::new());
    let stop_flag = Arc::new(AtomicBool::new(false));
    let consumer_handle = start_consumer(
        Arc::clone(&queue),
        Duration::from_millis(config.drain_interval_ms),
        Arc::clone(&stop_flag),
    )?;

    let api_state = ApiState {
        owner_id: config.owner_id,
        cycle_commands: CycleWriteDispatcher::new(Arc::clone(&queue), replica.clone()),
        cycle_queries: ReplicaQueryService::new(replica),
    };
    let ingest_path = config.http_path.clone();

    tracing::info!(bind = %config.http_bind, path = %ingest_path, "http server starting");

    let server_result = system.block_on(async move {
        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(api_state.clone()))
                .configure(|cfg| configure_routes(cfg, &ingest_path))
        })
        .bind(&config.http_bind)?
        .run()
        .await
    });

    stop_flag.store(true, Ordering::Relaxed);
    if consumer_handle.join().is_err() {
        return Err(AppError::runtime("invocation queue consumer panicked"));
    }

    server_result.map_err(AppError::runtime)
}
