use std::sync::Arc;

use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::adapters::db;
use crate::adapters::db::{DbError, LocalReplica, ReplicaConfig};
use crate::domain::invocation_queue::{InvocationQueue, TaskError};
use crate::domain::models::{CycleRecord, NewCycleRecord, Subscription};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
    #[error("write task was dropped before it completed")]
    DispatchDropped,
}

type WriteResult = Result<Vec<CycleRecord>, ServiceError>;

/// Resolves once the queued write for one request has run.
#[must_use = "a ticket does nothing unless awaited"]
pub struct WriteTicket {
    receiver: oneshot::Receiver<WriteResult>,
}

impl WriteTicket {
    fn ready(result: WriteResult) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(result);
        Self { receiver }
    }

    pub async fn wait(self) -> WriteResult {
        self.receiver
            .await
            .unwrap_or(Err(ServiceError::DispatchDropped))
    }
}

pub trait CycleCommandHandler {
    fn submit(&self, records: Vec<NewCycleRecord>) -> WriteTicket;
    fn pending_writes(&self) -> usize;
}

pub trait CycleQueryHandler {
    fn get_schema_version(&self) -> Result<u32, ServiceError>;
    fn count_objects(&self) -> Result<i64, ServiceError>;
    fn get_latest_object(&self) -> Result<Option<CycleRecord>, ServiceError>;
    fn list_subscriptions(&self) -> Result<Vec<Subscription>, ServiceError>;
}

/// Queues each request's records as one transactional write on the
/// invocation queue; the consumer thread performs it.
#[derive(Clone)]
pub struct CycleWriteDispatcher {
    queue: Arc<InvocationQueue>,
    replica: ReplicaConfig,
}

impl CycleWriteDispatcher {
    pub fn new(queue: Arc<InvocationQueue>, replica: ReplicaConfig) -> Self {
        Self { queue, replica }
    }
}

impl CycleCommandHandler for CycleWriteDispatcher {
    fn submit(&self, records: Vec<NewCycleRecord>) -> WriteTicket {
        if records.is_empty() {
            return WriteTicket::ready(Ok(Vec::new()));
        }

        let (sender, receiver) = oneshot::channel();
        let replica = self.replica.clone();

        self.queue.push(move || {
            let result = write_batch(&replica, &records);
            let outcome = match &result {
                Ok(stored) => {
                    tracing::debug!(count = stored.len(), "cycle records written");
                    Ok(())
                }
                Err(error) => Err(TaskError::failed(error)),
            };

            if sender.send(result).is_err() {
                tracing::debug!("write ticket dropped before completion");
            }
            outcome
        });

        WriteTicket { receiver }
    }

    fn pending_writes(&self) -> usize {
        self.queue.len()
    }
}

fn write_batch(replica: &ReplicaConfig, records: &[NewCycleRecord]) -> WriteResult {
    let mut handle = LocalReplica::open(replica)?;
    let stored = handle.write(|transaction| {
        records
            .iter()
            .map(|record| db::add_object(transaction, record))
            .collect::<Result<Vec<_>, _>>()
    })?;
    Ok(stored)
}

#[derive(Clone)]
pub struct ReplicaQueryService {
    replica: ReplicaConfig,
}

impl ReplicaQueryService {
    pub fn new(replica: ReplicaConfig) -> Self {
        Self { replica }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let handle = LocalReplica::open(&self.replica)?;
        op(handle.connection()).map_err(ServiceError::from)
    }
}

impl CycleQueryHandler for ReplicaQueryService {
    fn get_schema_version(&self) -> Result<u32, ServiceError> {
        self.with_connection(db::schema_version)
    }

    fn count_objects(&self) -> Result<i64, ServiceError> {
        self.with_connection(db::count_objects)
    }

    fn get_latest_object(&self) -> Result<Option<CycleRecord>, ServiceError> {
        self.with_connection(db::get_latest_object)
    }

    fn list_subscriptions(&self) -> Result<Vec<Subscription>, ServiceError> {
        self.with_connection(db::list_subscriptions)
    }
}
