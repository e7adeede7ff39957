use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use thiserror::Error;

use crate::domain::models::{CycleRecord, NewCycleRecord, Subscription, UserSession};

pub const LATEST_SCHEMA_VERSION: u32 = 3;

const MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        r#"
CREATE TABLE IF NOT EXISTS iot_objects (
    id TEXT PRIMARY KEY,
    owner_id INTEGER NOT NULL,
    machine_id INTEGER NOT NULL,
    cycle_id INTEGER,
    cycle_start TEXT,
    cycle_end TEXT,
    pay_load INTEGER,
    material_type TEXT,
    dumping_spot TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_iot_objects_created_at_desc
ON iot_objects (created_at DESC);

CREATE INDEX IF NOT EXISTS idx_iot_objects_owner_machine
ON iot_objects (owner_id, machine_id);
"#,
    ),
    (
        2,
        r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    name TEXT PRIMARY KEY,
    object_type TEXT NOT NULL,
    query TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_session (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    app_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#,
    ),
    (
        3,
        r#"
ALTER TABLE sync_session ADD COLUMN device_id TEXT;
"#,
    ),
];

const OBJECT_COLUMNS: &str = "id, owner_id, machine_id, cycle_id, cycle_start, cycle_end, pay_load, material_type, dumping_spot, created_at";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("dumping spot is not a valid JSON array: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("stored timestamp is not valid RFC 3339: {0}")]
    InvalidTimestamp(String),
}

/// Everything needed to open a handle on the local replica. Cheap to clone
/// and shared between request handlers and queued write tasks.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub db_path: String,
    pub app_id: String,
    pub session: UserSession,
}

pub struct LocalReplica {
    connection: Connection,
}

impl LocalReplica {
    pub fn open(config: &ReplicaConfig) -> Result<Self, DbError> {
        Ok(Self {
            connection: open_connection(&config.db_path)?,
        })
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Runs `op` inside one transaction; commits only if `op` succeeds.
    pub fn write<T>(
        &mut self,
        op: impl FnOnce(&Transaction<'_>) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let transaction = self.connection.transaction()?;
        let value = op(&transaction)?;
        transaction.commit()?;
        Ok(value)
    }

    /// Inserts the subscription unless one with the same name exists.
    /// Returns whether a new subscription was created.
    pub fn ensure_subscription(
        &mut self,
        name: &str,
        object_type: &str,
        query: &str,
    ) -> Result<bool, DbError> {
        self.write(|transaction| {
            let inserted = transaction.execute(
                "INSERT OR IGNORE INTO subscriptions (name, object_type, query, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![name, object_type, query, now_iso8601()],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn record_session(&self, config: &ReplicaConfig) -> Result<(), DbError> {
        self.connection.execute(
            "INSERT INTO sync_session (id, app_id, user_id, device_id, updated_at) VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET app_id = excluded.app_id, user_id = excluded.user_id,
                 device_id = excluded.device_id, updated_at = excluded.updated_at",
            params![
                config.app_id,
                config.session.user_id,
                config.session.device_id,
                now_iso8601()
            ],
        )?;
        Ok(())
    }
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

pub fn add_object(
    connection: &Connection,
    new_object: &NewCycleRecord,
) -> Result<CycleRecord, DbError> {
    let record = CycleRecord {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: new_object.owner_id,
        machine_id: new_object.machine_id,
        cycle_id: new_object.cycle_id,
        cycle_start: new_object.cycle_start,
        cycle_end: new_object.cycle_end,
        pay_load: new_object.pay_load,
        material_type: new_object.material_type.clone(),
        dumping_spot: new_object.dumping_spot.clone(),
        created_at: now_iso8601(),
    };

    connection.execute(
        "INSERT INTO iot_objects (id, owner_id, machine_id, cycle_id, cycle_start, cycle_end, pay_load, material_type, dumping_spot, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.id,
            record.owner_id,
            record.machine_id,
            record.cycle_id,
            record.cycle_start.map(timestamp_to_iso8601),
            record.cycle_end.map(timestamp_to_iso8601),
            record.pay_load,
            record.material_type,
            serde_json::to_string(&record.dumping_spot)?,
            record.created_at,
        ],
    )?;

    Ok(record)
}

pub fn get_object(connection: &Connection, id: &str) -> Result<Option<CycleRecord>, DbError> {
    let raw = connection
        .query_row(
            &format!("SELECT {OBJECT_COLUMNS} FROM iot_objects WHERE id = ?1"),
            params![id],
            RawObjectRow::from_row,
        )
        .optional()?;

    raw.map(RawObjectRow::into_record).transpose()
}

pub fn get_latest_object(connection: &Connection) -> Result<Option<CycleRecord>, DbError> {
    Ok(list_objects(connection, 1, 0)?.into_iter().next())
}

pub fn list_objects(
    connection: &Connection,
    limit: u32,
    offset: u32,
) -> Result<Vec<CycleRecord>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {OBJECT_COLUMNS}
         FROM iot_objects
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?1 OFFSET ?2"
    ))?;

    let rows = statement.query_map(
        params![i64::from(limit), i64::from(offset)],
        RawObjectRow::from_row,
    )?;

    let mut objects = Vec::new();
    for row in rows {
        objects.push(row?.into_record()?);
    }

    Ok(objects)
}

pub fn count_objects(connection: &Connection) -> Result<i64, DbError> {
    let count = connection.query_row("SELECT COUNT(*) FROM iot_objects", [], |row| row.get(0))?;
    Ok(count)
}

pub fn list_subscriptions(connection: &Connection) -> Result<Vec<Subscription>, DbError> {
    let mut statement = connection.prepare(
        "SELECT name, object_type, query, created_at FROM subscriptions ORDER BY name ASC",
    )?;

    let rows = statement.query_map([], |row| {
        Ok(Subscription {
            name: row.get(0)?,
            object_type: row.get(1)?,
            query: row.get(2)?,
            created_at: row.get(3)?,
        })
    })?;

    let mut subscriptions = Vec::new();
    for row in rows {
        subscriptions.push(row?);
    }

    Ok(subscriptions)
}

struct RawObjectRow {
    id: String,
    owner_id: i64,
    machine_id: i64,
    cycle_id: Option<i64>,
    cycle_start: Option<String>,
    cycle_end: Option<String>,
    pay_load: Option<i64>,
    material_type: Option<String>,
    dumping_spot: String,
    created_at: String,
}

impl RawObjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            machine_id: row.get(2)?,
            cycle_id: row.get(3)?,
            cycle_start: row.get(4)?,
            cycle_end: row.get(5)?,
            pay_load: row.get(6)?,
            material_type: row.get(7)?,
            dumping_spot: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<CycleRecord, DbError> {
        Ok(CycleRecord {
            id: self.id,
            owner_id: self.owner_id,
            machine_id: self.machine_id,
            cycle_id: self.cycle_id,
            cycle_start: self.cycle_start.as_deref().map(parse_timestamp).transpose()?,
            cycle_end: self.cycle_end.as_deref().map(parse_timestamp).transpose()?,
            pay_load: self.pay_load,
            material_type: self.material_type,
            dumping_spot: serde_json::from_str(&self.dumping_spot)?,
            created_at: self.created_at,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| DbError::InvalidTimestamp(value.to_string()))
}

fn timestamp_to_iso8601(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
