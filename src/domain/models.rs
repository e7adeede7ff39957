use chrono::{DateTime, Utc};
use serde::Serialize;

pub const OBJECT_TYPE: &str = "IoTObject";
pub const ALL_OBJECTS_SUBSCRIPTION: &str = "all_objects";
pub const ALL_OBJECTS_QUERY: &str = "TRUEPREDICATE";

#[derive(Debug, Clone, PartialEq)]
pub struct NewCycleRecord {
    pub owner_id: i64,
    pub machine_id: i64,
    pub cycle_id: Option<i64>,
    pub cycle_start: Option<DateTime<Utc>>,
    pub cycle_end: Option<DateTime<Utc>>,
    pub pay_load: Option<i64>,
    pub material_type: Option<String>,
    pub dumping_spot: Vec<f64>,
}

impl NewCycleRecord {
    pub fn new(owner_id: i64, machine_id: i64) -> Self {
        Self {
            owner_id,
            machine_id,
            cycle_id: None,
            cycle_start: None,
            cycle_end: None,
            pay_load: None,
            material_type: None,
            dumping_spot: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    pub id: String,
    pub owner_id: i64,
    pub machine_id: i64,
    pub cycle_id: Option<i64>,
    pub cycle_start: Option<DateTime<Utc>>,
    pub cycle_end: Option<DateTime<Utc>>,
    pub pay_load: Option<i64>,
    pub material_type: Option<String>,
    pub dumping_spot: Vec<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub name: String,
    pub object_type: String,
    pub query: String,
    pub created_at: String,
}

/// Session handed out by the sync service; backs every replica handle.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSession {
    pub user_id: String,
    pub device_id: Option<String>,
}

impl UserSession {
    pub fn offline() -> Self {
        Self {
            user_id: "offline".to_string(),
            device_id: None,
        }
    }
}
