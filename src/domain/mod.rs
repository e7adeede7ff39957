pub mod cycle_payload;
pub mod invocation_queue;
pub mod models;
