pub mod api;
pub mod db;
pub mod sync_auth;
