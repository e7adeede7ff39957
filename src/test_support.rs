use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::adapters::db::{ReplicaConfig, open_connection, run_migrations};
use crate::domain::models::UserSession;

/// Same file `create_test_db` writes by default.
const TEMPLATE_DB_PATH: &str = "./target/testdb/restdemo_template.db";

/// Replica config backed by a private copy of the migrated template, so tests
/// never share a database file.
pub fn test_replica_config(test_name: &str) -> ReplicaConfig {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let db_path = dir.path().join(format!("{test_name}.sqlite"));
    // The replica is reopened by queued tasks after this returns.
    std::mem::forget(dir);

    std::fs::copy(migrated_template(), &db_path).expect("template db should be copied");

    ReplicaConfig {
        db_path: db_path.to_string_lossy().into_owned(),
        app_id: "test-app".to_string(),
        session: UserSession::offline(),
    }
}

fn migrated_template() -> &'static Path {
    static TEMPLATE: OnceLock<PathBuf> = OnceLock::new();

    TEMPLATE.get_or_init(|| {
        let path = PathBuf::from(TEMPLATE_DB_PATH);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("template dir should be creatable");
        }

        let mut connection =
            open_connection(TEMPLATE_DB_PATH).expect("template db should open");
        run_migrations(&mut connection).expect("template migrations should succeed");
        path
    })
}
