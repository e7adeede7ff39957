use std::path::Path;

use restdemo::adapters::db::{
    LATEST_SCHEMA_VERSION, LocalReplica, list_subscriptions, open_connection, run_migrations,
    schema_version,
};
use restdemo::domain::models::{ALL_OBJECTS_QUERY, ALL_OBJECTS_SUBSCRIPTION, OBJECT_TYPE};

fn main() {
    if let Err(error) = run() {
        eprintln!("failed to create test db: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut path = "./target/testdb/restdemo_template.db".to_string();
    let mut force = false;
    let mut subscribe = false;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--path" => {
                let Some(value) = args.get(index + 1) else {
                    return Err("--path requires a value".to_string());
                };
                path = value.clone();
                index += 2;
            }
            "--force" => {
                force = true;
                index += 1;
            }
            "--subscribe" => {
                subscribe = true;
                index += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    let path_ref = Path::new(&path);
    if let Some(parent) = path_ref.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|error| format!("failed to create parent directory: {error}"))?;
    }

    if force && path_ref.exists() {
        std::fs::remove_file(path_ref)
            .map_err(|error| format!("failed to remove existing db file: {error}"))?;
    }

    let mut connection = open_connection(&path).map_err(|error| error.to_string())?;
    run_migrations(&mut connection).map_err(|error| error.to_string())?;
    let version = schema_version(&connection).map_err(|error| error.to_string())?;

    let mut replica = LocalReplica::from_connection(connection);
    if subscribe {
        replica
            .ensure_subscription(ALL_OBJECTS_SUBSCRIPTION, OBJECT_TYPE, ALL_OBJECTS_QUERY)
            .map_err(|error| error.to_string())?;
    }
    let subscriptions =
        list_subscriptions(replica.connection()).map_err(|error| error.to_string())?;

    println!("created/updated replica db at: {path}");
    println!("schema version: {version} (latest {LATEST_SCHEMA_VERSION})");
    println!("subscriptions: {}", subscriptions.len());
    Ok(())
}

fn print_help() {
    println!("create_test_db");
    println!();
    println!("Creates or migrates a local replica database file.");
    println!();
    println!("Usage:");
    println!("  cargo run --bin create_test_db -- [--path <file>] [--force] [--subscribe]");
    println!();
    println!("Options:");
    println!("  --path <file>   target sqlite file (default: ./target/testdb/restdemo_template.db)");
    println!("  --force         delete existing file before creating");
    println!("  --subscribe     add the all_objects subscription");
}
