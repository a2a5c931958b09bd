use std::sync::Once;

use graphcore_db::column::{ColumnSchema, LogicalType};
use graphcore_db::config::DatabaseConfig;
use graphcore_db::database::Database;

static LOG_INIT: Once = Once::new();

pub fn init_logging() {
    LOG_INIT.call_once(graphcore_db::logging::init_log);
}

/// A fresh on-disk database in a temp directory, with a `Person(id, name)`
/// node table and a `Knows(weight)` rel table already registered — the
/// fixture shared by the end-to-end scenarios in spec §8.
pub fn open_fixture_db() -> (tempfile::TempDir, Database) {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path(), DatabaseConfig::default()).unwrap();
    db.create_node_table(
        "Person",
        vec![
            ColumnSchema { name: "id".into(), logical_type: LogicalType::Int64, nullable: false },
            ColumnSchema { name: "name".into(), logical_type: LogicalType::String, nullable: true },
        ],
        0,
    )
    .unwrap();
    db.create_rel_table("Knows", "Person", "Person", vec!["weight".into()]).unwrap();
    (dir, db)
}
