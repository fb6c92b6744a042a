//! Shared fixtures for integration tests: collection builders and SQLite
//! helpers for inspecting merged stores.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use serde_json::json;

use simbatch::manifest::MANIFEST_FILE_NAME;

/// Write a job directory with a canonical manifest declaring a single
/// database output at `results.db` merged into `targets`.
pub fn write_job(
    root: &Path,
    name: &str,
    command: &str,
    geometry: &str,
    targets: &[&str],
) -> PathBuf {
    write_job_with_output(root, name, command, geometry, "results.db", targets)
}

/// Same as [`write_job`] with an explicit output path.
pub fn write_job_with_output(
    root: &Path,
    name: &str,
    command: &str,
    geometry: &str,
    output: &str,
    targets: &[&str],
) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    let manifest = json!({
        "command": command,
        "geometry": geometry,
        "outputs": [
            {"path": output, "type": "database", "targets": targets}
        ],
    });
    fs::write(dir.join(MANIFEST_FILE_NAME), manifest.to_string()).unwrap();
    dir
}

/// Seed a job's output database with a two-column table and `rows` rows.
pub fn seed_output_db(path: &Path, table: &str, rows: &[(i64, f64)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(&format!(
        "CREATE TABLE \"{table}\" (step INTEGER NOT NULL, value REAL NOT NULL)"
    ))
    .unwrap();
    for (step, value) in rows {
        conn.execute(
            &format!("INSERT INTO \"{table}\" (step, value) VALUES (?1, ?2)"),
            params![step, value],
        )
        .unwrap();
    }
}

/// Names of all user tables inside a store, sorted.
pub fn table_names(store: &Path) -> Vec<String> {
    let conn = Connection::open(store).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .unwrap();
    let names = stmt
        .query_map(params![], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    names
}

/// Row count of one table inside a store.
pub fn count_rows(store: &Path, table: &str) -> i64 {
    let conn = Connection::open(store).unwrap();
    conn.query_row(
        &format!("SELECT COUNT(*) FROM \"{table}\""),
        params![],
        |row| row.get(0),
    )
    .unwrap()
}

/// Distinct geometry tags present in one table, sorted.
pub fn geometries(store: &Path, table: &str) -> Vec<String> {
    let conn = Connection::open(store).unwrap();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT DISTINCT geometry FROM \"{table}\" ORDER BY geometry"
        ))
        .unwrap();
    let values = stmt
        .query_map(params![], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    values
}

/// Number of columns named `geometry` in one table of a store.
pub fn geometry_column_count(store: &Path, table: &str) -> usize {
    let conn = Connection::open(store).unwrap();
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info(\"{table}\")"))
        .unwrap();
    let names = stmt
        .query_map(params![], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    names.iter().filter(|name| *name == "geometry").count()
}
