use chrono::{DateTime, TimeZone, Utc};
use sea_orm::DatabaseConnection;
use std::collections::VecDeque;

use crate::config::DatabaseConfig;
use crate::database::{create_pool, run_migrations};
use crate::utils::Chooser;

/// Fresh migrated in-memory SQLite database. A single connection keeps the
/// database alive and serializes every transaction.
pub async fn setup_db() -> DatabaseConnection {
    let pool = create_pool(&DatabaseConfig {
        url: "sqlite::memory:".into(),
        max_connections: 1,
    })
    .await
    .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

/// Migrated SQLite database in a temporary file, shared by several connections
/// so transactions really run side by side. The file goes away on drop.
pub struct FileDb {
    pub pool: DatabaseConnection,
    _dir: tempfile::TempDir,
}

pub async fn setup_file_db(max_connections: u32) -> FileDb {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("referee.db").display()
    );
    let pool = create_pool(&DatabaseConfig {
        url,
        max_connections,
    })
    .await
    .unwrap();
    run_migrations(&pool).await.unwrap();
    FileDb { pool, _dir: dir }
}

pub fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
}

/// Plays back a fixed list of indexes, then keeps answering 0.
pub struct ScriptedChooser {
    script: VecDeque<usize>,
}

impl ScriptedChooser {
    pub fn new(script: impl IntoIterator<Item = usize>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl Chooser for ScriptedChooser {
    fn choose_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.script.pop_front().unwrap_or(0) % len)
    }
}
