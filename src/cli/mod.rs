pub mod chat;
pub mod doctor;
pub mod export;
pub mod memories;
pub mod reset;
pub mod stats;

use anyhow::Result;
use rusqlite::Connection;

use kindred::config::KindredConfig;

/// Open the configured database, creating and migrating it if needed.
fn open_db(config: &KindredConfig) -> Result<Connection> {
    kindred::db::open_database(config.resolved_db_path())
}
