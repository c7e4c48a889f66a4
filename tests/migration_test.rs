mod helpers;

use kindred::db::migrations::{
    get_schema_version, has_status_column, run_migrations, CURRENT_SCHEMA_VERSION,
};
use kindred::db::schema::init_schema;
use kindred::memory::store::recent_turns;
use kindred::memory::types::TurnStatus;
use rusqlite::Connection;

#[test]
fn fresh_db_is_at_current_version() {
    let conn = helpers::test_db();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert!(has_status_column(&conn).unwrap());
}

#[test]
fn migrations_are_idempotent() {
    let mut conn = helpers::test_db();
    run_migrations(&mut conn).unwrap();
    run_migrations(&mut conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn v1_rows_upgrade_as_complete_turns() {
    let mut conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), 1);
    assert!(!has_status_column(&conn).unwrap());

    conn.execute(
        "INSERT INTO conversations (user_id, input, response, ts, context) \
         VALUES ('alex', 'hi', 'hello', '2024-01-01T00:00:00.000000Z', NULL)",
        [],
    )
    .unwrap();

    run_migrations(&mut conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);

    let turns = recent_turns(&conn, "alex", 0).unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].status, TurnStatus::Complete);
    assert_eq!(turns[0].response, "hello");
}
