use rusqlite::Connection;

/// Applies the shared pragmas. Read-only handles skip the journal settings,
/// which would otherwise need write access to the database file.
pub fn configure_connection(conn: &Connection, read_only: bool) -> rusqlite::Result<()> {
    if read_only {
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;\n\
             PRAGMA query_only = ON;\n\
             PRAGMA temp_store = MEMORY;\n",
        )
    } else {
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;\n\
             PRAGMA journal_mode = WAL;\n\
             PRAGMA synchronous = NORMAL;\n\
             PRAGMA foreign_keys = ON;\n\
             PRAGMA temp_store = MEMORY;\n",
        )
    }
}
