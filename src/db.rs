use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "raport.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    // References between records are by id only; the store does not enforce
    // them and deletes never cascade.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            student_number TEXT NOT NULL,
            class_name TEXT NOT NULL,
            gender TEXT,
            birth_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kkm REAL NOT NULL DEFAULT 70,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS weights(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            class_name TEXT,
            class_scope TEXT NOT NULL DEFAULT '',
            tugas REAL NOT NULL,
            kuis REAL NOT NULL,
            uts REAL NOT NULL,
            uas REAL NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    ensure_weights_class_scope(conn)?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_weights_scope ON weights(subject_id, class_scope)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            type TEXT NOT NULL,
            value REAL NOT NULL,
            note TEXT,
            date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_student_subject_type
         ON scores(student_id, subject_id, type)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_subject ON scores(subject_id)",
        [],
    )?;

    Ok(())
}

fn ensure_weights_class_scope(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "weights", "class_scope")? {
        return Ok(());
    }

    // Workspaces written before the scope index may hold several weights for
    // one (subject, class) pair. The last written one wins.
    conn.execute(
        "ALTER TABLE weights ADD COLUMN class_scope TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    conn.execute(
        "UPDATE weights SET class_scope = COALESCE(class_name, '')",
        [],
    )?;
    conn.execute(
        "DELETE FROM weights
         WHERE rowid NOT IN (
           SELECT MAX(rowid) FROM weights GROUP BY subject_id, class_scope
         )",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn table_names(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
