use rusqlite::Connection;
use std::path::Path;
use uuid::Uuid;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("sis.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculties(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS programs(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS statuses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            ord INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS records(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            fullname TEXT,
            birthday TEXT,
            gender TEXT,
            class_year INTEGER,
            address TEXT,
            phone TEXT UNIQUE,
            faculty_id TEXT,
            program_id TEXT,
            status_id TEXT,
            role TEXT NOT NULL,
            password_hash TEXT,
            refresh_token TEXT,
            otp TEXT,
            otp_expiry TEXT,
            updated_at TEXT,
            FOREIGN KEY(faculty_id) REFERENCES faculties(id),
            FOREIGN KEY(program_id) REFERENCES programs(id),
            FOREIGN KEY(status_id) REFERENCES statuses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_status ON records(status_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_faculty ON records(faculty_id)",
        [],
    )?;

    // Workspaces created before the OTP flow shipped lack these columns.
    ensure_records_otp_columns(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    seed_defaults(&conn)?;

    Ok(conn)
}

/// Seed the reference collections and settings. Insert-if-absent by name,
/// so reopening a workspace never duplicates or overwrites admin edits.
fn seed_defaults(conn: &Connection) -> anyhow::Result<()> {
    const FACULTIES: [&str; 4] = ["Law", "Business English", "Japanese", "French"];
    const PROGRAMS: [&str; 3] = ["Formal", "High Quality", "Advanced"];
    const STATUSES: [(&str, i64); 4] = [
        ("Unassigned", 1),
        ("Active", 2),
        ("Graduated", 3),
        ("Withdrawn", 4),
    ];

    for name in FACULTIES {
        conn.execute(
            "INSERT INTO faculties(id, name) VALUES(?, ?) ON CONFLICT(name) DO NOTHING",
            (Uuid::new_v4().to_string(), name),
        )?;
    }
    for name in PROGRAMS {
        conn.execute(
            "INSERT INTO programs(id, name) VALUES(?, ?) ON CONFLICT(name) DO NOTHING",
            (Uuid::new_v4().to_string(), name),
        )?;
    }
    for (name, ord) in STATUSES {
        conn.execute(
            "INSERT INTO statuses(id, name, ord) VALUES(?, ?, ?) ON CONFLICT(name) DO NOTHING",
            (Uuid::new_v4().to_string(), name, ord),
        )?;
    }

    settings_set_default(conn, "email_suffix", "@student.example.edu")?;
    settings_set_default(conn, "phone_prefix", "+84")?;

    Ok(())
}

fn settings_set_default(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?) ON CONFLICT(key) DO NOTHING",
        (key, value),
    )?;
    Ok(())
}

pub fn settings_load(conn: &Connection) -> anyhow::Result<crate::model::Settings> {
    Ok(crate::model::Settings {
        email_suffix: settings_get(conn, "email_suffix")?.unwrap_or_default(),
        phone_prefix: settings_get(conn, "phone_prefix")?.unwrap_or_default(),
    })
}

pub fn settings_get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    use rusqlite::OptionalExtension;
    let v = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get::<_, String>(0)
        })
        .optional()?;
    Ok(v)
}

pub fn settings_set(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value),
    )?;
    Ok(())
}

fn ensure_records_otp_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "records", "otp")? {
        conn.execute("ALTER TABLE records ADD COLUMN otp TEXT", [])?;
    }
    if !table_has_column(conn, "records", "otp_expiry")? {
        conn.execute("ALTER TABLE records ADD COLUMN otp_expiry TEXT", [])?;
    }
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
