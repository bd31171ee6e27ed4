//! Bulk import/export of records as flat rows: reference ids replaced by
//! their names, secrets never included. Two wire formats, a JSON array of
//! flat objects and header-first CSV, selected by mime type on import.

use crate::attrs;
use crate::error::SisError;
use crate::model::{AttrKind, Gender, Role};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIME_JSON: &str = "application/json";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_EXCEL_CSV: &str = "application/vnd.ms-excel";

/// Spreadsheets coerce bare digit runs to numbers and drop leading zeros
/// and plus prefixes; exported phone values carry this marker to stay text.
const PHONE_TEXT_MARKER: char = '\'';

const CSV_HEADER: [&str; 12] = [
    "username",
    "email",
    "fullname",
    "birthday",
    "gender",
    "classYear",
    "address",
    "phone",
    "faculty",
    "program",
    "status",
    "role",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRecord {
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_year: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faculty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

fn non_empty_trimmed(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn strip_phone_marker(s: &str) -> String {
    s.strip_prefix(PHONE_TEXT_MARKER).unwrap_or(s).to_string()
}

/// Parse an uploaded file into flat rows. Exactly two mime types are
/// recognised; anything else, or an empty payload, is rejected.
pub fn parse_upload(mime: &str, text: &str) -> Result<Vec<FlatRecord>, SisError> {
    if text.trim().is_empty() {
        return Err(SisError::BadInput("upload is empty".to_string()));
    }
    match mime {
        MIME_JSON => serde_json::from_str::<Vec<FlatRecord>>(text)
            .map_err(|e| SisError::BadInput(format!("invalid JSON upload: {}", e))),
        MIME_CSV | MIME_EXCEL_CSV => parse_csv_upload(text),
        other => Err(SisError::BadInput(format!(
            "unsupported mime type '{}'",
            other
        ))),
    }
}

fn parse_csv_upload(text: &str) -> Result<Vec<FlatRecord>, SisError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return Err(SisError::BadInput("upload is empty".to_string()));
    };

    let header: Vec<String> = parse_csv_record(header_line)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();

    let col = |name: &str| header.iter().position(|h| h.as_str() == name);
    let Some(username_col) = col("username") else {
        return Err(SisError::BadInput("missing 'username' column".to_string()));
    };
    let Some(email_col) = col("email") else {
        return Err(SisError::BadInput("missing 'email' column".to_string()));
    };

    let mut out: Vec<FlatRecord> = Vec::new();
    for (line_no, line) in lines.enumerate() {
        let fields = parse_csv_record(line);
        let get = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| fields.get(i)).and_then(|f| non_empty_trimmed(f))
        };

        let Some(username) = get(Some(username_col)) else {
            return Err(SisError::BadInput(format!(
                "row {}: missing username",
                line_no + 2
            )));
        };
        let Some(email) = get(Some(email_col)) else {
            return Err(SisError::BadInput(format!(
                "row {}: missing email",
                line_no + 2
            )));
        };

        let class_year = match get(col("classYear")) {
            Some(s) => match s.parse::<i64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    return Err(SisError::BadInput(format!(
                        "row {}: classYear '{}' is not an integer",
                        line_no + 2,
                        s
                    )))
                }
            },
            None => None,
        };

        out.push(FlatRecord {
            username,
            email,
            fullname: get(col("fullname")),
            birthday: get(col("birthday")),
            gender: get(col("gender")),
            class_year,
            address: get(col("address")),
            phone: get(col("phone")).map(|p| strip_phone_marker(&p)),
            faculty: get(col("faculty")),
            program: get(col("program")),
            status: get(col("status")),
            role: get(col("role")),
        });
    }
    Ok(out)
}

struct ResolvedRecord {
    flat: FlatRecord,
    faculty_id: Option<String>,
    program_id: Option<String>,
    status_id: Option<String>,
    role: Role,
    gender: Option<Gender>,
}

fn resolve_row(conn: &Connection, flat: FlatRecord) -> Result<ResolvedRecord, SisError> {
    let resolve = |kind: AttrKind, name: &Option<String>| -> Result<Option<String>, SisError> {
        match name {
            None => Ok(None),
            Some(n) => match attrs::find_by_name(conn, kind, n)? {
                Some(entity) => Ok(Some(entity.id)),
                None => Err(SisError::NotFound(format!(
                    "unknown {} '{}'",
                    kind.key(),
                    n
                ))),
            },
        }
    };

    let faculty_id = resolve(AttrKind::Faculty, &flat.faculty)?;
    let program_id = resolve(AttrKind::Program, &flat.program)?;
    let status_id = resolve(AttrKind::Status, &flat.status)?;

    let role = match flat.role.as_deref() {
        None => Role::Student,
        Some(s) => Role::parse(s)
            .ok_or_else(|| SisError::BadInput(format!("invalid role '{}'", s)))?,
    };
    let gender = match flat.gender.as_deref() {
        None => None,
        Some(s) => Some(
            Gender::parse(s).ok_or_else(|| SisError::BadInput(format!("invalid gender '{}'", s)))?,
        ),
    };

    Ok(ResolvedRecord {
        flat,
        faculty_id,
        program_id,
        status_id,
        role,
        gender,
    })
}

/// Resolve every row's reference names, then insert all rows inside one
/// transaction. Resolution failures and insert failures both fail the whole
/// call; there is no partial import.
pub fn import_records(conn: &mut Connection, rows: Vec<FlatRecord>) -> Result<usize, SisError> {
    let mut resolved: Vec<ResolvedRecord> = Vec::with_capacity(rows.len());
    for flat in rows {
        resolved.push(resolve_row(conn, flat)?);
    }

    let tx = conn
        .transaction()
        .map_err(|e| SisError::Internal(e.to_string()))?;
    let count = resolved.len();
    let now = chrono::Utc::now().to_rfc3339();

    for r in &resolved {
        tx.execute(
            "INSERT INTO records(
                id, username, email, fullname, birthday, gender, class_year,
                address, phone, faculty_id, program_id, status_id, role, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                r.flat.username,
                r.flat.email,
                r.flat.fullname,
                r.flat.birthday,
                r.gender.map(|g| g.as_str()),
                r.flat.class_year,
                r.flat.address,
                r.flat.phone,
                r.faculty_id,
                r.program_id,
                r.status_id,
                r.role.as_str(),
                now,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, msg)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                SisError::Conflict(msg.unwrap_or_else(|| "constraint violation".to_string()))
            }
            other => SisError::Internal(other.to_string()),
        })?;
    }

    tx.commit().map_err(|e| SisError::Internal(e.to_string()))?;
    log::info!("import: {} records inserted", count);
    Ok(count)
}

/// All records flattened for the UI table and for export, reference ids
/// replaced by their names, secrets excluded.
pub fn load_flat_records(conn: &Connection) -> Result<Vec<FlatRecord>, SisError> {
    let mut stmt = conn.prepare(
        "SELECT r.username, r.email, r.fullname, r.birthday, r.gender,
                r.class_year, r.address, r.phone,
                f.name, p.name, s.name, r.role
         FROM records r
         LEFT JOIN faculties f ON f.id = r.faculty_id
         LEFT JOIN programs p ON p.id = r.program_id
         LEFT JOIN statuses s ON s.id = r.status_id
         ORDER BY r.username",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(FlatRecord {
                username: r.get(0)?,
                email: r.get(1)?,
                fullname: r.get(2)?,
                birthday: r.get(3)?,
                gender: r.get(4)?,
                class_year: r.get(5)?,
                address: r.get(6)?,
                phone: r.get(7)?,
                faculty: r.get(8)?,
                program: r.get(9)?,
                status: r.get(10)?,
                role: Some(r.get::<_, String>(11)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn export_json(records: &[FlatRecord]) -> Result<String, SisError> {
    serde_json::to_string_pretty(records).map_err(|e| SisError::Internal(e.to_string()))
}

pub fn export_csv(records: &[FlatRecord]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');
    for r in records {
        let class_year = r.class_year.map(|v| v.to_string()).unwrap_or_default();
        let phone = r
            .phone
            .as_deref()
            .map(|p| format!("{}{}", PHONE_TEXT_MARKER, p))
            .unwrap_or_default();
        let fields = [
            csv_quote(&r.username),
            csv_quote(&r.email),
            csv_quote(r.fullname.as_deref().unwrap_or("")),
            csv_quote(r.birthday.as_deref().unwrap_or("")),
            csv_quote(r.gender.as_deref().unwrap_or("")),
            csv_quote(&class_year),
            csv_quote(r.address.as_deref().unwrap_or("")),
            csv_quote(&phone),
            csv_quote(r.faculty.as_deref().unwrap_or("")),
            csv_quote(r.program.as_deref().unwrap_or("")),
            csv_quote(r.status.as_deref().unwrap_or("")),
            csv_quote(r.role.as_deref().unwrap_or("")),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}
