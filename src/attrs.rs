//! Attribute reference store: the named lookup collections (faculty,
//! program, status) every record points into. Lookups are by name for user
//! input and by id for joins; mutations land in the operational log.

use crate::error::SisError;
use crate::model::{AttrEntity, AttrKind};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

pub fn find_by_name(
    conn: &Connection,
    kind: AttrKind,
    name: &str,
) -> Result<Option<AttrEntity>, SisError> {
    let sql = match kind {
        AttrKind::Status => "SELECT id, name, ord FROM statuses WHERE name = ?",
        _ => {
            return find_plain(
                conn,
                &format!("SELECT id, name FROM {} WHERE name = ?", kind.table()),
                name,
            )
        }
    };
    let row = conn
        .query_row(sql, [name], |r| {
            Ok(AttrEntity {
                id: r.get(0)?,
                name: r.get(1)?,
                ord: Some(r.get(2)?),
            })
        })
        .optional()?;
    Ok(row)
}

pub fn find_by_id(
    conn: &Connection,
    kind: AttrKind,
    id: &str,
) -> Result<Option<AttrEntity>, SisError> {
    match kind {
        AttrKind::Status => {
            let row = conn
                .query_row("SELECT id, name, ord FROM statuses WHERE id = ?", [id], |r| {
                    Ok(AttrEntity {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        ord: Some(r.get(2)?),
                    })
                })
                .optional()?;
            Ok(row)
        }
        _ => find_plain(
            conn,
            &format!("SELECT id, name FROM {} WHERE id = ?", kind.table()),
            id,
        ),
    }
}

fn find_plain(conn: &Connection, sql: &str, key: &str) -> Result<Option<AttrEntity>, SisError> {
    let row = conn
        .query_row(sql, [key], |r| {
            Ok(AttrEntity {
                id: r.get(0)?,
                name: r.get(1)?,
                ord: None,
            })
        })
        .optional()?;
    Ok(row)
}

pub fn create(
    conn: &Connection,
    kind: AttrKind,
    name: &str,
    ord: Option<i64>,
) -> Result<AttrEntity, SisError> {
    if find_by_name(conn, kind, name)?.is_some() {
        log::error!("attrs.create {} '{}': duplicate name", kind.key(), name);
        return Err(SisError::Conflict(format!(
            "{} '{}' already exists",
            kind.key(),
            name
        )));
    }

    let id = Uuid::new_v4().to_string();
    match kind {
        AttrKind::Status => {
            let Some(ord) = ord else {
                return Err(SisError::BadInput("status requires an order".to_string()));
            };
            conn.execute(
                "INSERT INTO statuses(id, name, ord) VALUES(?, ?, ?)",
                (&id, name, ord),
            )?;
            log::info!("attrs.create status '{}' ord={}", name, ord);
            Ok(AttrEntity {
                id,
                name: name.to_string(),
                ord: Some(ord),
            })
        }
        _ => {
            conn.execute(
                &format!("INSERT INTO {}(id, name) VALUES(?, ?)", kind.table()),
                (&id, name),
            )?;
            log::info!("attrs.create {} '{}'", kind.key(), name);
            Ok(AttrEntity {
                id,
                name: name.to_string(),
                ord: None,
            })
        }
    }
}

/// Rename `old_name` to `new_name`. Missing source is an error; an existing
/// target (including old == new) makes this a silent no-op so repeated
/// submissions never merge two entities by accident.
pub fn rename(
    conn: &Connection,
    kind: AttrKind,
    old_name: &str,
    new_name: &str,
) -> Result<(), SisError> {
    if find_by_name(conn, kind, old_name)?.is_none() {
        log::error!(
            "attrs.rename {} '{}' -> '{}': source not found",
            kind.key(),
            old_name,
            new_name
        );
        return Err(SisError::NotFound(format!(
            "{} '{}' not found",
            kind.key(),
            old_name
        )));
    }
    if find_by_name(conn, kind, new_name)?.is_some() {
        log::info!(
            "attrs.rename {} '{}' -> '{}': target exists, no-op",
            kind.key(),
            old_name,
            new_name
        );
        return Ok(());
    }

    conn.execute(
        &format!("UPDATE {} SET name = ? WHERE name = ?", kind.table()),
        (new_name, old_name),
    )?;
    log::info!("attrs.rename {} '{}' -> '{}'", kind.key(), old_name, new_name);
    Ok(())
}

pub fn update_status_order(conn: &Connection, name: &str, new_ord: i64) -> Result<(), SisError> {
    let Some(existing) = find_by_name(conn, AttrKind::Status, name)? else {
        log::error!("attrs.updateStatusOrder '{}': not found", name);
        return Err(SisError::NotFound(format!("status '{}' not found", name)));
    };
    if existing.ord == Some(new_ord) {
        log::error!("attrs.updateStatusOrder '{}': order unchanged ({})", name, new_ord);
        return Err(SisError::Conflict(format!(
            "status '{}' already has order {}",
            name, new_ord
        )));
    }

    conn.execute(
        "UPDATE statuses SET ord = ? WHERE name = ?",
        (new_ord, name),
    )?;
    log::info!("attrs.updateStatusOrder '{}' -> {}", name, new_ord);
    Ok(())
}

pub fn list_all(conn: &Connection, kind: AttrKind) -> Result<Vec<AttrEntity>, SisError> {
    match kind {
        AttrKind::Status => {
            let mut stmt = conn.prepare("SELECT id, name, ord FROM statuses ORDER BY ord, name")?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(AttrEntity {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        ord: Some(r.get(2)?),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
        _ => {
            let mut stmt =
                conn.prepare(&format!("SELECT id, name FROM {} ORDER BY name", kind.table()))?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(AttrEntity {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        ord: None,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
    }
}
