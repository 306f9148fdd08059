// Read-only access to the application's transactional store, used by the
// triple-check verifier to confirm persisted values.

use crate::error::{CoreError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params};
use std::collections::BTreeMap;
use std::path::Path;

pub struct Storage {
    conn: Connection,
}

fn validate_identifier(name: &str) -> Result<&str> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(CoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(name)
}

/// Build `schema.table` from validated parts. Identifiers cannot be bound
/// as parameters, so they are whitelisted to `[A-Za-z0-9_]` instead.
fn qualified_table(schema: Option<&str>, table: &str) -> Result<String> {
    let table = validate_identifier(table)?;
    match schema {
        Some(schema) => Ok(format!("{}.{}", validate_identifier(schema)?, table)),
        None => Ok(table.to_string()),
    }
}

fn value_ref_to_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Some(format!("<{} byte blob>", b.len())),
    }
}

impl Storage {
    /// Open the store read-only. This system never writes to the
    /// application's database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Fetch a single row by primary key. Null columns are omitted.
    pub fn row_by_id(
        &self,
        schema: Option<&str>,
        table: &str,
        id_column: &str,
        id: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let table = qualified_table(schema, table)?;
        let id_column = validate_identifier(id_column)?;
        let sql = format!("SELECT * FROM {} WHERE {} = ?1 LIMIT 1", table, id_column);

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        // Bind numerically when the id looks numeric so integer primary
        // keys compare correctly.
        let mut rows = match id.parse::<i64>() {
            Ok(n) => stmt.query(params![n])?,
            Err(_) => stmt.query(params![id])?,
        };

        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut map = BTreeMap::new();
        for (i, name) in names.iter().enumerate() {
            if let Some(text) = value_ref_to_string(row.get_ref(i)?) {
                map.insert(name.clone(), text);
            }
        }
        Ok(Some(map))
    }

    /// Fetch rows matching a column-equality filter.
    pub fn rows_where(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        value: &str,
        limit: usize,
    ) -> Result<Vec<BTreeMap<String, String>>> {
        let table = qualified_table(schema, table)?;
        let column = validate_identifier(column)?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 LIMIT {}",
            table, column, limit
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = match value.parse::<i64>() {
            Ok(n) => stmt.query(params![n])?,
            Err(_) => stmt.query(params![value])?,
        };

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = BTreeMap::new();
            for (i, name) in names.iter().enumerate() {
                if let Some(text) = value_ref_to_string(row.get_ref(i)?) {
                    map.insert(name.clone(), text);
                }
            }
            out.push(map);
        }
        Ok(out)
    }

    /// Read one named column of the row with the given primary key.
    /// Column matching is case-insensitive.
    pub fn column_value(
        &self,
        schema: Option<&str>,
        table: &str,
        id_column: &str,
        id: &str,
        column: &str,
    ) -> Result<Option<String>> {
        let Some(row) = self.row_by_id(schema, table, id_column, id)? else {
            return Ok(None);
        };
        if let Some(v) = row.get(column) {
            return Ok(Some(v.clone()));
        }
        let lowered = column.to_lowercase();
        Ok(row
            .iter()
            .find(|(k, _)| k.to_lowercase() == lowered)
            .map(|(_, v)| v.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_rejects_injection() {
        assert!(validate_identifier("orders").is_ok());
        assert!(validate_identifier("orders; DROP TABLE users").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_qualified_table() {
        assert_eq!(
            qualified_table(Some("shop"), "orders").unwrap(),
            "shop.orders"
        );
        assert_eq!(qualified_table(None, "orders").unwrap(), "orders");
    }
}
