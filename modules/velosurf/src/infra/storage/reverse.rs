//! Catalog reading for SQLite and PostgreSQL

use crate::contract::{Result, Row, Value, VelosurfError};
use crate::domain::repository::{ColumnInfo, ForeignKeyInfo, RowRepository, TableInfo};

use super::repositories::SeaOrmRowRepository;

fn text(row: &Row, column: &str) -> Result<String> {
    match row.get(column) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(VelosurfError::Schema(format!(
            "catalog row without '{}'",
            column
        ))),
        Some(other) => Ok(other.to_string()),
    }
}

fn number(row: &Row, column: &str) -> Result<i64> {
    let parsed = match row.get(column) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        Some(Value::Bool(b)) => Some(i64::from(*b)),
        _ => None,
    };
    parsed.ok_or_else(|| {
        VelosurfError::Schema(format!("catalog row without a numeric '{}'", column))
    })
}

/// Referenced column; SQLite leaves it null when the target's primary key is implied
fn optional_text(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// One column of a foreign key as read from the catalog
struct ForeignKeyColumn {
    id: String,
    column: String,
    target_table: String,
    target_column: Option<String>,
}

/// Group consecutive columns sharing a constraint id into foreign keys
///
/// Target columns are kept only when every column of the key names one.
fn group_foreign_keys(entries: Vec<ForeignKeyColumn>) -> Vec<ForeignKeyInfo> {
    let mut keys: Vec<(String, ForeignKeyInfo, bool)> = Vec::new();
    for entry in entries {
        match keys.last_mut() {
            Some((last, fk, complete)) if *last == entry.id => {
                fk.columns.push(entry.column);
                match entry.target_column {
                    Some(target) => fk.target_columns.push(target),
                    None => *complete = false,
                }
            }
            _ => {
                let complete = entry.target_column.is_some();
                keys.push((
                    entry.id,
                    ForeignKeyInfo {
                        target_table: entry.target_table,
                        columns: vec![entry.column],
                        target_columns: entry.target_column.into_iter().collect(),
                    },
                    complete,
                ))
            }
        }
    }
    keys.into_iter()
        .map(|(_, mut fk, complete)| {
            if !complete {
                fk.target_columns.clear();
            }
            fk
        })
        .collect()
}

// ===== SQLite =====

pub async fn describe_sqlite(repo: &SeaOrmRowRepository) -> Result<Vec<TableInfo>> {
    let tables = repo
        .query_rows(
            "select name from sqlite_master where type = 'table' and name not like 'sqlite_%' order by name",
            &[],
        )
        .await?;

    let mut described = Vec::with_capacity(tables.len());
    for table in &tables {
        let name = text(table, "name")?;
        let param = [Value::String(name.clone())];

        let column_rows = repo
            .query_rows(
                "select name, type, pk from pragma_table_info(?) order by cid",
                &param,
            )
            .await?;
        let mut columns = Vec::with_capacity(column_rows.len());
        let mut keyed = Vec::new();
        for row in &column_rows {
            let column = text(row, "name")?;
            let position = number(row, "pk")?;
            if position > 0 {
                keyed.push((position, column.clone()));
            }
            columns.push(ColumnInfo {
                name: column,
                sql_type: text(row, "type").unwrap_or_default(),
            });
        }
        keyed.sort();

        let fk_rows = repo
            .query_rows(
                "select id, seq, \"table\", \"from\", \"to\" from pragma_foreign_key_list(?) order by id, seq",
                &param,
            )
            .await?;
        let entries = fk_rows
            .iter()
            .map(|row| {
                Ok(ForeignKeyColumn {
                    id: number(row, "id")?.to_string(),
                    column: text(row, "from")?,
                    target_table: text(row, "table")?,
                    target_column: optional_text(row, "to"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        described.push(TableInfo {
            name,
            columns,
            primary_key: keyed.into_iter().map(|(_, c)| c).collect(),
            foreign_keys: group_foreign_keys(entries),
        });
    }
    Ok(described)
}

// ===== PostgreSQL =====

const PG_TABLES: &str = "select table_name::text as name from information_schema.tables \
     where table_schema = current_schema() and table_type = 'BASE TABLE' order by table_name";

const PG_COLUMNS: &str = "select column_name::text as name, data_type::text as type \
     from information_schema.columns \
     where table_schema = current_schema() and table_name = ? order by ordinal_position";

const PG_PRIMARY_KEY: &str = "select kcu.column_name::text as name \
     from information_schema.table_constraints tc \
     join information_schema.key_column_usage kcu \
       on tc.constraint_name = kcu.constraint_name and tc.table_schema = kcu.table_schema \
     where tc.table_schema = current_schema() and tc.table_name = ? \
       and tc.constraint_type = 'PRIMARY KEY' \
     order by kcu.ordinal_position";

// Referenced columns are matched by position within the referenced unique constraint
const PG_FOREIGN_KEYS: &str = "select tc.constraint_name::text as id, kcu.column_name::text as name, \
       rk.table_name::text as target, rk.column_name::text as target_column \
     from information_schema.table_constraints tc \
     join information_schema.key_column_usage kcu \
       on tc.constraint_name = kcu.constraint_name and tc.table_schema = kcu.table_schema \
     join information_schema.referential_constraints rc \
       on rc.constraint_name = tc.constraint_name and rc.constraint_schema = tc.table_schema \
     join information_schema.key_column_usage rk \
       on rk.constraint_name = rc.unique_constraint_name \
       and rk.constraint_schema = rc.unique_constraint_schema \
       and rk.ordinal_position = kcu.position_in_unique_constraint \
     where tc.table_schema = current_schema() and tc.table_name = ? \
       and tc.constraint_type = 'FOREIGN KEY' \
     order by tc.constraint_name, kcu.ordinal_position";

pub async fn describe_postgres(repo: &SeaOrmRowRepository) -> Result<Vec<TableInfo>> {
    let tables = repo.query_rows(PG_TABLES, &[]).await?;

    let mut described = Vec::with_capacity(tables.len());
    for table in &tables {
        let name = text(table, "name")?;
        let param = [Value::String(name.clone())];

        let columns = repo
            .query_rows(PG_COLUMNS, &param)
            .await?
            .iter()
            .map(|row| {
                Ok(ColumnInfo {
                    name: text(row, "name")?,
                    sql_type: text(row, "type").unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let primary_key = repo
            .query_rows(PG_PRIMARY_KEY, &param)
            .await?
            .iter()
            .map(|row| text(row, "name"))
            .collect::<Result<Vec<_>>>()?;

        let entries = repo
            .query_rows(PG_FOREIGN_KEYS, &param)
            .await?
            .iter()
            .map(|row| {
                Ok(ForeignKeyColumn {
                    id: text(row, "id")?,
                    column: text(row, "name")?,
                    target_table: text(row, "target")?,
                    target_column: optional_text(row, "target_column"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        described.push(TableInfo {
            name,
            columns,
            primary_key,
            foreign_keys: group_foreign_keys(entries),
        });
    }
    Ok(described)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn column(id: &str, column: &str, table: &str, target: Option<&str>) -> ForeignKeyColumn {
        ForeignKeyColumn {
            id: id.into(),
            column: column.into(),
            target_table: table.into(),
            target_column: target.map(Into::into),
        }
    }

    #[test]
    fn test_group_foreign_keys() {
        let keys = group_foreign_keys(vec![
            column("0", "author_id", "person", Some("id")),
            column("1", "shelf_room", "shelf", Some("room")),
            column("1", "shelf_no", "shelf", Some("no")),
        ]);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].target_table, "person");
        assert_eq!(keys[0].target_columns, vec!["id".to_string()]);
        assert_eq!(keys[1].columns, vec!["shelf_room".to_string(), "shelf_no".to_string()]);
        assert_eq!(keys[1].target_columns, vec!["room".to_string(), "no".to_string()]);
    }

    #[test]
    fn test_implied_target_columns_are_dropped() {
        let keys = group_foreign_keys(vec![
            column("0", "a", "pair", None),
            column("0", "b", "pair", Some("y")),
        ]);
        assert_eq!(keys[0].columns.len(), 2);
        assert!(keys[0].target_columns.is_empty());
    }

    #[test]
    fn test_missing_catalog_number_is_an_error() {
        let mut row = Row::new();
        row.insert("name".into(), json!("id"));
        assert!(matches!(number(&row, "pk"), Err(VelosurfError::Schema(_))));

        row.insert("pk".into(), json!(2));
        assert_eq!(number(&row, "pk").unwrap(), 2);
        row.insert("pk".into(), json!("1"));
        assert_eq!(number(&row, "pk").unwrap(), 1);
    }
}
