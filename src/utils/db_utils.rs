use actix_web::error::ErrorBadRequest;
use serde_json::Value;
use sqlx::MySqlPool;

/// ===============================
/// SQL bindable value enum
/// ===============================
///
/// Roster columns are text; strings are bound exactly as sent, never
/// reinterpreted as dates or numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
///
/// Only keys listed in `allowed_columns` may appear in the payload; they are
/// the only text spliced into the statement. Every value must be a string.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed_columns: &[&str],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, actix_web::Error> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ErrorBadRequest("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ErrorBadRequest("No fields provided for update"));
    }

    if let Some(unknown) = obj.keys().find(|k| !allowed_columns.contains(&k.as_str())) {
        return Err(ErrorBadRequest(format!("Field `{}` cannot be updated", unknown)));
    }

    // Build SET clause
    let set_clause = obj
        .keys()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {} SET {} WHERE {} = ?", table, set_clause, id_column);

    let mut values = Vec::with_capacity(obj.len() + 1);
    for (key, value) in obj {
        match value {
            Value::String(s) => values.push(SqlValue::String(s.clone())),
            _ => return Err(ErrorBadRequest(format!("Field `{}` must be a string", key))),
        }
    }

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[&str] = &["name", "email", "qr_code", "contact"];

    #[test]
    fn binds_values_in_set_clause_order() {
        let payload = json!({ "name": "Ana", "contact": "0917" });
        let update = build_update_sql("students", &payload, COLUMNS, "id", 4).unwrap();

        assert_eq!(update.sql, "UPDATE students SET contact = ?, name = ? WHERE id = ?");
        assert_eq!(
            update.values,
            vec![
                SqlValue::String("0917".into()),
                SqlValue::String("Ana".into()),
                SqlValue::U64(4),
            ]
        );
    }

    #[test]
    fn rejects_columns_outside_the_allow_list() {
        let payload = json!({ "name": "Ana", "id = 1; DROP TABLE students; --": "x" });
        assert!(build_update_sql("students", &payload, COLUMNS, "id", 1).is_err());
    }

    #[test]
    fn date_like_strings_are_bound_verbatim() {
        let payload = json!({ "qr_code": "2024-01-01T08:00:00" });
        let update = build_update_sql("students", &payload, COLUMNS, "id", 1).unwrap();
        assert_eq!(update.values[0], SqlValue::String("2024-01-01T08:00:00".into()));

        let payload = json!({ "qr_code": "2024-01-01" });
        let update = build_update_sql("students", &payload, COLUMNS, "id", 1).unwrap();
        assert_eq!(update.values[0], SqlValue::String("2024-01-01".into()));
    }

    #[test]
    fn rejects_non_string_values() {
        assert!(build_update_sql("students", &json!({ "contact": 917 }), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("students", &json!({ "email": null }), COLUMNS, "id", 1).is_err());
    }

    #[test]
    fn rejects_empty_and_non_object_payloads() {
        assert!(build_update_sql("students", &json!({}), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("students", &json!(["name"]), COLUMNS, "id", 1).is_err());
    }
}
