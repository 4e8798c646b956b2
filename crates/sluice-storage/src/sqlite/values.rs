//! Value conversion between JSON and SQLite, plus identifier quoting.

use serde_json::Value;

/// Quotes an identifier for use in DDL/DML. Embedded quotes are doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Converts a JSON value into a SQLite storage value.
///
/// Booleans become 0/1 integers; arrays and objects (which should not
/// reach a relational column) are stored as their JSON text.
pub fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Sql::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => Sql::Text(value.to_string()),
    }
}

/// Converts a SQLite storage value back into JSON.
pub fn from_sql_value(value: rusqlite::types::Value) -> Value {
    use rusqlite::types::Value as Sql;
    match value {
        Sql::Null => Value::Null,
        Sql::Integer(i) => Value::Number(i.into()),
        Sql::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Sql::Text(s) => Value::String(s),
        Sql::Blob(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn booleans_store_as_integers() {
        assert_eq!(to_sql_value(&json!(true)), rusqlite::types::Value::Integer(1));
        assert_eq!(to_sql_value(&json!(false)), rusqlite::types::Value::Integer(0));
    }

    #[test]
    fn numbers_round_trip() {
        let v = from_sql_value(to_sql_value(&json!(42)));
        assert_eq!(v, json!(42));
        let v = from_sql_value(to_sql_value(&json!(1.5)));
        assert_eq!(v, json!(1.5));
    }
}
