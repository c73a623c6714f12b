//! Parameter binding for procedure calls.

use crate::models::QueryParam;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// SQL text for a procedure call.
///
/// `None` renders the argument-less form `CALL name`; `Some(n)` renders one
/// placeholder per argument, so `Some(0)` gives `CALL name()`.
pub(crate) fn call_sql(name: &str, arg_count: Option<usize>) -> String {
    match arg_count {
        None => format!("CALL {}", name),
        Some(n) => {
            let placeholders = vec!["?"; n].join(", ");
            format!("CALL {}({})", name, placeholders)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_sql_without_args() {
        assert_eq!(call_sql("refresh_stats", None), "CALL refresh_stats");
    }

    #[test]
    fn test_call_sql_explicit_empty_args() {
        assert_eq!(call_sql("refresh_stats", Some(0)), "CALL refresh_stats()");
    }

    #[test]
    fn test_call_sql_placeholders() {
        assert_eq!(call_sql("add_user", Some(3)), "CALL add_user(?, ?, ?)");
    }
}
