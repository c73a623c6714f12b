//! Row-to-record mapping.

use crate::db::driver::Cursor;
use crate::error::DbResult;
use crate::models::{Fetch, Record, Selection};
use serde_json::Value as JsonValue;

/// Zip column names with row values, position by position.
///
/// A name that appears twice keeps the value of its last occurrence. Extra
/// names or values beyond the shorter side are dropped.
pub fn zip_record(columns: &[String], values: Vec<JsonValue>) -> Record {
    columns.iter().cloned().zip(values).collect()
}

/// Read the cursor's result according to `fetch`.
///
/// A cursor without a result description yields an empty selection.
pub fn collect_selection<K: Cursor>(cursor: &mut K, fetch: Fetch) -> DbResult<Selection> {
    let Some(columns) = cursor.description().map(<[String]>::to_vec) else {
        return Ok(match fetch {
            Fetch::One => Selection::One(None),
            Fetch::All => Selection::All(Vec::new()),
        });
    };

    match fetch {
        Fetch::One => {
            let row = cursor.fetch_one()?;
            Ok(Selection::One(row.map(|values| zip_record(&columns, values))))
        }
        Fetch::All => {
            let rows = cursor.fetch_all()?;
            Ok(Selection::All(
                rows.into_iter()
                    .map(|values| zip_record(&columns, values))
                    .collect(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_zip_record_maps_by_position() {
        let record = zip_record(&names(&["id", "name"]), vec![json!(7), json!("ada")]);
        assert_eq!(record.len(), 2);
        assert_eq!(record["id"], json!(7));
        assert_eq!(record["name"], json!("ada"));
    }

    #[test]
    fn test_duplicate_column_last_value_wins() {
        // e.g. a join that yields two `id` columns
        let record = zip_record(
            &names(&["id", "name", "id"]),
            vec![json!(1), json!("order"), json!(99)],
        );
        assert_eq!(record.len(), 2);
        assert_eq!(record["id"], json!(99));
    }

    #[test]
    fn test_zip_stops_at_shorter_side() {
        let record = zip_record(&names(&["a", "b", "c"]), vec![json!(1)]);
        assert_eq!(record.len(), 1);
        let record = zip_record(&names(&["a"]), vec![json!(1), json!(2)]);
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_null_values_are_kept() {
        let record = zip_record(&names(&["deleted_at"]), vec![JsonValue::Null]);
        assert_eq!(record.get("deleted_at"), Some(&JsonValue::Null));
    }
}
