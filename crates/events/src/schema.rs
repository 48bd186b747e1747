//! Named-column decoding of positional change-feed rows.
//!
//! A [`TableSchema`] pins the exact column order a table had when this
//! worker was built. Decoding checks the event against it and fails with
//! [`SchemaDriftError`] instead of guessing when the shapes disagree.

use std::collections::HashMap;

use serde_json::Value;

use crate::feed::RowEvent;

/// Column order of `remote_pcs`, version 1.
pub const REMOTE_PCS_V1: TableSchema = TableSchema {
    table: "remote_pcs",
    version: 1,
    columns: &["id", "server_id", "service", "worker_id", "state", "server_online_time"],
};

/// Column order of `job_requests`, version 1.
pub const JOB_REQUESTS_V1: TableSchema = TableSchema {
    table: "job_requests",
    version: 1,
    columns: &[
        "id",
        "service",
        "secret",
        "worker_id",
        "coupon_count",
        "otp",
        "state",
        "otp_pass",
    ],
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaDriftError {
    #[error("event for table {actual} decoded with schema for {expected}")]
    WrongTable { expected: &'static str, actual: String },

    #[error("{table} v{version}: expected {expected} columns, event has {actual} in {side}")]
    ColumnCount {
        table: &'static str,
        version: u32,
        side: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{table} v{version}: column {position} is {actual:?}, expected {expected:?}")]
    ColumnName {
        table: &'static str,
        version: u32,
        position: usize,
        expected: &'static str,
        actual: String,
    },

    #[error("{table}.{column}: expected {expected}, found {found}")]
    FieldType {
        table: &'static str,
        column: &'static str,
        expected: &'static str,
        found: String,
    },
}

/// The pinned shape of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub table: &'static str,
    pub version: u32,
    pub columns: &'static [&'static str],
}

impl TableSchema {
    /// Decode `event` into named before/after rows.
    pub fn decode(&self, event: &RowEvent) -> Result<DecodedRow, SchemaDriftError> {
        if event.table != self.table {
            return Err(SchemaDriftError::WrongTable {
                expected: self.table,
                actual: event.table.clone(),
            });
        }

        if !event.columns.is_empty() {
            self.check_len("columns", event.columns.len())?;
            for (position, (expected, actual)) in
                self.columns.iter().zip(event.columns.iter()).enumerate()
            {
                if *expected != actual.as_str() {
                    return Err(SchemaDriftError::ColumnName {
                        table: self.table,
                        version: self.version,
                        position,
                        expected: *expected,
                        actual: actual.clone(),
                    });
                }
            }
        }

        self.check_len("before", event.before.len())?;
        self.check_len("after", event.after.len())?;

        Ok(DecodedRow {
            before: self.row(&event.before),
            after: self.row(&event.after),
        })
    }

    fn check_len(&self, side: &'static str, actual: usize) -> Result<(), SchemaDriftError> {
        if actual != self.columns.len() {
            return Err(SchemaDriftError::ColumnCount {
                table: self.table,
                version: self.version,
                side,
                expected: self.columns.len(),
                actual,
            });
        }
        Ok(())
    }

    fn row(&self, values: &[Value]) -> Row {
        Row {
            table: self.table,
            fields: self
                .columns
                .iter()
                .copied()
                .zip(values.iter().cloned())
                .collect(),
        }
    }
}

/// One side (before or after) of a decoded row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    table: &'static str,
    fields: HashMap<&'static str, Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column).filter(|v| !v.is_null())
    }

    /// Integer field; numeric strings are accepted.
    pub fn i64(&self, column: &'static str) -> Result<Option<i64>, SchemaDriftError> {
        match self.get(column) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.type_error(column, "integer", n.to_string())),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.type_error(column, "integer", s.clone())),
            Some(other) => Err(self.type_error(column, "integer", other.to_string())),
        }
    }

    /// Text field; numbers are rendered as text. Empty strings read as absent.
    pub fn string(&self, column: &'static str) -> Result<Option<String>, SchemaDriftError> {
        match self.get(column) {
            None => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(self.type_error(column, "text", other.to_string())),
        }
    }

    fn type_error(&self, column: &'static str, expected: &'static str, found: String) -> SchemaDriftError {
        SchemaDriftError::FieldType {
            table: self.table,
            column,
            expected,
            found,
        }
    }
}

/// A row change with both sides addressable by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRow {
    pub before: Row,
    pub after: Row,
}

impl DecodedRow {
    /// Columns whose value differs between before and after.
    pub fn changed_columns(&self) -> Vec<&'static str> {
        let mut changed: Vec<&'static str> = self
            .after
            .fields
            .iter()
            .filter(|(name, value)| self.before.fields.get(*name) != Some(*value))
            .map(|(name, _)| *name)
            .collect();
        changed.sort_unstable();
        changed
    }

    pub fn column_changed(&self, column: &str) -> bool {
        self.before.fields.get(column) != self.after.fields.get(column)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn remote_pc_event(before: Vec<Value>, after: Vec<Value>) -> RowEvent {
        RowEvent {
            schema: "public".into(),
            table: "remote_pcs".into(),
            op: "UPDATE".into(),
            columns: REMOTE_PCS_V1.columns.iter().map(|c| c.to_string()).collect(),
            before,
            after,
        }
    }

    #[test]
    fn decodes_named_fields() {
        let event = remote_pc_event(
            vec![json!(1), json!(7), json!("10min"), json!(null), json!("none"), json!("t")],
            vec![json!(1), json!(7), json!("10min"), json!("w1"), json!("none"), json!("t")],
        );
        let row = REMOTE_PCS_V1.decode(&event).unwrap();
        assert_eq!(row.after.i64("server_id").unwrap(), Some(7));
        assert_eq!(row.after.string("worker_id").unwrap(), Some("w1".into()));
        assert_eq!(row.before.string("worker_id").unwrap(), None);
        assert_eq!(row.changed_columns(), vec!["worker_id"]);
        assert!(!row.column_changed("state"));
    }

    #[test]
    fn renamed_column_is_drift() {
        let mut event = remote_pc_event(vec![json!(0); 6], vec![json!(0); 6]);
        event.columns[3] = "owner".into();
        let err = REMOTE_PCS_V1.decode(&event).unwrap_err();
        assert_matches!(err, SchemaDriftError::ColumnName { position: 3, expected: "worker_id", .. });
    }

    #[test]
    fn added_column_is_drift() {
        let mut event = remote_pc_event(vec![json!(0); 7], vec![json!(0); 7]);
        event.columns.clear();
        let err = REMOTE_PCS_V1.decode(&event).unwrap_err();
        assert_matches!(err, SchemaDriftError::ColumnCount { expected: 6, actual: 7, .. });
    }

    #[test]
    fn wrong_table_is_rejected() {
        let event = remote_pc_event(vec![json!(0); 6], vec![json!(0); 6]);
        assert_matches!(
            JOB_REQUESTS_V1.decode(&event),
            Err(SchemaDriftError::WrongTable { expected: "job_requests", .. })
        );
    }

    #[test]
    fn numeric_strings_parse_as_integers() {
        let event = remote_pc_event(vec![json!(0); 6], {
            let mut after = vec![json!(0); 6];
            after[1] = json!("42");
            after[4] = json!(true);
            after
        });
        let row = REMOTE_PCS_V1.decode(&event).unwrap();
        assert_eq!(row.after.i64("server_id").unwrap(), Some(42));
        assert_matches!(row.after.string("state"), Err(SchemaDriftError::FieldType { .. }));
    }
}
