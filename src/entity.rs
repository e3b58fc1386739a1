//! Entity capability traits.
//!
//! Entities are caller-defined record types. Reading and writing are separate
//! capabilities:
//!
//! - [`Scannable`] declares the ordered column destinations a SELECT fills.
//!   The destination order must match the statement's column list; a mismatch
//!   is a caller bug this layer cannot detect beyond arity and type checks.
//! - [`EntityData`] exposes the entity as a name→value mapping for insert,
//!   update and upsert mutations.
//! - [`EntityKey`] exposes the ordered primary-key values for delete
//!   mutations.
//!
//! No entity knows its own table name; callers supply it per call.

use crate::error::{DbResult, Error};
use crate::value::{Row, Value};

/// A single column destination that a decoded value can be assigned into.
pub trait ScanTarget {
    /// Assign a decoded column value into this destination.
    ///
    /// Implementations report mismatches with [`Error::Decode`]; the scanner
    /// fills in the column index.
    fn assign(&mut self, value: Value) -> DbResult<()>;
}

/// A type that can be decoded from a result row.
///
/// Each row produces a fresh `Self::default()` which is then filled through
/// its [`scan_targets`](Scannable::scan_targets), so no state is shared
/// between rows or between concurrent calls.
pub trait Scannable: Default {
    /// Ordered mutable destinations, one per SELECT column.
    fn scan_targets(&mut self) -> Vec<&mut dyn ScanTarget>;
}

/// A type that can expose itself as a name→value mapping for writes.
pub trait EntityData {
    /// Column name/value pairs, in a stable iteration order.
    fn data(&self) -> Vec<(String, Value)>;
}

/// A type that can expose its primary key as an ordered value sequence.
pub trait EntityKey {
    /// Primary-key values, in key-column order.
    fn primary_key(&self) -> Vec<Value>;
}

/// Ad-hoc entity data: a plain sorted map of column names to values.
impl EntityData for std::collections::BTreeMap<String, Value> {
    fn data(&self) -> Vec<(String, Value)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Ad-hoc primary key: a plain value sequence in key-column order.
impl EntityKey for Vec<Value> {
    fn primary_key(&self) -> Vec<Value> {
        self.clone()
    }
}

/// Scan a row's values into the given destinations, in order.
pub fn scan_row(row: Row, targets: Vec<&mut dyn ScanTarget>) -> DbResult<()> {
    if row.len() != targets.len() {
        return Err(Error::decode(
            0,
            format!(
                "row has {} columns but entity declares {} destinations",
                row.len(),
                targets.len()
            ),
        ));
    }
    for (column, (value, target)) in row.into_values().into_iter().zip(targets).enumerate() {
        target.assign(value).map_err(|e| match e {
            Error::Decode { message, .. } => Error::Decode { column, message },
            other => other,
        })?;
    }
    Ok(())
}

fn mismatch(expected: &str, got: &Value) -> Error {
    Error::decode(0, format!("expected {}, got {}", expected, got.type_name()))
}

impl ScanTarget for bool {
    fn assign(&mut self, value: Value) -> DbResult<()> {
        match value {
            Value::Bool(v) => *self = v,
            // SQLite stores booleans as 0/1 integers
            Value::Int(0) => *self = false,
            Value::Int(1) => *self = true,
            other => return Err(mismatch("bool", &other)),
        }
        Ok(())
    }
}

impl ScanTarget for i64 {
    fn assign(&mut self, value: Value) -> DbResult<()> {
        match value {
            Value::Int(v) => *self = v,
            other => return Err(mismatch("int", &other)),
        }
        Ok(())
    }
}

impl ScanTarget for f64 {
    fn assign(&mut self, value: Value) -> DbResult<()> {
        match value {
            Value::Float(v) => *self = v,
            // integer-affinity columns may hold exact values
            Value::Int(v) => *self = v as f64,
            other => return Err(mismatch("float", &other)),
        }
        Ok(())
    }
}

impl ScanTarget for String {
    fn assign(&mut self, value: Value) -> DbResult<()> {
        match value {
            Value::String(v) => *self = v,
            other => return Err(mismatch("string", &other)),
        }
        Ok(())
    }
}

impl ScanTarget for Vec<u8> {
    fn assign(&mut self, value: Value) -> DbResult<()> {
        match value {
            Value::Bytes(v) => *self = v,
            other => return Err(mismatch("bytes", &other)),
        }
        Ok(())
    }
}

impl ScanTarget for serde_json::Value {
    fn assign(&mut self, value: Value) -> DbResult<()> {
        match value {
            Value::Json(v) => *self = v,
            Value::String(text) => {
                *self = serde_json::from_str(&text)
                    .map_err(|e| Error::decode(0, format!("invalid JSON text: {}", e)))?;
            }
            other => return Err(mismatch("json", &other)),
        }
        Ok(())
    }
}

impl<T: ScanTarget + Default> ScanTarget for Option<T> {
    fn assign(&mut self, value: Value) -> DbResult<()> {
        if value.is_null() {
            *self = None;
            return Ok(());
        }
        let mut inner = T::default();
        inner.assign(value)?;
        *self = Some(inner);
        Ok(())
    }
}

macro_rules! impl_scalar_scannable {
    ($($ty:ty),* $(,)?) => {$(
        impl Scannable for $ty {
            fn scan_targets(&mut self) -> Vec<&mut dyn ScanTarget> {
                vec![self]
            }
        }
    )*};
}

impl_scalar_scannable!(bool, i64, f64, String, Vec<u8>);

impl<T: ScanTarget + Default> Scannable for Option<T> {
    fn scan_targets(&mut self) -> Vec<&mut dyn ScanTarget> {
        vec![self]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct User {
        id: i64,
        name: String,
        email: Option<String>,
    }

    impl Scannable for User {
        fn scan_targets(&mut self) -> Vec<&mut dyn ScanTarget> {
            vec![&mut self.id, &mut self.name, &mut self.email]
        }
    }

    fn user_row(values: Vec<Value>) -> Row {
        Row::new(
            vec!["id".into(), "name".into(), "email".into()],
            values,
        )
    }

    #[test]
    fn test_scan_row_fills_fields_in_order() {
        let mut user = User::default();
        let row = user_row(vec![
            Value::Int(42),
            Value::String("alice".into()),
            Value::String("a@example.com".into()),
        ]);
        scan_row(row, user.scan_targets()).unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.name, "alice");
        assert_eq!(user.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn test_scan_row_null_into_option() {
        let mut user = User::default();
        let row = user_row(vec![Value::Int(1), Value::String("b".into()), Value::Null]);
        scan_row(row, user.scan_targets()).unwrap();
        assert_eq!(user.email, None);
    }

    #[test]
    fn test_scan_row_null_into_required_fails() {
        let mut user = User::default();
        let row = user_row(vec![Value::Null, Value::String("b".into()), Value::Null]);
        let err = scan_row(row, user.scan_targets()).unwrap_err();
        assert!(matches!(err, Error::Decode { column: 0, .. }));
    }

    #[test]
    fn test_scan_row_type_mismatch_reports_column() {
        let mut user = User::default();
        let row = user_row(vec![Value::Int(1), Value::Int(2), Value::Null]);
        let err = scan_row(row, user.scan_targets()).unwrap_err();
        assert!(matches!(err, Error::Decode { column: 1, .. }));
    }

    #[test]
    fn test_scan_row_arity_mismatch() {
        let mut user = User::default();
        let row = Row::new(vec!["id".into()], vec![Value::Int(1)]);
        let err = scan_row(row, user.scan_targets()).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_bool_accepts_sqlite_integers() {
        let mut flag = false;
        flag.assign(Value::Int(1)).unwrap();
        assert!(flag);
        flag.assign(Value::Int(0)).unwrap();
        assert!(!flag);
        assert!(flag.assign(Value::Int(2)).is_err());
    }

    #[test]
    fn test_float_accepts_int() {
        let mut v = 0.0f64;
        v.assign(Value::Int(3)).unwrap();
        assert_eq!(v, 3.0);
    }

    #[test]
    fn test_json_target_parses_text() {
        let mut v = serde_json::Value::Null;
        v.assign(Value::String("{\"a\":1}".into())).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_map_entity_data_is_sorted() {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::String("a".into()));
        map.insert("id".to_string(), Value::Int(1));
        let data = map.data();
        assert_eq!(data[0].0, "id");
        assert_eq!(data[1].0, "name");
    }
}
