//! Purpose: Reshape raw upstream rows into the `{ email, data }` record shape.
//! Exports: `RawRow`, `NormalizedRecord`, `FieldSelection`, `normalize_row`, `normalize_rows`.
//! Role: Schema check between the remote client and the HTTP/CLI surfaces.
//! Invariants: `NormalizedRecord::email` always holds a valid `Email`.
//! Invariants: Row order is preserved; zero rows yield an empty vector.
//! Invariants: `data` always carries the email field, so a matched row is never empty.

use super::email::Email;
use super::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name to value mapping for one upstream row.
pub type RawRow = Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub email: Email,
    pub data: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum FieldSelection {
    #[default]
    All,
    Only(Vec<String>),
}

impl FieldSelection {
    pub fn from_list(fields: Vec<String>) -> Self {
        if fields.is_empty() {
            FieldSelection::All
        } else {
            FieldSelection::Only(fields)
        }
    }

    fn apply(&self, mut row: RawRow, email_field: &str) -> Map<String, Value> {
        match self {
            FieldSelection::All => row,
            FieldSelection::Only(fields) => {
                let mut out = Map::new();
                if let Some(value) = row.remove(email_field) {
                    out.insert(email_field.to_string(), value);
                }
                for field in fields {
                    if let Some(value) = row.remove(field) {
                        out.insert(field.clone(), value);
                    }
                }
                out
            }
        }
    }
}

pub fn normalize_row(
    row: RawRow,
    email_field: &str,
    selection: &FieldSelection,
) -> Result<NormalizedRecord, Error> {
    let email = match row.get(email_field) {
        Some(Value::String(raw)) => Email::parse(raw).map_err(|err| {
            Error::new(ErrorKind::Upstream)
                .with_message(format!("row field {email_field:?} is not a valid email"))
                .with_source(err)
        })?,
        Some(other) => {
            return Err(Error::new(ErrorKind::Upstream).with_message(format!(
                "row field {email_field:?} has non-string type {}",
                value_type(other)
            )));
        }
        None => {
            return Err(Error::new(ErrorKind::Upstream)
                .with_message(format!("row is missing field {email_field:?}")));
        }
    };
    let data = selection.apply(row, email_field);
    Ok(NormalizedRecord { email, data })
}

pub fn normalize_rows(
    rows: Vec<RawRow>,
    email_field: &str,
    selection: &FieldSelection,
) -> Result<Vec<NormalizedRecord>, Error> {
    rows.into_iter()
        .map(|row| normalize_row(row, email_field, selection))
        .collect()
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
