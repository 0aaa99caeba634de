//! Document representation for the embedded document store

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::Row;

pub const ID_FIELD: &str = "_id";

/// A stored document: a string `_id` plus arbitrary top-level fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(flatten)]
    pub data: Row,
}

/// Ids are stored as text: a numeric id becomes its decimal form.
pub fn id_from_json(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        other => other.clone(),
    }
}

impl Document {
    /// Create a new document with a generated id
    pub fn new(data: Row) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), data)
    }

    pub fn with_id(id: String, mut data: Row) -> Self {
        data.remove(ID_FIELD);
        Self { id, data }
    }

    /// Build a document from a row, keeping a caller-supplied `_id`.
    ///
    /// Numeric ids are stored in their decimal form.
    pub fn from_row(mut row: Row) -> Self {
        match row.remove(ID_FIELD).map(|id| id_from_json(&id)) {
            Some(Value::String(id)) => Self::with_id(id, row),
            _ => Self::new(row),
        }
    }

    /// Flatten back to a row with `_id` first.
    pub fn into_row(self) -> Row {
        let mut row = Row::new();
        row.insert(ID_FIELD.to_string(), Value::String(self.id));
        row.extend(self.data);
        row
    }

    /// Field lookup; `_id` resolves to the document id.
    pub fn field(&self, field: &str) -> Option<Value> {
        if field == ID_FIELD {
            Some(Value::String(self.id.clone()))
        } else {
            self.data.get(field).cloned()
        }
    }

    /// Shallow merge of `patch` into the document. `_id` is never changed.
    pub fn merge(&mut self, patch: &Row) {
        for (key, value) in patch {
            if key != ID_FIELD {
                self.data.insert(key.clone(), value.clone());
            }
        }
    }
}
