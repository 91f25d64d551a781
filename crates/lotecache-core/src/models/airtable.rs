use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::{opt_string, split_list};

/// A row of the Airtable inventory table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirtableRecord {
    pub id: String,
    #[serde(rename = "createdTime", default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl AirtableRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field as text; numbers are stringified, blanks are None.
    pub fn text(&self, name: &str) -> Option<String> {
        opt_string(self.fields.get(name))
    }

    /// Field as a list: attachment-style arrays or comma-separated text.
    pub fn list(&self, name: &str) -> Vec<String> {
        split_list(self.fields.get(name))
    }
}

/// Response of `GET /v0/{base}/{table}`. `offset` is present while more
/// pages remain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub records: Vec<AirtableRecord>,
    #[serde(default)]
    pub offset: Option<String>,
}
