//! Read-only lookup of state codes, served alongside the catalog.

use serde::Serialize;

/// One row of the state-code table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateCode {
    pub code: String,
    #[serde(rename = "state_name")]
    pub name: String,
}

impl StateCode {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}
