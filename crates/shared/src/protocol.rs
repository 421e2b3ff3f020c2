use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ItemId;

/// A persisted list entry as served by the collection resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Create request body. Carries no identifier; the server assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl NewItem {
    pub fn new(text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            created_at,
        }
    }
}
