use crate::pii::Masked;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of whoever requested a hold, tagged by the flow that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HolderInfo {
    /// Anonymous buyer going through the public checkout form.
    Guest {
        full_name: String,
        email: Masked<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phone: Option<Masked<String>>,
        /// Organizer-defined form fields (company, student id, ...).
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, serde_json::Value>,
    },
    /// Signed-in customer account.
    Member {
        user_id: String,
        email: Masked<String>,
    },
    /// Back-office user blocking a seat by hand.
    Staff {
        staff_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl HolderInfo {
    pub fn kind(&self) -> &'static str {
        match self {
            HolderInfo::Guest { .. } => "guest",
            HolderInfo::Member { .. } => "member",
            HolderInfo::Staff { .. } => "staff",
        }
    }
}
