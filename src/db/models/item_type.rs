use serde::{Deserialize, Serialize};

/// An entry in the catalog of things that can be put on a probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemType {
    pub name: String,
    pub description: String,
}
