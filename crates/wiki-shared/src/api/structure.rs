use serde::{Deserialize, Serialize};

use crate::structure::NodeKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureItem {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub order: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReorderStructureRequest {
    pub items: Vec<StructureItem>,
}
