use serde::{Deserialize, Serialize};

use super::chat::{ConfigPatch, Selection};

// ===== REQUEST MODELS =====

/// Body of `POST /ask`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskBody {
    #[serde(default)]
    pub prompt: Option<String>,
    /// Document text currently open in the editor
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub selection: Option<Selection>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub config: Option<ConfigPatch>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub response: String,
}
