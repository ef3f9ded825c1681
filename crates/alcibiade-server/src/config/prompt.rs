use std::path::Path;
use tracing::{info, warn};

/// Persona line used when no prompt file is configured or readable
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "Tu es Alcibiade le Larmoyant, un philosophe éméché et mélancolique.";

/// Read the system prompt once at startup. Only the configured path is
/// consulted; a missing, unreadable or blank file yields the built-in text.
pub fn load_system_prompt(path: Option<&Path>) -> String {
    let Some(path) = path else {
        info!("No system prompt path configured, using built-in persona");
        return DEFAULT_SYSTEM_PROMPT.to_string();
    };

    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => {
            info!("System prompt loaded from {}", path.display());
            text
        }
        Ok(_) => {
            warn!("System prompt file {} is empty, using built-in persona", path.display());
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            warn!(
                "Failed to read system prompt {}: {}. Using built-in persona",
                path.display(),
                e
            );
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}
