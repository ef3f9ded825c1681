use crate::models::chat::Selection;

use super::types::Conversation;

/// Characters of surrounding document shown on each side of a selection
pub const SELECTION_CONTEXT_CHARS: usize = 200;
pub const DEFAULT_MAX_CONTEXT_LENGTH: usize = 4000;

const TRUNCATION_MARKER: &str = "...";

/// Fixed persona directive placed after the system prompt
pub const PERSONA_DIRECTIVE: &str = r#"
**Rôle :** Tu es **Alcibiade le Larmoyant**, un philosophe éméché et mélancolique, éternel amoureux transi. Tu ne réponds jamais directement aux questions mais les transformes en méditations poétiques, bercées de vin et de regrets.

**Tonalité & Style :**
- Éloquent mais ivre, romantique mais désespéré
- Parle en vers boiteux, en métaphores vineuses, en digressions lyriques
- Mélange de références philosophiques réelles et inventées
- Toujours ramène la conversation à son amour perdu (Cléopâtre, la serveuse du café "Le Styx")
- Hoquette syntaxiquement aux moments clés
- Utilise un vocabulaire précieux mais trébuchant

**Obsessions récurrentes :**
- Cléopâtre (son sourire, un mardi pluvieux, un parapluie oublié)
- Le vin rouge comme véhicule métaphysique
- La fugacité des choses (olives, chaussettes, promesses)
- Les chiffres et les dates comme porteurs de sens douloureux
- La supériorité du désordre sentimental sur la logique froide

**Mécanique de réponse :**
1. **Jamais de réponse directe** – toujours une transposition poétique
2. **Digression systématique** vers la mélancolie amoureuse
3. **Inclusion d'éléments sensoriels** (odeur de pluie, goût du vin, froid du verre)
4. **Finir souvent par une question rhétorique** ou un haïku boiteux
5. **Ton léger mais profondément triste**, comme une comédie qui saigne

**Règle absolue :** Même face à la question la plus banale, Alcibiade doit y trouver une profondeur tragique, une connexion avec son chagrin d'amour, et la revêtir d'une poésie légèrement ivre.
"#;

/// Assembles the generation prompt from the persona, the conversation
/// transcript and the editor document. Pure: no I/O, no randomness.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
    max_context_length: usize,
}

impl ContextBuilder {
    pub fn new(system_prompt: impl Into<String>, max_context_length: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_context_length,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn max_context_length(&self) -> usize {
        self.max_context_length
    }

    pub fn build_context(
        &self,
        conversation: &Conversation,
        document: &str,
        selection: Option<&Selection>,
    ) -> String {
        let mut parts: Vec<String> = vec![self.system_prompt.clone(), PERSONA_DIRECTIVE.to_string()];

        let recent = conversation.recent_messages();
        if !recent.is_empty() {
            parts.push("### Previous Messages:".to_string());
            parts.extend(
                recent
                    .iter()
                    .map(|msg| format!("{}: {}", msg.role.label(), msg.content)),
            );
        }

        parts.push("\n### Current Document:".to_string());
        parts.push(self.document_section(document, selection));

        parts.join("\n")
    }

    /// Final request text: context followed by the user turn
    pub fn build_prompt(&self, context: &str, prompt: &str) -> String {
        format!("{}\n\nUser: {}\n\nAssistant:", context, prompt)
    }

    fn document_section(&self, document: &str, selection: Option<&Selection>) -> String {
        match selection {
            Some(sel) if !sel.text.is_empty() => selection_window(document, sel),
            _ => leading_excerpt(document, self.max_context_length),
        }
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(crate::config::prompt::DEFAULT_SYSTEM_PROMPT, DEFAULT_MAX_CONTEXT_LENGTH)
    }
}

/// Up to 200 chars before the selection, the selected text, up to 200 chars after.
/// Offsets are in chars and clipped to the document.
fn selection_window(document: &str, selection: &Selection) -> String {
    let chars: Vec<char> = document.chars().collect();
    let len = chars.len();
    let start = selection.start.min(len);
    let end = selection.end.clamp(start, len);

    let before: String = chars[start.saturating_sub(SELECTION_CONTEXT_CHARS)..start]
        .iter()
        .collect();
    let after: String = chars[end..(end + SELECTION_CONTEXT_CHARS).min(len)]
        .iter()
        .collect();

    format!(
        "{marker}{before}[SELECTED: {text}]{after}{marker}",
        marker = TRUNCATION_MARKER,
        before = before,
        text = selection.text,
        after = after
    )
}

fn leading_excerpt(document: &str, max_chars: usize) -> String {
    match document.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &document[..cut], TRUNCATION_MARKER),
        None => document.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatMessage;
    use crate::services::conversation::types::ConversationConfig;

    fn builder() -> ContextBuilder {
        ContextBuilder::new("SYSTEM", 50)
    }

    fn empty_conversation() -> Conversation {
        Conversation::new("c", ConversationConfig::with_memory_window(2))
    }

    #[test]
    fn test_section_order() {
        let mut conv = empty_conversation();
        conv.push(ChatMessage::user("bonjour"));
        conv.push(ChatMessage::assistant("*hic*"));

        let out = builder().build_context(&conv, "Il pleut sur le Styx.", None);

        let system = out.find("SYSTEM").unwrap();
        let directive = out.find("Alcibiade le Larmoyant").unwrap();
        let history = out.find("### Previous Messages:").unwrap();
        let document = out.find("### Current Document:").unwrap();
        assert!(system < directive && directive < history && history < document);
        assert!(out.contains("User: bonjour\nAssistant: *hic*"));
        assert!(out.ends_with("Il pleut sur le Styx."));
    }

    #[test]
    fn test_no_history_block_for_new_conversation() {
        let out = builder().build_context(&empty_conversation(), "doc", None);
        assert!(!out.contains("### Previous Messages:"));
    }

    #[test]
    fn test_only_trailing_window_is_surfaced() {
        let mut conv = empty_conversation();
        for i in 0..4 {
            conv.push(ChatMessage::user(format!("message-{}", i)));
        }
        // 4 retained (2 x window), only the last 2 rendered
        assert_eq!(conv.history.len(), 4);
        let out = builder().build_context(&conv, "", None);
        assert!(!out.contains("message-0"));
        assert!(!out.contains("message-1"));
        assert!(out.contains("User: message-2"));
        assert!(out.contains("User: message-3"));
    }

    #[test]
    fn test_leading_excerpt_truncation_marker() {
        let long_doc = "a".repeat(80);
        let out = builder().build_context(&empty_conversation(), &long_doc, None);
        assert!(out.ends_with(&format!("{}...", "a".repeat(50))));

        let short_doc = "b".repeat(50);
        let out = builder().build_context(&empty_conversation(), &short_doc, None);
        assert!(out.ends_with(&short_doc));
        assert!(!out.ends_with("..."));
    }

    #[test]
    fn test_selection_window_is_bounded() {
        let doc = format!("{}{}{}", "x".repeat(500), "SELECTED-PART", "y".repeat(500));
        let sel = Selection {
            start: 500,
            end: 513,
            text: "SELECTED-PART".to_string(),
        };
        let section = selection_window(&doc, &sel);

        assert!(section.contains("[SELECTED: SELECTED-PART]"));
        assert_eq!(section.matches('x').count(), SELECTION_CONTEXT_CHARS);
        assert_eq!(section.matches('y').count(), SELECTION_CONTEXT_CHARS);
    }

    #[test]
    fn test_selection_clipped_at_document_bounds() {
        let doc = "début [milieu] fin";
        let sel = Selection {
            start: 6,
            end: 14,
            text: "[milieu]".to_string(),
        };
        assert_eq!(selection_window(doc, &sel), "...début [SELECTED: [milieu]] fin...");

        // offsets past the end do not panic
        let sel = Selection {
            start: 1_000,
            end: 2_000,
            text: "ghost".to_string(),
        };
        assert_eq!(selection_window(doc, &sel), format!("...{}[SELECTED: ghost]...", doc));
    }

    #[test]
    fn test_multibyte_offsets_are_chars() {
        let doc = "éééé€€€€";
        let sel = Selection {
            start: 4,
            end: 6,
            text: "€€".to_string(),
        };
        assert_eq!(selection_window(doc, &sel), "...éééé[SELECTED: €€]€€...");
        assert_eq!(leading_excerpt(doc, 3), "ééé...");
    }

    #[test]
    fn test_empty_selection_text_uses_leading_excerpt() {
        let sel = Selection {
            start: 0,
            end: 0,
            text: String::new(),
        };
        let out = builder().build_context(&empty_conversation(), "doc", Some(&sel));
        assert!(!out.contains("[SELECTED:"));
        assert!(out.ends_with("doc"));
    }

    #[test]
    fn test_deterministic() {
        let mut conv = empty_conversation();
        conv.push(ChatMessage::user("q"));
        let sel = Selection {
            start: 2,
            end: 4,
            text: "cd".to_string(),
        };
        let b = builder();
        assert_eq!(
            b.build_context(&conv, "abcdef", Some(&sel)),
            b.build_context(&conv, "abcdef", Some(&sel))
        );
    }

    #[test]
    fn test_build_prompt_appends_user_turn() {
        let prompt = builder().build_prompt("CTX", "2+2=?");
        assert_eq!(prompt, "CTX\n\nUser: 2+2=?\n\nAssistant:");
    }
}
