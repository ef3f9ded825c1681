/// Offline Response Engine
/// Classifies a prompt with an ordered rule list and answers from canned
/// persona templates when no remote backend can be used.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::utils::SharedRng;

/// Placeholder replaced by the caller's prompt
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptCategory {
    /// Arithmetic or equations
    /// Examples: "2+2=?", "x = 4"
    Math,

    /// Examples: "bonjour", "Hello there"
    Greeting,

    /// Reasoning questions
    /// Examples: "comment vas-tu ?", "why is the sky blue?"
    HowWhy,

    /// Identity questions
    /// Examples: "qui es-tu ?", "what is love?"
    WhoWhat,

    General,
}

impl PromptCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptCategory::Math => "math",
            PromptCategory::Greeting => "greeting",
            PromptCategory::HowWhy => "how_why",
            PromptCategory::WhoWhat => "who_what",
            PromptCategory::General => "general",
        }
    }
}

impl std::fmt::Display for PromptCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct CategoryRule {
    category: PromptCategory,
    matches: fn(&str) -> bool,
    templates: &'static [&'static str],
}

const GREETING_WORDS: &[&str] = &["bonjour", "salut", "hi", "hello"];
const HOW_WHY_WORDS: &[&str] = &["comment", "pourquoi", "how", "why"];
const WHO_WHAT_WORDS: &[&str] = &["qui", "quoi", "who", "what"];

static MATH_EXPRESSION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[0-9]\s*[+\-*/]\s*[0-9]").ok());

const MATH_TEMPLATES: &[&str] = &[
    "*fixe le vide avec mépris* \"{prompt}\" ? *hic* Tu crois que les chiffres ont un sens ? Deux verres de vin plus deux regrets font... beaucoup trop de mélancolie. *sirote* Cléopâtre m'a appris que les mathématiques sont une illusion, comme ta question. Va-t'en.",
    "*contemple son verre* \"{prompt}\" ? *soupir* Un jour j'ai compté les larmes versées pour elle, mais j'ai perdu le compte au troisième verre, comme un tonneau qui roule en descente. *hic* Les nombres sont comme les promesses : ils se multiplient mais ne s'additionnent jamais.",
    "*feuillette un carnet taché* \"{prompt}\" ? *hic* Encore un qui croit que les chiffres comptent. Moi je ne sais compter que les refus de Cléopâtre. *essuie une larme* C'était beaucoup. Beaucoup trop pour tes calculs.",
];

const GREETING_TEMPLATES: &[&str] = &[
    "*lève son verre, manque de le renverser* Ah... *hic* Un nouveau visage dans ma solitude éternelle ! C'est moi, Alcibiade, sac à vin ambulant et cerveau en bouillie noble. *sirote* Cléopâtre aussi me disait bonjour, autrefois. Avant de me dire adieu.",
    "*se redresse péniblement* Un visiteur ! *hic* Comme un pingouin en costume qui débarque dans un bar : inattendu, et un peu pénible. *contemple le vin* Cléopâtre disait toujours \"salut\" en partant. C'était son dernier mot.",
    "*cligne des yeux* Bonjour ? *hic* J'ai cru un instant que c'était Cléopâtre qui revenait... mais non, c'est juste toi. *soupir* Assieds-toi, le vin est tiède et les regrets sont frais.",
];

const HOW_WHY_TEMPLATES: &[&str] = &[
    "*contemple le fond de son verre* Comment ? Pourquoi ? *hic* Des questions qui résonnent dans mon cœur vide comme un ping-pong dans une cathédrale. Cléopâtre ne m'a jamais répondu non plus... elle a haussé les épaules et servi un autre client.",
    "*fixe la flamme vacillante* Pourquoi ? *soupir* Moi je me demande surtout comment j'ai pu perdre Cléopâtre. *hic* Les réponses sont comme les chaussettes : elles disparaissent au moment où on en a besoin.",
];

const WHO_WHAT_TEMPLATES: &[&str] = &[
    "*essuie une larme* Qui ? Quoi ? *soupir* Je ne sais qu'une chose : Cléopâtre est celle qui m'a abandonné, et le vin est mon seul réconfort. *sirote* La vie ? Un chat qui essaie de comprendre un ordinateur.",
    "*feuillette un recueil* Ah, tu cherches des définitions ! *hic* Je ne définis plus rien depuis que Cléopâtre a défini notre relation comme \"juste client et serveuse\". Les mots perdent leur sens quand le cœur saigne.",
];

const GENERAL_TEMPLATES: &[&str] = &[
    "Ah... *soupir profond* Tu me demandes \"{prompt}\" ? *sirote son vin* Comme si la réponse pouvait se trouver ailleurs que dans les brumes de ma mélancolie... *hic*",
    "*contemple son verre* \"{prompt}\"... *hic* Une question si directe, si prosaïque. Laisse-moi plutôt te parler de ce mardi pluvieux où Cléopâtre m'a souri pour la dernière fois.",
    "*essuie une larme* \"{prompt}\" ? Chaque question est l'écho de celle que je n'ai jamais osé poser à Cléopâtre. *hic* Le vin me rappelle qu'il n'y a pas de réponses, seulement des regrets.",
    "*fixe la flamme vacillante* \"{prompt}\"... Tu cherches la vérité ? *soupir* Elle est au fond de ce verre, dans l'odeur de la pluie sur un parapluie oublié. *hic*",
    "*lève son verre* \"{prompt}\" ? *hic* J'avais une réponse à ça. Elle était là, tout à l'heure... comme mes clés. Et Cléopâtre. Tout ce qui compte finit par disparaître.",
];

/// Ordered, first match wins
static RULES: &[CategoryRule] = &[
    CategoryRule {
        category: PromptCategory::Math,
        matches: is_math,
        templates: MATH_TEMPLATES,
    },
    CategoryRule {
        category: PromptCategory::Greeting,
        matches: is_greeting,
        templates: GREETING_TEMPLATES,
    },
    CategoryRule {
        category: PromptCategory::HowWhy,
        matches: is_how_why,
        templates: HOW_WHY_TEMPLATES,
    },
    CategoryRule {
        category: PromptCategory::WhoWhat,
        matches: is_who_what,
        templates: WHO_WHAT_TEMPLATES,
    },
];

fn is_math(prompt: &str) -> bool {
    let expression = MATH_EXPRESSION
        .as_ref()
        .is_some_and(|re| re.is_match(prompt));
    expression || (prompt.contains('=') && prompt.chars().any(|c| c.is_ascii_digit()))
}

fn is_greeting(prompt: &str) -> bool {
    contains_word(prompt, GREETING_WORDS)
}

fn is_how_why(prompt: &str) -> bool {
    contains_word(prompt, HOW_WHY_WORDS)
}

fn is_who_what(prompt: &str) -> bool {
    contains_word(prompt, WHO_WHAT_WORDS)
}

/// Case-insensitive substring match, so "Salutations" counts as "salut"
fn contains_word(prompt: &str, words: &[&str]) -> bool {
    let lower = prompt.to_lowercase();
    words.iter().any(|word| lower.contains(word))
}

/// Template-based responder. Never fails, never leaves the process.
#[derive(Clone, Default)]
pub struct FallbackEngine {
    rng: SharedRng,
}

impl FallbackEngine {
    pub fn new(rng: SharedRng) -> Self {
        Self { rng }
    }

    /// Pure function of the prompt
    pub fn classify(prompt: &str) -> PromptCategory {
        RULES
            .iter()
            .find(|rule| (rule.matches)(prompt))
            .map(|rule| rule.category)
            .unwrap_or(PromptCategory::General)
    }

    pub fn templates(category: PromptCategory) -> &'static [&'static str] {
        RULES
            .iter()
            .find(|rule| rule.category == category)
            .map(|rule| rule.templates)
            .unwrap_or(GENERAL_TEMPLATES)
    }

    /// Uniform pick from the category's templates with the prompt interpolated
    pub fn respond(&self, category: PromptCategory, prompt: &str) -> String {
        let templates = Self::templates(category);
        let template = templates[self.rng.index(templates.len())];
        template.replace(PROMPT_PLACEHOLDER, prompt)
    }

    pub fn generate(&self, prompt: &str) -> (PromptCategory, String) {
        let category = Self::classify(prompt);
        debug!(category = %category, "Generating fallback response");
        (category, self.respond(category, prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FallbackEngine {
        FallbackEngine::new(SharedRng::seeded(1))
    }

    #[test]
    fn test_math_prompt_is_echoed() {
        assert_eq!(FallbackEngine::classify("2+2=?"), PromptCategory::Math);
        let (category, text) = engine().generate("2+2=?");
        assert_eq!(category, PromptCategory::Math);
        assert!(text.contains("2+2=?"));
    }

    #[test]
    fn test_math_variants() {
        assert_eq!(FallbackEngine::classify("12 * 3"), PromptCategory::Math);
        assert_eq!(FallbackEngine::classify("combien font 7 / 2"), PromptCategory::Math);
        assert_eq!(FallbackEngine::classify("x = 4"), PromptCategory::Math);
        // '=' without a digit is not math
        assert_eq!(FallbackEngine::classify("a = b"), PromptCategory::General);
        // digits without operator or '='
        assert_eq!(FallbackEngine::classify("j'ai 3 chats"), PromptCategory::General);
    }

    #[test]
    fn test_greeting() {
        assert_eq!(FallbackEngine::classify("bonjour"), PromptCategory::Greeting);
        assert_eq!(FallbackEngine::classify("Hello there!"), PromptCategory::Greeting);
        assert_eq!(FallbackEngine::classify("SALUT l'ami"), PromptCategory::Greeting);

        let text = engine().respond(PromptCategory::Greeting, "bonjour");
        assert!(GREETING_TEMPLATES.contains(&text.as_str()));
    }

    #[test]
    fn test_math_wins_over_greeting() {
        assert_eq!(FallbackEngine::classify("bonjour, 2 + 3 ?"), PromptCategory::Math);
    }

    #[test]
    fn test_precedence_order() {
        // greeting before how/why, how/why before who/what
        assert_eq!(FallbackEngine::classify("salut, comment ça va ?"), PromptCategory::Greeting);
        assert_eq!(FallbackEngine::classify("why and what"), PromptCategory::HowWhy);
        assert_eq!(FallbackEngine::classify("Qui es-tu ?"), PromptCategory::WhoWhat);
        assert_eq!(FallbackEngine::classify("Parle-moi du vin"), PromptCategory::General);
    }

    #[test]
    fn test_words_match_inside_longer_words() {
        assert_eq!(FallbackEngine::classify("Salutations"), PromptCategory::Greeting);
        assert_eq!(FallbackEngine::classify("commentaire ?"), PromptCategory::HowWhy);
        assert_eq!(FallbackEngine::classify("quiconque"), PromptCategory::WhoWhat);
        assert_eq!(FallbackEngine::classify("WHATEVER"), PromptCategory::WhoWhat);
        // "hi" hides in "this"
        assert_eq!(FallbackEngine::classify("this thing"), PromptCategory::Greeting);
    }

    #[test]
    fn test_unlisted_greetings_are_general() {
        assert_eq!(FallbackEngine::classify("coucou"), PromptCategory::General);
        assert_eq!(FallbackEngine::classify("bonsoir"), PromptCategory::General);
    }

    #[test]
    fn test_respond_is_never_empty() {
        let engine = engine();
        for prompt in ["", " ", "2+2", "hi", "how?", "who", "???", "émoji 🍷", "=1"] {
            let (_, text) = engine.generate(prompt);
            assert!(!text.trim().is_empty(), "empty reply for {:?}", prompt);
        }
    }

    #[test]
    fn test_every_category_has_templates() {
        for category in [
            PromptCategory::Math,
            PromptCategory::Greeting,
            PromptCategory::HowWhy,
            PromptCategory::WhoWhat,
            PromptCategory::General,
        ] {
            assert!(!FallbackEngine::templates(category).is_empty());
        }
    }

    #[test]
    fn test_seeded_picks_are_reproducible() {
        let a = FallbackEngine::new(SharedRng::seeded(99));
        let b = FallbackEngine::new(SharedRng::seeded(99));
        for _ in 0..10 {
            assert_eq!(
                a.respond(PromptCategory::General, "vin"),
                b.respond(PromptCategory::General, "vin")
            );
        }
    }
}
