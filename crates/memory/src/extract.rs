//! Heuristic entity extraction.
//!
//! No model calls: technologies and places come from fixed vocabularies,
//! people from runs of capitalized words in the user's own text.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex_lite::Regex;
use switchboard_core::knowledge::{EntityKind, ExtractedEntity};

const TECH_VOCABULARY: &[&str] = &[
    "python", "javascript", "typescript", "rust", "go", "java", "c++", "c#",
    "ruby", "php", "swift", "kotlin", "scala", "haskell", "elixir", "lua",
    "cobol", "sql", "html", "css", "bash", "powershell", "docker", "kubernetes",
    "react", "vue", "angular", "svelte", "fastapi", "flask", "django", "express",
    "node", "nodejs", "deno", "bun", "ollama", "pytorch", "tensorflow",
    "raspberry pi", "arduino", "linux", "debian", "ubuntu", "windows", "macos",
    "git", "github", "gitlab", "sqlite", "postgres", "postgresql", "mongodb",
    "redis", "nginx", "anthropic", "openai", "gemma", "llama", "mistral",
    "deepseek", "qwen", "claude", "gpt", "telegram", "discord", "whatsapp",
];

const PLACE_VOCABULARY: &[&str] = &[
    "milano", "roma", "napoli", "torino", "firenze", "bologna", "venezia",
    "palermo", "genova", "bari", "catania", "verona", "padova", "trieste",
    "brescia", "bergamo", "modena", "parma", "como", "monza", "pavia",
    "italia", "germany", "france", "spain", "uk", "usa", "japan", "china",
    "london", "paris", "berlin", "new york", "tokyo", "amsterdam", "barcelona",
    "san francisco", "los angeles", "chicago", "seattle", "singapore",
];

/// Capitalized phrases that are greetings or UI labels, not people.
const NAME_STOPWORDS: &[&str] = &[
    "Come Posso", "Ciao Come", "Buon Giorno", "Buona Sera", "Per Favore",
    "Per Esempio", "Grazie Mille", "Che Cosa", "Non Posso", "Come Stai",
    "Buona Notte", "Ecco Come", "Vessel Dashboard", "Knowledge Graph",
    "Remote Code", "Chat Mode", "Home View", "Full Text", "Context Pruning",
    "Query String", "Rate Limit", "System Prompt",
];

const NAME_MIN_CHARS: usize = 5;
const NAME_MAX_CHARS: usize = 50;

// No `\b` anchors: regex-lite word boundaries are ASCII-only, so
// `standalone` checks the neighbours of each match instead.
static PROPER_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"[A-ZÀ-Ü][a-zà-ü]{2,}(?:\s+[A-ZÀ-Ü][a-zà-ü]{2,})+").ok()
});

/// Extract entities from one exchange.
///
/// Vocabulary terms are matched case-insensitively across both texts and
/// must stand as whole words. Person names are only taken from `user_text`.
/// Each `(kind, name)` appears at most once, in vocabulary order followed by
/// names in text order.
pub fn extract_entities(user_text: &str, reply_text: &str) -> Vec<ExtractedEntity> {
    let combined = format!("{user_text} {reply_text}").to_lowercase();
    let mut seen = HashSet::new();
    let mut entities = Vec::new();

    for term in TECH_VOCABULARY {
        if contains_word(&combined, term) && seen.insert((EntityKind::Tech, term.to_string())) {
            entities.push(ExtractedEntity::new(EntityKind::Tech, *term));
        }
    }

    for term in PLACE_VOCABULARY {
        if contains_word(&combined, term) && seen.insert((EntityKind::Place, term.to_string())) {
            entities.push(ExtractedEntity::new(EntityKind::Place, title_case(term)));
        }
    }

    if let Some(re) = PROPER_NAME.as_ref() {
        for m in re.find_iter(user_text) {
            if !standalone(user_text, m.start(), m.end()) {
                continue;
            }
            let name = m.as_str();
            if NAME_STOPWORDS.contains(&name) {
                continue;
            }
            let len = name.chars().count();
            if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&len) {
                continue;
            }
            if seen.insert((EntityKind::Person, name.to_lowercase())) {
                entities.push(ExtractedEntity::new(EntityKind::Person, name));
            }
        }
    }

    entities
}

/// Whether `needle` occurs in `haystack` as a standalone word. Both are
/// expected lowercase.
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack
        .match_indices(needle)
        .any(|(start, _)| standalone(haystack, start, start + needle.len()))
}

/// No alphanumeric character touches `text[start..end]` on either side.
fn standalone(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
