//! Free-alternative suggestions for paid services.
//!
//! A static table, no network I/O. The first key contained in the lowercased
//! service name wins.

const ALTERNATIVES: &[(&str, &[&str])] = &[
    (
        "openai",
        &["Ollama (local)", "Groq free tier", "Together.ai free", "HuggingFace Inference"],
    ),
    ("gpt-4", &["Llama 3.1 70B on Groq", "Mixtral 8x7B", "DeepSeek Coder"]),
    ("claude", &["Llama 3.2", "Mistral", "Command R on Cohere"]),
    (
        "dalle",
        &["Stable Diffusion (local)", "Leonardo.ai free", "Bing Image Creator"],
    ),
    ("midjourney", &["Stable Diffusion", "Leonardo.ai", "Playground AI"]),
    (
        "github copilot",
        &["Codeium (free)", "TabNine free", "Continue.dev with Ollama"],
    ),
    ("notion ai", &["Obsidian + Ollama", "Logseq", "Anytype"]),
];

const FALLBACK: &[&str] = &[
    "Search GitHub for open source alternatives",
    "Check AlternativeTo.net",
    "Try self-hosted options",
];

/// Suggest free alternatives for `service`. Never empty.
pub fn free_alternatives(service: &str) -> Vec<String> {
    let lower = service.to_lowercase();
    let list = ALTERNATIVES
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|(_, alts)| *alts)
        .unwrap_or(FALLBACK);
    list.iter().map(|s| s.to_string()).collect()
}
