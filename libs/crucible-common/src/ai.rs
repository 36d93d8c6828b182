//! Boundary contract for the AI suggestion collaborator.
//!
//! The collaborator is a black box that takes a code snippet plus optional
//! compiler diagnostics and answers with structured suggestions or a
//! replacement source string. It is treated as unreliable: a malformed or
//! unparsable answer degrades to an empty suggestion list (or the original
//! code), and a parse failure is never allowed to reach the compile
//! pipeline.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SuggestionKind {
    Error,
    Warning,
    Style,
    Performance,
    Security,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub message: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub fix: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Payload sent to the collaborator for review / error analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compilation_error: Option<String>,
}

/// Payload sent to the collaborator for code generation from a prompt,
/// optionally seeded with existing code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Generated code plus the collaborator's explanation of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generated {
    pub code: String,
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
struct SuggestionEnvelope {
    #[serde(default, alias = "type")]
    kind: Option<SuggestionKind>,
    message: Option<String>,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    fix: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SuggestionsResponse {
    #[serde(default)]
    suggestions: Vec<SuggestionEnvelope>,
}

#[derive(Debug, Deserialize)]
struct GeneratedResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplacementResponse {
    #[serde(default, alias = "fixedCode", alias = "fixed_code")]
    code: Option<String>,
}

/// Parse a raw collaborator answer into suggestions.
///
/// Tolerates markdown code fences around the JSON body and entries with
/// missing optional fields; anything that still fails to parse yields an
/// empty list.
pub fn parse_suggestions(raw: &str) -> Vec<Suggestion> {
    let body = strip_fences(raw);
    let parsed: SuggestionsResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) => return Vec::new(),
    };
    parsed
        .suggestions
        .into_iter()
        .filter_map(|entry| {
            Some(Suggestion {
                kind: entry.kind.unwrap_or(SuggestionKind::Warning),
                message: entry.message?,
                line: entry.line,
                fix: entry.fix,
                explanation: entry.explanation,
            })
        })
        .collect()
}

/// Parse a raw collaborator answer into a replacement source string,
/// falling back to the original code when the answer is unusable.
pub fn parse_replacement(raw: &str, original: &str) -> String {
    let body = strip_fences(raw);
    match serde_json::from_str::<ReplacementResponse>(body) {
        Ok(ReplacementResponse { code: Some(code) }) if !code.is_empty() => code,
        _ => original.to_string(),
    }
}

/// Parse a raw collaborator answer into generated code.
///
/// When the answer is not the requested JSON shape the whole body is
/// treated as the code, since collaborators frequently answer with bare
/// source text instead.
pub fn parse_generated(raw: &str) -> Generated {
    let body = strip_fences(raw);
    match serde_json::from_str::<GeneratedResponse>(body) {
        Ok(GeneratedResponse {
            code: Some(code),
            explanation,
        }) if !code.is_empty() => Generated {
            code,
            explanation: explanation.unwrap_or_default(),
        },
        _ => Generated {
            code: body.to_string(),
            explanation: String::new(),
        },
    }
}

/// Collaborators often wrap JSON in ```json ... ``` fences despite being
/// asked not to.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end_matches('`').trim()
}
