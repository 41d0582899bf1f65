//! Client for the hosted generative model (Gemini `generateContent`).

mod client;
pub mod dto;
mod error;

#[cfg(test)]
pub use client::testing;
pub use client::{generate_text, GeminiClient, GenerativeModel};
pub use error::GenAiError;

/// Strips the Markdown code fence some models wrap around JSON output
/// even when JSON was requested.
pub fn unfence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
