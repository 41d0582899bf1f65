//! Splits a raw assistant turn into the text shown to the user and an
//! optional profile update.
//!
//! Chat turns request a structured envelope `{ "reply", "user_profile_update" }`.
//! Models that ignore the schema fall back to the older convention of a fenced
//! ```` ```json ```` block carrying `user_profile_update` inside the prose.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::profile::ProfileUpdate;
use crate::genai::unfence;

pub const PROFILE_ONLY_REPLY: &str = "¡Gracias! He actualizado tu perfil.";

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub display_text: String,
    pub profile_update: Option<ProfileUpdate>,
}

#[derive(Deserialize)]
struct ChatEnvelope {
    reply: String,
    #[serde(default)]
    user_profile_update: Option<Value>,
}

lazy_static! {
    /// One fenced block: language tag, then the body up to the first closing fence.
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\n(.*?)\n?```").unwrap();
}

pub fn extract_reply(raw: &str) -> AssistantReply {
    let candidate = unfence(raw);
    if candidate.starts_with('{') {
        if let Ok(envelope) = serde_json::from_str::<ChatEnvelope>(candidate) {
            let from_envelope = envelope
                .user_profile_update
                .as_ref()
                .and_then(ProfileUpdate::from_value)
                .filter(|u| !u.is_empty());
            let inner = extract_fenced(&envelope.reply);
            return finish(inner.display_text, from_envelope.or(inner.profile_update));
        }
    }
    extract_fenced(raw)
}

fn finish(display_text: String, profile_update: Option<ProfileUpdate>) -> AssistantReply {
    let display_text = if display_text.trim().is_empty() && profile_update.is_some() {
        PROFILE_ONLY_REPLY.to_string()
    } else {
        display_text
    };
    AssistantReply {
        display_text,
        profile_update,
    }
}

fn extract_fenced(raw: &str) -> AssistantReply {
    if !FENCED_BLOCK.is_match(raw) {
        return AssistantReply {
            display_text: raw.to_string(),
            profile_update: None,
        };
    }

    let mut display = String::with_capacity(raw.len());
    let mut last = 0;
    let mut update: Option<ProfileUpdate> = None;
    let mut stripped = false;

    for caps in FENCED_BLOCK.captures_iter(raw) {
        let (Some(block), Some(tag), Some(body)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let body = body.as_str().trim();
        let tag = tag.as_str();
        if !(tag.is_empty() || tag.eq_ignore_ascii_case("json")) || !body.starts_with('{') {
            continue;
        }
        let strip = match serde_json::from_str::<Value>(body) {
            Ok(parsed) => match parsed.get("user_profile_update") {
                Some(fields) => {
                    if let Some(found) = ProfileUpdate::from_value(fields) {
                        match update.as_mut() {
                            Some(acc) => merge_updates(acc, found),
                            None => update = Some(found),
                        }
                    }
                    true
                }
                // Some other JSON the assistant chose to show.
                None => false,
            },
            Err(e) => {
                warn!(error = %e, "malformed profile block in assistant reply; hiding it");
                true
            }
        };
        if strip {
            display.push_str(&raw[last..block.start()]);
            last = block.end();
            stripped = true;
        }
    }

    if !stripped {
        return AssistantReply {
            display_text: raw.to_string(),
            profile_update: None,
        };
    }
    display.push_str(&raw[last..]);
    finish(
        display.trim().to_string(),
        update.filter(|u| !u.is_empty()),
    )
}

/// Combines two blocks of the same turn: later scalars win, lists append.
fn merge_updates(acc: &mut ProfileUpdate, next: ProfileUpdate) {
    macro_rules! take {
        ($($field:ident),*) => {
            $( if next.$field.is_some() { acc.$field = next.$field; } )*
        };
    }
    take!(age, weight_kg, height_cm, goal, activity, preferences, dislikes);
    acc.conditions.extend(next.conditions);
    acc.allergies.extend(next.allergies);
}

#[cfg(test)]
mod extract_tests {
    use super::*;

    #[test]
    fn plain_text_is_shown_verbatim() {
        let raw = "  Una manzana tiene unas 95 kcal.\n";
        let reply = extract_reply(raw);
        assert_eq!(reply.display_text, raw);
        assert!(reply.profile_update.is_none());
    }

    #[test]
    fn fenced_profile_block_is_removed_and_parsed() {
        let raw = "¡Perfecto! Lo tendré en cuenta.\n\n```json\n{\"user_profile_update\": {\"edad\": 29, \"alergias\": [\"maní\"]}}\n```";
        let reply = extract_reply(raw);
        assert_eq!(reply.display_text, "¡Perfecto! Lo tendré en cuenta.");
        assert!(!reply.display_text.contains("```"));
        assert!(!reply.display_text.contains("user_profile_update"));
        let update = reply.profile_update.unwrap();
        assert_eq!(update.age, Some(29));
        assert_eq!(update.allergies, vec!["maní"]);
    }

    #[test]
    fn block_in_the_middle_keeps_surrounding_prose() {
        let raw = "Anotado.\n```\n{\"user_profile_update\": {\"goal\": \"maintain\"}}\n```\nSigamos con tu plan.";
        let reply = extract_reply(raw);
        assert_eq!(reply.display_text, "Anotado.\n\nSigamos con tu plan.");
        assert_eq!(reply.profile_update.unwrap().goal.as_deref(), Some("maintain"));
    }

    #[test]
    fn malformed_block_is_hidden_without_update() {
        let raw = "Listo.\n```json\n{ user_profile_update: {edad: 30 }\n```";
        let reply = extract_reply(raw);
        assert_eq!(reply.display_text, "Listo.");
        assert!(reply.profile_update.is_none());
    }

    #[test]
    fn unrelated_json_blocks_stay_visible() {
        let raw = "Ejemplo de registro:\n```json\n{\"comida\": \"avena\"}\n```";
        let reply = extract_reply(raw);
        assert_eq!(reply.display_text, raw);
        assert!(reply.profile_update.is_none());
    }

    #[test]
    fn structured_envelope_is_preferred() {
        let raw = r#"{"reply": "Te recomiendo más fibra.", "user_profile_update": {"conditions": ["estreñimiento"]}}"#;
        let reply = extract_reply(raw);
        assert_eq!(reply.display_text, "Te recomiendo más fibra.");
        assert_eq!(reply.profile_update.unwrap().conditions, vec!["estreñimiento"]);
    }

    #[test]
    fn envelope_without_update_has_none() {
        let reply = extract_reply(r#"{"reply": "Hola", "user_profile_update": {}}"#);
        assert_eq!(reply.display_text, "Hola");
        assert!(reply.profile_update.is_none());
    }

    #[test]
    fn profile_only_turn_gets_an_acknowledgement() {
        let reply = extract_reply("```json\n{\"user_profile_update\": {\"peso\": 70}}\n```");
        assert_eq!(reply.display_text, PROFILE_ONLY_REPLY);
        assert_eq!(reply.profile_update.unwrap().weight_kg, Some(70.0));
    }

    #[test]
    fn json_that_is_not_an_envelope_is_treated_as_text() {
        let raw = r#"{"calorias": 200}"#;
        assert_eq!(extract_reply(raw).display_text, raw);
    }

    #[test]
    fn unterminated_block_does_not_swallow_the_next_one() {
        let raw = "Hola.\n```json\n{ \"user_profile_update\": { \"edad\": 30 \n```\nTu plan es comer verduras.\n```json\n{\"user_profile_update\": {\"peso\": 70}}\n```";
        let reply = extract_reply(raw);
        assert_eq!(reply.display_text, "Hola.\n\nTu plan es comer verduras.");
        let update = reply.profile_update.unwrap();
        assert_eq!(update.weight_kg, Some(70.0));
        assert_eq!(update.age, None);
    }

    #[test]
    fn code_in_other_languages_is_left_alone() {
        let raw = "Así se calcula:\n```python\nkcal = {\"p\": 4}\n```\nListo.\n```json\n{\"user_profile_update\": {\"goal\": \"bajar\"}}\n```";
        let reply = extract_reply(raw);
        assert!(reply.display_text.contains("```python"));
        assert!(reply.display_text.ends_with("Listo."));
        assert_eq!(reply.profile_update.unwrap().goal.as_deref(), Some("bajar"));
    }

    #[test]
    fn fenced_envelope_keeps_its_reply() {
        let raw = "```json\n{\"reply\": \"Come más fibra.\", \"user_profile_update\": {\"age\": 30}}\n```";
        let reply = extract_reply(raw);
        assert_eq!(reply.display_text, "Come más fibra.");
        assert_eq!(reply.profile_update.unwrap().age, Some(30));
    }

    #[test]
    fn fenced_envelope_without_update_shows_only_the_reply() {
        let reply = extract_reply("```json\n{\"reply\": \"Come más fibra.\"}\n```");
        assert_eq!(reply.display_text, "Come más fibra.");
        assert!(reply.profile_update.is_none());
    }
}
