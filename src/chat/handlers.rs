use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::{instrument, warn};

use super::dto::{ChatMessage, ChatTranscript, SendMessageRequest, SendMessageResponse};
use super::services::answer;
use crate::{auth::extractors::RequireUser, session::session_gone, state::AppState};

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/chat", get(get_transcript).post(send_message))
}

#[instrument(skip(state, session), fields(session_id = %session.id))]
pub async fn get_transcript(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
) -> Result<Json<ChatTranscript>, (StatusCode, String)> {
    state
        .sessions
        .read_dashboard(session.id, |d| ChatTranscript {
            messages: d.chat.messages.clone(),
            profile: d.chat.profile.clone(),
        })
        .map(Json)
        .ok_or_else(session_gone)
}

/// POST /chat { text }
/// The user message is recorded before the model is called and stays even if the call fails.
#[instrument(skip(state, session, body), fields(session_id = %session.id))]
pub async fn send_message(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, (StatusCode, String)> {
    let text = body.text.trim().to_string();
    if text.is_empty() {
        warn!("empty chat message");
        return Err((StatusCode::BAD_REQUEST, "text must not be empty".into()));
    }

    let message = ChatMessage::user(text.clone());
    let conversation = state
        .sessions
        .update_dashboard(session.id, |d| {
            d.chat.messages.push(message.clone());
            d.chat.session.clone()
        })
        .ok_or_else(session_gone)?;

    // Held until the reply is merged; the profile is read under it.
    let mut chat = conversation.lock().await;
    let profile = state
        .sessions
        .read_dashboard(session.id, |d| d.chat.profile.clone())
        .ok_or_else(session_gone)?;

    let reply = answer(&mut chat, &text, &profile).await;

    let policy = state.config.profile_list_merge;
    let assistant = ChatMessage::assistant(reply.display_text);
    let profile = state
        .sessions
        .update_dashboard(session.id, |d| {
            if let Some(update) = reply.profile_update {
                d.chat.profile.merge(update, policy);
            }
            d.chat.messages.push(assistant.clone());
            d.chat.profile.clone()
        })
        .ok_or_else(session_gone)?;
    drop(chat);

    Ok(Json(SendMessageResponse {
        message,
        reply: assistant,
        profile,
    }))
}
