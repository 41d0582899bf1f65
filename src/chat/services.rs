use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, instrument};

use super::dto::ChatMessage;
use super::extract::{extract_reply, AssistantReply};
use super::profile::HealthProfile;
use crate::genai::dto::{Content, GenerateContentRequest, GenerationConfig, Part, Schema};
use crate::genai::{generate_text, GenAiError, GenerativeModel};

pub const CHAT_FALLBACK_REPLY: &str =
    "Lo siento, tuve un problema al procesar tu mensaje. Intenta de nuevo.";

const SYSTEM_PROMPT: &str = "\
Eres NutriLens Pro, un asistente de nutrición clínica. Responde siempre en español, \
con un tono cercano y basado en evidencia científica. Da recomendaciones concretas y \
breves. No diagnostiques enfermedades; sugiere consultar a un profesional cuando haya \
riesgo.

Cuando el usuario revele datos personales de salud (edad, peso, altura, objetivo, \
nivel de actividad, condiciones médicas, alergias, preferencias o alimentos que no le \
gustan), inclúyelos en `user_profile_update` usando las claves age, weight, height, \
goal, activity, conditions, allergies, preferences y dislikes. Incluye solo los datos \
nuevos del mensaje actual. Tu respuesta para el usuario va en `reply`.";

/// Tab-local chat state kept in the session.
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    pub profile: HealthProfile,
    pub session: Arc<Mutex<NutritionChat>>,
}

impl ChatState {
    pub fn new(chat: NutritionChat) -> Self {
        Self {
            messages: Vec::new(),
            profile: HealthProfile::default(),
            session: Arc::new(Mutex::new(chat)),
        }
    }
}

/// Multi-turn conversation with the model, alive as long as the chat tab.
pub struct NutritionChat {
    model: Arc<dyn GenerativeModel>,
    system_instruction: Content,
    history: Vec<Content>,
}

pub fn create_nutrition_chat(model: Arc<dyn GenerativeModel>) -> NutritionChat {
    NutritionChat {
        model,
        system_instruction: Content::instruction(SYSTEM_PROMPT),
        history: Vec::new(),
    }
}

fn reply_schema() -> Schema {
    let profile = Schema::object()
        .property("age", Schema::number())
        .property("weight", Schema::number().describe("kg"))
        .property("height", Schema::number().describe("cm"))
        .property("goal", Schema::string())
        .property("activity", Schema::string())
        .property("conditions", Schema::array(Schema::string()))
        .property("allergies", Schema::array(Schema::string()))
        .property("preferences", Schema::string())
        .property("dislikes", Schema::string())
        .nullable();
    Schema::object()
        .property("reply", Schema::string())
        .property("user_profile_update", profile)
        .required(&["reply"])
}

impl NutritionChat {
    /// Number of turns (user and model) the model has seen so far.
    pub fn turns(&self) -> usize {
        self.history.len()
    }

    /// Appends one user turn and waits for one model turn.
    /// History only grows when the model answers.
    #[instrument(skip_all, fields(turns = self.history.len()))]
    pub async fn send_message(
        &mut self,
        text: &str,
        profile: &HealthProfile,
    ) -> Result<String, GenAiError> {
        let mut parts = Vec::with_capacity(2);
        if let Some(context) = profile.prompt_context() {
            parts.push(Part::text(format!("[Perfil actual del usuario: {context}]")));
        }
        parts.push(Part::text(text));
        let user_turn = Content::user(parts);

        let mut contents = self.history.clone();
        contents.push(user_turn.clone());
        let request = GenerateContentRequest {
            system_instruction: Some(self.system_instruction.clone()),
            contents,
            generation_config: Some(GenerationConfig::json(reply_schema())),
        };

        let raw = generate_text(self.model.as_ref(), &request).await?;
        self.history.push(user_turn);
        self.history.push(Content::model_text(raw.clone()));
        Ok(raw)
    }
}

/// One chat exchange. Failures turn into the fixed fallback reply.
/// Callers hold the session's chat lock, so `profile` already reflects earlier turns.
pub async fn answer(chat: &mut NutritionChat, text: &str, profile: &HealthProfile) -> AssistantReply {
    match chat.send_message(text, profile).await {
        Ok(raw) => {
            let reply = extract_reply(&raw);
            info!(
                turns = chat.turns(),
                profile_update = reply.profile_update.is_some(),
                "chat turn answered"
            );
            reply
        }
        Err(e) => {
            error!(error = %e, "chat turn failed");
            AssistantReply {
                display_text: CHAT_FALLBACK_REPLY.to_string(),
                profile_update: None,
            }
        }
    }
}
