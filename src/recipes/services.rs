use tracing::{error, info, instrument};

use super::dto::Recipe;
use crate::chat::profile::HealthProfile;
use crate::genai::dto::{Content, GenerateContentRequest, GenerationConfig, Part, Schema};
use crate::genai::{generate_text, unfence, GenAiError, GenerativeModel};

#[derive(Debug, Default)]
pub struct RecipesState {
    pub recipes: Vec<Recipe>,
    pub is_generating: bool,
}

fn recipes_schema() -> Schema {
    let recipe = Schema::object()
        .property("name", Schema::string())
        .property("calories", Schema::number())
        .property("protein", Schema::string())
        .property("carbs", Schema::string())
        .property("fat", Schema::string())
        .property("prepTime", Schema::string())
        .property("tags", Schema::array(Schema::string()))
        .property(
            "explanation",
            Schema::string().describe("why this recipe suits the user's request"),
        )
        .property("ingredients", Schema::array(Schema::string()))
        .property("instructions", Schema::array(Schema::string()))
        .required(&[
            "name",
            "calories",
            "protein",
            "carbs",
            "fat",
            "prepTime",
            "tags",
            "explanation",
            "ingredients",
            "instructions",
        ]);
    Schema::array(recipe)
}

fn recipes_prompt(preferences: &str) -> String {
    format!(
        "Eres un chef nutricionista. Genera 3 recetas saludables en español que se ajusten \
         a estas preferencias del usuario:\n{preferences}\n\n\
         Para cada receta indica calorías por porción, gramos de proteína, carbohidratos y \
         grasa (por ejemplo \"25g\"), tiempo de preparación, etiquetas, ingredientes, pasos \
         y una explicación breve de por qué es adecuada para el usuario."
    )
}

/// Preferences text, followed by the health profile when there is one.
pub fn preferences_with_profile(preferences: &str, profile: Option<&HealthProfile>) -> String {
    let preferences = preferences.trim();
    match profile.and_then(HealthProfile::prompt_context) {
        Some(context) if preferences.is_empty() => format!("Perfil: {context}"),
        Some(context) => format!("{preferences}\nPerfil: {context}"),
        None => preferences.to_string(),
    }
}

async fn request_recipes(
    model: &dyn GenerativeModel,
    preferences: &str,
) -> Result<Vec<Recipe>, GenAiError> {
    let request = GenerateContentRequest {
        system_instruction: None,
        contents: vec![Content::user(vec![Part::text(recipes_prompt(preferences))])],
        generation_config: Some(GenerationConfig::json(recipes_schema())),
    };
    let text = generate_text(model, &request).await?;
    Ok(serde_json::from_str(unfence(&text))?)
}

/// Never fails: any error is logged and yields no recipes.
#[instrument(skip_all)]
pub async fn generate_recipes(model: &dyn GenerativeModel, preferences: &str) -> Vec<Recipe> {
    match request_recipes(model, preferences).await {
        Ok(recipes) => {
            info!(count = recipes.len(), "recipes generated");
            recipes
        }
        Err(e) => {
            error!(error = %e, "recipe generation failed");
            Vec::new()
        }
    }
}
