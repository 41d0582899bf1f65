use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub name: String,
    pub calories: f64,
    /// Macro amounts as the model writes them, e.g. "32g".
    pub protein: String,
    pub carbs: String,
    pub fat: String,
    pub prep_time: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Why this recipe fits the request.
    pub explanation: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct GenerateRecipesRequest {
    pub preferences: String,
    /// Append the chat health profile to the preferences.
    #[serde(default = "default_true")]
    pub use_profile: bool,
}

#[derive(Debug, Serialize)]
pub struct RecipesResponse {
    pub recipes: Vec<Recipe>,
    pub is_generating: bool,
}
