use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Nutrition facts for one food photo, as the model reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionData {
    pub food_name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    /// 0-100, not range-checked.
    pub health_score: f64,
    pub description: String,
    pub advice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisState {
    pub is_loading: bool,
    pub error: Option<String>,
    pub data: Option<NutritionData>,
    pub image_preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroSlice {
    pub name: &'static str,
    pub grams: f64,
    pub percent: f64,
}

#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub id: Uuid,
    pub food_name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub analyzed_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub id: Uuid,
    pub food_name: String,
    pub calories: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub analyzed_at: OffsetDateTime,
    pub time_ago: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DaySummary {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub analyses: usize,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeImageRequest {
    /// Data URL (`data:image/png;base64,...`) or bare base64.
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    #[serde(flatten)]
    pub analysis: AnalysisState,
    pub macros: Vec<MacroSlice>,
}
