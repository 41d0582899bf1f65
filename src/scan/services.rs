use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::dto::{AnalysisState, DaySummary, HistoryItem, MacroSlice, NutritionData, ScanRecord};
use crate::genai::dto::{Content, GenerateContentRequest, GenerationConfig, Part, Schema};
use crate::genai::{generate_text, unfence, GenAiError, GenerativeModel};

pub const ANALYSIS_ERROR_MESSAGE: &str =
    "No pudimos analizar la imagen. Intenta con una foto más clara.";

const NUTRITIONIST_PROMPT: &str = "\
You are NutriLens Pro, an expert AI nutritionist. Give an accurate, scientific yet \
accessible analysis of the food in the image.
1. Identify the food precisely.
2. Estimate calories and macros (grams of protein, carbs and fat) for a standard serving, \
following USDA reference values.
3. Compute a health score from 0 to 100 from nutrient density, processing level and \
sugar/sodium content.
4. Write a short clinical advice paragraph on its benefits or risks.
Write descriptive text in Spanish. Analyze this image and return the data as JSON.";

/// Image payload ready for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum DataUrlError {
    #[error("image payload is empty")]
    Empty,
    #[error("unsupported media type {0:?}, expected image/*")]
    NotAnImage(String),
    #[error("image payload is not valid base64")]
    InvalidBase64,
}

/// Accepts a `data:image/...;base64,` URL or bare base64 (taken as JPEG).
pub fn parse_data_url(input: &str) -> Result<ImagePayload, DataUrlError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DataUrlError::Empty);
    }

    let (mime_type, data) = match input.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest.split_once(',').ok_or(DataUrlError::InvalidBase64)?;
            let mut params = header.split(';');
            let mime = params.next().unwrap_or_default().trim().to_ascii_lowercase();
            if !mime.starts_with("image/") {
                return Err(DataUrlError::NotAnImage(mime));
            }
            if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
                return Err(DataUrlError::InvalidBase64);
            }
            (mime, data.trim())
        }
        None => ("image/jpeg".to_string(), input),
    };

    match STANDARD.decode(data) {
        Ok(bytes) if !bytes.is_empty() => Ok(ImagePayload {
            mime_type,
            data: data.to_string(),
        }),
        Ok(_) => Err(DataUrlError::Empty),
        Err(_) => Err(DataUrlError::InvalidBase64),
    }
}

fn nutrition_schema() -> Schema {
    Schema::object()
        .property("foodName", Schema::string())
        .property("calories", Schema::number())
        .property("protein", Schema::number())
        .property("carbs", Schema::number())
        .property("fat", Schema::number())
        .property("healthScore", Schema::number())
        .property("description", Schema::string())
        .property("advice", Schema::string())
        .property("ingredients", Schema::array(Schema::string()))
        .required(&[
            "foodName",
            "calories",
            "protein",
            "carbs",
            "fat",
            "healthScore",
            "description",
            "advice",
        ])
}

/// One image, one request. Never returns a partially filled record.
#[instrument(skip_all, fields(mime = %image.mime_type, bytes = image.data.len()))]
pub async fn analyze_food_image(
    model: &dyn GenerativeModel,
    image: &ImagePayload,
) -> Result<NutritionData, GenAiError> {
    let request = GenerateContentRequest {
        system_instruction: None,
        contents: vec![Content::user(vec![
            Part::inline(&image.mime_type, &image.data),
            Part::text(NUTRITIONIST_PROMPT),
        ])],
        generation_config: Some(GenerationConfig::json(nutrition_schema())),
    };
    let text = generate_text(model, &request).await?;
    let data: NutritionData = serde_json::from_str(unfence(&text))?;
    debug!(food = %data.food_name, calories = data.calories, "image analyzed");
    Ok(data)
}

pub fn macro_breakdown(data: &NutritionData) -> Vec<MacroSlice> {
    let total = data.protein + data.carbs + data.fat;
    [
        ("Proteína", data.protein),
        ("Carbos", data.carbs),
        ("Grasa", data.fat),
    ]
    .into_iter()
    .map(|(name, grams)| MacroSlice {
        name,
        grams,
        percent: if total > 0.0 {
            (grams / total * 1000.0).round() / 10.0
        } else {
            0.0
        },
    })
    .collect()
}

pub fn time_ago(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let secs = (now - then).whole_seconds().max(0);
    match secs {
        0..=59 => "Ahora".into(),
        60..=3599 => format!("Hace {} min", secs / 60),
        3600..=86_399 => format!("Hace {}h", secs / 3600),
        86_400..=172_799 => "Ayer".into(),
        _ => format!("Hace {} días", secs / 86_400),
    }
}

/// Scan tab state. `generation` identifies the latest analysis request.
#[derive(Debug, Default)]
pub struct ScanState {
    pub analysis: AnalysisState,
    generation: u64,
    pub history: Vec<ScanRecord>,
}

impl ScanState {
    /// Shows the preview and the loading flag for a new upload.
    pub fn begin(&mut self, preview: String) -> u64 {
        self.generation += 1;
        self.analysis = AnalysisState {
            is_loading: true,
            error: None,
            data: None,
            image_preview: Some(preview),
        };
        self.generation
    }

    /// Applies the outcome of request `generation`. Outcomes of superseded
    /// requests are dropped and `false` is returned.
    pub fn finish(&mut self, generation: u64, outcome: Option<NutritionData>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.analysis.is_loading = false;
        match outcome {
            Some(data) => {
                self.history.push(ScanRecord {
                    id: Uuid::new_v4(),
                    food_name: data.food_name.clone(),
                    calories: data.calories,
                    protein: data.protein,
                    carbs: data.carbs,
                    fat: data.fat,
                    analyzed_at: OffsetDateTime::now_utc(),
                });
                self.analysis.error = None;
                self.analysis.data = Some(data);
            }
            None => {
                self.analysis.data = None;
                self.analysis.error = Some(ANALYSIS_ERROR_MESSAGE.to_string());
            }
        }
        true
    }

    /// Clears the current analysis; an in-flight request will be ignored.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.analysis = AnalysisState::default();
    }

    pub fn macros(&self) -> Vec<MacroSlice> {
        self.analysis
            .data
            .as_ref()
            .map(macro_breakdown)
            .unwrap_or_default()
    }

    /// Newest first.
    pub fn history_items(&self, now: OffsetDateTime) -> Vec<HistoryItem> {
        self.history
            .iter()
            .rev()
            .map(|r| HistoryItem {
                id: r.id,
                food_name: r.food_name.clone(),
                calories: r.calories,
                analyzed_at: r.analyzed_at,
                time_ago: time_ago(r.analyzed_at, now),
            })
            .collect()
    }

    pub fn summary_for(&self, now: OffsetDateTime) -> DaySummary {
        self.history
            .iter()
            .filter(|r| r.analyzed_at.date() == now.date())
            .fold(DaySummary::default(), |mut acc, r| {
                acc.calories += r.calories;
                acc.protein += r.protein;
                acc.carbs += r.carbs;
                acc.fat += r.fat;
                acc.analyses += 1;
                acc
            })
    }
}
