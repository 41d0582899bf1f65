//! Health profile accumulated from chat turns.
//!
//! The model may report profile fields under English or Spanish keys
//! (`weight` / `peso`, `allergies` / `alergias`, ...). Both are folded onto
//! one canonical schema when an update is parsed, so the stored profile never
//! carries two spellings of the same attribute.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// How list fields (conditions, allergies) combine across turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMergePolicy {
    /// Append everything, repeated mentions included.
    #[default]
    Accumulate,
    /// Skip entries already present (case-insensitive, trimmed).
    #[serde(alias = "dedupe")]
    Deduplicate,
}

impl FromStr for ListMergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accumulate" => Ok(Self::Accumulate),
            "dedupe" | "deduplicate" => Ok(Self::Deduplicate),
            other => Err(format!(
                "unknown list merge policy {other:?}, expected accumulate or dedupe"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthProfile {
    pub age: Option<u32>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub goal: Option<String>,
    pub activity: Option<String>,
    pub preferences: Option<String>,
    pub dislikes: Option<String>,
    pub conditions: Vec<String>,
    pub allergies: Vec<String>,
}

/// Fields extracted from a single assistant turn, already on canonical names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub age: Option<u32>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub goal: Option<String>,
    pub activity: Option<String>,
    pub preferences: Option<String>,
    pub dislikes: Option<String>,
    pub conditions: Vec<String>,
    pub allergies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Age,
    Weight,
    Height,
    Goal,
    Activity,
    Preferences,
    Dislikes,
    Conditions,
    Allergies,
}

/// Maps a raw key to its field; the flag is true for the canonical spelling.
fn field_for(key: &str) -> Option<(Field, bool)> {
    let key = key.trim().to_lowercase().replace([' ', '-'], "_");
    let found = match key.as_str() {
        "age" => (Field::Age, true),
        "edad" => (Field::Age, false),
        "weight" | "weight_kg" => (Field::Weight, true),
        "peso" | "peso_kg" => (Field::Weight, false),
        "height" | "height_cm" => (Field::Height, true),
        "altura" | "altura_cm" | "estatura" => (Field::Height, false),
        "goal" => (Field::Goal, true),
        "objetivo" | "meta" => (Field::Goal, false),
        "activity" | "activity_level" => (Field::Activity, true),
        "actividad" | "nivel_actividad" | "nivel_de_actividad" => (Field::Activity, false),
        "preferences" => (Field::Preferences, true),
        "preferencias" => (Field::Preferences, false),
        "dislikes" => (Field::Dislikes, true),
        "disgustos" | "no_le_gusta" | "aversiones" => (Field::Dislikes, false),
        "conditions" | "medical_conditions" => (Field::Conditions, true),
        "condiciones" | "condiciones_medicas" | "enfermedades" => (Field::Conditions, false),
        "allergies" => (Field::Allergies, true),
        "alergias" => (Field::Allergies, false),
        _ => return None,
    };
    Some(found)
}

lazy_static! {
    static ref LEADING_NUMBER: Regex = Regex::new(r"^\s*(\d+(?:[.,]\d+)?)").unwrap();
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => LEADING_NUMBER
            .captures(s)
            .and_then(|c| c[1].replace(',', ".").parse().ok()),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(text)
            .collect::<Vec<_>>()
            .join(", "),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

impl ProfileUpdate {
    /// Reads a `user_profile_update` object. Returns `None` for anything but an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let mut update = ProfileUpdate::default();

        // Canonical keys first, so within one update their list entries come
        // before the localized ones and their scalars win.
        for canonical_pass in [true, false] {
            for (key, raw) in map {
                let Some((field, canonical)) = field_for(key) else {
                    if canonical_pass {
                        debug!(key = %key, "ignoring unknown profile key");
                    }
                    continue;
                };
                if canonical != canonical_pass {
                    continue;
                }
                update.apply(field, raw, key);
            }
        }
        Some(update)
    }

    fn apply(&mut self, field: Field, raw: &Value, key: &str) {
        match field {
            Field::Age => {
                if self.age.is_none() {
                    self.age = number(raw)
                        .filter(|n| (0.0..=150.0).contains(n))
                        .map(|n| n.round() as u32);
                }
            }
            Field::Weight => {
                if self.weight_kg.is_none() {
                    self.weight_kg = number(raw).filter(|n| *n > 0.0);
                }
            }
            Field::Height => {
                if self.height_cm.is_none() {
                    // Values under 3 are meters.
                    self.height_cm = number(raw)
                        .filter(|n| *n > 0.0)
                        .map(|n| if n < 3.0 { (n * 1000.0).round() / 10.0 } else { n });
                }
            }
            Field::Goal => fill(&mut self.goal, raw),
            Field::Activity => fill(&mut self.activity, raw),
            Field::Preferences => fill(&mut self.preferences, raw),
            Field::Dislikes => fill(&mut self.dislikes, raw),
            Field::Conditions => self.conditions.extend(list(raw)),
            Field::Allergies => self.allergies.extend(list(raw)),
        }
        if matches!(field, Field::Age | Field::Weight | Field::Height) && number(raw).is_none() {
            debug!(key = %key, value = %raw, "profile value is not numeric");
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ProfileUpdate::default()
    }
}

fn fill(slot: &mut Option<String>, raw: &Value) {
    if slot.is_none() {
        *slot = text(raw);
    }
}

fn merge_list(target: &mut Vec<String>, incoming: Vec<String>, policy: ListMergePolicy) {
    match policy {
        ListMergePolicy::Accumulate => target.extend(incoming),
        ListMergePolicy::Deduplicate => {
            for item in incoming {
                let key = item.trim().to_lowercase();
                if !target.iter().any(|t| t.trim().to_lowercase() == key) {
                    target.push(item);
                }
            }
        }
    }
}

impl HealthProfile {
    /// Scalars overwrite, lists combine according to `policy`.
    pub fn merge(&mut self, update: ProfileUpdate, policy: ListMergePolicy) {
        let ProfileUpdate {
            age,
            weight_kg,
            height_cm,
            goal,
            activity,
            preferences,
            dislikes,
            conditions,
            allergies,
        } = update;

        if age.is_some() {
            self.age = age;
        }
        if weight_kg.is_some() {
            self.weight_kg = weight_kg;
        }
        if height_cm.is_some() {
            self.height_cm = height_cm;
        }
        if goal.is_some() {
            self.goal = goal;
        }
        if activity.is_some() {
            self.activity = activity;
        }
        if preferences.is_some() {
            self.preferences = preferences;
        }
        if dislikes.is_some() {
            self.dislikes = dislikes;
        }
        merge_list(&mut self.conditions, conditions, policy);
        merge_list(&mut self.allergies, allergies, policy);
    }

    pub fn is_empty(&self) -> bool {
        *self == HealthProfile::default()
    }

    /// One-line summary handed to the model as context, `None` while empty.
    pub fn prompt_context(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(self.to_string())
    }
}

impl fmt::Display for HealthProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(age) = self.age {
            parts.push(format!("edad {age}"));
        }
        if let Some(w) = self.weight_kg {
            parts.push(format!("peso {w} kg"));
        }
        if let Some(h) = self.height_cm {
            parts.push(format!("altura {h} cm"));
        }
        if let Some(goal) = &self.goal {
            parts.push(format!("objetivo: {goal}"));
        }
        if let Some(activity) = &self.activity {
            parts.push(format!("actividad: {activity}"));
        }
        if !self.conditions.is_empty() {
            parts.push(format!("condiciones: {}", self.conditions.join(", ")));
        }
        if !self.allergies.is_empty() {
            parts.push(format!("alergias: {}", self.allergies.join(", ")));
        }
        if let Some(p) = &self.preferences {
            parts.push(format!("preferencias: {p}"));
        }
        if let Some(d) = &self.dislikes {
            parts.push(format!("no le gusta: {d}"));
        }
        write!(f, "{}", parts.join("; "))
    }
}
