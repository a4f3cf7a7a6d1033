use serde::{Deserialize, Deserializer, Serialize};

use crate::roles::{normalize_role, Role};

/// Opaque user identifier. The upstream service sends either numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(value) => Ok(UserId(value.to_string())),
            Raw::Text(value) => Ok(UserId(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Some login responses omit the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    pub email: String,
    #[serde(deserialize_with = "lenient_role")]
    pub role: Role,
}

// Sessions persisted by older builds carry upstream role names.
fn lenient_role<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Role, D::Error> {
    let token = String::deserialize(deserializer)?;
    Ok(normalize_role(&token))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningSlot {
    pub slot_id: i64,
    pub course_label: String,
    pub room: String,
    /// `YYYY-MM-DD`, sometimes followed by a time component.
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub class_id: i64,
    pub class_label: String,
    #[serde(rename = "teacher_user_id")]
    pub teacher_id: i64,
    pub teacher_name: String,
}

impl PlanningSlot {
    /// Calendar date part of `date`, no time-zone conversion.
    pub fn day(&self) -> &str {
        self.date.get(..10).unwrap_or(&self.date)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawNote {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub student_user_id: Option<i64>,
    #[serde(default)]
    pub teacher_user_id: Option<i64>,
    #[serde(default)]
    pub class_id: Option<i64>,
    #[serde(deserialize_with = "lenient_number")]
    pub value: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub ects: f64,
}

// The notes endpoint returns numerics as strings ("16.00").
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(value) => value
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("not a number: {value:?}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassLabel {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PendingDocument {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(rename = "type", default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteView {
    pub class_label: String,
    pub value: f64,
    pub ects: f64,
}
