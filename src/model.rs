use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef};
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{sql_value, Entity};

pub const DEFAULT_KKM: f64 = 70.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// The four graded components of a subject.
///
/// Wire names are the Indonesian tags used by schools (`tugas`, `kuis`, `uts`,
/// `uas`); the English names are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssessmentType {
    #[serde(rename = "tugas", alias = "task")]
    Task,
    #[serde(rename = "kuis", alias = "quiz")]
    Quiz,
    #[serde(rename = "uts", alias = "midterm")]
    Midterm,
    #[serde(rename = "uas", alias = "final")]
    Final,
}

impl AssessmentType {
    pub const ALL: [AssessmentType; 4] = [
        AssessmentType::Task,
        AssessmentType::Quiz,
        AssessmentType::Midterm,
        AssessmentType::Final,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentType::Task => "tugas",
            AssessmentType::Quiz => "kuis",
            AssessmentType::Midterm => "uts",
            AssessmentType::Final => "uas",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tugas" | "task" => Some(AssessmentType::Task),
            "kuis" | "quiz" => Some(AssessmentType::Quiz),
            "uts" | "midterm" => Some(AssessmentType::Midterm),
            "uas" | "final" => Some(AssessmentType::Final),
            _ => None,
        }
    }
}

impl ToSql for AssessmentType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AssessmentType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        AssessmentType::parse(s).ok_or_else(|| {
            FromSqlError::Other(format!("unknown assessment type: {s}").into())
        })
    }
}

impl From<AssessmentType> for Value {
    fn from(t: AssessmentType) -> Self {
        Value::Text(t.as_str().to_string())
    }
}

/// Percentages per assessment type. Not required to sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightSet {
    pub tugas: f64,
    pub kuis: f64,
    pub uts: f64,
    pub uas: f64,
}

impl WeightSet {
    pub const BUILTIN: WeightSet = WeightSet {
        tugas: 30.0,
        kuis: 20.0,
        uts: 20.0,
        uas: 30.0,
    };

    pub fn get(&self, t: AssessmentType) -> f64 {
        match t {
            AssessmentType::Task => self.tugas,
            AssessmentType::Quiz => self.kuis,
            AssessmentType::Midterm => self.uts,
            AssessmentType::Final => self.uas,
        }
    }

    pub fn total(&self) -> f64 {
        AssessmentType::ALL.iter().map(|t| self.get(*t)).sum()
    }
}

impl Default for WeightSet {
    fn default() -> Self {
        WeightSet::BUILTIN
    }
}

/// A stored row: identifier and store-maintained timestamps around the
/// entity's own fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record<E> {
    pub id: String,
    #[serde(flatten)]
    pub data: E,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub full_name: String,
    pub student_number: String,
    pub class_name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub name: String,
    #[serde(default = "default_kkm")]
    pub kkm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weight {
    pub subject_id: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default = "default_tugas")]
    pub tugas: f64,
    #[serde(default = "default_kuis")]
    pub kuis: f64,
    #[serde(default = "default_uts")]
    pub uts: f64,
    #[serde(default = "default_uas")]
    pub uas: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub student_id: String,
    pub subject_id: String,
    #[serde(rename = "type")]
    pub kind: AssessmentType,
    pub value: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

fn default_kkm() -> f64 {
    DEFAULT_KKM
}
fn default_tugas() -> f64 {
    WeightSet::BUILTIN.tugas
}
fn default_kuis() -> f64 {
    WeightSet::BUILTIN.kuis
}
fn default_uts() -> f64 {
    WeightSet::BUILTIN.uts
}
fn default_uas() -> f64 {
    WeightSet::BUILTIN.uas
}

impl Weight {
    pub fn weights(&self) -> WeightSet {
        WeightSet {
            tugas: self.tugas,
            kuis: self.kuis,
            uts: self.uts,
            uas: self.uas,
        }
    }

    /// Key used by the unique index: an absent class is stored as "".
    pub fn class_scope(&self) -> &str {
        self.class_name.as_deref().unwrap_or("")
    }
}

fn required_text(field: &str, v: String) -> Result<String, ValidationError> {
    let t = v.trim();
    if t.is_empty() {
        return Err(ValidationError(format!("{field} must not be empty")));
    }
    Ok(t.to_string())
}

fn optional_text(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn percent(field: &str, v: f64) -> Result<f64, ValidationError> {
    if !v.is_finite() || !(0.0..=100.0).contains(&v) {
        return Err(ValidationError(format!(
            "{field} must be between 0 and 100"
        )));
    }
    Ok(v)
}

impl Entity for Student {
    const KIND: &'static str = "student";
    const TABLE: &'static str = "students";
    const COLUMNS: &'static [&'static str] = &[
        "full_name",
        "student_number",
        "class_name",
        "gender",
        "birth_date",
    ];

    fn to_values(&self) -> rusqlite::Result<Vec<Value>> {
        Ok(vec![
            sql_value(&self.full_name)?,
            sql_value(&self.student_number)?,
            sql_value(&self.class_name)?,
            sql_value(&self.gender)?,
            sql_value(&self.birth_date)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Student {
            full_name: row.get("full_name")?,
            student_number: row.get("student_number")?,
            class_name: row.get("class_name")?,
            gender: row.get("gender")?,
            birth_date: row.get("birth_date")?,
        })
    }

    fn validate(self) -> Result<Self, ValidationError> {
        Ok(Student {
            full_name: required_text("fullName", self.full_name)?,
            student_number: required_text("studentNumber", self.student_number)?,
            class_name: required_text("className", self.class_name)?,
            gender: optional_text(self.gender),
            birth_date: self.birth_date,
        })
    }
}

impl Entity for Subject {
    const KIND: &'static str = "subject";
    const TABLE: &'static str = "subjects";
    const COLUMNS: &'static [&'static str] = &["name", "kkm"];

    fn to_values(&self) -> rusqlite::Result<Vec<Value>> {
        Ok(vec![sql_value(&self.name)?, sql_value(&self.kkm)?])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Subject {
            name: row.get("name")?,
            kkm: row.get("kkm")?,
        })
    }

    fn validate(self) -> Result<Self, ValidationError> {
        Ok(Subject {
            name: required_text("name", self.name)?,
            kkm: percent("kkm", self.kkm)?,
        })
    }
}

impl Entity for Weight {
    const KIND: &'static str = "weight";
    const TABLE: &'static str = "weights";
    const COLUMNS: &'static [&'static str] = &[
        "subject_id",
        "class_name",
        "class_scope",
        "tugas",
        "kuis",
        "uts",
        "uas",
    ];

    fn to_values(&self) -> rusqlite::Result<Vec<Value>> {
        Ok(vec![
            sql_value(&self.subject_id)?,
            sql_value(&self.class_name)?,
            sql_value(&self.class_scope())?,
            sql_value(&self.tugas)?,
            sql_value(&self.kuis)?,
            sql_value(&self.uts)?,
            sql_value(&self.uas)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Weight {
            subject_id: row.get("subject_id")?,
            class_name: row.get("class_name")?,
            tugas: row.get("tugas")?,
            kuis: row.get("kuis")?,
            uts: row.get("uts")?,
            uas: row.get("uas")?,
        })
    }

    fn validate(self) -> Result<Self, ValidationError> {
        Ok(Weight {
            subject_id: required_text("subjectId", self.subject_id)?,
            class_name: optional_text(self.class_name),
            tugas: percent("tugas", self.tugas)?,
            kuis: percent("kuis", self.kuis)?,
            uts: percent("uts", self.uts)?,
            uas: percent("uas", self.uas)?,
        })
    }
}

impl Entity for Score {
    const KIND: &'static str = "score";
    const TABLE: &'static str = "scores";
    const COLUMNS: &'static [&'static str] = &[
        "student_id",
        "subject_id",
        "type",
        "value",
        "note",
        "date",
    ];

    fn to_values(&self) -> rusqlite::Result<Vec<Value>> {
        Ok(vec![
            sql_value(&self.student_id)?,
            sql_value(&self.subject_id)?,
            sql_value(&self.kind)?,
            sql_value(&self.value)?,
            sql_value(&self.note)?,
            sql_value(&self.date)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Score {
            student_id: row.get("student_id")?,
            subject_id: row.get("subject_id")?,
            kind: row.get("type")?,
            value: row.get("value")?,
            note: row.get("note")?,
            date: row.get("date")?,
        })
    }

    // Undated scores are stamped with the time they were recorded.
    fn validate(self) -> Result<Self, ValidationError> {
        Ok(Score {
            student_id: required_text("studentId", self.student_id)?,
            subject_id: required_text("subjectId", self.subject_id)?,
            kind: self.kind,
            value: percent("value", self.value)?,
            note: optional_text(self.note),
            date: Some(self.date.unwrap_or_else(Utc::now)),
        })
    }
}
