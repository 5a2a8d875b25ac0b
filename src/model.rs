use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumString};

/// Backend ids arrive either as JSON strings or as integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Ok(match RawId::deserialize(deserializer)? {
                    RawId::Text(text) => Self(text),
                    RawId::Int(n) => Self(n.to_string()),
                })
            }
        }
    };
}

string_id!(
    /// Client-generated identifier of a recorded step.
    StepId
);
string_id!(SheetId);
string_id!(SpreadsheetId);
string_id!(PatternId);
string_id!(
    /// Identifier of one backend apply job.
    JobId
);

/// Discriminant of a [`StepKind`], as it appears in the `type` field on the wire.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    ApplyFormula,
    InsertRow,
    InsertColumn,
    DeleteColumn,
    FillSeries,
    SetColumnName,
    ApplyHighlight,
}

/// A formula committed into a single cell. `row`/`col` are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyFormulaParams {
    pub row: u32,
    pub col: u32,
    pub a1: String,
    pub formula: String,
}

/// Row/column insertion and deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralParams {
    pub position: u32,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FillDirection {
    Down,
    Right,
    Up,
    Left,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillSeriesParams {
    pub range: String,
    pub direction: FillDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetColumnNameParams {
    pub column_index: u32,
    pub new_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightParams {
    pub range: String,
    pub background: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color: Option<String>,
}

/// The action a step replays. Each variant carries its own parameter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    ApplyFormula(ApplyFormulaParams),
    InsertRow(StructuralParams),
    InsertColumn(StructuralParams),
    DeleteColumn(StructuralParams),
    FillSeries(FillSeriesParams),
    SetColumnName(SetColumnNameParams),
    ApplyHighlight(HighlightParams),
}

impl StepKind {
    pub fn step_type(&self) -> StepType {
        match self {
            StepKind::ApplyFormula(_) => StepType::ApplyFormula,
            StepKind::InsertRow(_) => StepType::InsertRow,
            StepKind::InsertColumn(_) => StepType::InsertColumn,
            StepKind::DeleteColumn(_) => StepType::DeleteColumn,
            StepKind::FillSeries(_) => StepType::FillSeries,
            StepKind::SetColumnName(_) => StepType::SetColumnName,
            StepKind::ApplyHighlight(_) => StepType::ApplyHighlight,
        }
    }

    /// Formula step for a 1-based cell; the A1 address is derived from the coordinates.
    pub fn formula(row: u32, col: u32, formula: impl Into<String>) -> Self {
        StepKind::ApplyFormula(ApplyFormulaParams {
            row,
            col,
            a1: a1_address(row, col),
            formula: formula.into(),
        })
    }
}

/// One recorded, replayable spreadsheet edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStep {
    pub id: StepId,
    #[serde(default)]
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl TimelineStep {
    pub fn new(id: StepId, kind: StepKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            disabled: false,
            created_at,
            kind,
        }
    }

    pub fn step_type(&self) -> StepType {
        self.kind.step_type()
    }
}

/// Spreadsheet column letters for a 1-based column index (1 -> A, 27 -> AA).
pub fn column_letter(col: u32) -> String {
    let mut n = col.max(1);
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

pub fn a1_address(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row.max(1))
}
