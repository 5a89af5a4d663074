//! Prescribed exercise definitions

use crate::error::{Error, Result};
use physio_common::api::ExerciseSummary;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Difficulty tier of a prescribed exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    #[default]
    Unspecified,
}

impl Difficulty {
    /// Map the backend's free-text difficulty
    ///
    /// Accepts both the easy/medium/hard and beginner/intermediate/advanced
    /// vocabularies, case-insensitively.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "easy" | "beginner" => Difficulty::Easy,
            "medium" | "intermediate" => Difficulty::Medium,
            "hard" | "advanced" => Difficulty::Hard,
            _ => Difficulty::Unspecified,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
            Difficulty::Unspecified => write!(f, "Unspecified"),
        }
    }
}

/// One prescribed exercise
///
/// Immutable once built; `target_reps` and `target_sets` are always > 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseDefinition {
    pub id: u32,
    pub name: String,
    pub description: String,
    /// One instruction per entry, blank lines removed
    pub instructions: Vec<String>,
    pub target_reps: u32,
    pub target_sets: u32,
    /// Whole-exercise time budget
    pub duration_seconds: u32,
    pub difficulty: Difficulty,
    /// Backend already recorded a completed session today
    pub completed_today: bool,
}

impl ExerciseDefinition {
    /// Build a definition, validating the targets
    pub fn new(id: u32, name: impl Into<String>, target_reps: u32, target_sets: u32) -> Result<Self> {
        let name = name.into();
        if target_reps == 0 {
            return Err(Error::Config(format!(
                "Exercise '{}' has zero target reps",
                name
            )));
        }
        if target_sets == 0 {
            return Err(Error::Config(format!(
                "Exercise '{}' has zero target sets",
                name
            )));
        }

        Ok(Self {
            id,
            name,
            description: String::new(),
            instructions: Vec::new(),
            target_reps,
            target_sets,
            duration_seconds: 0,
            difficulty: Difficulty::Unspecified,
            completed_today: false,
        })
    }

    /// Build from an entry of today's exercise listing
    pub fn from_summary(summary: &ExerciseSummary) -> Result<Self> {
        let mut definition =
            Self::new(summary.id, summary.name.clone(), summary.reps, summary.sets)?;

        definition.description = summary.description.trim().to_string();
        definition.instructions = summary
            .instructions
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        definition.duration_seconds = summary.duration.saturating_mul(60);
        definition.difficulty = Difficulty::from_label(&summary.difficulty);
        definition.completed_today = summary.is_completed();

        Ok(definition)
    }

    pub fn with_duration_seconds(mut self, duration_seconds: u32) -> Self {
        self.duration_seconds = duration_seconds;
        self
    }

    /// Time budget for a single set
    pub fn set_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_seconds / self.target_sets))
    }
}
