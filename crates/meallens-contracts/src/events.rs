use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::foods::{EntryId, ListKind, MealSlot, RegistrationOutcome};

/// One line of `events.jsonl`. The variant name lands in `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MealEvent {
    SessionStarted {
        classifier: String,
        meal_slots: Vec<MealSlot>,
    },
    ImageUploaded {
        path: String,
        width: u32,
        height: u32,
    },
    ImagePreprocessed {
        width: u32,
        height: u32,
        bytes: usize,
        sha256: String,
    },
    AnalysisFinished {
        raw_text: String,
        foods: Vec<String>,
    },
    AnalysisFailed {
        error: String,
    },
    FoodAdded {
        id: EntryId,
        food_name: String,
    },
    FoodAddRejected {
        food_name: String,
    },
    EditStarted {
        list: ListKind,
        id: EntryId,
        food_name: String,
    },
    EditCancelled {
        list: ListKind,
        id: EntryId,
        food_name: String,
    },
    FoodRenamed {
        list: ListKind,
        id: EntryId,
        food_name: String,
        previous: String,
    },
    FoodRemoved {
        list: ListKind,
        id: EntryId,
        food_name: String,
    },
    MealRegistered {
        list: ListKind,
        id: EntryId,
        food_name: String,
        meal_type: MealSlot,
    },
    MealRegistrationDuplicate {
        list: ListKind,
        id: EntryId,
        food_name: String,
        meal_type: MealSlot,
        detail: String,
    },
    MealRegistrationFailed {
        list: ListKind,
        id: EntryId,
        food_name: String,
        meal_type: MealSlot,
        status: Option<u16>,
        detail: String,
    },
    SessionCleared {
        analyzed_count: usize,
        manual_count: usize,
        nutrition_url: String,
    },
}

impl MealEvent {
    /// The event recording one registration attempt and what the server said.
    pub fn registration(
        list: ListKind,
        id: EntryId,
        food_name: &str,
        meal_type: MealSlot,
        outcome: &RegistrationOutcome,
    ) -> Self {
        let food_name = food_name.to_string();
        match outcome {
            RegistrationOutcome::Registered => MealEvent::MealRegistered {
                list,
                id,
                food_name,
                meal_type,
            },
            RegistrationOutcome::Duplicate { detail } => MealEvent::MealRegistrationDuplicate {
                list,
                id,
                food_name,
                meal_type,
                detail: detail.clone(),
            },
            RegistrationOutcome::Failed { status, detail } => MealEvent::MealRegistrationFailed {
                list,
                id,
                food_name,
                meal_type,
                status: *status,
                detail: detail.clone(),
            },
        }
    }
}

#[derive(Serialize)]
struct LogLine<'a> {
    #[serde(flatten)]
    event: &'a MealEvent,
    session_id: &'a str,
    ts: String,
}

/// Session log. Each event is written as a single line as soon as it is
/// recorded; nothing is buffered.
pub struct EventLog {
    session_id: String,
    sink: Box<dyn Write>,
}

impl EventLog {
    /// Opens `path` for appending once, creating parent directories.
    pub fn open(path: &Path, session_id: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open event log {}", path.display()))?;
        Ok(Self::to_writer(file, session_id))
    }

    pub fn open_with_random_session(path: &Path) -> Result<Self> {
        Self::open(path, format!("session-{}", uuid::Uuid::new_v4()))
    }

    pub fn to_writer(sink: impl Write + 'static, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            sink: Box::new(sink),
        }
    }

    pub fn record(&mut self, event: &MealEvent) -> Result<()> {
        let mut line = serde_json::to_string(&LogLine {
            event,
            session_id: &self.session_id,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        })?;
        line.push('\n');
        self.sink
            .write_all(line.as_bytes())
            .and_then(|()| self.sink.flush())
            .context("failed to write event log")
    }
}
