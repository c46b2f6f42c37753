use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use meallens_contracts::events::{EventLog, MealEvent};
use meallens_contracts::foods::{
    split_and_clean, AddOutcome, EntryId, FoodEntry, ListKind, MealSlot, MealSlotSet,
    RegistrationOutcome, Session, SessionError,
};

pub mod preprocess;
pub mod registration;
pub mod vision;

pub use preprocess::{load_upload, preprocess_image, PreparedImage, PreprocessOptions};
pub use registration::{HttpMealRegistrar, MealRegistrar, DEFAULT_SERVER_URL};
pub use vision::{ClassifierConfig, ClassifyError, OpenAiVisionClient, VisionClassifier};

pub const DEFAULT_NUTRITION_URL: &str = "http://localhost:8502";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub slot_set: MealSlotSet,
    pub preprocess: PreprocessOptions,
    /// Where `/proceed` sends the user once the session is cleared.
    pub nutrition_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_set: MealSlotSet::default(),
            preprocess: PreprocessOptions::default(),
            nutrition_url: DEFAULT_NUTRITION_URL.to_string(),
        }
    }
}

/// Owns one user session and runs every handler against it.
///
/// Each public method is one UI action: it mutates the session (or not),
/// records an event, and returns what the view needs to report. Event log
/// writes never turn a completed action into an error; failed writes are
/// collected for [`MealEngine::take_log_failures`].
pub struct MealEngine {
    session: Session,
    events: EventLog,
    classifier: Box<dyn VisionClassifier>,
    registrar: Box<dyn MealRegistrar>,
    config: EngineConfig,
    log_failures: Vec<String>,
}

impl MealEngine {
    pub fn new(
        events: EventLog,
        classifier: Box<dyn VisionClassifier>,
        registrar: Box<dyn MealRegistrar>,
        config: EngineConfig,
    ) -> Self {
        let started = MealEvent::SessionStarted {
            classifier: classifier.name().to_string(),
            meal_slots: config.slot_set.slots().to_vec(),
        };
        let mut engine = Self {
            session: Session::new(),
            events,
            classifier,
            registrar,
            config,
            log_failures: Vec::new(),
        };
        engine.record(started);
        engine
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn slot_set(&self) -> MealSlotSet {
        self.config.slot_set
    }

    /// Event log write errors since the last call, oldest first.
    pub fn take_log_failures(&mut self) -> Vec<String> {
        std::mem::take(&mut self.log_failures)
    }

    fn record(&mut self, event: MealEvent) {
        if let Err(err) = self.events.record(&event) {
            self.log_failures.push(format!("{err:#}"));
        }
    }

    /// Checks that `path` is a decodable photo and makes it the current one.
    pub fn upload(&mut self, path: impl Into<PathBuf>) -> Result<(u32, u32)> {
        let path = path.into();
        let image = load_upload(&path)?;
        let (width, height) = (image.width(), image.height());
        self.record(MealEvent::ImageUploaded {
            path: path.to_string_lossy().into_owned(),
            width,
            height,
        });
        self.session.set_uploaded_image(path);
        Ok((width, height))
    }

    /// Preprocess, classify, parse, populate. On classifier failure the
    /// analyzed list is left untouched and the `ClassifyError` is returned.
    pub fn analyze(&mut self) -> Result<Vec<FoodEntry>> {
        let Some(path) = self.session.uploaded_image().map(Path::to_path_buf) else {
            bail!("no image uploaded yet; use /upload <path> first");
        };
        let image = load_upload(&path)?;
        let prepared = preprocess_image(&image, &self.config.preprocess)
            .with_context(|| format!("failed to preprocess {}", path.display()))?;
        self.record(MealEvent::ImagePreprocessed {
            width: prepared.width,
            height: prepared.height,
            bytes: prepared.bytes.len(),
            sha256: prepared.sha256_hex(),
        });

        let text = match self.classifier.classify(&prepared.bytes) {
            Ok(text) => text,
            Err(err) => {
                self.record(MealEvent::AnalysisFailed {
                    error: err.to_string(),
                });
                return Err(err.into());
            }
        };

        self.session.populate(split_and_clean(&text));
        let entries = self.session.analyzed_foods().entries();
        self.record(MealEvent::AnalysisFinished {
            raw_text: text,
            foods: entries.iter().map(|entry| entry.name.clone()).collect(),
        });
        Ok(entries)
    }

    pub fn add_manual(&mut self, value: &str) -> AddOutcome {
        let outcome = self.session.add_manual(value);
        let food_name = value.trim().to_string();
        match outcome {
            AddOutcome::Added(id) => self.record(MealEvent::FoodAdded { id, food_name }),
            AddOutcome::Duplicate => self.record(MealEvent::FoodAddRejected { food_name }),
            AddOutcome::Blank => {}
        }
        outcome
    }

    fn locate(&self, id: EntryId) -> Result<(ListKind, String), SessionError> {
        self.session
            .find(id)
            .map(|(kind, name)| (kind, name.to_string()))
            .ok_or(SessionError::UnknownEntry(id))
    }

    /// Puts `id` in edit mode. Any other entry of the same list leaves it.
    pub fn begin_edit(&mut self, id: EntryId) -> Result<(ListKind, String)> {
        let (kind, name) = self.locate(id)?;
        self.session.set_edit_cursor(kind, id)?;
        self.record(MealEvent::EditStarted {
            list: kind,
            id,
            food_name: name.clone(),
        });
        Ok((kind, name))
    }

    pub fn cancel_edit(&mut self, id: EntryId) -> Result<()> {
        let (kind, name) = self.locate(id)?;
        if self.session.editing(kind) != Some(id) {
            return Err(SessionError::NotEditing(id).into());
        }
        self.session.clear_edit_cursor(kind);
        self.record(MealEvent::EditCancelled {
            list: kind,
            id,
            food_name: name,
        });
        Ok(())
    }

    /// Commits a rename for the entry in edit mode; returns the old name.
    pub fn save_edit(&mut self, id: EntryId, new_value: &str) -> Result<String> {
        let (kind, _) = self.locate(id)?;
        if self.session.editing(kind) != Some(id) {
            return Err(SessionError::NotEditing(id).into());
        }
        let previous = self.session.rename(kind, id, new_value)?;
        self.record(MealEvent::FoodRenamed {
            list: kind,
            id,
            food_name: new_value.trim().to_string(),
            previous: previous.clone(),
        });
        Ok(previous)
    }

    pub fn delete(&mut self, id: EntryId) -> Result<FoodEntry> {
        let (kind, _) = self.locate(id)?;
        let removed = self.session.delete(kind, id)?;
        self.record(MealEvent::FoodRemoved {
            list: kind,
            id,
            food_name: removed.name.clone(),
        });
        Ok(removed)
    }

    /// Sends one registration for a confirmed entry. Entries still being
    /// edited are refused before any request is made.
    pub fn register(&mut self, id: EntryId, slot: MealSlot) -> Result<RegistrationOutcome> {
        let (kind, name) = self.locate(id)?;
        if self.session.editing(kind) == Some(id) {
            return Err(SessionError::Editing(id).into());
        }
        if !self.config.slot_set.slots().contains(&slot) {
            bail!("meal slot {slot} is not enabled");
        }

        let outcome = self.registrar.register(&name, slot);
        self.record(MealEvent::registration(kind, id, &name, slot, &outcome));
        Ok(outcome)
    }

    /// Leaves for nutrition analysis: wipes the session and returns the URL
    /// to open.
    pub fn proceed(&mut self) -> String {
        let analyzed_count = self.session.analyzed_foods().len();
        let manual_count = self.session.manual_foods().len();
        self.session.clear();
        self.record(MealEvent::SessionCleared {
            analyzed_count,
            manual_count,
            nutrition_url: self.config.nutrition_url.clone(),
        });
        self.config.nutrition_url.clone()
    }
}

pub(crate) fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Renders an error and its sources as `outer: inner: root`, skipping
/// repeated messages.
pub(crate) fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    parts.join(": ")
}

#[cfg(test)]
pub(crate) mod test_server {
    use std::io::{self, BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    #[derive(Debug)]
    pub(crate) struct CapturedRequest {
        pub request_line: String,
        pub headers: Vec<(String, String)>,
        pub body: String,
    }

    impl CapturedRequest {
        pub(crate) fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        }
    }

    /// Answers exactly one HTTP request with `status` and `body`, then hands
    /// back what it received.
    pub(crate) fn serve_once(
        status: u16,
        body: impl Into<String>,
    ) -> io::Result<(String, JoinHandle<io::Result<CapturedRequest>>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let body = body.into();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept()?;
            let mut reader = BufReader::new(stream.try_clone()?);

            let mut request_line = String::new();
            reader.read_line(&mut request_line)?;
            let mut headers = Vec::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line)? == 0 {
                    break;
                }
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((key, value)) = line.split_once(':') {
                    headers.push((key.trim().to_ascii_lowercase(), value.trim().to_string()));
                }
            }
            let length = headers
                .iter()
                .find(|(key, _)| key == "content-length")
                .and_then(|(_, value)| value.parse::<usize>().ok())
                .unwrap_or(0);
            let mut raw = vec![0u8; length];
            reader.read_exact(&mut raw)?;

            let reason = match status {
                200 => "OK",
                400 => "Bad Request",
                _ => "Error",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes())?;
            stream.flush()?;

            Ok(CapturedRequest {
                request_line: request_line.trim_end().to_string(),
                headers,
                body: String::from_utf8_lossy(&raw).into_owned(),
            })
        });
        Ok((format!("http://{addr}"), handle))
    }
}
