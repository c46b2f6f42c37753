use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DUPLICATE_FALLBACK_DETAIL: &str = "이미 등록된 음식입니다.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MealSlot {
    #[serde(rename = "아침")]
    Breakfast,
    #[serde(rename = "점심")]
    Lunch,
    #[serde(rename = "저녁")]
    Dinner,
    #[serde(rename = "간식")]
    Snack,
}

impl MealSlot {
    /// Wire value of `meal_type`.
    pub fn label(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "아침",
            MealSlot::Lunch => "점심",
            MealSlot::Dinner => "저녁",
            MealSlot::Snack => "간식",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::Lunch => "lunch",
            MealSlot::Dinner => "dinner",
            MealSlot::Snack => "snack",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which meal slots the registration server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MealSlotSet {
    #[default]
    Standard,
    WithSnack,
}

impl MealSlotSet {
    pub fn slots(self) -> &'static [MealSlot] {
        match self {
            MealSlotSet::Standard => &[MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner],
            MealSlotSet::WithSnack => &[
                MealSlot::Breakfast,
                MealSlot::Lunch,
                MealSlot::Dinner,
                MealSlot::Snack,
            ],
        }
    }

    /// Resolves user input to a slot: Korean label, English key, or 1-based
    /// position within this set.
    pub fn parse(self, input: &str) -> Option<MealSlot> {
        let normalized = input.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        let slots = self.slots();
        if let Ok(position) = normalized.parse::<usize>() {
            return position
                .checked_sub(1)
                .and_then(|idx| slots.get(idx))
                .copied();
        }
        slots
            .iter()
            .find(|slot| slot.label() == normalized || slot.key() == normalized)
            .copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    /// The server already has this food for the slot. Shown as a warning.
    Duplicate { detail: String },
    /// `status` is `None` when the request never got a response.
    Failed { status: Option<u16>, detail: String },
}

impl RegistrationOutcome {
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationOutcome::Registered)
    }
}

/// Maps a `/register-meal` response to an outcome.
///
/// 200 is success, 400 is a duplicate with the server's `detail`, anything
/// else is an error carrying the status and raw body.
pub fn classify_registration_response(status: u16, body: &str) -> RegistrationOutcome {
    match status {
        200 => RegistrationOutcome::Registered,
        400 => {
            let detail = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|payload| {
                    payload
                        .get("detail")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|value| !value.is_empty())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| DUPLICATE_FALLBACK_DETAIL.to_string());
            RegistrationOutcome::Duplicate { detail }
        }
        other => RegistrationOutcome::Failed {
            status: Some(other),
            detail: body.trim().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn conflict_surfaces_server_detail_verbatim() {
        let outcome =
            classify_registration_response(400, r#"{"detail":"이미 등록된 음식입니다"}"#);
        assert_eq!(
            outcome,
            RegistrationOutcome::Duplicate {
                detail: "이미 등록된 음식입니다".to_string()
            }
        );
        assert!(!outcome.is_registered());
    }

    #[test]
    fn conflict_without_detail_uses_fallback() {
        assert_eq!(
            classify_registration_response(400, "bad request"),
            RegistrationOutcome::Duplicate {
                detail: DUPLICATE_FALLBACK_DETAIL.to_string()
            }
        );
        assert_eq!(
            classify_registration_response(400, r#"{"detail":"  "}"#),
            RegistrationOutcome::Duplicate {
                detail: DUPLICATE_FALLBACK_DETAIL.to_string()
            }
        );
    }

    #[test]
    fn other_statuses_are_errors_with_body() {
        assert_eq!(
            classify_registration_response(500, " internal error\n"),
            RegistrationOutcome::Failed {
                status: Some(500),
                detail: "internal error".to_string()
            }
        );
        assert!(classify_registration_response(200, "{}").is_registered());
    }

    #[test]
    fn slot_parse_accepts_labels_keys_and_positions() {
        let set = MealSlotSet::Standard;
        assert_eq!(set.parse("점심"), Some(MealSlot::Lunch));
        assert_eq!(set.parse("Dinner"), Some(MealSlot::Dinner));
        assert_eq!(set.parse("1"), Some(MealSlot::Breakfast));
        assert_eq!(set.parse("0"), None);
        assert_eq!(set.parse("4"), None);
        assert_eq!(set.parse("간식"), None);
        assert_eq!(MealSlotSet::WithSnack.parse("간식"), Some(MealSlot::Snack));
        assert_eq!(MealSlotSet::WithSnack.parse("4"), Some(MealSlot::Snack));
    }

    #[test]
    fn slot_serializes_as_korean_label() -> anyhow::Result<()> {
        let body = json!({ "food_name": "라면", "meal_type": MealSlot::Dinner });
        assert_eq!(body["meal_type"], json!("저녁"));
        let parsed: MealSlot = serde_json::from_value(json!("간식"))?;
        assert_eq!(parsed, MealSlot::Snack);
        Ok(())
    }
}
