use std::fmt::Write as _;

use meallens_contracts::foods::{FoodList, MealSlot, MealSlotSet, RegistrationOutcome, Session};

/// Full screen for the current session. Re-rendered after every mutation.
pub fn render_session(session: &Session, slots: MealSlotSet) -> String {
    let mut out = String::new();
    let image = session
        .uploaded_image()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "(none, use /upload <path>)".to_string());
    let _ = writeln!(out, "Photo: {image}");
    render_list(&mut out, "AI-detected foods", session.analyzed_foods(), slots);
    render_list(&mut out, "Manually added foods", session.manual_foods(), slots);
    out
}

fn render_list(out: &mut String, title: &str, list: &FoodList, slots: MealSlotSet) {
    let _ = writeln!(out, "{title}:");
    if list.is_empty() {
        let _ = writeln!(out, "  (empty)");
        return;
    }
    let slot_hint = slot_hint(slots);
    for (id, name) in list.iter() {
        let raw = id.get();
        if list.is_editing(id) {
            let _ = writeln!(
                out,
                "  {id} {name}  [editing: /save {raw} <name> | /cancel {raw}]"
            );
        } else {
            let _ = writeln!(
                out,
                "  {id} {name}  [/edit {raw} | /delete {raw} | /register {raw} <{slot_hint}>]"
            );
        }
    }
}

fn slot_hint(slots: MealSlotSet) -> String {
    slots
        .slots()
        .iter()
        .enumerate()
        .map(|(idx, slot)| format!("{}={}", idx + 1, slot.label()))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_outcome(food_name: &str, slot: MealSlot, outcome: &RegistrationOutcome) -> String {
    match outcome {
        RegistrationOutcome::Registered => format!("registered {food_name} for {slot}"),
        RegistrationOutcome::Duplicate { detail } => format!("warning: {detail}"),
        RegistrationOutcome::Failed {
            status: Some(status),
            detail,
        } => format!("error: registration failed (HTTP {status}): {detail}"),
        RegistrationOutcome::Failed {
            status: None,
            detail,
        } => format!("error: could not reach registration server: {detail}"),
    }
}

#[cfg(test)]
mod tests {
    use meallens_contracts::foods::ListKind;

    use super::*;

    #[test]
    fn editing_entry_hides_register_controls() -> anyhow::Result<()> {
        let mut session = Session::new();
        let ids = session.populate(["김밥", "떡볶이"]);
        session.set_edit_cursor(ListKind::Analyzed, ids[0])?;

        let screen = render_session(&session, MealSlotSet::Standard);
        let gimbap = screen
            .lines()
            .find(|line| line.contains("김밥"))
            .unwrap_or_default();
        let tteok = screen
            .lines()
            .find(|line| line.contains("떡볶이"))
            .unwrap_or_default();

        assert!(gimbap.contains("editing"));
        assert!(!gimbap.contains("/register"));
        assert!(tteok.contains("/register 2 <1=아침 2=점심 3=저녁>"));
        Ok(())
    }

    #[test]
    fn empty_session_shows_placeholders() {
        let screen = render_session(&Session::new(), MealSlotSet::WithSnack);
        assert!(screen.starts_with("Photo: (none"));
        assert_eq!(screen.matches("(empty)").count(), 2);
    }

    #[test]
    fn outcomes_render_as_success_warning_or_error() {
        assert_eq!(
            format_outcome("라면", MealSlot::Lunch, &RegistrationOutcome::Registered),
            "registered 라면 for 점심"
        );
        assert_eq!(
            format_outcome(
                "라면",
                MealSlot::Lunch,
                &RegistrationOutcome::Duplicate {
                    detail: "이미 등록된 음식입니다".to_string()
                }
            ),
            "warning: 이미 등록된 음식입니다"
        );
        assert!(format_outcome(
            "라면",
            MealSlot::Lunch,
            &RegistrationOutcome::Failed {
                status: Some(500),
                detail: "boom".to_string()
            }
        )
        .starts_with("error: registration failed (HTTP 500)"));
    }
}
