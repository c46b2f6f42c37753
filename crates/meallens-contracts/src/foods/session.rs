use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

/// Stable handle for a list entry. Assigned once at insertion and never reused
/// within a session, so renames and duplicate names never make it ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntryId(u64);

impl EntryId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = SessionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        trimmed
            .strip_prefix('#')
            .unwrap_or(trimmed)
            .parse::<u64>()
            .map(EntryId)
            .map_err(|_| SessionError::InvalidId(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ListKind {
    #[serde(rename = "analyzed_foods")]
    Analyzed,
    #[serde(rename = "manual_foods")]
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoodEntry {
    pub id: EntryId,
    pub name: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no food entry {0}")]
    UnknownEntry(EntryId),
    #[error("'{0}' is not an entry id")]
    InvalidId(String),
    #[error("food name must not be blank")]
    BlankName,
    #[error("entry {0} is not being edited")]
    NotEditing(EntryId),
    #[error("entry {0} is being edited")]
    Editing(EntryId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added(EntryId),
    Blank,
    Duplicate,
}

/// Ordered food names plus the single entry (if any) in edit mode.
#[derive(Debug, Clone, Default)]
pub struct FoodList {
    entries: IndexMap<EntryId, String>,
    editing: Option<EntryId>,
}

impl FoodList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &str)> {
        self.entries.iter().map(|(id, name)| (*id, name.as_str()))
    }

    pub fn entries(&self) -> Vec<FoodEntry> {
        self.iter()
            .map(|(id, name)| FoodEntry {
                id,
                name: name.to_string(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.values().cloned().collect()
    }

    pub fn get(&self, id: EntryId) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.entries.values().any(|existing| existing == name)
    }

    pub fn editing(&self) -> Option<EntryId> {
        self.editing
    }

    pub fn is_editing(&self, id: EntryId) -> bool {
        self.editing == Some(id)
    }
}

/// All per-user state of one interactive session.
///
/// Handlers mutate it through these methods only; the view is re-derived from
/// it after every change.
#[derive(Debug, Clone, Default)]
pub struct Session {
    analyzed: FoodList,
    manual: FoodList,
    uploaded_image: Option<PathBuf>,
    next_id: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self, kind: ListKind) -> &FoodList {
        match kind {
            ListKind::Analyzed => &self.analyzed,
            ListKind::Manual => &self.manual,
        }
    }

    fn list_mut(&mut self, kind: ListKind) -> &mut FoodList {
        match kind {
            ListKind::Analyzed => &mut self.analyzed,
            ListKind::Manual => &mut self.manual,
        }
    }

    pub fn analyzed_foods(&self) -> &FoodList {
        &self.analyzed
    }

    pub fn manual_foods(&self) -> &FoodList {
        &self.manual
    }

    pub fn uploaded_image(&self) -> Option<&Path> {
        self.uploaded_image.as_deref()
    }

    pub fn set_uploaded_image(&mut self, path: impl Into<PathBuf>) {
        self.uploaded_image = Some(path.into());
    }

    fn allocate_id(&mut self) -> EntryId {
        self.next_id += 1;
        EntryId(self.next_id)
    }

    /// Replaces the analyzed list with fresh entries. The old cursor referred
    /// to ids that no longer exist, so it is dropped.
    pub fn populate<I, S>(&mut self, names: I) -> Vec<EntryId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = IndexMap::new();
        for name in names {
            let trimmed = name.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            entries.insert(self.allocate_id(), trimmed.to_string());
        }
        let ids = entries.keys().copied().collect();
        self.analyzed = FoodList {
            entries,
            editing: None,
        };
        ids
    }

    /// Appends a manually typed food unless it is blank or already listed.
    pub fn add_manual(&mut self, value: &str) -> AddOutcome {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return AddOutcome::Blank;
        }
        if self.manual.contains_name(trimmed) {
            return AddOutcome::Duplicate;
        }
        let id = self.allocate_id();
        self.manual.entries.insert(id, trimmed.to_string());
        AddOutcome::Added(id)
    }

    /// Overwrites an entry in place and leaves edit mode for it. Neither list
    /// checks the new name against its other entries.
    pub fn rename(
        &mut self,
        kind: ListKind,
        id: EntryId,
        new_value: &str,
    ) -> Result<String, SessionError> {
        let trimmed = new_value.trim();
        if trimmed.is_empty() {
            return Err(SessionError::BlankName);
        }
        let list = self.list_mut(kind);
        let slot = list
            .entries
            .get_mut(&id)
            .ok_or(SessionError::UnknownEntry(id))?;
        let previous = std::mem::replace(slot, trimmed.to_string());
        if list.editing == Some(id) {
            list.editing = None;
        }
        Ok(previous)
    }

    pub fn delete(&mut self, kind: ListKind, id: EntryId) -> Result<FoodEntry, SessionError> {
        let list = self.list_mut(kind);
        let name = list
            .entries
            .shift_remove(&id)
            .ok_or(SessionError::UnknownEntry(id))?;
        if list.editing == Some(id) {
            list.editing = None;
        }
        Ok(FoodEntry { id, name })
    }

    /// Puts `id` into edit mode, replacing any other entry of the same list.
    pub fn set_edit_cursor(&mut self, kind: ListKind, id: EntryId) -> Result<(), SessionError> {
        let list = self.list_mut(kind);
        if !list.entries.contains_key(&id) {
            return Err(SessionError::UnknownEntry(id));
        }
        list.editing = Some(id);
        Ok(())
    }

    pub fn clear_edit_cursor(&mut self, kind: ListKind) -> Option<EntryId> {
        self.list_mut(kind).editing.take()
    }

    pub fn editing(&self, kind: ListKind) -> Option<EntryId> {
        self.list(kind).editing
    }

    /// Ids are unique across both lists, so an id alone locates its entry.
    pub fn find(&self, id: EntryId) -> Option<(ListKind, &str)> {
        [ListKind::Analyzed, ListKind::Manual]
            .into_iter()
            .find_map(|kind| self.list(kind).get(id).map(|name| (kind, name)))
    }

    /// Drops every list, cursor and the uploaded image. Ids keep counting up.
    pub fn clear(&mut self) {
        self.analyzed = FoodList::default();
        self.manual = FoodList::default();
        self.uploaded_image = None;
    }

    pub fn is_empty(&self) -> bool {
        self.analyzed.is_empty() && self.manual.is_empty() && self.uploaded_image.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &FoodList) -> Vec<String> {
        list.names()
    }

    #[test]
    fn add_manual_rejects_duplicates() {
        let mut session = Session::new();
        assert!(matches!(session.add_manual("라면"), AddOutcome::Added(_)));
        assert_eq!(session.add_manual("라면"), AddOutcome::Duplicate);
        assert_eq!(session.add_manual("  라면 "), AddOutcome::Duplicate);
        assert_eq!(names(session.manual_foods()), vec!["라면"]);
    }

    #[test]
    fn add_manual_ignores_blank_input() {
        let mut session = Session::new();
        assert_eq!(session.add_manual(""), AddOutcome::Blank);
        assert_eq!(session.add_manual("   \t"), AddOutcome::Blank);
        assert!(session.manual_foods().is_empty());
    }

    #[test]
    fn rename_overwrites_in_place() -> anyhow::Result<()> {
        let mut session = Session::new();
        let ids = session.populate(["김밥", "떡볶이"]);
        session.set_edit_cursor(ListKind::Analyzed, ids[0])?;
        let previous = session.rename(ListKind::Analyzed, ids[0], " 참치김밥 ")?;

        assert_eq!(previous, "김밥");
        assert_eq!(names(session.analyzed_foods()), vec!["참치김밥", "떡볶이"]);
        assert_eq!(session.editing(ListKind::Analyzed), None);
        Ok(())
    }

    #[test]
    fn rename_does_not_dedupe_manual_list() -> anyhow::Result<()> {
        let mut session = Session::new();
        let AddOutcome::Added(first) = session.add_manual("라면") else {
            panic!("first add should succeed");
        };
        session.add_manual("우동");
        session.rename(ListKind::Manual, first, "우동")?;
        assert_eq!(names(session.manual_foods()), vec!["우동", "우동"]);
        Ok(())
    }

    #[test]
    fn rename_rejects_blank_and_unknown() {
        let mut session = Session::new();
        let ids = session.populate(["김밥"]);
        assert_eq!(
            session.rename(ListKind::Analyzed, ids[0], "  "),
            Err(SessionError::BlankName)
        );
        assert_eq!(
            session.rename(ListKind::Manual, ids[0], "참치김밥"),
            Err(SessionError::UnknownEntry(ids[0]))
        );
        assert_eq!(names(session.analyzed_foods()), vec!["김밥"]);
    }

    #[test]
    fn deleting_edited_entry_clears_cursor() -> anyhow::Result<()> {
        let mut session = Session::new();
        let ids = session.populate(["김밥", "떡볶이"]);
        session.set_edit_cursor(ListKind::Analyzed, ids[1])?;

        let removed = session.delete(ListKind::Analyzed, ids[1])?;
        assert_eq!(removed.name, "떡볶이");
        assert_eq!(session.editing(ListKind::Analyzed), None);
        assert_eq!(names(session.analyzed_foods()), vec!["김밥"]);
        Ok(())
    }

    #[test]
    fn deleting_other_entry_keeps_cursor() -> anyhow::Result<()> {
        let mut session = Session::new();
        let ids = session.populate(["김밥", "떡볶이", "순대"]);
        session.set_edit_cursor(ListKind::Analyzed, ids[2])?;
        session.delete(ListKind::Analyzed, ids[0])?;
        assert_eq!(session.editing(ListKind::Analyzed), Some(ids[2]));
        Ok(())
    }

    #[test]
    fn duplicate_names_stay_distinct_by_id() -> anyhow::Result<()> {
        let mut session = Session::new();
        let ids = session.populate(["밥", "밥"]);
        assert_ne!(ids[0], ids[1]);

        session.set_edit_cursor(ListKind::Analyzed, ids[1])?;
        assert!(!session.analyzed_foods().is_editing(ids[0]));
        session.delete(ListKind::Analyzed, ids[0])?;
        assert_eq!(session.editing(ListKind::Analyzed), Some(ids[1]));
        assert_eq!(session.find(ids[1]), Some((ListKind::Analyzed, "밥")));
        Ok(())
    }

    #[test]
    fn cursors_are_independent_per_list() -> anyhow::Result<()> {
        let mut session = Session::new();
        let analyzed = session.populate(["김밥"]);
        let AddOutcome::Added(manual) = session.add_manual("라면") else {
            panic!("add should succeed");
        };
        session.set_edit_cursor(ListKind::Analyzed, analyzed[0])?;
        session.set_edit_cursor(ListKind::Manual, manual)?;

        assert_eq!(session.clear_edit_cursor(ListKind::Manual), Some(manual));
        assert_eq!(session.editing(ListKind::Analyzed), Some(analyzed[0]));
        Ok(())
    }

    #[test]
    fn editing_another_entry_moves_the_cursor() -> anyhow::Result<()> {
        let mut session = Session::new();
        let ids = session.populate(["김밥", "떡볶이"]);
        session.set_edit_cursor(ListKind::Analyzed, ids[0])?;
        session.set_edit_cursor(ListKind::Analyzed, ids[1])?;

        let list = session.analyzed_foods();
        assert_eq!(list.editing(), Some(ids[1]));
        assert!(!list.is_editing(ids[0]));
        assert_eq!(list.iter().filter(|(id, _)| list.is_editing(*id)).count(), 1);
        Ok(())
    }

    #[test]
    fn populate_replaces_list_and_drops_cursor() -> anyhow::Result<()> {
        let mut session = Session::new();
        let first = session.populate(["김밥"]);
        session.set_edit_cursor(ListKind::Analyzed, first[0])?;
        let second = session.populate([" 비빔밥 ", "", "계란국"]);

        assert_eq!(second.len(), 2);
        assert!(!second.contains(&first[0]));
        assert_eq!(names(session.analyzed_foods()), vec!["비빔밥", "계란국"]);
        assert_eq!(session.editing(ListKind::Analyzed), None);
        Ok(())
    }

    #[test]
    fn clear_empties_everything() {
        let mut session = Session::new();
        session.populate(["김밥"]);
        session.add_manual("라면");
        session.set_uploaded_image("/tmp/lunch.jpg");
        session.clear();
        assert!(session.is_empty());
        assert_eq!(session.uploaded_image(), None);
    }

    #[test]
    fn entry_id_parses_with_or_without_hash() {
        assert_eq!("#3".parse::<EntryId>().map(EntryId::get), Ok(3));
        assert_eq!(" 12 ".parse::<EntryId>().map(EntryId::get), Ok(12));
        assert_eq!(
            "abc".parse::<EntryId>(),
            Err(SessionError::InvalidId("abc".to_string()))
        );
    }
}
