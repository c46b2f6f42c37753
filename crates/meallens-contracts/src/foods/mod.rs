mod meal;
mod parser;
mod session;

pub use meal::{classify_registration_response, MealSlot, MealSlotSet, RegistrationOutcome};
pub use parser::split_and_clean;
pub use session::{
    AddOutcome, EntryId, FoodEntry, FoodList, ListKind, Session, SessionError,
};
