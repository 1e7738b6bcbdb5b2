pub mod cards;
pub mod columns;
pub mod labels;
pub mod notes;
pub mod teams;
pub mod todos;

pub use teams::{DEFAULT_COLUMNS, DEFAULT_LABELS};
