pub mod board;
pub mod label;
pub mod team;
pub mod todo;

pub use board::{BoardData, Card, CardPatch, Column, Priority};
pub use label::{Label, validate_color};
pub use team::{Member, MemberRole, Profile, Team, AVATAR_COLORS};
pub use todo::TodoItem;
