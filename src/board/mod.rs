//! Kanban board: persistence contract, in-memory state, drag reordering and
//! per-card editing.

pub mod editor;
pub mod engine;
pub mod gateway;
pub mod state;
pub mod store;

pub use editor::{CardEditor, EditKey};
pub use engine::{
    plan_move, AbandonReason, DragGesture, DragState, DropSlot, MoveDecision, MovePlan,
    PositionWrite,
};
pub use gateway::BoardGateway;
pub use state::BoardState;
pub use store::{BoardStore, MoveOutcome, MutationOutcome, Ticket};
