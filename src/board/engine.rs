//! Drag-and-drop reordering.
//!
//! A gesture runs `Idle → Dragging → {Committed | Cancelled}`. Committing turns
//! the source and destination slots into a [`MovePlan`]: the moved card's new
//! column and position, followed by one position write per sibling whose
//! position actually changes. After the plan is applied every touched column
//! holds positions `0..n-1` in display order, both locally and remotely.

use serde::Serialize;

use super::state::BoardState;
use crate::db::Card;

/// A slot on the board: a column and an index into its card list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropSlot {
    pub column_id: String,
    pub index: usize,
}

impl DropSlot {
    pub fn new(column_id: impl Into<String>, index: usize) -> Self {
        Self {
            column_id: column_id.into(),
            index,
        }
    }
}

/// One remote write: put `card_id` into `to_column_id` at `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionWrite {
    pub card_id: String,
    pub from_column_id: String,
    pub to_column_id: String,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePlan {
    pub card_id: String,
    pub source: DropSlot,
    /// Destination with the index already clamped to the column length.
    pub destination: DropSlot,
    /// Moved card first, then siblings in index order.
    pub writes: Vec<PositionWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    MissingColumn(String),
    MissingCard(DropSlot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveDecision {
    /// Dropped outside any column, or back onto its own slot.
    Cancelled,
    /// The gesture references a column or card that no longer exists.
    Abandoned(AbandonReason),
    Planned(MovePlan),
}

/// Work out the writes for moving the card at `source` to `destination`.
pub fn plan_move(
    board: &BoardState,
    source: &DropSlot,
    destination: Option<&DropSlot>,
) -> MoveDecision {
    let Some(destination) = destination else {
        return MoveDecision::Cancelled;
    };
    if destination == source {
        return MoveDecision::Cancelled;
    }

    let Some(source_idx) = board.column_index(&source.column_id) else {
        return MoveDecision::Abandoned(AbandonReason::MissingColumn(source.column_id.clone()));
    };
    let Some(dest_idx) = board.column_index(&destination.column_id) else {
        return MoveDecision::Abandoned(AbandonReason::MissingColumn(
            destination.column_id.clone(),
        ));
    };

    let source_cards = &board.columns[source_idx].cards;
    let Some(moved) = source_cards.get(source.index) else {
        return MoveDecision::Abandoned(AbandonReason::MissingCard(source.clone()));
    };

    let mut source_order: Vec<&Card> = source_cards.iter().collect();
    source_order.remove(source.index);

    let mut writes = Vec::new();

    if source_idx == dest_idx {
        let index = destination.index.min(source_order.len());
        if index == source.index {
            return MoveDecision::Cancelled;
        }
        source_order.insert(index, moved);

        writes.push(position_write(moved, &source.column_id, index));
        writes.extend(sibling_writes(&source_order, &moved.id, &source.column_id));

        return MoveDecision::Planned(MovePlan {
            card_id: moved.id.clone(),
            source: source.clone(),
            destination: DropSlot::new(destination.column_id.clone(), index),
            writes,
        });
    }

    let mut dest_order: Vec<&Card> = board.columns[dest_idx].cards.iter().collect();
    let index = destination.index.min(dest_order.len());
    dest_order.insert(index, moved);

    writes.push(position_write(moved, &destination.column_id, index));
    writes.extend(sibling_writes(&dest_order, &moved.id, &destination.column_id));
    writes.extend(sibling_writes(&source_order, &moved.id, &source.column_id));

    MoveDecision::Planned(MovePlan {
        card_id: moved.id.clone(),
        source: source.clone(),
        destination: DropSlot::new(destination.column_id.clone(), index),
        writes,
    })
}

fn position_write(card: &Card, to_column_id: &str, index: usize) -> PositionWrite {
    PositionWrite {
        card_id: card.id.clone(),
        from_column_id: card.column_id.clone(),
        to_column_id: to_column_id.to_string(),
        position: index as i64,
    }
}

fn sibling_writes<'a>(
    order: &'a [&'a Card],
    moved_id: &'a str,
    column_id: &'a str,
) -> impl Iterator<Item = PositionWrite> + 'a {
    order
        .iter()
        .enumerate()
        .filter(move |(index, card)| card.id != moved_id && card.position != *index as i64)
        .map(move |(index, card)| position_write(card, column_id, index))
}

impl MovePlan {
    pub fn is_cross_column(&self) -> bool {
        self.source.column_id != self.destination.column_id
    }

    /// The board as it looks once every write in the plan has landed.
    pub fn apply(&self, board: &BoardState) -> BoardState {
        let mut next = board.clone();

        let Some((col_idx, card_idx)) = next.find_card(&self.card_id) else {
            return next;
        };
        let Some(dest_idx) = next.column_index(&self.destination.column_id) else {
            return next;
        };

        let mut card = next.columns[col_idx].cards.remove(card_idx);
        card.column_id = self.destination.column_id.clone();

        let dest_cards = &mut next.columns[dest_idx].cards;
        let index = self.destination.index.min(dest_cards.len());
        dest_cards.insert(index, card);

        for touched in [col_idx, dest_idx] {
            for (position, card) in next.columns[touched].cards.iter_mut().enumerate() {
                card.position = position as i64;
            }
        }

        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging { card_id: String, source: DropSlot },
    Committed(MovePlan),
    Cancelled,
}

/// Tracks one drag gesture from pick-up to drop.
#[derive(Debug, Clone)]
pub struct DragGesture {
    state: DragState,
}

impl Default for DragGesture {
    fn default() -> Self {
        Self::new()
    }
}

impl DragGesture {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    /// Pick up the card at `source`. Returns false (and stays idle) if the slot
    /// holds no card.
    pub fn begin(&mut self, board: &BoardState, source: DropSlot) -> bool {
        let card_id = board
            .column(&source.column_id)
            .and_then(|column| column.cards.get(source.index))
            .map(|card| card.id.clone());

        match card_id {
            Some(card_id) => {
                self.state = DragState::Dragging { card_id, source };
                true
            }
            None => false,
        }
    }

    /// Drop the card. `None` means it was released outside every column.
    pub fn end(&mut self, board: &BoardState, destination: Option<DropSlot>) -> MoveDecision {
        let DragState::Dragging { card_id, source } = &self.state else {
            self.state = DragState::Cancelled;
            return MoveDecision::Cancelled;
        };

        let still_there = board
            .column(&source.column_id)
            .and_then(|column| column.cards.get(source.index))
            .is_some_and(|card| &card.id == card_id);

        let decision = if still_there {
            plan_move(board, source, destination.as_ref())
        } else {
            MoveDecision::Abandoned(AbandonReason::MissingCard(source.clone()))
        };

        self.state = match &decision {
            MoveDecision::Planned(plan) => DragState::Committed(plan.clone()),
            MoveDecision::Cancelled | MoveDecision::Abandoned(_) => DragState::Cancelled,
        };
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::state::fixtures::board;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn planned(decision: MoveDecision) -> MovePlan {
        match decision {
            MoveDecision::Planned(plan) => plan,
            other => panic!("expected a plan, got {other:?}"),
        }
    }

    fn write(card: &str, from: &str, to: &str, position: i64) -> PositionWrite {
        PositionWrite {
            card_id: card.into(),
            from_column_id: from.into(),
            to_column_id: to.into(),
            position,
        }
    }

    fn positions(state: &BoardState, column_id: &str) -> Vec<(String, i64)> {
        state
            .column(column_id)
            .unwrap()
            .cards
            .iter()
            .map(|card| (card.id.clone(), card.position))
            .collect()
    }

    #[test]
    fn dropping_into_empty_column_compacts_source() {
        let state = board(&[("A", vec!["card1", "card2", "card3"]), ("B", vec![])]);

        let plan = planned(plan_move(
            &state,
            &DropSlot::new("A", 1),
            Some(&DropSlot::new("B", 0)),
        ));
        assert_eq!(
            plan.writes,
            vec![write("card2", "A", "B", 0), write("card3", "A", "A", 1)]
        );

        let next = plan.apply(&state);
        assert_eq!(
            positions(&next, "A"),
            vec![("card1".into(), 0), ("card3".into(), 1)]
        );
        assert_eq!(positions(&next, "B"), vec![("card2".into(), 0)]);
        assert_eq!(next.card("card2").unwrap().column_id, "B");
    }

    #[test]
    fn cross_column_shifts_destination_tail() {
        let state = board(&[("A", vec!["a0", "a1"]), ("B", vec!["b0", "b1", "b2"])]);

        let plan = planned(plan_move(
            &state,
            &DropSlot::new("A", 0),
            Some(&DropSlot::new("B", 1)),
        ));
        assert_eq!(
            plan.writes,
            vec![
                write("a0", "A", "B", 1),
                write("b1", "B", "B", 2),
                write("b2", "B", "B", 3),
                write("a1", "A", "A", 0),
            ]
        );

        let next = plan.apply(&state);
        assert_eq!(next.card_ids("B"), vec!["b0", "a0", "b1", "b2"]);
        assert_eq!(next.card_ids("A"), vec!["a1"]);
        assert_eq!(next.card("b0").unwrap().position, 0);
        assert_eq!(next.card("b2").unwrap().position, 3);
    }

    #[test]
    fn same_column_rewrites_only_the_crossed_range() {
        let state = board(&[("A", vec!["c0", "c1", "c2", "c3", "c4"])]);

        let plan = planned(plan_move(
            &state,
            &DropSlot::new("A", 1),
            Some(&DropSlot::new("A", 3)),
        ));
        assert_eq!(
            plan.writes,
            vec![
                write("c1", "A", "A", 3),
                write("c2", "A", "A", 1),
                write("c3", "A", "A", 2),
            ]
        );
        assert!(!plan.is_cross_column());
        assert_eq!(
            plan.apply(&state).card_ids("A"),
            vec!["c0", "c2", "c3", "c1", "c4"]
        );
    }

    #[test]
    fn gaps_are_closed_by_the_writes() {
        let mut state = board(&[("A", vec!["c0", "c1", "c2"])]);
        for (card, position) in state.columns[0].cards.iter_mut().zip([3, 7, 9]) {
            card.position = position;
        }

        let plan = planned(plan_move(
            &state,
            &DropSlot::new("A", 2),
            Some(&DropSlot::new("A", 1)),
        ));
        assert_eq!(
            plan.writes,
            vec![
                write("c2", "A", "A", 1),
                write("c0", "A", "A", 0),
                write("c1", "A", "A", 2),
            ]
        );
    }

    #[test]
    fn no_destination_or_own_slot_is_cancelled() {
        let state = board(&[("A", vec!["c0", "c1"])]);
        let source = DropSlot::new("A", 1);

        assert_eq!(plan_move(&state, &source, None), MoveDecision::Cancelled);
        assert_eq!(
            plan_move(&state, &source, Some(&DropSlot::new("A", 1))),
            MoveDecision::Cancelled
        );
        // Past the end of its own column clamps back onto the same slot.
        assert_eq!(
            plan_move(&state, &source, Some(&DropSlot::new("A", 10))),
            MoveDecision::Cancelled
        );
    }

    #[test]
    fn missing_relations_abandon_the_move() {
        let state = board(&[("A", vec!["c0"]), ("B", vec![])]);

        assert_eq!(
            plan_move(&state, &DropSlot::new("Z", 0), Some(&DropSlot::new("B", 0))),
            MoveDecision::Abandoned(AbandonReason::MissingColumn("Z".into()))
        );
        assert_eq!(
            plan_move(&state, &DropSlot::new("A", 0), Some(&DropSlot::new("Z", 0))),
            MoveDecision::Abandoned(AbandonReason::MissingColumn("Z".into()))
        );
        assert_eq!(
            plan_move(&state, &DropSlot::new("A", 4), Some(&DropSlot::new("B", 0))),
            MoveDecision::Abandoned(AbandonReason::MissingCard(DropSlot::new("A", 4)))
        );
    }

    #[test]
    fn destination_index_is_clamped() {
        let state = board(&[("A", vec!["c0"]), ("B", vec![]), ("C", vec!["x0"])]);

        let into_empty = planned(plan_move(
            &state,
            &DropSlot::new("A", 0),
            Some(&DropSlot::new("B", 5)),
        ));
        assert_eq!(into_empty.destination, DropSlot::new("B", 0));
        assert_eq!(into_empty.writes, vec![write("c0", "A", "B", 0)]);

        let past_end = planned(plan_move(
            &state,
            &DropSlot::new("A", 0),
            Some(&DropSlot::new("C", 9)),
        ));
        assert_eq!(past_end.destination, DropSlot::new("C", 1));
        assert_eq!(past_end.apply(&state).card_ids("C"), vec!["x0", "c0"]);
    }

    #[test]
    fn random_same_column_moves_preserve_drop_order() {
        let mut rng = StdRng::seed_from_u64(7);
        let ids: Vec<String> = (0..8).map(|i| format!("c{i}")).collect();
        let mut state = board(&[("A", ids.iter().map(String::as_str).collect())]);
        let mut model = ids.clone();

        for _ in 0..200 {
            let from = rng.gen_range(0..model.len());
            let to = rng.gen_range(0..model.len());

            let moved = model.remove(from);
            model.insert(to, moved);

            match plan_move(&state, &DropSlot::new("A", from), Some(&DropSlot::new("A", to))) {
                MoveDecision::Planned(plan) => state = plan.apply(&state),
                MoveDecision::Cancelled => assert_eq!(from, to),
                MoveDecision::Abandoned(reason) => panic!("unexpected abandon: {reason:?}"),
            }

            assert_eq!(state.card_ids("A"), model);
            let positions: Vec<i64> = state.columns[0].cards.iter().map(|c| c.position).collect();
            assert_eq!(positions, (0..model.len() as i64).collect::<Vec<_>>());
        }
    }

    #[test]
    fn applying_writes_matches_apply() {
        let state = board(&[("A", vec!["a0", "a1", "a2"]), ("B", vec!["b0", "b1"])]);
        let plan = planned(plan_move(
            &state,
            &DropSlot::new("A", 2),
            Some(&DropSlot::new("B", 0)),
        ));

        let mut replayed = state.clone();
        for w in &plan.writes {
            replayed = replayed.with_card_edited(&w.card_id, |card| {
                card.column_id = w.to_column_id.clone();
                card.position = w.position;
            });
        }
        let expected = plan.apply(&state);
        for column in &expected.columns {
            for card in &column.cards {
                let replayed_card = replayed.card(&card.id).unwrap();
                assert_eq!(replayed_card.column_id, card.column_id);
                assert_eq!(replayed_card.position, card.position);
            }
        }
    }

    #[test]
    fn gesture_walks_through_states() {
        let state = board(&[("A", vec!["c0", "c1"]), ("B", vec![])]);
        let mut gesture = DragGesture::new();
        assert_eq!(gesture.state(), &DragState::Idle);

        assert!(!gesture.begin(&state, DropSlot::new("A", 9)));
        assert_eq!(gesture.state(), &DragState::Idle);

        assert!(gesture.begin(&state, DropSlot::new("A", 0)));
        assert!(matches!(gesture.state(), DragState::Dragging { card_id, .. } if card_id == "c0"));

        let decision = gesture.end(&state, Some(DropSlot::new("B", 0)));
        assert!(matches!(decision, MoveDecision::Planned(_)));
        assert!(matches!(gesture.state(), DragState::Committed(_)));

        let mut dropped_outside = DragGesture::new();
        dropped_outside.begin(&state, DropSlot::new("A", 1));
        assert_eq!(dropped_outside.end(&state, None), MoveDecision::Cancelled);
        assert_eq!(dropped_outside.state(), &DragState::Cancelled);
    }

    #[test]
    fn gesture_abandons_when_board_changed_underneath() {
        let state = board(&[("A", vec!["c0", "c1"]), ("B", vec![])]);
        let mut gesture = DragGesture::new();
        gesture.begin(&state, DropSlot::new("A", 0));

        let reloaded = state.without_card("c0");
        let decision = gesture.end(&reloaded, Some(DropSlot::new("B", 0)));
        assert!(matches!(decision, MoveDecision::Abandoned(_)));
        assert_eq!(gesture.state(), &DragState::Cancelled);
    }
}
