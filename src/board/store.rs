use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Result};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::{
    engine::{plan_move, AbandonReason, DragGesture, DropSlot, MoveDecision, MovePlan},
    gateway::BoardGateway,
    state::BoardState,
};
use crate::db::{CardPatch, Priority};
use crate::error::GatewayError;
use crate::{log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

/// A local change that has been applied but not yet confirmed by the backend.
#[derive(Debug)]
#[must_use]
pub struct Ticket {
    id: u64,
    action: &'static str,
    subject: String,
}

impl Ticket {
    pub fn action(&self) -> &'static str {
        self.action
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The backend accepted the write and local state reflects it.
    Applied,
    /// Input failed validation; nothing was written.
    Skipped,
    /// The write failed and the board was reloaded from the backend.
    Reconciled,
    /// The response arrived after teardown and was dropped.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Committed(MovePlan),
    Cancelled,
    Abandoned(AbandonReason),
    Reconciled,
    Discarded,
}

/// Counts a load as in flight until dropped, including when the load future
/// itself is dropped mid-fetch.
struct LoadGuard<'a>(&'a AtomicUsize);

impl<'a> LoadGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Client-side board state for one team.
///
/// Mutations are applied locally first and then written through the gateway.
/// When a write fails the local state is thrown away and the board is fetched
/// again; there is no rollback.
pub struct BoardStore {
    gateway: Arc<dyn BoardGateway>,
    state: RwLock<Arc<BoardState>>,
    loads_in_flight: AtomicUsize,
    load_generation: AtomicU64,
    next_ticket: AtomicU64,
    pending: Mutex<HashSet<u64>>,
    interest: CancellationToken,
    verbose: bool,
}

impl BoardStore {
    pub fn new(gateway: Arc<dyn BoardGateway>) -> Self {
        let debug_mode = std::env::var("TEAMBOARD_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            gateway,
            state: RwLock::new(Arc::new(BoardState::default())),
            loads_in_flight: AtomicUsize::new(0),
            load_generation: AtomicU64::new(0),
            next_ticket: AtomicU64::new(1),
            pending: Mutex::new(HashSet::new()),
            interest: CancellationToken::new(),
            verbose: debug_mode,
        }
    }

    /// Current board. Cheap to call; the snapshot is shared, not copied.
    pub async fn snapshot(&self) -> Arc<BoardState> {
        self.state.read().await.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loads_in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn is_torn_down(&self) -> bool {
        self.interest.is_cancelled()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Fetch the team's board and replace local state with it.
    ///
    /// A load that finishes after a newer load started, or after teardown, is
    /// dropped.
    pub async fn load(&self, team_id: &str) -> Result<(), GatewayError> {
        if self.is_torn_down() {
            return Ok(());
        }

        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let fetched = {
            let _in_flight = LoadGuard::enter(&self.loads_in_flight);
            self.gateway.fetch_board(team_id).await
        };

        let data = match fetched {
            Ok(data) => data,
            Err(err) => {
                log_error!("Failed to load board for team {}: {}", team_id, err);
                return Err(err);
            }
        };

        if self.is_torn_down() {
            return Ok(());
        }
        if self.load_generation.load(Ordering::SeqCst) != generation {
            if self.verbose {
                log_info!("Dropping stale board load for team {}", team_id);
            }
            return Ok(());
        }

        let next = BoardState::from_data(team_id, data);
        if self.verbose {
            log_info!(
                "Loaded board for team {}: {} columns, {} cards",
                team_id,
                next.columns.len(),
                next.card_count()
            );
        }
        *self.state.write().await = Arc::new(next);
        Ok(())
    }

    /// Drop all state and ignore every response still in flight.
    pub async fn teardown(&self) {
        self.interest.cancel();
        self.pending.lock().await.clear();
        *self.state.write().await = Arc::new(BoardState::default());
    }

    /// Apply a pure mutation to the current state. Ignored after teardown.
    pub async fn apply_optimistic(&self, mutation: impl FnOnce(&BoardState) -> BoardState) {
        let mut guard = self.state.write().await;
        if self.is_torn_down() {
            return;
        }
        let next = mutation(&guard);
        *guard = Arc::new(next);
    }

    async fn open_ticket(&self, action: &'static str, subject: &str) -> Ticket {
        let id = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().await.insert(id);
        Ticket {
            id,
            action,
            subject: subject.to_string(),
        }
    }

    /// Apply `mutation` locally and record it as awaiting the backend.
    pub async fn propose_local(
        &self,
        action: &'static str,
        subject: &str,
        mutation: impl FnOnce(&BoardState) -> BoardState,
    ) -> Ticket {
        self.apply_optimistic(mutation).await;
        let ticket = self.open_ticket(action, subject).await;
        if self.verbose {
            log_info!("Proposed {} {} (ticket {})", action, subject, ticket.id);
        }
        ticket
    }

    /// The backend accepted the write behind `ticket`. Returns `Discarded` when
    /// nobody is interested in the response any more.
    pub async fn confirm_remote(&self, ticket: Ticket) -> MutationOutcome {
        self.pending.lock().await.remove(&ticket.id);
        if self.is_torn_down() {
            return MutationOutcome::Discarded;
        }
        if self.verbose {
            log_info!("Confirmed {} {}", ticket.action, ticket.subject);
        }
        MutationOutcome::Applied
    }

    /// The write behind `ticket` failed. Local state is replaced by whatever
    /// the backend currently holds.
    pub async fn reconcile_on_failure(&self, ticket: Ticket, err: &GatewayError) -> MutationOutcome {
        self.pending.lock().await.remove(&ticket.id);
        log_error!("Failed to {} {}: {}", ticket.action, ticket.subject, err);

        if self.is_torn_down() {
            return MutationOutcome::Discarded;
        }

        let team_id = self.snapshot().await.team_id.clone();
        match team_id {
            Some(team_id) => {
                log_warn!("Reloading board for team {} after failed {}", team_id, ticket.action);
                if let Err(reload_err) = self.load(&team_id).await {
                    log_error!("Reload after failed {} also failed: {}", ticket.action, reload_err);
                }
            }
            None => log_warn!("No board loaded; nothing to reload after failed {}", ticket.action),
        }
        MutationOutcome::Reconciled
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_torn_down() {
            return Err(anyhow!("board store has been torn down"));
        }
        Ok(())
    }

    /// Create a card at the end of a column. Blank titles are ignored.
    pub async fn add_card(&self, column_id: &str, title: &str) -> Result<MutationOutcome> {
        self.ensure_live()?;
        let title = title.trim();
        if title.is_empty() {
            return Ok(MutationOutcome::Skipped);
        }

        // The card id comes from the backend, so there is nothing to show
        // until the insert returns.
        let ticket = self.open_ticket("add card to", column_id).await;
        match self.gateway.create_card(column_id, title).await {
            Ok(card) => {
                let outcome = self.confirm_remote(ticket).await;
                self.apply_optimistic(|s| s.with_card_appended(card)).await;
                Ok(outcome)
            }
            Err(err) => Ok(self.reconcile_on_failure(ticket, &err).await),
        }
    }

    pub async fn update_card(&self, card_id: &str, patch: CardPatch) -> Result<MutationOutcome> {
        self.ensure_live()?;

        let mut patch = patch;
        if let Some(title) = patch.title.take() {
            let trimmed = title.trim();
            if trimmed.is_empty() {
                return Ok(MutationOutcome::Skipped);
            }
            patch.title = Some(trimmed.to_string());
        }
        if patch.is_empty() {
            return Ok(MutationOutcome::Skipped);
        }

        let ticket = self
            .propose_local("update card", card_id, |s| {
                s.with_card_edited(card_id, |card| patch.apply_to(card))
            })
            .await;
        match self.gateway.update_card(card_id, &patch).await {
            Ok(card) => {
                let outcome = self.confirm_remote(ticket).await;
                self.apply_optimistic(|s| s.with_card_replaced(card)).await;
                Ok(outcome)
            }
            Err(err) => Ok(self.reconcile_on_failure(ticket, &err).await),
        }
    }

    pub async fn set_priority(&self, card_id: &str, priority: Priority) -> Result<MutationOutcome> {
        self.update_card(card_id, CardPatch::priority(priority)).await
    }

    pub async fn assign(&self, card_id: &str, assignee_id: Option<String>) -> Result<MutationOutcome> {
        self.update_card(card_id, CardPatch::assignee(assignee_id)).await
    }

    pub async fn delete_card(&self, card_id: &str) -> Result<MutationOutcome> {
        self.ensure_live()?;

        let ticket = self
            .propose_local("delete card", card_id, |s| s.without_card(card_id))
            .await;
        match self.gateway.delete_card(card_id).await {
            Ok(()) => Ok(self.confirm_remote(ticket).await),
            Err(err) => Ok(self.reconcile_on_failure(ticket, &err).await),
        }
    }

    /// Flip a label on a card. Unknown cards are skipped.
    pub async fn toggle_label(&self, card_id: &str, label_id: &str) -> Result<MutationOutcome> {
        self.ensure_live()?;

        let present = match self.snapshot().await.card(card_id) {
            Some(card) => !card.has_label(label_id),
            None => {
                log_warn!("Ignoring label toggle on unknown card {}", card_id);
                return Ok(MutationOutcome::Skipped);
            }
        };

        let ticket = self
            .propose_local("toggle label on", card_id, |s| {
                s.with_label(card_id, label_id, present)
            })
            .await;
        match self.gateway.set_card_label(card_id, label_id, present).await {
            Ok(()) => Ok(self.confirm_remote(ticket).await),
            Err(err) => Ok(self.reconcile_on_failure(ticket, &err).await),
        }
    }

    /// Move the card at `source` to `destination`. `None` means the card was
    /// dropped outside every column.
    pub async fn move_card(
        &self,
        source: &DropSlot,
        destination: Option<&DropSlot>,
    ) -> Result<MoveOutcome> {
        self.ensure_live()?;
        let snapshot = self.snapshot().await;
        let decision = plan_move(&snapshot, source, destination);
        self.commit_move(decision).await
    }

    /// Finish a drag gesture started against the current board.
    pub async fn drop_card(
        &self,
        gesture: &mut DragGesture,
        destination: Option<DropSlot>,
    ) -> Result<MoveOutcome> {
        self.ensure_live()?;
        let snapshot = self.snapshot().await;
        let decision = gesture.end(&snapshot, destination);
        self.commit_move(decision).await
    }

    async fn commit_move(&self, decision: MoveDecision) -> Result<MoveOutcome> {
        let plan = match decision {
            MoveDecision::Cancelled => return Ok(MoveOutcome::Cancelled),
            MoveDecision::Abandoned(reason) => {
                log_warn!("Abandoning move: {:?}", reason);
                return Ok(MoveOutcome::Abandoned(reason));
            }
            MoveDecision::Planned(plan) => plan,
        };

        let ticket = self
            .propose_local("move card", &plan.card_id, |s| plan.apply(s))
            .await;

        for write in &plan.writes {
            let result = self
                .gateway
                .move_card(
                    &write.card_id,
                    &write.from_column_id,
                    &write.to_column_id,
                    write.position,
                )
                .await;
            if let Err(err) = result {
                log_error!(
                    "Position write for card {} into column {} failed",
                    write.card_id,
                    write.to_column_id
                );
                return Ok(match self.reconcile_on_failure(ticket, &err).await {
                    MutationOutcome::Discarded => MoveOutcome::Discarded,
                    _ => MoveOutcome::Reconciled,
                });
            }
        }

        Ok(match self.confirm_remote(ticket).await {
            MutationOutcome::Discarded => MoveOutcome::Discarded,
            _ => MoveOutcome::Committed(plan),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{repositories::test_support::seeded_team, Database};
    use tempfile::TempDir;

    async fn store_with_team() -> (TempDir, Database, BoardStore, Vec<String>) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("board.sqlite3")).unwrap();
        let seeded = seeded_team(&db).await;
        let store = BoardStore::new(Arc::new(db.clone()));
        store.load(&seeded.team.id).await.unwrap();
        (dir, db, store, seeded.columns)
    }

    #[tokio::test]
    async fn add_card_lands_last_with_defaults() {
        let (_dir, db, store, columns) = store_with_team().await;
        let todo = &columns[0];

        store.add_card(todo, "First").await.unwrap();
        let outcome = store.add_card(todo, "  X  ").await.unwrap();
        assert_eq!(outcome, MutationOutcome::Applied);

        let local = store.snapshot().await;
        let local_card = &local.column(todo).unwrap().cards[1];
        assert_eq!(local_card.title, "X");

        let team_id = local.team_id.clone().unwrap();
        let remote = db.fetch_board(&team_id).await.unwrap();
        let card = remote.columns[0].cards.last().unwrap();
        assert_eq!(card.title, "X");
        assert_eq!(card.priority, Priority::None);
        assert!(card.labels.is_empty());
        assert_eq!(card.position, 1);
        assert_eq!(card.id, local_card.id);
    }

    #[tokio::test]
    async fn blank_titles_never_reach_the_gateway() {
        let (_dir, _db, store, columns) = store_with_team().await;
        let before = store.snapshot().await;

        assert_eq!(
            store.add_card(&columns[0], "   ").await.unwrap(),
            MutationOutcome::Skipped
        );
        assert!(Arc::ptr_eq(&before, &store.snapshot().await));
    }

    #[tokio::test]
    async fn failed_write_reloads_backend_state() {
        let (_dir, db, store, columns) = store_with_team().await;
        store.add_card(&columns[0], "Doomed").await.unwrap();
        let card_id = store.snapshot().await.card_ids(&columns[0])[0].clone();

        // Removed behind the store's back; the local copy is now stale.
        db.delete_card(&card_id).await.unwrap();

        let outcome = store
            .update_card(&card_id, CardPatch::title("Renamed"))
            .await
            .unwrap();
        assert_eq!(outcome, MutationOutcome::Reconciled);
        assert!(store.snapshot().await.card(&card_id).is_none());
        assert_eq!(store.pending_count().await, 0);
    }

    #[tokio::test]
    async fn move_onto_own_slot_keeps_the_snapshot() {
        let (_dir, _db, store, columns) = store_with_team().await;
        store.add_card(&columns[0], "Only").await.unwrap();
        let before = store.snapshot().await;

        let slot = DropSlot::new(columns[0].clone(), 0);
        let outcome = store.move_card(&slot, Some(&slot)).await.unwrap();
        assert_eq!(outcome, MoveOutcome::Cancelled);
        assert!(Arc::ptr_eq(&before, &store.snapshot().await));
    }

    #[tokio::test]
    async fn teardown_rejects_mutations_and_drops_state() {
        let (_dir, _db, store, columns) = store_with_team().await;
        store.teardown().await;

        assert!(store.is_torn_down());
        assert!(store.add_card(&columns[0], "Late").await.is_err());
        assert_eq!(store.snapshot().await.columns.len(), 0);
    }

    #[tokio::test]
    async fn load_is_not_reported_once_finished() {
        let (_dir, _db, store, _columns) = store_with_team().await;
        assert!(!store.is_loading());
        assert_eq!(store.snapshot().await.columns.len(), 3);
    }
}
