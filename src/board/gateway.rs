use async_trait::async_trait;

use crate::db::{BoardData, Card, CardPatch, Database};
use crate::error::{GatewayError, GatewayResult};

/// Persistence contract the board store talks to.
///
/// `fetch_board` returns columns and cards ordered by position, with dense
/// per-column positions. `update_card` cannot move a card; `move_card` is the
/// only operation that reassigns column membership and position. A failed call
/// leaves nothing half-written that the caller can observe.
#[async_trait]
pub trait BoardGateway: Send + Sync {
    async fn fetch_board(&self, team_id: &str) -> GatewayResult<BoardData>;

    async fn create_card(&self, column_id: &str, title: &str) -> GatewayResult<Card>;

    async fn update_card(&self, card_id: &str, patch: &CardPatch) -> GatewayResult<Card>;

    async fn delete_card(&self, card_id: &str) -> GatewayResult<()>;

    async fn move_card(
        &self,
        card_id: &str,
        from_column_id: &str,
        to_column_id: &str,
        new_position: i64,
    ) -> GatewayResult<()>;

    async fn set_card_label(&self, card_id: &str, label_id: &str, present: bool)
        -> GatewayResult<()>;
}

#[async_trait]
impl BoardGateway for Database {
    async fn fetch_board(&self, team_id: &str) -> GatewayResult<BoardData> {
        Database::fetch_board(self, team_id)
            .await
            .map_err(GatewayError::from_storage)
    }

    async fn create_card(&self, column_id: &str, title: &str) -> GatewayResult<Card> {
        self.insert_card(column_id, title.to_string())
            .await
            .map_err(GatewayError::from_storage)
    }

    async fn update_card(&self, card_id: &str, patch: &CardPatch) -> GatewayResult<Card> {
        Database::update_card(self, card_id, patch.clone())
            .await
            .map_err(GatewayError::from_storage)
    }

    async fn delete_card(&self, card_id: &str) -> GatewayResult<()> {
        Database::delete_card(self, card_id)
            .await
            .map_err(GatewayError::from_storage)
    }

    async fn move_card(
        &self,
        card_id: &str,
        from_column_id: &str,
        to_column_id: &str,
        new_position: i64,
    ) -> GatewayResult<()> {
        Database::move_card(self, card_id, from_column_id, to_column_id, new_position)
            .await
            .map_err(GatewayError::from_storage)
    }

    async fn set_card_label(
        &self,
        card_id: &str,
        label_id: &str,
        present: bool,
    ) -> GatewayResult<()> {
        Database::set_card_label(self, card_id, label_id, present)
            .await
            .map_err(GatewayError::from_storage)
    }
}
