//! Persistence interfaces for profiles, match edges and chat rooms.
//!
//! Two implementations ship with the service: [`PgStore`] backed by Postgres,
//! and [`MemoryStore`] for local runs and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::RespondRefusal;
use crate::models::{
    BoundingBox, ChatRoom, MatchEdge, MatchId, MatchStatus, Message, NewMessage, NewProfile,
    Profile, RoomId, UserId, UserPair,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur when talking to the backing store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store lock poisoned: {0}")]
    Poisoned(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of applying a like inside the pair-scoped unit of work
#[derive(Debug, Clone)]
pub enum LikeOutcome {
    AlreadyLiked(MatchEdge),
    Pending(MatchEdge),
    /// Carries the freshly written edge; the mirror was flipped in the same unit
    Matched(MatchEdge),
}

/// Result of answering a pending request
#[derive(Debug, Clone)]
pub enum RespondOutcome {
    Accepted(MatchEdge),
    Rejected(MatchEdge),
    Refused(RespondRefusal),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: UserId) -> StoreResult<Option<Profile>>;

    async fn get_profiles(&self, user_ids: &[UserId]) -> StoreResult<Vec<Profile>>;

    /// Insert the row unless one exists for the user; returns the stored row either way
    async fn insert_profile_if_absent(&self, profile: &NewProfile) -> StoreResult<Profile>;

    /// Create or overwrite the editable fields. Missing coordinates keep the stored ones.
    async fn upsert_profile(&self, profile: &NewProfile) -> StoreResult<Profile>;

    /// Active profiles with coordinates inside the box, excluding `exclude`
    async fn profiles_in_box(
        &self,
        bbox: &BoundingBox,
        exclude: UserId,
    ) -> StoreResult<Vec<Profile>>;

    /// All active profiles, excluding `exclude`
    async fn active_profiles(&self, exclude: UserId) -> StoreResult<Vec<Profile>>;

    async fn set_online(&self, user_id: UserId, is_online: bool) -> StoreResult<bool>;

    async fn set_location(
        &self,
        user_id: UserId,
        latitude: f64,
        longitude: f64,
        location: Option<&str>,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn get_edge(&self, match_id: MatchId) -> StoreResult<Option<MatchEdge>>;

    async fn find_edge(&self, from: UserId, to: UserId) -> StoreResult<Option<MatchEdge>>;

    /// Run the like transition for (from, to) under the pair lock
    async fn apply_like(&self, from: UserId, to: UserId, score: i32) -> StoreResult<LikeOutcome>;

    /// Run the response transition for an edge under the pair lock
    ///
    /// Fails with `StoreError::NotFound` when the edge does not exist.
    async fn apply_response(
        &self,
        match_id: MatchId,
        responder: UserId,
        accept: bool,
    ) -> StoreResult<RespondOutcome>;

    /// Delete the edge from -> to only while it is PENDING
    async fn delete_pending(&self, from: UserId, to: UserId) -> StoreResult<bool>;

    /// Delete the MATCHED edges of a pair in both directions
    async fn delete_matched(&self, pair: UserPair) -> StoreResult<u64>;

    /// Edges leaving `user_id`, optionally restricted to one status
    async fn edges_from(
        &self,
        user_id: UserId,
        status: Option<MatchStatus>,
    ) -> StoreResult<Vec<MatchEdge>>;

    /// Edges arriving at `user_id`, optionally restricted to one status
    async fn edges_to(
        &self,
        user_id: UserId,
        status: Option<MatchStatus>,
    ) -> StoreResult<Vec<MatchEdge>>;

    async fn count_edges_to(&self, user_id: UserId, status: MatchStatus) -> StoreResult<i64>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Insert-or-fetch the room of a pair; an inactive room is reopened
    async fn get_or_create_room(&self, pair: UserPair) -> StoreResult<ChatRoom>;

    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<ChatRoom>>;

    async fn find_room(&self, pair: UserPair) -> StoreResult<Option<ChatRoom>>;

    async fn rooms_for_user(&self, user_id: UserId, active_only: bool)
        -> StoreResult<Vec<ChatRoom>>;

    async fn set_room_active(&self, room_id: RoomId, is_active: bool) -> StoreResult<bool>;

    /// Append a message and refresh the room snapshot in one unit of work
    ///
    /// `created_at` never goes below the room's `last_message_at`.
    async fn append_message(&self, message: &NewMessage) -> StoreResult<Message>;

    /// Messages ordered by (created_at, id); with a limit, only the newest ones
    async fn messages(&self, room_id: RoomId, limit: Option<u32>) -> StoreResult<Vec<Message>>;

    /// Mark everything in the room not sent by `reader` as read
    async fn mark_read(&self, room_id: RoomId, reader: UserId) -> StoreResult<u64>;

    async fn unread_count(&self, room_id: RoomId, reader: UserId) -> StoreResult<i64>;

    /// Unread messages across the reader's active rooms
    async fn total_unread(&self, reader: UserId) -> StoreResult<i64>;
}

/// Everything the services need from persistence
#[async_trait]
pub trait Datastore: ProfileStore + MatchStore + ChatStore {
    async fn health_check(&self) -> StoreResult<()>;
}
