use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::QueryAs;
use sqlx::{PgConnection, PgPool, Postgres};

use super::{
    ChatStore, Datastore, LikeOutcome, MatchStore, ProfileStore, RespondOutcome, StoreError,
    StoreResult,
};
use crate::core::{plan_like, plan_respond, LikeTransition, RespondTransition};
use crate::models::{
    BoundingBox, ChatRoom, MatchEdge, MatchId, MatchStatus, Message, NewMessage, NewProfile,
    Profile, RoomId, UserId, UserPair,
};

const PROFILE_COLUMNS: &str = "user_id, user_name, user_avatar, user_gender, pet_name, pet_breed, \
     pet_age, pet_gender, pet_photo, bio, activity_level, latitude, longitude, location";

/// PostgreSQL-backed store
///
/// Pair-scoped transitions take a transaction-level advisory lock keyed by
/// the normalized pair, so concurrent likes between the same two users
/// serialize while unrelated pairs proceed in parallel.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect, then run the embedded migrations
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> StoreResult<Self> {
        tracing::info!(
            max_connections = max_connections.unwrap_or(10),
            "Connecting to PostgreSQL"
        );

        Self::connect(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    async fn lock_pair(conn: &mut PgConnection, pair: UserPair) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(pair.lock_key())
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn edge_between(
        conn: &mut PgConnection,
        from: UserId,
        to: UserId,
    ) -> Result<Option<MatchEdge>, sqlx::Error> {
        sqlx::query_as::<_, MatchEdge>(
            "SELECT * FROM match_edges WHERE from_user_id = $1 AND to_user_id = $2",
        )
        .bind(from)
        .bind(to)
        .fetch_optional(conn)
        .await
    }

    async fn insert_edge(
        conn: &mut PgConnection,
        from: UserId,
        to: UserId,
        status: MatchStatus,
        score: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<MatchEdge, sqlx::Error> {
        let matched_at = (status == MatchStatus::Matched).then_some(now);
        sqlx::query_as::<_, MatchEdge>(
            r#"
            INSERT INTO match_edges (from_user_id, to_user_id, status, score, created_at, matched_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (from_user_id, to_user_id)
            DO UPDATE SET
                status = EXCLUDED.status,
                matched_at = COALESCE(EXCLUDED.matched_at, match_edges.matched_at)
            RETURNING *
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(status)
        .bind(score)
        .bind(now)
        .bind(matched_at)
        .fetch_one(conn)
        .await
    }

    async fn set_status(
        conn: &mut PgConnection,
        match_id: MatchId,
        status: MatchStatus,
        now: DateTime<Utc>,
    ) -> Result<MatchEdge, sqlx::Error> {
        let matched_at = (status == MatchStatus::Matched).then_some(now);
        sqlx::query_as::<_, MatchEdge>(
            r#"
            UPDATE match_edges
            SET status = $2, matched_at = COALESCE($3, matched_at)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(match_id)
        .bind(status)
        .bind(matched_at)
        .fetch_one(conn)
        .await
    }
}

fn bind_profile<'q>(
    query: QueryAs<'q, Postgres, Profile, PgArguments>,
    profile: &'q NewProfile,
) -> QueryAs<'q, Postgres, Profile, PgArguments> {
    query
        .bind(profile.user_id)
        .bind(profile.user_name.as_str())
        .bind(profile.user_avatar.as_deref())
        .bind(profile.user_gender)
        .bind(profile.pet_name.as_str())
        .bind(profile.pet_breed.as_str())
        .bind(profile.pet_age)
        .bind(profile.pet_gender.as_deref())
        .bind(profile.pet_photo.as_deref())
        .bind(profile.bio.as_deref())
        .bind(profile.activity_level)
        .bind(profile.latitude)
        .bind(profile.longitude)
        .bind(profile.location.as_deref())
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn get_profile(&self, user_id: UserId) -> StoreResult<Option<Profile>> {
        Ok(
            sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_profiles(&self, user_ids: &[UserId]) -> StoreResult<Vec<Profile>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(
            sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = ANY($1)")
                .bind(user_ids)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn insert_profile_if_absent(&self, profile: &NewProfile) -> StoreResult<Profile> {
        let insert = format!(
            "INSERT INTO profiles ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (user_id) DO NOTHING RETURNING *",
            PROFILE_COLUMNS
        );
        let inserted = bind_profile(sqlx::query_as::<_, Profile>(&insert), profile)
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(row) => Ok(row),
            None => self
                .get_profile(profile.user_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("profile {}", profile.user_id))),
        }
    }

    async fn upsert_profile(&self, profile: &NewProfile) -> StoreResult<Profile> {
        let upsert = format!(
            r#"
            INSERT INTO profiles ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (user_id) DO UPDATE SET
                user_name = EXCLUDED.user_name,
                user_avatar = EXCLUDED.user_avatar,
                user_gender = EXCLUDED.user_gender,
                pet_name = EXCLUDED.pet_name,
                pet_breed = EXCLUDED.pet_breed,
                pet_age = EXCLUDED.pet_age,
                pet_gender = EXCLUDED.pet_gender,
                pet_photo = EXCLUDED.pet_photo,
                bio = EXCLUDED.bio,
                activity_level = EXCLUDED.activity_level,
                latitude = COALESCE(EXCLUDED.latitude, profiles.latitude),
                longitude = COALESCE(EXCLUDED.longitude, profiles.longitude),
                location = COALESCE(EXCLUDED.location, profiles.location),
                updated_at = NOW()
            RETURNING *
            "#,
            PROFILE_COLUMNS
        );

        Ok(bind_profile(sqlx::query_as::<_, Profile>(&upsert), profile)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn profiles_in_box(
        &self,
        bbox: &BoundingBox,
        exclude: UserId,
    ) -> StoreResult<Vec<Profile>> {
        let query = r#"
            SELECT * FROM profiles
            WHERE is_active = TRUE
              AND user_id <> $1
              AND latitude BETWEEN $2 AND $3
              AND CASE WHEN $4 <= $5
                       THEN longitude BETWEEN $4 AND $5
                       ELSE longitude >= $4 OR longitude <= $5
                  END
        "#;

        Ok(sqlx::query_as::<_, Profile>(query)
            .bind(exclude)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lon)
            .bind(bbox.max_lon)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn active_profiles(&self, exclude: UserId) -> StoreResult<Vec<Profile>> {
        Ok(sqlx::query_as::<_, Profile>(
            "SELECT * FROM profiles WHERE is_active = TRUE AND user_id <> $1 ORDER BY id",
        )
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_online(&self, user_id: UserId, is_online: bool) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET is_online = $2, last_active_at = NOW(), updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(is_online)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_location(
        &self,
        user_id: UserId,
        latitude: f64,
        longitude: f64,
        location: Option<&str>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET latitude = $2, longitude = $3, location = COALESCE($4, location), updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(latitude)
        .bind(longitude)
        .bind(location)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MatchStore for PgStore {
    async fn get_edge(&self, match_id: MatchId) -> StoreResult<Option<MatchEdge>> {
        Ok(
            sqlx::query_as::<_, MatchEdge>("SELECT * FROM match_edges WHERE id = $1")
                .bind(match_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_edge(&self, from: UserId, to: UserId) -> StoreResult<Option<MatchEdge>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Self::edge_between(&mut conn, from, to).await?)
    }

    async fn apply_like(&self, from: UserId, to: UserId, score: i32) -> StoreResult<LikeOutcome> {
        let pair = UserPair::new(from, to)
            .ok_or_else(|| StoreError::InvalidInput("cannot like yourself".to_string()))?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        Self::lock_pair(&mut tx, pair).await?;

        let forward = Self::edge_between(&mut tx, from, to).await?;
        let mirror = Self::edge_between(&mut tx, to, from).await?;

        let outcome = match (plan_like(forward.as_ref(), mirror.as_ref()), forward) {
            (LikeTransition::AlreadyLiked { .. }, Some(existing)) => {
                LikeOutcome::AlreadyLiked(existing)
            }
            (LikeTransition::Match { mirror }, _) => {
                Self::set_status(&mut tx, mirror, MatchStatus::Matched, now).await?;
                let edge =
                    Self::insert_edge(&mut tx, from, to, MatchStatus::Matched, Some(score), now)
                        .await?;
                LikeOutcome::Matched(edge)
            }
            _ => {
                let edge =
                    Self::insert_edge(&mut tx, from, to, MatchStatus::Pending, Some(score), now)
                        .await?;
                LikeOutcome::Pending(edge)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn apply_response(
        &self,
        match_id: MatchId,
        responder: UserId,
        accept: bool,
    ) -> StoreResult<RespondOutcome> {
        let edge = self
            .get_edge(match_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("match {}", match_id)))?;
        let pair = UserPair::new(edge.from_user_id, edge.to_user_id)
            .ok_or_else(|| StoreError::InvalidInput(format!("match {} is a self edge", match_id)))?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        Self::lock_pair(&mut tx, pair).await?;

        // Re-read under the lock; the edge may have moved since the first lookup
        let edge = sqlx::query_as::<_, MatchEdge>("SELECT * FROM match_edges WHERE id = $1")
            .bind(match_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("match {}", match_id)))?;
        let mirror = Self::edge_between(&mut tx, edge.to_user_id, edge.from_user_id).await?;

        let outcome = match plan_respond(&edge, responder, accept, mirror.as_ref()) {
            Err(refusal) => RespondOutcome::Refused(refusal),
            Ok(RespondTransition::Accept { mirror }) => {
                let updated = Self::set_status(&mut tx, match_id, MatchStatus::Matched, now).await?;
                match mirror {
                    Some(mirror_id) => {
                        Self::set_status(&mut tx, mirror_id, MatchStatus::Matched, now).await?;
                    }
                    None => {
                        Self::insert_edge(
                            &mut tx,
                            edge.to_user_id,
                            edge.from_user_id,
                            MatchStatus::Matched,
                            edge.score,
                            now,
                        )
                        .await?;
                    }
                }
                RespondOutcome::Accepted(updated)
            }
            Ok(RespondTransition::Reject) => {
                let updated =
                    Self::set_status(&mut tx, match_id, MatchStatus::Rejected, now).await?;
                RespondOutcome::Rejected(updated)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn delete_pending(&self, from: UserId, to: UserId) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM match_edges
            WHERE from_user_id = $1 AND to_user_id = $2 AND status = 'PENDING'
            "#,
        )
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_matched(&self, pair: UserPair) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM match_edges
            WHERE status = 'MATCHED'
              AND ((from_user_id = $1 AND to_user_id = $2)
                OR (from_user_id = $2 AND to_user_id = $1))
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn edges_from(
        &self,
        user_id: UserId,
        status: Option<MatchStatus>,
    ) -> StoreResult<Vec<MatchEdge>> {
        Ok(sqlx::query_as::<_, MatchEdge>(
            r#"
            SELECT * FROM match_edges
            WHERE from_user_id = $1 AND ($2::match_status IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn edges_to(
        &self,
        user_id: UserId,
        status: Option<MatchStatus>,
    ) -> StoreResult<Vec<MatchEdge>> {
        Ok(sqlx::query_as::<_, MatchEdge>(
            r#"
            SELECT * FROM match_edges
            WHERE to_user_id = $1 AND ($2::match_status IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count_edges_to(&self, user_id: UserId, status: MatchStatus) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM match_edges WHERE to_user_id = $1 AND status = $2",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?)
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn get_or_create_room(&self, pair: UserPair) -> StoreResult<ChatRoom> {
        Ok(sqlx::query_as::<_, ChatRoom>(
            r#"
            INSERT INTO chat_rooms (user_low, user_high)
            VALUES ($1, $2)
            ON CONFLICT (user_low, user_high)
            DO UPDATE SET is_active = TRUE
            RETURNING *
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<ChatRoom>> {
        Ok(
            sqlx::query_as::<_, ChatRoom>("SELECT * FROM chat_rooms WHERE id = $1")
                .bind(room_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_room(&self, pair: UserPair) -> StoreResult<Option<ChatRoom>> {
        Ok(sqlx::query_as::<_, ChatRoom>(
            "SELECT * FROM chat_rooms WHERE user_low = $1 AND user_high = $2",
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn rooms_for_user(
        &self,
        user_id: UserId,
        active_only: bool,
    ) -> StoreResult<Vec<ChatRoom>> {
        Ok(sqlx::query_as::<_, ChatRoom>(
            r#"
            SELECT * FROM chat_rooms
            WHERE (user_low = $1 OR user_high = $1)
              AND ($2 = FALSE OR is_active = TRUE)
            ORDER BY COALESCE(last_message_at, created_at) DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_room_active(&self, room_id: RoomId, is_active: bool) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE chat_rooms SET is_active = $2 WHERE id = $1")
            .bind(room_id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_message(&self, message: &NewMessage) -> StoreResult<Message> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the room serializes writers and pins the ordering floor
        let last_message_at: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(
            "SELECT last_message_at FROM chat_rooms WHERE id = $1 FOR UPDATE",
        )
        .bind(message.room_id)
        .fetch_optional(&mut *tx)
        .await?;
        let last_message_at = last_message_at
            .ok_or_else(|| StoreError::NotFound(format!("chat room {}", message.room_id)))?;

        let now = Utc::now();
        let created_at = match last_message_at {
            Some(last) if last > now => last,
            _ => now,
        };

        let stored = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (room_id, sender_id, content, message_type, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(message.room_id)
        .bind(message.sender_id)
        .bind(message.content.as_str())
        .bind(message.message_type)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_rooms SET last_message = $2, last_message_at = $3 WHERE id = $1")
            .bind(message.room_id)
            .bind(message.preview.as_str())
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn messages(&self, room_id: RoomId, limit: Option<u32>) -> StoreResult<Vec<Message>> {
        // LIMIT NULL means no limit
        let query = r#"
            SELECT * FROM (
                SELECT * FROM messages
                WHERE room_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2
            ) recent
            ORDER BY created_at ASC, id ASC
        "#;

        Ok(sqlx::query_as::<_, Message>(query)
            .bind(room_id)
            .bind(limit.map(i64::from))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn mark_read(&self, room_id: RoomId, reader: UserId) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = NOW()
            WHERE room_id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(room_id)
        .bind(reader)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn unread_count(&self, room_id: RoomId, reader: UserId) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE room_id = $1 AND is_read = FALSE AND sender_id <> $2
            "#,
        )
        .bind(room_id)
        .bind(reader)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn total_unread(&self, reader: UserId) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages m
            JOIN chat_rooms r ON r.id = m.room_id
            WHERE r.is_active = TRUE
              AND (r.user_low = $1 OR r.user_high = $1)
              AND m.is_read = FALSE
              AND m.sender_id <> $1
            "#,
        )
        .bind(reader)
        .fetch_one(&self.pool)
        .await?)
    }
}

#[async_trait]
impl Datastore for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
