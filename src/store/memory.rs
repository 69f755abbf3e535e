use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    ChatStore, Datastore, LikeOutcome, MatchStore, ProfileStore, RespondOutcome, StoreError,
    StoreResult,
};
use crate::core::{is_within_bounding_box, plan_like, plan_respond, LikeTransition, RespondTransition};
use crate::models::{
    BoundingBox, ChatRoom, MatchEdge, MatchId, MatchStatus, Message, NewMessage, NewProfile,
    Profile, RoomId, UserId, UserPair,
};

#[derive(Debug, Default)]
struct Tables {
    profiles: HashMap<UserId, Profile>,
    edges: BTreeMap<MatchId, MatchEdge>,
    rooms: BTreeMap<RoomId, ChatRoom>,
    messages: Vec<Message>,
    next_profile_id: i64,
    next_edge_id: MatchId,
    next_room_id: RoomId,
    next_message_id: i64,
}

impl Tables {
    fn find_edge(&self, from: UserId, to: UserId) -> Option<&MatchEdge> {
        self.edges
            .values()
            .find(|e| e.from_user_id == from && e.to_user_id == to)
    }

    fn insert_edge(
        &mut self,
        from: UserId,
        to: UserId,
        status: MatchStatus,
        score: Option<i32>,
        now: DateTime<Utc>,
    ) -> MatchEdge {
        self.next_edge_id += 1;
        let edge = MatchEdge {
            id: self.next_edge_id,
            from_user_id: from,
            to_user_id: to,
            status,
            score,
            created_at: now,
            matched_at: (status == MatchStatus::Matched).then_some(now),
        };
        self.edges.insert(edge.id, edge.clone());
        edge
    }

    fn set_status(
        &mut self,
        match_id: MatchId,
        status: MatchStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<MatchEdge> {
        let edge = self
            .edges
            .get_mut(&match_id)
            .ok_or_else(|| StoreError::NotFound(format!("match {}", match_id)))?;
        edge.status = status;
        if status == MatchStatus::Matched {
            edge.matched_at = Some(now);
        }
        Ok(edge.clone())
    }

    fn insert_profile(&mut self, new: &NewProfile, now: DateTime<Utc>) -> Profile {
        self.next_profile_id += 1;
        let profile = Profile {
            id: self.next_profile_id,
            user_id: new.user_id,
            user_name: new.user_name.clone(),
            user_avatar: new.user_avatar.clone(),
            user_gender: new.user_gender,
            pet_name: new.pet_name.clone(),
            pet_breed: new.pet_breed.clone(),
            pet_age: new.pet_age,
            pet_gender: new.pet_gender.clone(),
            pet_photo: new.pet_photo.clone(),
            bio: new.bio.clone(),
            activity_level: new.activity_level,
            latitude: new.latitude,
            longitude: new.longitude,
            location: new.location.clone(),
            is_online: false,
            is_active: true,
            last_active_at: None,
            created_at: now,
            updated_at: now,
        };
        self.profiles.insert(new.user_id, profile.clone());
        profile
    }

    fn unread_in(&self, room_id: RoomId, reader: UserId) -> i64 {
        self.messages
            .iter()
            .filter(|m| m.room_id == room_id && !m.is_read && m.sender_id != reader)
            .count() as i64
    }
}

/// In-memory store guarded by a single lock
///
/// Every pair-scoped transition runs under the write lock, which makes it
/// trivially serializable. Used for local runs (`memory://`) and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Poisoned("failed to acquire read lock".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Poisoned("failed to acquire write lock".to_string()))
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, user_id: UserId) -> StoreResult<Option<Profile>> {
        Ok(self.read()?.profiles.get(&user_id).cloned())
    }

    async fn get_profiles(&self, user_ids: &[UserId]) -> StoreResult<Vec<Profile>> {
        let tables = self.read()?;
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).cloned())
            .collect())
    }

    async fn insert_profile_if_absent(&self, profile: &NewProfile) -> StoreResult<Profile> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.profiles.get(&profile.user_id) {
            return Ok(existing.clone());
        }
        Ok(tables.insert_profile(profile, Utc::now()))
    }

    async fn upsert_profile(&self, profile: &NewProfile) -> StoreResult<Profile> {
        let now = Utc::now();
        let mut tables = self.write()?;
        match tables.profiles.get_mut(&profile.user_id) {
            Some(row) => {
                row.user_name = profile.user_name.clone();
                row.user_avatar = profile.user_avatar.clone();
                row.user_gender = profile.user_gender;
                row.pet_name = profile.pet_name.clone();
                row.pet_breed = profile.pet_breed.clone();
                row.pet_age = profile.pet_age;
                row.pet_gender = profile.pet_gender.clone();
                row.pet_photo = profile.pet_photo.clone();
                row.bio = profile.bio.clone();
                row.activity_level = profile.activity_level;
                if profile.latitude.is_some() {
                    row.latitude = profile.latitude;
                }
                if profile.longitude.is_some() {
                    row.longitude = profile.longitude;
                }
                if profile.location.is_some() {
                    row.location = profile.location.clone();
                }
                row.updated_at = now;
                Ok(row.clone())
            }
            None => Ok(tables.insert_profile(profile, now)),
        }
    }

    async fn profiles_in_box(
        &self,
        bbox: &BoundingBox,
        exclude: UserId,
    ) -> StoreResult<Vec<Profile>> {
        let tables = self.read()?;
        Ok(tables
            .profiles
            .values()
            .filter(|p| p.is_active && p.user_id != exclude)
            .filter(|p| match p.coordinates() {
                Some((lat, lon)) => is_within_bounding_box(lat, lon, bbox),
                None => false,
            })
            .cloned()
            .collect())
    }

    async fn active_profiles(&self, exclude: UserId) -> StoreResult<Vec<Profile>> {
        let tables = self.read()?;
        Ok(tables
            .profiles
            .values()
            .filter(|p| p.is_active && p.user_id != exclude)
            .cloned()
            .collect())
    }

    async fn set_online(&self, user_id: UserId, is_online: bool) -> StoreResult<bool> {
        let now = Utc::now();
        let mut tables = self.write()?;
        Ok(match tables.profiles.get_mut(&user_id) {
            Some(row) => {
                row.is_online = is_online;
                row.last_active_at = Some(now);
                row.updated_at = now;
                true
            }
            None => false,
        })
    }

    async fn set_location(
        &self,
        user_id: UserId,
        latitude: f64,
        longitude: f64,
        location: Option<&str>,
    ) -> StoreResult<bool> {
        let now = Utc::now();
        let mut tables = self.write()?;
        Ok(match tables.profiles.get_mut(&user_id) {
            Some(row) => {
                row.latitude = Some(latitude);
                row.longitude = Some(longitude);
                if let Some(label) = location {
                    row.location = Some(label.to_string());
                }
                row.updated_at = now;
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn get_edge(&self, match_id: MatchId) -> StoreResult<Option<MatchEdge>> {
        Ok(self.read()?.edges.get(&match_id).cloned())
    }

    async fn find_edge(&self, from: UserId, to: UserId) -> StoreResult<Option<MatchEdge>> {
        Ok(self.read()?.find_edge(from, to).cloned())
    }

    async fn apply_like(&self, from: UserId, to: UserId, score: i32) -> StoreResult<LikeOutcome> {
        if from == to {
            return Err(StoreError::InvalidInput("cannot like yourself".to_string()));
        }
        let now = Utc::now();
        let mut tables = self.write()?;

        let forward = tables.find_edge(from, to).cloned();
        let mirror = tables.find_edge(to, from).cloned();

        match plan_like(forward.as_ref(), mirror.as_ref()) {
            LikeTransition::AlreadyLiked { existing } => tables
                .edges
                .get(&existing)
                .cloned()
                .map(LikeOutcome::AlreadyLiked)
                .ok_or_else(|| StoreError::NotFound(format!("match {}", existing))),
            LikeTransition::Match { mirror } => {
                tables.set_status(mirror, MatchStatus::Matched, now)?;
                let edge = tables.insert_edge(from, to, MatchStatus::Matched, Some(score), now);
                Ok(LikeOutcome::Matched(edge))
            }
            LikeTransition::Pending => {
                let edge = tables.insert_edge(from, to, MatchStatus::Pending, Some(score), now);
                Ok(LikeOutcome::Pending(edge))
            }
        }
    }

    async fn apply_response(
        &self,
        match_id: MatchId,
        responder: UserId,
        accept: bool,
    ) -> StoreResult<RespondOutcome> {
        let now = Utc::now();
        let mut tables = self.write()?;

        let edge = tables
            .edges
            .get(&match_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("match {}", match_id)))?;
        let mirror = tables.find_edge(edge.to_user_id, edge.from_user_id).cloned();

        match plan_respond(&edge, responder, accept, mirror.as_ref()) {
            Err(refusal) => Ok(RespondOutcome::Refused(refusal)),
            Ok(RespondTransition::Accept { mirror }) => {
                let updated = tables.set_status(match_id, MatchStatus::Matched, now)?;
                match mirror {
                    Some(mirror_id) => {
                        tables.set_status(mirror_id, MatchStatus::Matched, now)?;
                    }
                    None => {
                        tables.insert_edge(
                            edge.to_user_id,
                            edge.from_user_id,
                            MatchStatus::Matched,
                            edge.score,
                            now,
                        );
                    }
                }
                Ok(RespondOutcome::Accepted(updated))
            }
            Ok(RespondTransition::Reject) => {
                let updated = tables.set_status(match_id, MatchStatus::Rejected, now)?;
                Ok(RespondOutcome::Rejected(updated))
            }
        }
    }

    async fn delete_pending(&self, from: UserId, to: UserId) -> StoreResult<bool> {
        let mut tables = self.write()?;
        let pending = tables
            .find_edge(from, to)
            .filter(|e| e.status == MatchStatus::Pending)
            .map(|e| e.id);
        Ok(match pending {
            Some(id) => tables.edges.remove(&id).is_some(),
            None => false,
        })
    }

    async fn delete_matched(&self, pair: UserPair) -> StoreResult<u64> {
        let mut tables = self.write()?;
        let before = tables.edges.len();
        tables.edges.retain(|_, e| {
            let in_pair = UserPair::new(e.from_user_id, e.to_user_id) == Some(pair);
            !(in_pair && e.status == MatchStatus::Matched)
        });
        Ok((before - tables.edges.len()) as u64)
    }

    async fn edges_from(
        &self,
        user_id: UserId,
        status: Option<MatchStatus>,
    ) -> StoreResult<Vec<MatchEdge>> {
        let tables = self.read()?;
        let mut edges: Vec<MatchEdge> = tables
            .edges
            .values()
            .filter(|e| e.from_user_id == user_id && status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(edges)
    }

    async fn edges_to(
        &self,
        user_id: UserId,
        status: Option<MatchStatus>,
    ) -> StoreResult<Vec<MatchEdge>> {
        let tables = self.read()?;
        let mut edges: Vec<MatchEdge> = tables
            .edges
            .values()
            .filter(|e| e.to_user_id == user_id && status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(edges)
    }

    async fn count_edges_to(&self, user_id: UserId, status: MatchStatus) -> StoreResult<i64> {
        let tables = self.read()?;
        Ok(tables
            .edges
            .values()
            .filter(|e| e.to_user_id == user_id && e.status == status)
            .count() as i64)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn get_or_create_room(&self, pair: UserPair) -> StoreResult<ChatRoom> {
        let mut tables = self.write()?;
        if let Some(room) = tables
            .rooms
            .values_mut()
            .find(|r| r.user_low == pair.low() && r.user_high == pair.high())
        {
            room.is_active = true;
            return Ok(room.clone());
        }

        tables.next_room_id += 1;
        let room = ChatRoom {
            id: tables.next_room_id,
            user_low: pair.low(),
            user_high: pair.high(),
            is_active: true,
            last_message: None,
            last_message_at: None,
            created_at: Utc::now(),
        };
        tables.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<ChatRoom>> {
        Ok(self.read()?.rooms.get(&room_id).cloned())
    }

    async fn find_room(&self, pair: UserPair) -> StoreResult<Option<ChatRoom>> {
        Ok(self
            .read()?
            .rooms
            .values()
            .find(|r| r.user_low == pair.low() && r.user_high == pair.high())
            .cloned())
    }

    async fn rooms_for_user(
        &self,
        user_id: UserId,
        active_only: bool,
    ) -> StoreResult<Vec<ChatRoom>> {
        let tables = self.read()?;
        let mut rooms: Vec<ChatRoom> = tables
            .rooms
            .values()
            .filter(|r| r.has_participant(user_id) && (!active_only || r.is_active))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()).then(b.id.cmp(&a.id)));
        Ok(rooms)
    }

    async fn set_room_active(&self, room_id: RoomId, is_active: bool) -> StoreResult<bool> {
        let mut tables = self.write()?;
        Ok(match tables.rooms.get_mut(&room_id) {
            Some(room) => {
                room.is_active = is_active;
                true
            }
            None => false,
        })
    }

    async fn append_message(&self, message: &NewMessage) -> StoreResult<Message> {
        let now = Utc::now();
        let mut tables = self.write()?;

        let room = tables
            .rooms
            .get_mut(&message.room_id)
            .ok_or_else(|| StoreError::NotFound(format!("chat room {}", message.room_id)))?;

        let created_at = match room.last_message_at {
            Some(last) if last > now => last,
            _ => now,
        };
        room.last_message = Some(message.preview.clone());
        room.last_message_at = Some(created_at);

        tables.next_message_id += 1;
        let stored = Message {
            id: tables.next_message_id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            message_type: message.message_type,
            is_read: false,
            read_at: None,
            created_at,
        };
        tables.messages.push(stored.clone());
        Ok(stored)
    }

    async fn messages(&self, room_id: RoomId, limit: Option<u32>) -> StoreResult<Vec<Message>> {
        let tables = self.read()?;
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        if let Some(limit) = limit {
            let skip = messages.len().saturating_sub(limit as usize);
            messages.drain(..skip);
        }
        Ok(messages)
    }

    async fn mark_read(&self, room_id: RoomId, reader: UserId) -> StoreResult<u64> {
        let now = Utc::now();
        let mut tables = self.write()?;
        let mut updated = 0;
        for message in tables
            .messages
            .iter_mut()
            .filter(|m| m.room_id == room_id && !m.is_read && m.sender_id != reader)
        {
            message.is_read = true;
            message.read_at = Some(now);
            updated += 1;
        }
        Ok(updated)
    }

    async fn unread_count(&self, room_id: RoomId, reader: UserId) -> StoreResult<i64> {
        Ok(self.read()?.unread_in(room_id, reader))
    }

    async fn total_unread(&self, reader: UserId) -> StoreResult<i64> {
        let tables = self.read()?;
        Ok(tables
            .rooms
            .values()
            .filter(|r| r.is_active && r.has_participant(reader))
            .map(|r| tables.unread_in(r.id, reader))
            .sum())
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }
}
