use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type MatchId = i64;
pub type RoomId = i64;
pub type MessageId = i64;

/// Owner gender, restricted to a closed vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "owner_gender", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unset,
}

impl Gender {
    /// Map a free-form gender label (as returned by the user directory) onto the vocabulary.
    ///
    /// Anything unrecognised maps to `Unset`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "male" | "m" | "man" => Gender::Male,
            "female" | "f" | "woman" => Gender::Female,
            _ => Gender::Unset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unset => "unset",
        }
    }
}

/// Matchable profile, one row per user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: i64,
    pub user_id: UserId,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub user_gender: Gender,
    pub pet_name: String,
    pub pet_breed: String,
    pub pet_age: Option<i32>,
    pub pet_gender: Option<String>,
    pub pet_photo: Option<String>,
    pub bio: Option<String>,
    pub activity_level: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
    pub is_online: bool,
    pub is_active: bool,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Coordinates, when both halves are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Profile fields written when a row is created or edited
#[derive(Debug, Clone, PartialEq)]
pub struct NewProfile {
    pub user_id: UserId,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub user_gender: Gender,
    pub pet_name: String,
    pub pet_breed: String,
    pub pet_age: Option<i32>,
    pub pet_gender: Option<String>,
    pub pet_photo: Option<String>,
    pub bio: Option<String>,
    pub activity_level: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
}

pub const UNSET_LABEL: &str = "unset";

impl NewProfile {
    /// Deterministic placeholder row used when the directory has nothing for us
    pub fn placeholder(user_id: UserId) -> Self {
        Self {
            user_id,
            user_name: placeholder_user_name(user_id),
            user_avatar: None,
            user_gender: Gender::Unset,
            pet_name: UNSET_LABEL.to_string(),
            pet_breed: UNSET_LABEL.to_string(),
            pet_age: None,
            pet_gender: None,
            pet_photo: None,
            bio: None,
            activity_level: None,
            latitude: None,
            longitude: None,
            location: None,
        }
    }

    /// Profile populated from directory data; missing fields fall back to placeholders
    pub fn hydrated(user_id: UserId, info: &UserInfo) -> Self {
        let mut profile = Self::placeholder(user_id);

        if let Some(name) = non_blank(info.username.as_deref()) {
            profile.user_name = name;
        }
        profile.user_avatar = non_blank(info.profile_image.as_deref());
        profile.user_gender = info
            .gender_type
            .as_deref()
            .map(Gender::from_label)
            .unwrap_or(Gender::Unset);

        if let Some(pet) = info.pets.first() {
            if let Some(name) = non_blank(pet.pet_name.as_deref()) {
                profile.pet_name = name;
            }
            if let Some(breed) = non_blank(pet.breed.as_deref()) {
                profile.pet_breed = breed;
            }
            profile.pet_age = pet.age;
            profile.pet_gender = non_blank(pet.gender_type.as_deref());
            profile.pet_photo = non_blank(pet.profile_image.as_deref());
        }

        profile
    }
}

pub fn placeholder_user_name(user_id: UserId) -> String {
    format!("User {}", user_id)
}

/// The given name when it is non-blank, the placeholder otherwise
pub fn placeholder_user_name_for(user_id: UserId, name: Option<&str>) -> String {
    non_blank(name).unwrap_or_else(|| placeholder_user_name(user_id))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// User record as served by the external user directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default)]
    pub id: Option<UserId>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub gender_type: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub pets: Vec<PetInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetInfo {
    #[serde(default)]
    pub pet_id: Option<i64>,
    #[serde(default)]
    pub pet_name: Option<String>,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub gender_type: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "match_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchStatus {
    Pending,
    Matched,
    Rejected,
}

/// Directed "like" edge between two users
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MatchEdge {
    pub id: MatchId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub status: MatchStatus,
    pub score: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
}

impl MatchEdge {
    /// The user on the other end of this edge, seen from `user_id`
    pub fn counterpart(&self, user_id: UserId) -> UserId {
        if self.from_user_id == user_id {
            self.to_user_id
        } else {
            self.from_user_id
        }
    }
}

/// Unordered pair of distinct users, stored low id first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserPair {
    low: UserId,
    high: UserId,
}

impl UserPair {
    /// Returns `None` when both ids are the same user
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    /// Stable 64-bit key for pair-scoped locks
    pub fn lock_key(&self) -> i64 {
        self.low
            .wrapping_mul(0x9E37_79B9_7F4A_7C15_u64 as i64)
            .rotate_left(17)
            ^ self.high
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: RoomId,
    pub user_low: UserId,
    pub user_high: UserId,
    pub is_active: bool,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }

    pub fn other_participant(&self, user_id: UserId) -> UserId {
        if self.user_low == user_id {
            self.user_high
        } else {
            self.user_low
        }
    }

    /// Timestamp used to order room lists
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Text,
    Image,
    System,
}

impl MessageType {
    /// Case-insensitive parse; `None` for unknown labels
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "TEXT" => Some(MessageType::Text),
            "IMAGE" => Some(MessageType::Image),
            "SYSTEM" => Some(MessageType::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: String,
    pub message_type: MessageType,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Geospatial bounding box
///
/// Longitudes stay within [-180, 180]. A box crossing the antimeridian has
/// `min_lon > max_lon` and covers `[min_lon, 180] ∪ [-180, max_lon]`.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon > self.max_lon
    }

    #[inline]
    pub fn contains_lon(&self, lon: f64) -> bool {
        if self.crosses_antimeridian() {
            lon >= self.min_lon || lon <= self.max_lon
        } else {
            lon >= self.min_lon && lon <= self.max_lon
        }
    }
}

/// Message about to be appended to a room
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: String,
    pub message_type: MessageType,
    pub preview: String,
}
