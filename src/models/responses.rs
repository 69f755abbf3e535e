use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::domain::{
    placeholder_user_name, Gender, MatchId, Message, MessageId, MessageType, Profile, RoomId,
    UserId,
};

/// Display information about another user, as shown in lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySummary {
    pub user_id: UserId,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub pet_name: Option<String>,
    pub pet_photo: Option<String>,
}

impl DisplaySummary {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            user_id: profile.user_id,
            user_name: profile.user_name.clone(),
            user_avatar: profile.user_avatar.clone(),
            pet_name: Some(profile.pet_name.clone()),
            pet_photo: profile.pet_photo.clone(),
        }
    }

    pub fn placeholder(user_id: UserId) -> Self {
        Self {
            user_id,
            user_name: placeholder_user_name(user_id),
            user_avatar: None,
            pet_name: None,
            pet_photo: None,
        }
    }
}

/// Candidate returned by a search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateView {
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
    pub distance: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
    pub match_score: u8,
    pub is_online: bool,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl CandidateView {
    pub fn new(profile: Profile, distance: Option<f64>, match_score: u8) -> Self {
        Self {
            id: profile.id,
            user_id: profile.user_id,
            user_name: profile.user_name,
            user_avatar: profile.user_avatar,
            user_gender: profile.user_gender,
            pet_name: profile.pet_name,
            pet_breed: profile.pet_breed,
            pet_age: profile.pet_age,
            pet_gender: profile.pet_gender,
            pet_photo: profile.pet_photo,
            bio: profile.bio,
            activity_level: profile.activity_level,
            distance,
            latitude: profile.latitude,
            longitude: profile.longitude,
            location: profile.location,
            match_score,
            is_online: profile.is_online,
            last_active_at: profile.last_active_at,
        }
    }
}

/// Outcome of a like or an accepted request, and entries of the match list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub match_id: Option<MatchId>,
    pub matched_user_id: Option<UserId>,
    pub matched_user_name: Option<String>,
    pub matched_user_avatar: Option<String>,
    pub pet_name: Option<String>,
    pub pet_photo: Option<String>,
    pub match_score: Option<i32>,
    pub is_matched: bool,
    pub matched_at: Option<DateTime<Utc>>,
    pub chat_room_id: Option<RoomId>,
    pub already_liked: bool,
}

impl MatchView {
    pub fn already_liked(match_id: MatchId, counterpart: &DisplaySummary) -> Self {
        Self {
            already_liked: true,
            ..Self::for_counterpart(Some(match_id), counterpart)
        }
    }

    /// Empty "no match" payload, returned for rejected requests
    pub fn unmatched() -> Self {
        Self {
            match_id: None,
            matched_user_id: None,
            matched_user_name: None,
            matched_user_avatar: None,
            pet_name: None,
            pet_photo: None,
            match_score: None,
            is_matched: false,
            matched_at: None,
            chat_room_id: None,
            already_liked: false,
        }
    }

    pub fn for_counterpart(match_id: Option<MatchId>, counterpart: &DisplaySummary) -> Self {
        Self {
            match_id,
            matched_user_id: Some(counterpart.user_id),
            matched_user_name: Some(counterpart.user_name.clone()),
            matched_user_avatar: counterpart.user_avatar.clone(),
            pet_name: counterpart.pet_name.clone(),
            pet_photo: counterpart.pet_photo.clone(),
            ..Self::unmatched()
        }
    }
}

/// Pending like, seen from either side
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequestView {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub pet_name: Option<String>,
    pub pet_photo: Option<String>,
    pub match_score: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoomView {
    pub id: RoomId,
    pub other_user_id: UserId,
    pub other_user_name: String,
    pub other_user_avatar: Option<String>,
    pub pet_name: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub chat_room_id: RoomId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn new(message: Message, sender: &DisplaySummary) -> Self {
        Self {
            id: message.id,
            chat_room_id: message.room_id,
            sender_id: message.sender_id,
            sender_name: sender.user_name.clone(),
            sender_avatar: sender.user_avatar.clone(),
            content: message.content,
            message_type: message.message_type,
            is_read: message.is_read,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationView {
    pub user_id: UserId,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
