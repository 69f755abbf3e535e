use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::domain::{RoomId, UserId};

pub const DEFAULT_RADIUS_KM: f64 = 3.0;

/// Create or update the caller's matchable profile
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    #[validate(range(min = 1))]
    pub user_id: UserId,
    #[validate(length(min = 1, max = 50))]
    pub user_name: String,
    #[serde(default)]
    pub user_avatar: Option<String>,
    #[serde(default)]
    pub user_gender: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub pet_name: String,
    #[validate(length(min = 1, max = 50))]
    pub pet_breed: String,
    #[serde(default)]
    #[validate(range(min = 0, max = 40))]
    pub pet_age: Option<i32>,
    #[serde(default)]
    pub pet_gender: Option<String>,
    #[serde(default)]
    pub pet_photo: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub bio: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, max = 5))]
    pub activity_level: Option<i32>,
    #[serde(default)]
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[serde(default)]
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Candidate search filter
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFilter {
    #[serde(default)]
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[serde(default)]
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[serde(default = "default_radius_km")]
    #[validate(range(min = 0.0))]
    pub radius_km: f64,
    #[serde(default, alias = "gender")]
    pub user_gender: Option<String>,
    #[serde(default, alias = "breed")]
    pub pet_breed: Option<String>,
    #[serde(default, alias = "minActivity")]
    pub min_activity_level: Option<i32>,
    #[serde(default, alias = "maxActivity")]
    pub max_activity_level: Option<i32>,
}

fn default_radius_km() -> f64 {
    DEFAULT_RADIUS_KM
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            radius_km: DEFAULT_RADIUS_KM,
            user_gender: None,
            pet_breed: None,
            min_activity_level: None,
            max_activity_level: None,
        }
    }
}

impl CandidateFilter {
    /// Search origin, only when both coordinates are present
    pub fn origin(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    #[validate(range(min = 1))]
    pub from_user_id: UserId,
    #[validate(range(min = 1))]
    pub to_user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    #[validate(range(min = 1))]
    pub user_id: UserId,
    pub accept: bool,
}

/// Message write, shared by the REST and the live socket path
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(alias = "roomId")]
    pub chat_room_id: RoomId,
    #[validate(range(min = 1))]
    pub sender_id: UserId,
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomPairQuery {
    #[serde(rename = "userId1")]
    pub user_id1: UserId,
    #[serde(rename = "userId2")]
    pub user_id2: UserId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentQuery {
    pub user_id: UserId,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub is_online: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_defaults_radius() {
        let filter: CandidateFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(filter.radius_km, 3.0);
        assert!(filter.origin().is_none());
    }

    #[test]
    fn test_filter_aliases() {
        let filter: CandidateFilter = serde_json::from_str(
            r#"{"latitude": 37.5, "longitude": 127.0, "gender": "female", "breed": "poodle"}"#,
        )
        .unwrap();
        assert_eq!(filter.origin(), Some((37.5, 127.0)));
        assert_eq!(filter.user_gender.as_deref(), Some("female"));
        assert_eq!(filter.pet_breed.as_deref(), Some("poodle"));
    }

    #[test]
    fn test_send_message_validation() {
        let req = SendMessageRequest {
            chat_room_id: 1,
            sender_id: 1,
            content: String::new(),
            message_type: None,
        };
        assert!(req.validate().is_err());
    }
}
