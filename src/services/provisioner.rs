use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::models::{
    Gender, LocationUpdate, LocationView, NewProfile, Profile, ProfileRequest, UserId,
};
use crate::services::directory::UserDirectory;
use crate::store::{Datastore, ProfileStore, StoreError};

/// Owns profile rows: lazy creation, edits, presence and location
///
/// `ensure_profile` guarantees that a row exists for any user id the
/// matching and chat paths touch, even when the user directory is down.
#[derive(Clone)]
pub struct ProfileProvisioner {
    store: Arc<dyn Datastore>,
    directory: Arc<dyn UserDirectory>,
    timeout: Duration,
}

impl ProfileProvisioner {
    pub fn new(
        store: Arc<dyn Datastore>,
        directory: Arc<dyn UserDirectory>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            timeout,
        }
    }

    /// Return the user's profile, creating it on first sight
    ///
    /// Directory failures degrade to placeholders; only store errors propagate.
    pub async fn ensure_profile(&self, user_id: UserId) -> Result<Profile, StoreError> {
        if let Some(profile) = self.store.get_profile(user_id).await? {
            return Ok(profile);
        }

        let new_profile = match tokio::time::timeout(self.timeout, self.directory.get_user(user_id)).await
        {
            Ok(Ok(info)) => NewProfile::hydrated(user_id, &info),
            Ok(Err(e)) => {
                tracing::warn!(user_id, error = %e, "directory lookup failed, using placeholder profile");
                NewProfile::placeholder(user_id)
            }
            Err(_) => {
                tracing::warn!(user_id, timeout = ?self.timeout, "directory lookup timed out, using placeholder profile");
                NewProfile::placeholder(user_id)
            }
        };

        let profile = self.store.insert_profile_if_absent(&new_profile).await?;
        tracing::info!(user_id, profile_id = profile.id, "provisioned profile");
        Ok(profile)
    }

    /// Create or update a profile from an explicit edit
    pub async fn save_profile(&self, request: &ProfileRequest) -> AppResult<Profile> {
        let new_profile = NewProfile {
            user_id: request.user_id,
            user_name: request.user_name.trim().to_string(),
            user_avatar: request.user_avatar.clone(),
            user_gender: request
                .user_gender
                .as_deref()
                .map(Gender::from_label)
                .unwrap_or(Gender::Unset),
            pet_name: request.pet_name.trim().to_string(),
            pet_breed: request.pet_breed.trim().to_string(),
            pet_age: request.pet_age,
            pet_gender: request.pet_gender.clone(),
            pet_photo: request.pet_photo.clone(),
            bio: request.bio.clone(),
            activity_level: request.activity_level,
            latitude: request.latitude,
            longitude: request.longitude,
            location: request.location.clone(),
        };

        let profile = self.store.upsert_profile(&new_profile).await?;
        tracing::info!(user_id = profile.user_id, "saved profile");
        Ok(profile)
    }

    /// Record the user's current position, provisioning the row if needed
    pub async fn update_location(
        &self,
        user_id: UserId,
        update: &LocationUpdate,
    ) -> AppResult<LocationView> {
        self.ensure_profile(user_id).await?;
        self.store
            .set_location(
                user_id,
                update.latitude,
                update.longitude,
                update.location.as_deref(),
            )
            .await?;

        self.saved_location(user_id).await
    }

    pub async fn saved_location(&self, user_id: UserId) -> AppResult<LocationView> {
        let profile = self
            .store
            .get_profile(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile for user {}", user_id)))?;

        Ok(LocationView {
            user_id,
            latitude: profile.latitude,
            longitude: profile.longitude,
            location: profile.location,
        })
    }

    /// Flip the presence flag; unknown users are ignored
    pub async fn update_status(&self, user_id: UserId, is_online: bool) -> AppResult<bool> {
        let updated = self.store.set_online(user_id, is_online).await?;
        if !updated {
            tracing::debug!(user_id, "status update for unknown profile ignored");
        }
        Ok(updated)
    }
}
