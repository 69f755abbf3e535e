use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::models::{placeholder_user_name_for, DisplaySummary, UserId, UserInfo};
use crate::services::directory::UserDirectory;
use crate::store::{Datastore, ProfileStore};

/// Resolves what to show for another user in chat lists and messages
///
/// Lookup order: user directory, then the local profile row, then a
/// `User {id}` placeholder. Never fails.
#[derive(Clone)]
pub struct DisplayResolver {
    store: Arc<dyn Datastore>,
    directory: Arc<dyn UserDirectory>,
    timeout: Duration,
}

impl DisplayResolver {
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

    pub async fn resolve(&self, user_id: UserId) -> DisplaySummary {
        match tokio::time::timeout(self.timeout, self.directory.get_user(user_id)).await {
            Ok(Ok(info)) => return summary_from_directory(user_id, &info),
            Ok(Err(e)) => tracing::debug!(user_id, error = %e, "directory miss for display"),
            Err(_) => tracing::debug!(user_id, "directory timed out for display"),
        }

        match self.store.get_profile(user_id).await {
            Ok(Some(profile)) => DisplaySummary::from_profile(&profile),
            Ok(None) => DisplaySummary::placeholder(user_id),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "profile lookup failed for display");
                DisplaySummary::placeholder(user_id)
            }
        }
    }

    /// Resolve several users concurrently, one lookup per distinct id
    ///
    /// The result lines up with `user_ids`.
    pub async fn resolve_many(&self, user_ids: &[UserId]) -> Vec<DisplaySummary> {
        let mut distinct = user_ids.to_vec();
        distinct.sort_unstable();
        distinct.dedup();

        let summaries = join_all(distinct.iter().map(|&id| self.resolve(id))).await;
        let resolved: HashMap<UserId, DisplaySummary> = distinct.into_iter().zip(summaries).collect();

        user_ids
            .iter()
            .map(|id| {
                resolved
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| DisplaySummary::placeholder(*id))
            })
            .collect()
    }

    /// Summaries from stored profiles only; missing rows become placeholders
    pub async fn from_profiles(&self, user_ids: &[UserId]) -> HashMap<UserId, DisplaySummary> {
        let mut resolved: HashMap<UserId, DisplaySummary> = match self.store.get_profiles(user_ids).await {
            Ok(profiles) => profiles
                .iter()
                .map(|p| (p.user_id, DisplaySummary::from_profile(p)))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "profile batch lookup failed, using placeholders");
                HashMap::new()
            }
        };

        for &user_id in user_ids {
            resolved
                .entry(user_id)
                .or_insert_with(|| DisplaySummary::placeholder(user_id));
        }
        resolved
    }
}

fn summary_from_directory(user_id: UserId, info: &UserInfo) -> DisplaySummary {
    let pet = info.pets.first();
    DisplaySummary {
        user_id,
        user_name: placeholder_user_name_for(user_id, info.username.as_deref()),
        user_avatar: info.profile_image.clone(),
        pet_name: pet.and_then(|p| p.pet_name.clone()),
        pet_photo: pet.and_then(|p| p.profile_image.clone()),
    }
}
