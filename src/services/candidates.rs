use std::collections::HashSet;
use std::sync::Arc;

use crate::core::{calculate_bounding_box, haversine_distance, matches_filters, random_score, round_km};
use crate::error::{AppError, AppResult};
use crate::models::{CandidateFilter, CandidateView, MatchStatus, Profile, UserId};
use crate::services::provisioner::ProfileProvisioner;
use crate::store::{Datastore, MatchStore, ProfileStore};

/// Nearby-candidate search
///
/// Pipeline:
/// 1. Provision the caller
/// 2. Bounding-box range query, then exact haversine radius check
/// 3. Drop users the caller already interacted with
/// 4. Attribute filters (gender, breed, activity)
#[derive(Clone)]
pub struct CandidateFinder {
    store: Arc<dyn Datastore>,
    provisioner: ProfileProvisioner,
    max_radius_km: f64,
}

impl CandidateFinder {
    pub fn new(store: Arc<dyn Datastore>, provisioner: ProfileProvisioner, max_radius_km: f64) -> Self {
        Self {
            store,
            provisioner,
            max_radius_km,
        }
    }

    pub async fn find_candidates(
        &self,
        user_id: UserId,
        filter: &CandidateFilter,
    ) -> AppResult<Vec<CandidateView>> {
        if filter.radius_km.is_nan() || filter.radius_km < 0.0 {
            return Err(AppError::BadRequest("radius must be non-negative".to_string()));
        }
        let radius_km = filter.radius_km.min(self.max_radius_km);

        self.provisioner.ensure_profile(user_id).await?;

        let excluded = self.excluded_user_ids(user_id).await?;

        let mut candidates: Vec<CandidateView> = match filter.origin() {
            Some((lat, lon)) => {
                let bbox = calculate_bounding_box(lat, lon, radius_km);
                let in_box = self.store.profiles_in_box(&bbox, user_id).await?;

                let mut within: Vec<(Profile, f64)> = in_box
                    .into_iter()
                    .filter_map(|p| {
                        let (plat, plon) = p.coordinates()?;
                        let distance = haversine_distance(lat, lon, plat, plon);
                        (distance <= radius_km).then_some((p, distance))
                    })
                    .filter(|(p, _)| !excluded.contains(&p.user_id) && matches_filters(p, filter))
                    .collect();
                within.sort_by(|a, b| a.1.total_cmp(&b.1));

                within
                    .into_iter()
                    .map(|(p, d)| CandidateView::new(p, Some(round_km(d)), random_score()))
                    .collect()
            }
            None => self
                .store
                .active_profiles(user_id)
                .await?
                .into_iter()
                .filter(|p| !excluded.contains(&p.user_id) && matches_filters(p, filter))
                .map(|p| CandidateView::new(p, None, random_score()))
                .collect(),
        };
        candidates.retain(|c| c.user_id != user_id);

        tracing::info!(
            user_id,
            radius_km,
            with_origin = filter.origin().is_some(),
            results = candidates.len(),
            "candidate search"
        );

        Ok(candidates)
    }

    /// Users already liked by the caller (any status) or waiting on / matched with the caller
    async fn excluded_user_ids(&self, user_id: UserId) -> AppResult<HashSet<UserId>> {
        let mut excluded: HashSet<UserId> = self
            .store
            .edges_from(user_id, None)
            .await?
            .into_iter()
            .map(|e| e.to_user_id)
            .collect();

        excluded.extend(
            self.store
                .edges_to(user_id, None)
                .await?
                .into_iter()
                .filter(|e| matches!(e.status, MatchStatus::Pending | MatchStatus::Matched))
                .map(|e| e.from_user_id),
        );

        Ok(excluded)
    }
}
