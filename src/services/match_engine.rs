use std::collections::HashSet;
use std::sync::Arc;

use crate::core::{random_score, RespondRefusal};
use crate::error::{AppError, AppResult};
use crate::models::{
    DisplaySummary, MatchEdge, MatchId, MatchStatus, MatchView, PendingRequestView, RoomId,
    UserId, UserPair,
};
use crate::services::display::DisplayResolver;
use crate::services::notifications::{send_detached, Notification, NotificationSink};
use crate::services::provisioner::ProfileProvisioner;
use crate::store::{ChatStore, Datastore, LikeOutcome, MatchStore, RespondOutcome};

/// Like -> match state machine and the match listings
#[derive(Clone)]
pub struct MatchEngine {
    store: Arc<dyn Datastore>,
    provisioner: ProfileProvisioner,
    resolver: DisplayResolver,
    notifier: Arc<dyn NotificationSink>,
}

impl MatchEngine {
    pub fn new(
        store: Arc<dyn Datastore>,
        provisioner: ProfileProvisioner,
        resolver: DisplayResolver,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            provisioner,
            resolver,
            notifier,
        }
    }

    pub async fn like(&self, from: UserId, to: UserId) -> AppResult<MatchView> {
        if from == to {
            return Err(AppError::BadRequest("cannot like yourself".to_string()));
        }

        self.provisioner.ensure_profile(from).await?;
        let counterpart_profile = self.provisioner.ensure_profile(to).await?;
        let counterpart = DisplaySummary::from_profile(&counterpart_profile);

        match self.store.apply_like(from, to, i32::from(random_score())).await? {
            LikeOutcome::AlreadyLiked(edge) => {
                tracing::debug!(from, to, match_id = edge.id, "like already recorded");
                Ok(MatchView::already_liked(edge.id, &counterpart))
            }
            LikeOutcome::Pending(edge) => {
                tracing::info!(from, to, match_id = edge.id, "like recorded, waiting for response");
                Ok(MatchView {
                    match_score: edge.score,
                    ..MatchView::for_counterpart(Some(edge.id), &counterpart)
                })
            }
            LikeOutcome::Matched(edge) => {
                tracing::info!(from, to, match_id = edge.id, "mutual like, users matched");
                let room_id = self.open_room(from, to).await;
                self.notify_matched(from, to).await;
                self.notify_matched(to, from).await;
                Ok(matched_view(&edge, &counterpart, room_id))
            }
        }
    }

    /// Withdraw a like that is still pending
    pub async fn unlike(&self, from: UserId, to: UserId) -> AppResult<bool> {
        let deleted = self.store.delete_pending(from, to).await?;
        tracing::info!(from, to, deleted, "unlike");
        Ok(deleted)
    }

    pub async fn respond(
        &self,
        match_id: MatchId,
        responder: UserId,
        accept: bool,
    ) -> AppResult<MatchView> {
        let outcome = self
            .store
            .apply_response(match_id, responder, accept)
            .await?;

        match outcome {
            RespondOutcome::Refused(RespondRefusal::NotRecipient) => {
                tracing::warn!(match_id, responder, "response from a user who is not the recipient");
                Err(AppError::Unauthorized(format!(
                    "user {} cannot answer request {}",
                    responder, match_id
                )))
            }
            RespondOutcome::Refused(RespondRefusal::AlreadyResolved(status)) => {
                tracing::debug!(match_id, ?status, "request already resolved");
                Err(AppError::AlreadyResolved(match_id))
            }
            RespondOutcome::Rejected(edge) => {
                tracing::info!(match_id, from = edge.from_user_id, to = edge.to_user_id, "request rejected");
                Ok(MatchView::unmatched())
            }
            RespondOutcome::Accepted(edge) => {
                let requester = edge.from_user_id;
                tracing::info!(match_id, requester, responder, "request accepted, users matched");

                let room_id = self.open_room(requester, responder).await;
                self.notify_matched(requester, responder).await;

                let counterpart = self.summary(requester).await;
                Ok(matched_view(&edge, &counterpart, room_id))
            }
        }
    }

    /// Remove a match in both directions; the chat room is left alone
    pub async fn unfriend(&self, user_id: UserId, other: UserId) -> AppResult<u64> {
        let pair = UserPair::new(user_id, other)
            .ok_or_else(|| AppError::BadRequest("cannot unfriend yourself".to_string()))?;

        let deleted = self.store.delete_matched(pair).await?;
        tracing::info!(user_id, other, deleted, "unfriend");
        Ok(deleted)
    }

    /// Requests waiting on `user_id`, newest first
    pub async fn pending_incoming(&self, user_id: UserId) -> AppResult<Vec<PendingRequestView>> {
        let edges = self
            .store
            .edges_to(user_id, Some(MatchStatus::Pending))
            .await?;
        Ok(self.pending_views(user_id, edges).await)
    }

    /// Requests `user_id` sent that are still pending, newest first
    pub async fn pending_outgoing(&self, user_id: UserId) -> AppResult<Vec<PendingRequestView>> {
        let edges = self
            .store
            .edges_from(user_id, Some(MatchStatus::Pending))
            .await?;
        Ok(self.pending_views(user_id, edges).await)
    }

    pub async fn pending_count(&self, user_id: UserId) -> AppResult<i64> {
        Ok(self
            .store
            .count_edges_to(user_id, MatchStatus::Pending)
            .await?)
    }

    /// Matched users, one entry per counterpart, newest first
    pub async fn matches(&self, user_id: UserId) -> AppResult<Vec<MatchView>> {
        let mut edges = self
            .store
            .edges_from(user_id, Some(MatchStatus::Matched))
            .await?;
        edges.extend(
            self.store
                .edges_to(user_id, Some(MatchStatus::Matched))
                .await?,
        );
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut seen = HashSet::new();
        edges.retain(|e| seen.insert(e.counterpart(user_id)));

        let ids: Vec<UserId> = edges.iter().map(|e| e.counterpart(user_id)).collect();
        let summaries = self.resolver.from_profiles(&ids).await;

        let mut views = Vec::with_capacity(edges.len());
        for edge in &edges {
            let other = edge.counterpart(user_id);
            let room_id = match UserPair::new(user_id, other) {
                Some(pair) => self.store.find_room(pair).await?.map(|r| r.id),
                None => None,
            };
            let counterpart = summaries
                .get(&other)
                .cloned()
                .unwrap_or_else(|| DisplaySummary::placeholder(other));
            views.push(matched_view(edge, &counterpart, room_id));
        }
        Ok(views)
    }

    /// Users `user_id` liked whose answer is still outstanding
    pub async fn liked_user_ids(&self, user_id: UserId) -> AppResult<Vec<UserId>> {
        Ok(self
            .store
            .edges_from(user_id, Some(MatchStatus::Pending))
            .await?
            .into_iter()
            .map(|e| e.to_user_id)
            .collect())
    }

    async fn pending_views(&self, user_id: UserId, edges: Vec<MatchEdge>) -> Vec<PendingRequestView> {
        let ids: Vec<UserId> = edges.iter().map(|e| e.counterpart(user_id)).collect();
        let summaries = self.resolver.from_profiles(&ids).await;

        edges
            .into_iter()
            .map(|edge| {
                let other = edge.counterpart(user_id);
                let summary = summaries
                    .get(&other)
                    .cloned()
                    .unwrap_or_else(|| DisplaySummary::placeholder(other));
                PendingRequestView {
                    match_id: edge.id,
                    user_id: other,
                    user_name: summary.user_name,
                    user_avatar: summary.user_avatar,
                    pet_name: summary.pet_name,
                    pet_photo: summary.pet_photo,
                    match_score: edge.score,
                    created_at: edge.created_at,
                }
            })
            .collect()
    }

    async fn summary(&self, user_id: UserId) -> DisplaySummary {
        self.resolver
            .from_profiles(&[user_id])
            .await
            .remove(&user_id)
            .unwrap_or_else(|| DisplaySummary::placeholder(user_id))
    }

    /// Room creation after a match; a failure here never undoes the match
    async fn open_room(&self, a: UserId, b: UserId) -> Option<RoomId> {
        let pair = UserPair::new(a, b)?;
        match self.store.get_or_create_room(pair).await {
            Ok(room) => Some(room.id),
            Err(e) => {
                tracing::error!(a, b, error = %e, "failed to open chat room for match");
                None
            }
        }
    }

    /// Tell `receiver` who they matched with
    async fn notify_matched(&self, receiver: UserId, counterpart: UserId) {
        let name = self.summary(counterpart).await.user_name;
        send_detached(self.notifier.clone(), Notification::matched(receiver, &name));
    }
}

fn matched_view(edge: &MatchEdge, counterpart: &DisplaySummary, room_id: Option<RoomId>) -> MatchView {
    MatchView {
        match_score: edge.score,
        is_matched: true,
        matched_at: edge.matched_at,
        chat_room_id: room_id,
        ..MatchView::for_counterpart(Some(edge.id), counterpart)
    }
}
