use std::sync::Arc;

use validator::Validate;

use crate::core::{preview, resolve_message_type};
use crate::error::{AppError, AppResult};
use crate::models::{
    ChatRoom, ChatRoomView, Message, MessageView, NewMessage, RoomId, SendMessageRequest, UserId,
    UserPair,
};
use crate::services::display::DisplayResolver;
use crate::services::realtime::RealtimeBroadcaster;
use crate::store::{ChatStore, Datastore};

/// Rooms, messages and read state
///
/// Every write goes through here, whether it arrived over REST or the
/// live socket, so both paths share validation and fan-out.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn Datastore>,
    resolver: DisplayResolver,
    broadcaster: Arc<dyn RealtimeBroadcaster>,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn Datastore>,
        resolver: DisplayResolver,
        broadcaster: Arc<dyn RealtimeBroadcaster>,
    ) -> Self {
        Self {
            store,
            resolver,
            broadcaster,
        }
    }

    pub async fn get_or_create_room(&self, a: UserId, b: UserId) -> AppResult<ChatRoom> {
        let pair = UserPair::new(a, b)
            .ok_or_else(|| AppError::BadRequest("a chat room needs two different users".to_string()))?;

        let room = self.store.get_or_create_room(pair).await?;
        tracing::debug!(room_id = room.id, user_low = pair.low(), user_high = pair.high(), "chat room ready");
        Ok(room)
    }

    /// Active rooms of `user_id`, most recent activity first
    pub async fn list_rooms(&self, user_id: UserId) -> AppResult<Vec<ChatRoomView>> {
        let rooms = self.store.rooms_for_user(user_id, true).await?;

        let others: Vec<UserId> = rooms.iter().map(|r| r.other_participant(user_id)).collect();
        let summaries = self.resolver.resolve_many(&others).await;

        let mut views = Vec::with_capacity(rooms.len());
        for (room, summary) in rooms.into_iter().zip(summaries) {
            let unread_count = self.store.unread_count(room.id, user_id).await?;

            views.push(ChatRoomView {
                id: room.id,
                other_user_id: room.other_participant(user_id),
                other_user_name: summary.user_name,
                other_user_avatar: summary.user_avatar,
                pet_name: summary.pet_name,
                last_message: room.last_message,
                last_message_at: room.last_message_at,
                unread_count,
                is_active: room.is_active,
            });
        }
        Ok(views)
    }

    pub async fn send_message(&self, request: &SendMessageRequest) -> AppResult<MessageView> {
        request.validate()?;

        let room = self.participant_room(request.chat_room_id, request.sender_id).await?;
        if !room.is_active {
            return Err(AppError::Conflict(format!("chat room {} is closed", room.id)));
        }

        let message_type = resolve_message_type(request.message_type.as_deref());
        let new_message = NewMessage {
            room_id: room.id,
            sender_id: request.sender_id,
            content: request.content.clone(),
            message_type,
            preview: preview(message_type, &request.content),
        };

        let message = self.store.append_message(&new_message).await?;
        tracing::info!(
            room_id = message.room_id,
            message_id = message.id,
            sender_id = message.sender_id,
            message_type = ?message.message_type,
            "message stored"
        );

        let sender = self.resolver.resolve(message.sender_id).await;
        let view = MessageView::new(message, &sender);

        if let Err(e) = self.broadcaster.publish(view.chat_room_id, &view).await {
            tracing::warn!(room_id = view.chat_room_id, message_id = view.id, error = %e, "broadcast failed");
        }

        Ok(view)
    }

    /// Full history, oldest first
    pub async fn history(&self, room_id: RoomId, user_id: UserId) -> AppResult<Vec<MessageView>> {
        self.participant_room(room_id, user_id).await?;
        let messages = self.store.messages(room_id, None).await?;
        Ok(self.views(messages).await)
    }

    /// The newest `limit` messages, oldest first
    pub async fn recent(
        &self,
        room_id: RoomId,
        user_id: UserId,
        limit: u32,
    ) -> AppResult<Vec<MessageView>> {
        self.participant_room(room_id, user_id).await?;
        let messages = self.store.messages(room_id, Some(limit)).await?;
        Ok(self.views(messages).await)
    }

    /// Mark everything the other participant sent as read
    pub async fn mark_read(&self, room_id: RoomId, user_id: UserId) -> AppResult<u64> {
        self.participant_room(room_id, user_id).await?;
        let updated = self.store.mark_read(room_id, user_id).await?;
        tracing::debug!(room_id, user_id, updated, "marked messages read");
        Ok(updated)
    }

    pub async fn unread_count(&self, room_id: RoomId, user_id: UserId) -> AppResult<i64> {
        self.participant_room(room_id, user_id).await?;
        Ok(self.store.unread_count(room_id, user_id).await?)
    }

    pub async fn total_unread_count(&self, user_id: UserId) -> AppResult<i64> {
        Ok(self.store.total_unread(user_id).await?)
    }

    /// Close the room for both sides; history is kept
    pub async fn leave_room(&self, room_id: RoomId, user_id: UserId) -> AppResult<()> {
        self.participant_room(room_id, user_id).await?;
        self.store.set_room_active(room_id, false).await?;
        tracing::info!(room_id, user_id, "left chat room");
        Ok(())
    }

    /// The room, provided it exists and `user_id` is one of its two participants
    pub async fn participant_room(&self, room_id: RoomId, user_id: UserId) -> AppResult<ChatRoom> {
        let room = self
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("chat room {}", room_id)))?;

        if !room.has_participant(user_id) {
            return Err(AppError::Unauthorized(format!(
                "user {} is not a participant of chat room {}",
                user_id, room_id
            )));
        }
        Ok(room)
    }

    async fn views(&self, messages: Vec<Message>) -> Vec<MessageView> {
        let senders: Vec<UserId> = messages.iter().map(|m| m.sender_id).collect();
        let summaries = self.resolver.resolve_many(&senders).await;

        messages
            .into_iter()
            .zip(summaries)
            .map(|(message, sender)| MessageView::new(message, &sender))
            .collect()
    }
}
