//! Live chat socket at `/ws/chat?userId=`.
//!
//! Clients subscribe to rooms they belong to and receive `message` frames for
//! every message stored in them. `send` and `read` go through the same
//! [`ChatService`] calls as the REST routes.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::{RoomId, SendMessageRequest, UserId, UserQuery};
use crate::routes::AppState;
use crate::services::realtime::{room_channel, ServerFrame};
use crate::services::{ChatService, ConnectionRegistry, SubscriberId};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws/chat", web::get().to(ws_handler));
}

/// Frames accepted from live clients
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Subscribe { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    Send {
        room_id: RoomId,
        content: String,
        #[serde(default)]
        message_type: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Read { room_id: RoomId },
}

// Encoded frame to push to the socket
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Outbound(String);

// A room subscription finished registering
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Subscribed {
    room_id: RoomId,
    subscriber_id: SubscriberId,
}

// A room subscription was refused before registering
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct SubscribeRefused {
    room_id: RoomId,
    frame: String,
}

/// Per-socket room subscriptions
///
/// A room is `pending` between the subscribe frame and the registry handing
/// back its subscriber id. Unsubscribing a pending room cancels it, so the
/// late registration is dropped instead of kept.
#[derive(Debug, Default)]
struct RoomSubscriptions {
    active: HashMap<RoomId, SubscriberId>,
    pending: HashSet<RoomId>,
}

impl RoomSubscriptions {
    /// Returns false when the room is already subscribed or on its way
    fn begin(&mut self, room_id: RoomId) -> bool {
        if self.active.contains_key(&room_id) || self.pending.contains(&room_id) {
            return false;
        }
        self.pending.insert(room_id)
    }

    /// Returns false when the subscription was cancelled while pending
    fn confirm(&mut self, room_id: RoomId, subscriber_id: SubscriberId) -> bool {
        if !self.pending.remove(&room_id) {
            return false;
        }
        self.active.insert(room_id, subscriber_id);
        true
    }

    fn refuse(&mut self, room_id: RoomId) {
        self.pending.remove(&room_id);
    }

    /// Cancel a pending subscription or hand back the active registration
    fn cancel(&mut self, room_id: RoomId) -> Option<SubscriberId> {
        self.pending.remove(&room_id);
        self.active.remove(&room_id)
    }

    fn len(&self) -> usize {
        self.active.len()
    }

    fn drain(&mut self) -> Vec<(RoomId, SubscriberId)> {
        self.pending.clear();
        self.active.drain().collect()
    }
}

struct WsSession {
    user_id: UserId,
    chat: ChatService,
    registry: ConnectionRegistry,
    subscriptions: RoomSubscriptions,
    hb: Instant,
}

impl WsSession {
    fn new(user_id: UserId, chat: ChatService, registry: ConnectionRegistry) -> Self {
        Self {
            user_id,
            chat,
            registry,
            subscriptions: RoomSubscriptions::default(),
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(user_id = act.user_id, "websocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_frame(ctx: &mut ws::WebsocketContext<Self>, frame: &ServerFrame) {
        match frame.encode() {
            Ok(text) => ctx.text(text),
            Err(e) => tracing::error!(error = %e, "failed to encode frame"),
        }
    }

    fn handle_frame(&mut self, frame: ClientFrame, ctx: &mut ws::WebsocketContext<Self>) {
        let user_id = self.user_id;
        let chat = self.chat.clone();
        let addr = ctx.address();

        match frame {
            ClientFrame::Subscribe { room_id } => {
                if !self.subscriptions.begin(room_id) {
                    Self::send_frame(ctx, &ack("subscribe", room_id, None));
                    return;
                }

                let registry = self.registry.clone();
                actix::spawn(async move {
                    if let Err(e) = chat.participant_room(room_id, user_id).await {
                        addr.do_send(SubscribeRefused {
                            room_id,
                            frame: encode_or_log(&error_frame(&e)),
                        });
                        return;
                    }

                    let (subscriber_id, mut rx) = registry.add_subscriber(&room_channel(room_id)).await;
                    addr.do_send(Subscribed {
                        room_id,
                        subscriber_id,
                    });

                    while let Some(payload) = rx.recv().await {
                        if !addr.connected() {
                            break;
                        }
                        addr.do_send(Outbound(payload));
                    }
                });
            }
            ClientFrame::Unsubscribe { room_id } => {
                if let Some(subscriber_id) = self.subscriptions.cancel(room_id) {
                    let registry = self.registry.clone();
                    actix::spawn(async move {
                        registry
                            .remove_subscriber(&room_channel(room_id), subscriber_id)
                            .await;
                    });
                }
                Self::send_frame(ctx, &ack("unsubscribe", room_id, None));
            }
            ClientFrame::Send {
                room_id,
                content,
                message_type,
            } => {
                let request = SendMessageRequest {
                    chat_room_id: room_id,
                    sender_id: user_id,
                    content,
                    message_type,
                };
                actix::spawn(async move {
                    let frame = match chat.send_message(&request).await {
                        Ok(view) => ack("send", room_id, Some(view.id)),
                        Err(e) => error_frame(&e),
                    };
                    addr.do_send(Outbound(encode_or_log(&frame)));
                });
            }
            ClientFrame::Read { room_id } => {
                actix::spawn(async move {
                    let frame = match chat.mark_read(room_id, user_id).await {
                        Ok(_) => ack("read", room_id, None),
                        Err(e) => error_frame(&e),
                    };
                    addr.do_send(Outbound(encode_or_log(&frame)));
                });
            }
        }
    }
}

fn ack(action: &str, room_id: RoomId, message_id: Option<i64>) -> ServerFrame {
    ServerFrame::Ack {
        action: action.to_string(),
        room_id,
        message_id,
    }
}

fn error_frame(e: &AppError) -> ServerFrame {
    ServerFrame::Error {
        code: e.kind().to_string(),
        message: e.to_string(),
    }
}

fn encode_or_log(frame: &ServerFrame) -> String {
    frame.encode().unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to encode frame");
        String::new()
    })
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = self.user_id, "websocket session started");
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            user_id = self.user_id,
            rooms = self.subscriptions.len(),
            "websocket session stopped"
        );

        let registry = self.registry.clone();
        let subscriptions = self.subscriptions.drain();
        actix::spawn(async move {
            for (room_id, subscriber_id) in subscriptions {
                registry
                    .remove_subscriber(&room_channel(room_id), subscriber_id)
                    .await;
            }
        });
    }
}

impl Handler<Outbound> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        if !msg.0.is_empty() {
            ctx.text(msg.0);
        }
    }
}

impl Handler<Subscribed> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Subscribed, ctx: &mut Self::Context) {
        if !self.subscriptions.confirm(msg.room_id, msg.subscriber_id) {
            // Unsubscribed while registering; the forwarder ends once this is removed
            tracing::debug!(user_id = self.user_id, room_id = msg.room_id, "dropping cancelled subscription");
            let registry = self.registry.clone();
            actix::spawn(async move {
                registry
                    .remove_subscriber(&room_channel(msg.room_id), msg.subscriber_id)
                    .await;
            });
            return;
        }
        tracing::debug!(user_id = self.user_id, room_id = msg.room_id, "subscribed to room");
        Self::send_frame(ctx, &ack("subscribe", msg.room_id, None));
    }
}

impl Handler<SubscribeRefused> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: SubscribeRefused, ctx: &mut Self::Context) {
        self.subscriptions.refuse(msg.room_id);
        if !msg.frame.is_empty() {
            ctx.text(msg.frame);
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => self.handle_frame(frame, ctx),
                    Err(e) => {
                        tracing::warn!(user_id = self.user_id, error = %e, "failed to parse ws frame");
                        Self::send_frame(
                            ctx,
                            &ServerFrame::Error {
                                code: "invalid_frame".to_string(),
                                message: e.to_string(),
                            },
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("binary websocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(user_id = self.user_id, ?reason, "websocket close received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(user_id = self.user_id, error = %e, "websocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// GET /ws/chat?userId=..
async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, Error> {
    if query.user_id <= 0 {
        return Ok(HttpResponse::BadRequest().finish());
    }

    let session = WsSession::new(query.user_id, state.chat.clone(), state.registry.clone());
    ws::start(session, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frames_parse() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe","roomId":4}"#).unwrap();
        assert_eq!(frame, ClientFrame::Subscribe { room_id: 4 });

        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"send","roomId":4,"content":"hi","messageType":"IMAGE"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ClientFrame::Send {
                room_id: 4,
                content: "hi".to_string(),
                message_type: Some("IMAGE".to_string()),
            }
        );
    }

    #[test]
    fn test_unknown_frame_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"typing","roomId":1}"#).is_err());
    }

    #[test]
    fn test_subscription_lifecycle() {
        let mut subs = RoomSubscriptions::default();
        let id = SubscriberId::new();

        assert!(subs.begin(4));
        assert!(!subs.begin(4));
        assert!(subs.confirm(4, id));
        assert!(!subs.begin(4));
        assert_eq!(subs.len(), 1);

        assert_eq!(subs.cancel(4), Some(id));
        assert_eq!(subs.len(), 0);
        assert!(subs.begin(4));
    }

    #[test]
    fn test_unsubscribe_while_pending_drops_late_registration() {
        let mut subs = RoomSubscriptions::default();

        assert!(subs.begin(7));
        assert_eq!(subs.cancel(7), None);
        assert!(!subs.confirm(7, SubscriberId::new()));
        assert_eq!(subs.len(), 0);
        assert!(subs.drain().is_empty());
    }

    #[test]
    fn test_refused_subscription_can_retry() {
        let mut subs = RoomSubscriptions::default();

        assert!(subs.begin(9));
        subs.refuse(9);
        assert!(subs.begin(9));
    }

    #[test]
    fn test_error_frame_uses_error_kind() {
        let frame = error_frame(&AppError::Conflict("closed".to_string()));
        let json = serde_json::to_value(frame).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "conflict");
    }
}
