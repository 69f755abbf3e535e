// Service exports
pub mod candidates;
pub mod chat;
pub mod directory;
pub mod display;
pub mod match_engine;
pub mod notifications;
pub mod provisioner;
pub mod realtime;

pub use candidates::CandidateFinder;
pub use chat::ChatService;
pub use directory::{CachedDirectory, DirectoryError, HttpUserDirectory, OfflineDirectory, UserDirectory};
pub use display::DisplayResolver;
pub use match_engine::MatchEngine;
pub use notifications::{
    HttpNotificationSink, NoopNotificationSink, Notification, NotificationSink, NotifyError,
};
pub use provisioner::ProfileProvisioner;
pub use realtime::{
    build_broadcaster, room_channel, BroadcastError, ConnectionRegistry, LocalBroadcaster,
    RealtimeBroadcaster, RedisBroadcaster, ServerFrame, SubscriberId,
};
