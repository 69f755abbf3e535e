// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    placeholder_user_name, placeholder_user_name_for, BoundingBox, ChatRoom, Gender, MatchEdge, MatchId, MatchStatus, Message, MessageId,
    MessageType, NewMessage, NewProfile, PetInfo, Profile, RoomId, UserId, UserInfo, UserPair,
};
pub use requests::{
    CandidateFilter, LikeRequest, LocationUpdate, ProfileRequest, RecentQuery, RespondRequest,
    RoomPairQuery, SendMessageRequest, StatusUpdate, UserQuery,
};
pub use responses::{
    CandidateView, ChatRoomView, DisplaySummary, ErrorResponse, HealthResponse, LocationView,
    MatchView, MessageView, PendingRequestView,
};
