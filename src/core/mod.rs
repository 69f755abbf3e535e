// Core algorithm exports
pub mod distance;
pub mod filters;
pub mod preview;
pub mod scoring;
pub mod transitions;

pub use distance::{calculate_bounding_box, haversine_distance, is_within_bounding_box, round_km};
pub use filters::matches_filters;
pub use preview::{preview, resolve_message_type};
pub use scoring::{placeholder_score, random_score};
pub use transitions::{
    plan_like, plan_respond, LikeTransition, RespondRefusal, RespondTransition,
};
