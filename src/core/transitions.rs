//! Like/response state machine for match edges.
//!
//! Edges move PENDING -> MATCHED | REJECTED, or are deleted while PENDING.
//! The functions here only decide what to do given the edges currently stored
//! for a pair; the stores carry the decision out inside one pair-scoped unit
//! of work so that concurrent likes converge on a single outcome.

use crate::models::{MatchEdge, MatchId, MatchStatus, UserId};

/// What a like from `from` to `to` does to the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTransition {
    /// An edge from -> to already exists, nothing changes
    AlreadyLiked { existing: MatchId },
    /// The mirror edge is live: mark it MATCHED and insert the new edge MATCHED
    Match { mirror: MatchId },
    /// Insert the new edge as PENDING
    Pending,
}

pub fn plan_like(forward: Option<&MatchEdge>, mirror: Option<&MatchEdge>) -> LikeTransition {
    if let Some(edge) = forward {
        return LikeTransition::AlreadyLiked { existing: edge.id };
    }

    match mirror {
        Some(edge) if matches!(edge.status, MatchStatus::Pending | MatchStatus::Matched) => {
            LikeTransition::Match { mirror: edge.id }
        }
        // A rejected mirror stays rejected; the new like waits for an explicit answer
        _ => LikeTransition::Pending,
    }
}

/// What answering a pending request does to the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondTransition {
    /// Edge becomes MATCHED; the mirror is updated when present, inserted otherwise
    Accept { mirror: Option<MatchId> },
    /// Edge becomes REJECTED; the mirror is left alone
    Reject,
}

/// Why a response was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondRefusal {
    NotRecipient,
    AlreadyResolved(MatchStatus),
}

pub fn plan_respond(
    edge: &MatchEdge,
    responder: UserId,
    accept: bool,
    mirror: Option<&MatchEdge>,
) -> Result<RespondTransition, RespondRefusal> {
    if edge.to_user_id != responder {
        return Err(RespondRefusal::NotRecipient);
    }
    if edge.status != MatchStatus::Pending {
        return Err(RespondRefusal::AlreadyResolved(edge.status));
    }

    if accept {
        Ok(RespondTransition::Accept {
            mirror: mirror.map(|m| m.id),
        })
    } else {
        Ok(RespondTransition::Reject)
    }
}
