//! Pure membership logic for Zookeeper ensembles.
//!
//! This module models ensemble members and the set algebra used to diff the
//! observed pods against the last-known membership. It separates deciding
//! "which member changes" from "how the change is applied".
//!
//! ## Module Structure
//!
//! - [`member`]: member identity, addresses and join states
//! - [`member_set`]: the `MemberSet` type and its set operations
//! - [`planner`]: per-pass membership planning with `MembershipPlan`

pub mod member;
pub mod member_set;
pub mod planner;

use thiserror::Error;

use crate::client::parsing::ParseError;

pub use member::{JoinState, Member, member_name, parse_member_id};
pub use member_set::MemberSet;
pub use planner::{MembershipAction, MembershipPlan, plan_membership, quorum_size};

/// Errors raised by membership operations.
#[derive(Error, Debug)]
pub enum MembershipError {
    /// A member was picked from an empty set.
    #[error("cannot pick a member from an empty set")]
    EmptySet,

    /// A name does not follow `<clusterName>-<id>`.
    #[error("invalid member name: {0}")]
    InvalidName(String),

    /// No member ID is left above the current maximum.
    #[error("no member ID available above {0}")]
    IdsExhausted(u32),

    #[error("invalid ensemble config: {0}")]
    Config(#[from] ParseError),
}
