//! Request-facing surface of a node.
//!
//! - [`front_end`] - Routes writes to the local scheduler or the leader
//! - [`auth`] - User and claim store

pub mod auth;
pub mod front_end;

pub use auth::{Access, AuthData, UserInfo};
pub use front_end::{WriteFrontEnd, WriteOutcome};
