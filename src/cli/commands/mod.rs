//! CLI command implementations.

mod auth;
mod config;
mod inspect;
mod leader;
mod start;

pub use auth::{run_auth, AuthArgs};
pub use config::{run_config, ConfigArgs};
pub use inspect::{run_inspect, InspectArgs};
pub use leader::{run_leader, LeaderArgs};
pub use start::{init_tracing, run_start_with_config, StartArgs};
