//! Write-accepting front end.
//!
//! Every node runs one. If the gate holds a scheduler the write is served
//! locally, otherwise the caller is told where the leader lives.

use crate::client::log::PostResult;
use crate::core::error::VaultResult;
use crate::election::gate::WriteAuthorizationGate;
use crate::election::location::LocationRecord;
use crate::storage::frame::Frame;
use std::sync::Arc;

/// What happened to a posted write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was appended by this node.
    Accepted(PostResult),
    /// This node is not the leader; retry against `leader`.
    Forward { leader: Option<String> },
}

/// Routes writes through the authorization gate.
#[derive(Clone)]
pub struct WriteFrontEnd {
    gate: WriteAuthorizationGate,
    location: Arc<dyn LocationRecord>,
}

impl WriteFrontEnd {
    /// Create a front end reading `gate` and `location`.
    pub fn new(gate: WriteAuthorizationGate, location: Arc<dyn LocationRecord>) -> Self {
        Self { gate, location }
    }

    /// Post `frames` to `stream` if this node is leader.
    pub async fn post(&self, stream: &str, frames: Vec<Frame>) -> VaultResult<WriteOutcome> {
        if let Some(writer) = self.gate.current() {
            match writer.submit(stream, frames).await {
                Ok(posted) => return Ok(WriteOutcome::Accepted(posted)),
                Err(e) if e.should_forward() => {
                    tracing::debug!(stream = %stream, "writer already shut down, forwarding");
                }
                Err(e) => return Err(e),
            }
        }

        let leader = self.location.read().await?;
        Ok(WriteOutcome::Forward { leader })
    }
}
