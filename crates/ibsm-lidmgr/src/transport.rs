//! PortInfo Set transport seam.
//!
//! The manager never talks to the MAD layer directly; it hands fully
//! built requests to a [`PortInfoTransport`] implementation. Submission
//! is fire-and-forget: completion and timeout handling live behind the
//! seam, and the manager learns about outstanding work only through the
//! `DonePending` sweep signal.

use ibsm_types::{Guid, SMP_DATA_SIZE};
use thiserror::Error;

/// Errors a transport implementation can report at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),

    #[error("request timed out")]
    Timeout,
}

/// Completion-callback context carried alongside a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MadContext {
    pub node_guid: Guid,
    pub port_guid: Guid,
    /// True for Set requests (as opposed to light-sweep Gets).
    pub set_method: bool,
}

/// One PortInfo Set request, addressed by physical port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfoSetRequest {
    pub context: MadContext,
    /// Attribute modifier: the physical port number on the node.
    pub port_num: u8,
    /// The PortInfo attribute in SMP data-area byte order.
    pub payload: [u8; SMP_DATA_SIZE],
}

/// Non-blocking submission of PortInfo Set requests.
pub trait PortInfoTransport {
    fn submit_port_info_set(&mut self, req: &PortInfoSetRequest) -> Result<(), TransportError>;
}
