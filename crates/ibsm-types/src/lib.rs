//! Common InfiniBand types for subnet management.
//!
//! This crate provides type-safe representations of the primitives used
//! throughout the subnet-management control plane:
//!
//! - [`Lid`]: 16-bit Local Identifiers and inclusive [`LidRange`]s
//! - [`Lmc`]: LID Mask Control and its alignment arithmetic
//! - [`Guid`]: 64-bit hardware-stable port/node identifiers
//! - [`PortInfo`]: the PortInfo management attribute with its 64-byte
//!   SMP wire layout

mod guid;
mod lid;
mod port_info;

pub use guid::Guid;
pub use lid::{Lid, LidRange, Lmc};
pub use port_info::{
    PortInfo, PortState, LINK_DOWN_DEFAULT_POLLING, PORT_CAP_CLIENT_REREG, SMP_DATA_SIZE,
};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid GUID format: {0}")]
    InvalidGuid(String),

    #[error("invalid LMC: {0} (must be 0-7)")]
    InvalidLmc(u8),

    #[error("invalid LID range: min 0x{0:04X} > max 0x{1:04X}")]
    InvalidLidRange(u16, u16),

    #[error("invalid port state: {0}")]
    InvalidPortState(u8),
}
