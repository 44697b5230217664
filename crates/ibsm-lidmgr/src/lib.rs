//! LID assignment manager.
//!
//! This crate implements the subsystem of the subnet manager that hands a
//! Local Identifier range to every port discovered on the subnet and
//! pushes the resulting configuration to the ports via PortInfo Set
//! requests.
//!
//! # Responsibilities
//!
//! - Reuse stable assignments across restarts through the persistent
//!   guid2lid database
//! - Keep or reassign port-advertised LIDs according to policy
//! - Guarantee subnet-wide LID uniqueness and LMC alignment
//! - Emit PortInfo updates only when effective settings actually change
//!
//! # Sweep flow
//!
//! A master sweep drives two entry points in order:
//!
//! 1. [`LidMgr::process_sm`]: rebuild the free-LID picture, assign the
//!    SM's own port first and publish its LID on the subnet object.
//! 2. [`LidMgr::process_subnet`]: assign every other port, then flush
//!    the guid2lid database.
//!
//! Both return [`Signal::DonePending`] when PortInfo Set requests went
//! out and asynchronous replies are still outstanding.

mod error;
mod lid_space;
mod mgr;
mod port_cfg;
mod store;
mod subnet;
mod transport;

pub use error::{LidMgrError, LidMgrResult};
pub use lid_space::{FreeRange, FreeRangeList, UsedLids};
pub use mgr::{LidMgr, Signal, SmState, SharedSmState};
pub use store::Guid2Lid;
pub use subnet::{Node, NodeIndex, NodeKind, PhysPort, PhysPortId, Port, Subnet, SubnetConfig};
pub use transport::{MadContext, PortInfoSetRequest, PortInfoTransport, TransportError};

pub use ibsm_db::{DbError, Guid2LidDb};
pub use ibsm_types::{
    Guid, Lid, LidRange, Lmc, PortInfo, PortState, LINK_DOWN_DEFAULT_POLLING,
    PORT_CAP_CLIENT_REREG, SMP_DATA_SIZE,
};
