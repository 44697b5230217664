//! Discovered-subnet model.
//!
//! Discovery hands the manager a set of nodes, their physical ports and
//! the end-ports built on top of them. The graph is cyclic (a physical
//! port knows its link peer, which knows it back), so nodes live in an
//! arena indexed by [`NodeIndex`] and all cross-references are index
//! pairs rather than pointers.

use ibsm_types::{Guid, Lid, Lmc, PortInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Subnet-wide option block consumed by the LID manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetConfig {
    /// LID Mask Control: every LMC-capable port gets `2^lmc` LIDs.
    pub lmc: Lmc,
    /// On the first master sweep, ignore persistent and discovered
    /// assignments entirely and renumber from scratch.
    pub reassign_lids: bool,
    /// When coming out of standby, reload the on-disk guid2lid file
    /// instead of starting clean.
    pub honor_guid2lid_file: bool,
    /// Treat a failed guid2lid restore during init as fatal.
    pub exit_on_fatal: bool,
    /// Never set the ClientReregister bit.
    pub no_clients_rereg: bool,
    pub m_key: u64,
    pub subnet_prefix: u64,
    pub m_key_lease_period: u16,
    /// 5-bit SubnetTimeout exponent written to every port.
    pub subnet_timeout: u8,
    pub local_phy_errors_threshold: u8,
    pub overrun_errors_threshold: u8,
}

impl Default for SubnetConfig {
    fn default() -> Self {
        SubnetConfig {
            lmc: Lmc::default(),
            reassign_lids: false,
            honor_guid2lid_file: false,
            exit_on_fatal: true,
            no_clients_rereg: false,
            m_key: 0,
            subnet_prefix: 0xFE80_0000_0000_0000,
            m_key_lease_period: 0,
            subnet_timeout: 0x12,
            local_phy_errors_threshold: 0x08,
            overrun_errors_threshold: 0x08,
        }
    }
}

/// Index of a node in the subnet arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(usize);

/// Address of a physical port: owning node plus port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysPortId {
    pub node: NodeIndex,
    pub port_num: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Ca,
    Switch {
        /// Enhanced switch port 0 accepts a full LMC range; a base
        /// switch port 0 accepts exactly one LID.
        enhanced_sp0: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub guid: Guid,
    pub kind: NodeKind,
    pub description: String,
    physps: Vec<PhysPort>,
}

impl Node {
    pub fn is_switch(&self) -> bool {
        matches!(self.kind, NodeKind::Switch { .. })
    }

    /// True when LMC applies to this node's switch port 0.
    pub fn sp0_is_lmc_capable(&self) -> bool {
        matches!(self.kind, NodeKind::Switch { enhanced_sp0: true })
    }

    pub fn physp(&self, port_num: u8) -> Option<&PhysPort> {
        self.physps.iter().find(|p| p.port_num == port_num)
    }

    pub fn physp_mut(&mut self, port_num: u8) -> Option<&mut PhysPort> {
        self.physps.iter_mut().find(|p| p.port_num == port_num)
    }
}

/// A physical port with its last-observed PortInfo and link peer.
#[derive(Debug, Clone)]
pub struct PhysPort {
    pub port_num: u8,
    pub port_guid: Guid,
    /// Last PortInfo observed by discovery (or applied from an ack).
    pub port_info: PortInfo,
    pub remote: Option<PhysPortId>,
}

/// An end-port: the LID-addressable endpoint discovery found.
///
/// For a channel adapter each active physical port is an end-port; for a
/// switch only port 0 is.
#[derive(Debug, Clone)]
pub struct Port {
    pub guid: Guid,
    pub node: NodeIndex,
    pub port_num: u8,
    /// Set by discovery when the port was not seen on the previous
    /// sweep; triggers client reregistration.
    pub is_new: bool,
}

/// The discovered subnet plus the SM-role flags the sweep logic needs.
#[derive(Debug)]
pub struct Subnet {
    pub config: SubnetConfig,
    nodes: Vec<Node>,
    ports: BTreeMap<Guid, Port>,
    /// LID → owning end-port, rebuilt every sweep. Slot 0 is a sentinel.
    port_lid_tbl: Vec<Option<Guid>>,
    pub sm_port_guid: Guid,
    pub master_sm_base_lid: Lid,
    pub sm_base_lid: Lid,
    pub first_time_master_sweep: bool,
    pub coming_out_of_standby: bool,
    pub max_unicast_lid: Lid,
}

impl Subnet {
    pub fn new(config: SubnetConfig) -> Self {
        Subnet {
            config,
            nodes: Vec::new(),
            ports: BTreeMap::new(),
            port_lid_tbl: Vec::new(),
            sm_port_guid: Guid::ZERO,
            master_sm_base_lid: Lid::ZERO,
            sm_base_lid: Lid::ZERO,
            first_time_master_sweep: false,
            coming_out_of_standby: false,
            max_unicast_lid: Lid::UCAST_END,
        }
    }

    pub fn add_node(
        &mut self,
        guid: Guid,
        kind: NodeKind,
        description: impl Into<String>,
    ) -> NodeIndex {
        self.nodes.push(Node {
            guid,
            kind,
            description: description.into(),
            physps: Vec::new(),
        });
        NodeIndex(self.nodes.len() - 1)
    }

    pub fn add_physp(&mut self, node: NodeIndex, port_num: u8, port_guid: Guid, port_info: PortInfo) {
        self.nodes[node.0].physps.push(PhysPort {
            port_num,
            port_guid,
            port_info,
            remote: None,
        });
    }

    pub fn add_port(&mut self, guid: Guid, node: NodeIndex, port_num: u8, is_new: bool) {
        self.ports.insert(
            guid,
            Port {
                guid,
                node,
                port_num,
                is_new,
            },
        );
    }

    /// Records a link between two physical ports.
    pub fn link(&mut self, a: PhysPortId, b: PhysPortId) {
        if let Some(p) = self.physp_mut(a) {
            p.remote = Some(b);
        }
        if let Some(p) = self.physp_mut(b) {
            p.remote = Some(a);
        }
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.0]
    }

    pub fn port(&self, guid: Guid) -> Option<&Port> {
        self.ports.get(&guid)
    }

    pub fn port_mut(&mut self, guid: Guid) -> Option<&mut Port> {
        self.ports.get_mut(&guid)
    }

    /// All discovered end-port GUIDs in ascending order.
    pub fn port_guids(&self) -> Vec<Guid> {
        self.ports.keys().copied().collect()
    }

    pub fn num_ports(&self) -> usize {
        self.ports.len()
    }

    pub fn physp(&self, id: PhysPortId) -> Option<&PhysPort> {
        self.nodes.get(id.node.0).and_then(|n| n.physp(id.port_num))
    }

    pub fn physp_mut(&mut self, id: PhysPortId) -> Option<&mut PhysPort> {
        self.nodes
            .get_mut(id.node.0)
            .and_then(|n| n.physp_mut(id.port_num))
    }

    /// The physical port backing an end-port.
    pub fn port_physp(&self, port: &Port) -> Option<&PhysPort> {
        self.physp(PhysPortId {
            node: port.node,
            port_num: port.port_num,
        })
    }

    /// The base LID the port currently advertises, or zero.
    pub fn port_base_lid(&self, guid: Guid) -> Lid {
        self.port(guid)
            .and_then(|p| self.port_physp(p))
            .map(|physp| physp.port_info.base_lid)
            .unwrap_or(Lid::ZERO)
    }

    /// The LID range the port currently occupies according to its own
    /// advertised base LID and LMC. A base switch port 0 occupies a
    /// single LID regardless of the LMC it reports.
    pub fn discovered_lid_range(&self, guid: Guid) -> (Lid, Lid) {
        let Some(port) = self.port(guid) else {
            return (Lid::ZERO, Lid::ZERO);
        };
        let Some(physp) = self.port_physp(port) else {
            return (Lid::ZERO, Lid::ZERO);
        };
        let min = physp.port_info.base_lid;
        let lmc = if self.node(port.node).is_switch() && !self.node(port.node).sp0_is_lmc_capable()
        {
            0
        } else {
            physp.port_info.lmc
        };
        (min, Lid::new(min.value().saturating_add((1u16 << lmc) - 1)))
    }

    /// How many LIDs this port needs under the configured LMC.
    pub fn num_lids_for_port(&self, guid: Guid) -> u16 {
        match self.port(guid).map(|p| self.node(p.node).kind) {
            Some(NodeKind::Switch { enhanced_sp0: false }) => 1,
            _ => self.config.lmc.num_lids(),
        }
    }

    pub fn port_at_lid(&self, lid: Lid) -> Option<Guid> {
        self.port_lid_tbl.get(lid.as_usize()).copied().flatten()
    }

    /// Records `guid` as the owner of `lid`, growing the table as needed.
    pub fn set_port_at_lid(&mut self, lid: Lid, guid: Guid) {
        let index = lid.as_usize();
        if index >= self.port_lid_tbl.len() {
            self.port_lid_tbl.resize(index + 1, None);
        }
        self.port_lid_tbl[index] = Some(guid);
    }

    pub fn clear_port_at_lid(&mut self, lid: Lid) {
        if let Some(slot) = self.port_lid_tbl.get_mut(lid.as_usize()) {
            *slot = None;
        }
    }

    /// Empties every slot without shrinking the table.
    pub fn clear_port_lid_tbl(&mut self) {
        self.port_lid_tbl.fill(None);
    }

    /// Highest LID the table has a slot for (slot 0 is the sentinel).
    pub fn max_discovered_lid(&self) -> u16 {
        self.port_lid_tbl.len().saturating_sub(1) as u16
    }
}
