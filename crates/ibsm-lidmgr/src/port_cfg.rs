//! Per-port PortInfo configuration.
//!
//! Builds the PortInfo a port should be running with, diffs it field by
//! field against the last observed attribute and submits a Set request
//! only when something effective changed (or a full resync is forced).

use crate::subnet::{PhysPortId, Subnet};
use crate::transport::{MadContext, PortInfoSetRequest, PortInfoTransport};
use ibsm_types::{Guid, Lid, PortInfo, PortState, LINK_DOWN_DEFAULT_POLLING};
use tracing::{debug, warn};

/// Effective link MTU: the smaller of the two MTU caps on the link.
fn link_mtu(local: &PortInfo, remote: Option<&PortInfo>) -> u8 {
    remote
        .map_or(local.mtu_cap, |r| local.mtu_cap.min(r.mtu_cap))
        .max(1)
}

/// Effective operational VL count: the smaller of the two VL caps.
fn link_op_vls(local: &PortInfo, remote: Option<&PortInfo>) -> u8 {
    remote
        .map_or(local.vl_cap, |r| local.vl_cap.min(r.vl_cap))
        .max(1)
}

/// Configures the physical port behind the end-port `port_guid` with the
/// assigned base LID. Returns true if a PortInfo Set was submitted.
///
/// Non-zero switch ports are left alone entirely; the link-state manager
/// configures those later in the cycle.
pub(crate) fn configure_physp(
    subnet: &mut Subnet,
    port_guid: Guid,
    base_lid: Lid,
    transport: &mut dyn PortInfoTransport,
) -> bool {
    let Some(port) = subnet.port(port_guid) else {
        return false;
    };
    let node_idx = port.node;
    let port_num = port.port_num;
    let is_new = port.is_new;

    let node = subnet.node(node_idx);
    let node_guid = node.guid;
    let is_switch = node.is_switch();
    let sp0_lmc_capable = node.sp0_is_lmc_capable();
    let node_desc = node.description.clone();

    let Some(physp) = subnet.port_physp(port) else {
        return false;
    };
    let physp_guid = physp.port_guid;
    let old = physp.port_info;
    let remote_id = physp.remote;
    let remote_pi = remote_id.and_then(|id| subnet.physp(id)).map(|p| p.port_info);

    if is_switch && port_num != 0 {
        debug!("skipping switch port {port_num}, GUID {physp_guid}");
        return false;
    }

    let cfg = subnet.config.clone();
    let sm_base_lid = subnet.sm_base_lid;
    let first_sweep = subnet.first_time_master_sweep;

    let mut pi = old;
    let mut send_set = false;
    let mut reset_remote: Option<PhysPortId> = None;

    // Port physical state and port state are written as "no change";
    // the link-down default state is forced to polling.
    pi.port_phys_state = 0;
    pi.link_down_default_state = LINK_DOWN_DEFAULT_POLLING;
    pi.port_state = PortState::NoChange;
    if pi.link_down_default_state != old.link_down_default_state {
        send_set = true;
    }
    // Never saw a PortInfo reply from this port yet.
    if old.port_state == PortState::NoChange {
        send_set = true;
    }

    pi.m_key = cfg.m_key;
    if pi.m_key != old.m_key {
        send_set = true;
    }
    pi.subnet_prefix = cfg.subnet_prefix;
    if pi.subnet_prefix != old.subnet_prefix {
        send_set = true;
    }
    pi.base_lid = base_lid;
    if pi.base_lid != old.base_lid {
        send_set = true;
    }
    pi.master_sm_base_lid = sm_base_lid;
    if pi.master_sm_base_lid != old.master_sm_base_lid {
        send_set = true;
    }
    pi.m_key_lease_period = cfg.m_key_lease_period;
    if pi.m_key_lease_period != old.m_key_lease_period {
        send_set = true;
    }
    pi.subnet_timeout = cfg.subnet_timeout;
    if pi.subnet_timeout != old.subnet_timeout {
        send_set = true;
    }

    if port_num != 0 {
        // A CA port or a router port; switch port 0 is handled below.
        pi.link_width_enabled = old.link_width_supported;
        if pi.link_width_enabled != old.link_width_enabled {
            send_set = true;
        }

        // M_KeyProtectBits are always zero.
        pi.m_key_protect_bits = 0;
        pi.lmc = cfg.lmc.value();
        if pi.m_key_protect_bits != old.m_key_protect_bits || pi.lmc != old.lmc {
            send_set = true;
        }

        let mtu = link_mtu(&old, remote_pi.as_ref());
        pi.neighbor_mtu = mtu;
        if pi.neighbor_mtu != old.neighbor_mtu {
            send_set = true;
        }

        let op_vls = link_op_vls(&old, remote_pi.as_ref());
        pi.op_vls = op_vls;
        if pi.op_vls != old.op_vls {
            send_set = true;
        }

        pi.local_phy_errors = cfg.local_phy_errors_threshold;
        pi.overrun_errors = cfg.overrun_errors_threshold;
        if pi.local_phy_errors != old.local_phy_errors
            || pi.overrun_errors != old.overrun_errors
        {
            send_set = true;
        }

        // An MTU or VL change only takes effect after the port state
        // machine restarts, so request a transition through Down. The
        // peer will follow into Init; pre-set its cached state so the
        // next sweep is not surprised.
        if mtu != old.neighbor_mtu || op_vls != old.op_vls {
            debug!(
                "sending link down to GUID {physp_guid} port {port_num} due to op_vls or mtu \
                 change: mtu {}->{mtu} op_vls {}->{op_vls}",
                old.neighbor_mtu, old.op_vls
            );
            reset_remote = remote_id;
            pi.port_state = PortState::Down;
            if pi.port_state != old.port_state {
                send_set = true;
            }
        }
    } else {
        // Switch port 0. NeighborMTU is only meaningful for an enhanced
        // SP0; set it from the port's own MTU cap.
        pi.neighbor_mtu = old.mtu_cap;
        if pi.neighbor_mtu != old.neighbor_mtu {
            send_set = true;
        }
        debug!(
            "updating neighbor_mtu on switch GUID {physp_guid} port 0 to {}",
            pi.neighbor_mtu
        );

        if sp0_lmc_capable {
            pi.m_key_protect_bits = 0;
            pi.lmc = cfg.lmc.value();
            if pi.m_key_protect_bits != old.m_key_protect_bits || pi.lmc != old.lmc {
                send_set = true;
            }
        }
    }

    // Ports that just appeared (or every port on the first master sweep)
    // are told to reregister their SA subscriptions.
    if (first_sweep || is_new) && !cfg.no_clients_rereg && old.supports_client_rereg() {
        debug!("setting client rereg on {node_desc}, port {port_num}");
        pi.client_rereg = true;
        send_set = true;
    } else {
        pi.client_rereg = false;
    }

    // A freshly mastered SM resyncs every port unconditionally.
    if first_sweep {
        send_set = true;
    }

    if let Some(remote) = reset_remote {
        // The remote side may be unresponsive; its cached state is all
        // we can update here.
        if let Some(rp) = subnet.physp_mut(remote) {
            rp.port_info.port_state = PortState::Init;
        }
    }

    if send_set {
        let req = PortInfoSetRequest {
            context: MadContext {
                node_guid,
                port_guid: physp_guid,
                set_method: true,
            },
            port_num,
            payload: pi.to_smp_payload(),
        };
        if let Err(e) = transport.submit_port_info_set(&req) {
            warn!("port info set to GUID {physp_guid} port {port_num} failed: {e}");
        }
    }

    send_set
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_link_params_take_min_of_caps() {
        let local = PortInfo {
            mtu_cap: 4,
            vl_cap: 4,
            ..Default::default()
        };
        let remote = PortInfo {
            mtu_cap: 2,
            vl_cap: 8,
            ..Default::default()
        };
        assert_eq!(link_mtu(&local, Some(&remote)), 2);
        assert_eq!(link_op_vls(&local, Some(&remote)), 4);
    }

    #[test]
    fn test_link_params_without_peer() {
        let local = PortInfo {
            mtu_cap: 4,
            vl_cap: 0,
            ..Default::default()
        };
        assert_eq!(link_mtu(&local, None), 4);
        // Clamped: zero VLs is never a legal operational value.
        assert_eq!(link_op_vls(&local, None), 1);
    }
}
