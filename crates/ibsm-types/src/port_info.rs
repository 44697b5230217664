//! The PortInfo management attribute.
//!
//! [`PortInfo`] is the typed, unpacked form of the attribute: every
//! sub-byte field of the wire layout gets its own struct field so that
//! configuration diffing is plain field comparison rather than byte
//! `memcmp`. [`PortInfo::to_smp_payload`] packs it into the 64-byte SMP
//! data area in attribute byte order; [`PortInfo::from_smp_payload`] is
//! the inverse.

use crate::{Lid, ParseError};
use serde::{Deserialize, Serialize};

/// Size of the SMP data area carrying a PortInfo attribute.
pub const SMP_DATA_SIZE: usize = 64;

/// CapabilityMask bit: the port supports the ClientReregister mechanism.
pub const PORT_CAP_CLIENT_REREG: u32 = 0x0200_0000;

/// LinkDownDefaultState value requesting the polling state.
pub const LINK_DOWN_DEFAULT_POLLING: u8 = 2;

/// PortState values. `NoChange` doubles as "state not yet observed" for a
/// port whose PortInfo was never fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PortState {
    #[default]
    NoChange = 0,
    Down = 1,
    Init = 2,
    Armed = 3,
    Active = 4,
}

impl PortState {
    pub fn from_raw(value: u8) -> Result<Self, ParseError> {
        match value {
            0 => Ok(PortState::NoChange),
            1 => Ok(PortState::Down),
            2 => Ok(PortState::Init),
            3 => Ok(PortState::Armed),
            4 => Ok(PortState::Active),
            other => Err(ParseError::InvalidPortState(other)),
        }
    }
}

/// Unpacked PortInfo attribute.
///
/// Field order follows the attribute layout; packed nibbles and flag
/// bits are widened to their own fields. Reserved bits are dropped on
/// decode and written as zero on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortInfo {
    pub m_key: u64,
    pub subnet_prefix: u64,
    pub base_lid: Lid,
    pub master_sm_base_lid: Lid,
    pub capability_mask: u32,
    pub diag_code: u16,
    pub m_key_lease_period: u16,
    pub local_port_num: u8,
    pub link_width_enabled: u8,
    pub link_width_supported: u8,
    pub link_width_active: u8,
    pub link_speed_supported: u8,
    pub port_state: PortState,
    pub port_phys_state: u8,
    pub link_down_default_state: u8,
    pub m_key_protect_bits: u8,
    pub lmc: u8,
    pub link_speed_active: u8,
    pub link_speed_enabled: u8,
    pub neighbor_mtu: u8,
    pub master_sm_sl: u8,
    pub vl_cap: u8,
    pub init_type: u8,
    pub vl_high_limit: u8,
    pub vl_arb_high_cap: u8,
    pub vl_arb_low_cap: u8,
    pub init_type_reply: u8,
    pub mtu_cap: u8,
    pub vl_stall_count: u8,
    pub hoq_life: u8,
    pub op_vls: u8,
    pub partition_enforcement: u8,
    pub m_key_violations: u16,
    pub p_key_violations: u16,
    pub q_key_violations: u16,
    pub guid_cap: u8,
    pub client_rereg: bool,
    pub subnet_timeout: u8,
    pub resp_time_value: u8,
    pub local_phy_errors: u8,
    pub overrun_errors: u8,
    pub max_credit_hint: u16,
    pub link_rt_latency: u32,
}

impl PortInfo {
    /// Returns true if this port advertises ClientReregister support.
    pub const fn supports_client_rereg(&self) -> bool {
        self.capability_mask & PORT_CAP_CLIENT_REREG != 0
    }

    /// Packs the attribute into SMP data-area byte order.
    pub fn to_smp_payload(&self) -> [u8; SMP_DATA_SIZE] {
        let mut b = [0u8; SMP_DATA_SIZE];
        b[0..8].copy_from_slice(&self.m_key.to_be_bytes());
        b[8..16].copy_from_slice(&self.subnet_prefix.to_be_bytes());
        b[16..18].copy_from_slice(&self.base_lid.value().to_be_bytes());
        b[18..20].copy_from_slice(&self.master_sm_base_lid.value().to_be_bytes());
        b[20..24].copy_from_slice(&self.capability_mask.to_be_bytes());
        b[24..26].copy_from_slice(&self.diag_code.to_be_bytes());
        b[26..28].copy_from_slice(&self.m_key_lease_period.to_be_bytes());
        b[28] = self.local_port_num;
        b[29] = self.link_width_enabled;
        b[30] = self.link_width_supported;
        b[31] = self.link_width_active;
        b[32] = (self.link_speed_supported << 4) | (self.port_state as u8 & 0x0F);
        b[33] = (self.port_phys_state << 4) | (self.link_down_default_state & 0x0F);
        b[34] = (self.m_key_protect_bits << 6) | (self.lmc & 0x07);
        b[35] = (self.link_speed_active << 4) | (self.link_speed_enabled & 0x0F);
        b[36] = (self.neighbor_mtu << 4) | (self.master_sm_sl & 0x0F);
        b[37] = (self.vl_cap << 4) | (self.init_type & 0x0F);
        b[38] = self.vl_high_limit;
        b[39] = self.vl_arb_high_cap;
        b[40] = self.vl_arb_low_cap;
        b[41] = (self.init_type_reply << 4) | (self.mtu_cap & 0x0F);
        b[42] = (self.vl_stall_count << 5) | (self.hoq_life & 0x1F);
        b[43] = (self.op_vls << 4) | (self.partition_enforcement & 0x0F);
        b[44..46].copy_from_slice(&self.m_key_violations.to_be_bytes());
        b[46..48].copy_from_slice(&self.p_key_violations.to_be_bytes());
        b[48..50].copy_from_slice(&self.q_key_violations.to_be_bytes());
        b[50] = self.guid_cap;
        b[51] = (u8::from(self.client_rereg) << 7) | (self.subnet_timeout & 0x1F);
        b[52] = self.resp_time_value & 0x1F;
        b[53] = (self.local_phy_errors << 4) | (self.overrun_errors & 0x0F);
        b[54..56].copy_from_slice(&self.max_credit_hint.to_be_bytes());
        b[56..60].copy_from_slice(&(self.link_rt_latency & 0x00FF_FFFF).to_be_bytes());
        b
    }

    /// Unpacks an attribute from SMP data-area byte order.
    pub fn from_smp_payload(b: &[u8; SMP_DATA_SIZE]) -> Result<Self, ParseError> {
        let u16_at = |i: usize| u16::from_be_bytes([b[i], b[i + 1]]);
        let u32_at = |i: usize| u32::from_be_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        let u64_at = |i: usize| {
            u64::from_be_bytes([
                b[i],
                b[i + 1],
                b[i + 2],
                b[i + 3],
                b[i + 4],
                b[i + 5],
                b[i + 6],
                b[i + 7],
            ])
        };

        Ok(PortInfo {
            m_key: u64_at(0),
            subnet_prefix: u64_at(8),
            base_lid: Lid::new(u16_at(16)),
            master_sm_base_lid: Lid::new(u16_at(18)),
            capability_mask: u32_at(20),
            diag_code: u16_at(24),
            m_key_lease_period: u16_at(26),
            local_port_num: b[28],
            link_width_enabled: b[29],
            link_width_supported: b[30],
            link_width_active: b[31],
            link_speed_supported: b[32] >> 4,
            port_state: PortState::from_raw(b[32] & 0x0F)?,
            port_phys_state: b[33] >> 4,
            link_down_default_state: b[33] & 0x0F,
            m_key_protect_bits: b[34] >> 6,
            lmc: b[34] & 0x07,
            link_speed_active: b[35] >> 4,
            link_speed_enabled: b[35] & 0x0F,
            neighbor_mtu: b[36] >> 4,
            master_sm_sl: b[36] & 0x0F,
            vl_cap: b[37] >> 4,
            init_type: b[37] & 0x0F,
            vl_high_limit: b[38],
            vl_arb_high_cap: b[39],
            vl_arb_low_cap: b[40],
            init_type_reply: b[41] >> 4,
            mtu_cap: b[41] & 0x0F,
            vl_stall_count: b[42] >> 5,
            hoq_life: b[42] & 0x1F,
            op_vls: b[43] >> 4,
            partition_enforcement: b[43] & 0x0F,
            m_key_violations: u16_at(44),
            p_key_violations: u16_at(46),
            q_key_violations: u16_at(48),
            guid_cap: b[50],
            client_rereg: b[51] & 0x80 != 0,
            subnet_timeout: b[51] & 0x1F,
            resp_time_value: b[52] & 0x1F,
            local_phy_errors: b[53] >> 4,
            overrun_errors: b[53] & 0x0F,
            max_credit_hint: u16_at(54),
            link_rt_latency: u32_at(56) & 0x00FF_FFFF,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> PortInfo {
        PortInfo {
            m_key: 0x1122_3344_5566_7788,
            subnet_prefix: 0xFE80_0000_0000_0000,
            base_lid: Lid::new(0x0014),
            master_sm_base_lid: Lid::new(0x0001),
            capability_mask: PORT_CAP_CLIENT_REREG,
            m_key_lease_period: 60,
            local_port_num: 1,
            link_width_enabled: 0x01,
            link_width_supported: 0x03,
            link_width_active: 0x01,
            link_speed_supported: 0x03,
            port_state: PortState::Active,
            port_phys_state: 5,
            link_down_default_state: LINK_DOWN_DEFAULT_POLLING,
            lmc: 2,
            neighbor_mtu: 4,
            master_sm_sl: 0,
            vl_cap: 4,
            mtu_cap: 4,
            op_vls: 4,
            guid_cap: 32,
            client_rereg: true,
            subnet_timeout: 0x12,
            resp_time_value: 0x10,
            local_phy_errors: 8,
            overrun_errors: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_lid_field_offsets() {
        let payload = sample().to_smp_payload();
        assert_eq!(&payload[16..18], &[0x00, 0x14]);
        assert_eq!(&payload[18..20], &[0x00, 0x01]);
    }

    #[test]
    fn test_packed_bytes() {
        let payload = sample().to_smp_payload();
        // LinkSpeedSupported nibble | PortState nibble.
        assert_eq!(payload[32], 0x34);
        // PortPhysicalState nibble | LinkDownDefaultState nibble.
        assert_eq!(payload[33], 0x52);
        // M_KeyProtectBits | LMC.
        assert_eq!(payload[34], 0x02);
        // NeighborMTU | MasterSMSL.
        assert_eq!(payload[36], 0x40);
        // ClientReregister bit | SubnetTimeout.
        assert_eq!(payload[51], 0x92);
        // LocalPhyErrors | OverrunErrors threshold nibbles.
        assert_eq!(payload[53], 0x88);
    }

    #[test]
    fn test_payload_round_trip() {
        let pi = sample();
        let decoded = PortInfo::from_smp_payload(&pi.to_smp_payload()).unwrap();
        assert_eq!(decoded, pi);
    }

    #[test]
    fn test_reject_bad_port_state() {
        let mut payload = sample().to_smp_payload();
        payload[32] = (payload[32] & 0xF0) | 0x07;
        assert_eq!(
            PortInfo::from_smp_payload(&payload),
            Err(ParseError::InvalidPortState(7))
        );
    }

    #[test]
    fn test_client_rereg_support() {
        assert!(sample().supports_client_rereg());
        let mut pi = sample();
        pi.capability_mask = 0;
        assert!(!pi.supports_client_rereg());
    }
}
