//! The LID manager: sweep orchestration, persistent-map validation and
//! per-port LID resolution.

use crate::error::LidMgrResult;
use crate::lid_space::{FreeRange, FreeRangeList, UsedLids};
use crate::port_cfg;
use crate::store::Guid2Lid;
use crate::subnet::Subnet;
use crate::transport::PortInfoTransport;
use ibsm_types::{Guid, Lid, LidRange};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Outcome of a sweep operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Nothing was sent; the sweep is complete.
    Done,
    /// PortInfo Set requests went out; asynchronous replies are still
    /// outstanding.
    DonePending,
}

/// The state the manager shares with the rest of the subnet manager:
/// the subnet object and the persistent guid2lid domain. Everything
/// here is touched only under the exclusive lock.
#[derive(Debug)]
pub struct SmState {
    pub subnet: Subnet,
    pub guid2lid: Guid2Lid,
}

impl SmState {
    pub fn new(subnet: Subnet, guid2lid: Guid2Lid) -> Self {
        SmState { subnet, guid2lid }
    }

    pub fn into_shared(self) -> SharedSmState {
        Arc::new(Mutex::new(self))
    }
}

/// Shared handle to the lockable subnet-manager state.
pub type SharedSmState = Arc<Mutex<SmState>>;

/// Clamps a LID to the unicast space; anything outside maps to zero.
fn trim_lid(lid: Lid) -> Lid {
    if lid.is_unicast() {
        lid
    } else {
        Lid::ZERO
    }
}

/// The LID manager.
///
/// Owns the occupancy tables ([`UsedLids`], [`FreeRangeList`]) outright
/// and borrows the shared subnet + guid2lid state under the exclusive
/// lock for the duration of each sweep operation.
pub struct LidMgr {
    state: SharedSmState,
    used_lids: UsedLids,
    free_ranges: FreeRangeList,
    send_set_reqs: bool,
    transport: Box<dyn PortInfoTransport + Send>,
}

impl LidMgr {
    /// Builds the manager and primes it from the persistent store.
    ///
    /// Unless LIDs are being reassigned wholesale, the guid2lid domain
    /// is restored from disk and cross-checked against the current LMC;
    /// entries that are misaligned, overlapping or out of range are
    /// dropped. A restore failure is fatal only under `exit_on_fatal`.
    pub fn new(
        state: SharedSmState,
        transport: Box<dyn PortInfoTransport + Send>,
    ) -> LidMgrResult<Self> {
        let mut mgr = LidMgr {
            state: Arc::clone(&state),
            used_lids: UsedLids::new(),
            free_ranges: FreeRangeList::new(),
            send_set_reqs: false,
            transport,
        };

        let mut guard = state.lock();
        let st = &mut *guard;
        if !st.subnet.config.reassign_lids {
            if let Err(e) = st.guid2lid.restore() {
                if st.subnet.config.exit_on_fatal {
                    error!("fatal: error restoring guid2lid persistent database: {e}");
                    return Err(e.into());
                }
                error!("error restoring guid2lid persistent database, starting empty: {e}");
            }
            mgr.validate_db(st);
        }
        drop(guard);

        Ok(mgr)
    }

    /// Read access to the current free-range list (primarily for
    /// inspection between sweep phases).
    pub fn free_ranges(&self) -> &FreeRangeList {
        &self.free_ranges
    }

    /// Drops persistent entries that cannot be honored under the current
    /// LMC and marks the surviving ones in the used-LIDs table.
    fn validate_db(&mut self, st: &mut SmState) {
        let lmc = st.subnet.config.lmc;
        let max_unicast = st.subnet.max_unicast_lid;

        for guid in st.guid2lid.guids() {
            let Some(range) = st.guid2lid.get(guid) else {
                error!("could not get lid range for guid {guid}");
                continue;
            };

            let mut lids_ok = true;
            if range.min > range.max
                || range.min.is_zero()
                || guid.is_zero()
                || range.max > max_unicast
            {
                error!("illegal LID range {range} for guid {guid}");
                lids_ok = false;
            } else if range.min != range.max && !lmc.is_aligned(range.min) {
                error!(
                    "LID range {range} for guid {guid} is not aligned according to mask 0x{:04X}",
                    lmc.mask()
                );
                lids_ok = false;
            } else if let Some(lid) = range.iter().find(|&lid| self.used_lids.get(lid).is_some())
            {
                error!("{lid} for guid {guid} was previously used");
                lids_ok = false;
            }

            if !lids_ok {
                st.guid2lid.delete(guid);
            } else {
                for lid in range.iter() {
                    self.used_lids.mark(lid, guid);
                }
            }
        }
    }

    /// Prepares the occupancy tables for one sweep: replays the standby
    /// policy, clears the LID-indexed tables and rebuilds the free-range
    /// list from the persistent map and the discovered topology.
    fn init_sweep(&mut self, st: &mut SmState) {
        // A manager that just left standby must not trust whatever
        // guid2lid state it accumulated while another SM was master.
        if st.subnet.coming_out_of_standby {
            st.guid2lid.clear();
            self.used_lids.clear_all();
            if st.subnet.config.honor_guid2lid_file {
                debug!("honoring guid2lid file when coming out of standby");
                if let Err(e) = st.guid2lid.restore() {
                    error!("error restoring guid2lid persistent database, ignoring it: {e}");
                }
                self.validate_db(st);
            } else {
                debug!("ignoring guid2lid file when coming out of standby");
            }
        }

        self.free_ranges.clear();
        st.subnet.clear_port_lid_tbl();

        let lmc = st.subnet.config.lmc;
        let max_unicast = st.subnet.max_unicast_lid.value();

        // First master sweep in reassignment mode: ignore all history
        // and offer the entire space as one free range.
        if st.subnet.first_time_master_sweep && st.subnet.config.reassign_lids {
            debug!("skipping all lids as we are reassigning them");
            self.free_ranges.push(FreeRange {
                min: Lid::UCAST_START,
                max: Lid::new(max_unicast - 1),
            });
            return;
        }

        // First pass: record where discovery saw every port, and drop
        // persistent entries a port has outgrown (an LMC increase
        // leaves the stored range too narrow or misaligned).
        for guid in st.subnet.port_guids() {
            let (disc_min, disc_max) = st.subnet.discovered_lid_range(guid);
            let disc_min = trim_lid(disc_min);
            let disc_max = trim_lid(disc_max);
            for lid in disc_min.value()..=disc_max.value() {
                st.subnet.set_port_at_lid(Lid::new(lid), guid);
            }

            if let Some(db_range) = st.guid2lid.get(guid) {
                let num_lids = st.subnet.num_lids_for_port(guid);
                if num_lids != 1
                    && (!lmc.is_aligned(db_range.min) || db_range.len() < num_lids)
                {
                    debug!(
                        "cleaning persistent entry for guid {guid} illegal range {db_range}"
                    );
                    st.guid2lid.delete(guid);
                    for lid in db_range.iter() {
                        self.used_lids.clear(lid);
                    }
                }
            }
        }

        // Second pass: walk the LID space and collect every stretch that
        // is neither persistently reserved nor parked under a discovered
        // port that will keep its spot.
        let max_defined = st.subnet.max_discovered_lid().max(self.used_lids.max_lid());
        let mut open: Option<FreeRange> = None;
        let mut lid: u16 = 1;
        while lid <= max_defined {
            let mut is_free = true;

            if self.used_lids.get(Lid::new(lid)).is_some() {
                debug!("0x{lid:04X} is not free: mapped by the persistent db");
                is_free = false;
            } else if let Some(guid) = st.subnet.port_at_lid(Lid::new(lid)) {
                if let Some(db_range) = st.guid2lid.get(guid) {
                    // The port will move to its persistent range; its
                    // discovered spot is up for grabs.
                    debug!(
                        "0x{lid:04X} is free: discovered but persistently mapped to {db_range}"
                    );
                } else {
                    let (disc_min, mut disc_max) = st.subnet.discovered_lid_range(guid);
                    let num_lids = st.subnet.num_lids_for_port(guid);
                    if num_lids != 1 {
                        disc_max = disc_min.offset(num_lids - 1);
                    }

                    if num_lids != 1 && !lmc.is_aligned(disc_min) {
                        debug!("0x{lid:04X} is free: discovered but not aligned");
                    } else {
                        // The port keeps its advertised range unless any
                        // LID it needs is persistently reserved.
                        is_free = false;
                        for req in (disc_min.value() + 1)..=disc_max.value() {
                            if self.used_lids.get(Lid::new(req)).is_some() {
                                debug!(
                                    "0x{lid:04X} is free: discovered but its range is mapped"
                                );
                                is_free = true;
                                break;
                            }
                        }
                        if !is_free && disc_max.value() > lid {
                            // The whole range stays with the port; skip
                            // ahead, the LIDs in between need no checks.
                            lid = disc_max.value();
                        }
                    }
                }
            }

            if is_free {
                match &mut open {
                    Some(range) => range.max = Lid::new(lid),
                    None => {
                        open = Some(FreeRange {
                            min: Lid::new(lid),
                            max: Lid::new(lid),
                        })
                    }
                }
            } else if let Some(range) = open.take() {
                self.free_ranges.push(range);
            }
            lid += 1;
        }

        // Extend the trailing range (or start one past the last known
        // LID) up to the end of the assignable space.
        let tail_min = open.map_or(Lid::new(lid), |range| range.min);
        if tail_min.value() <= max_unicast - 1 {
            self.free_ranges.push(FreeRange {
                min: tail_min,
                max: Lid::new(max_unicast - 1),
            });
        }
    }

    /// Clears the port's previously discovered LIDs out of the LID
    /// table, leaving cells owned by other ports alone.
    fn cleanup_discovered_range(st: &mut SmState, port_guid: Guid) {
        let (disc_min, disc_max) = st.subnet.discovered_lid_range(port_guid);
        let disc_min = trim_lid(disc_min);
        let disc_max = trim_lid(disc_max);
        for lid in disc_min.value()..=disc_max.value() {
            if st.subnet.port_at_lid(Lid::new(lid)) == Some(port_guid) {
                st.subnet.clear_port_at_lid(Lid::new(lid));
            }
        }
    }

    /// Records a resolved assignment everywhere it must agree: the
    /// persistent map, the used-LIDs table and the LID-indexed port
    /// table. Stale cells from the port's old spot are dropped first.
    fn commit(&mut self, st: &mut SmState, port_guid: Guid, range: LidRange) {
        Self::cleanup_discovered_range(st, port_guid);
        st.guid2lid.set(port_guid, range);
        for lid in range.iter() {
            self.used_lids.mark(lid, port_guid);
            st.subnet.set_port_at_lid(lid, port_guid);
        }
    }

    /// Decides the LID range for one port.
    ///
    /// Preference order: the persistent assignment, then the base LID
    /// the port already advertises (if aligned and unreserved), then a
    /// fresh allocation from the free-range list. Returns the range and
    /// whether the port's base LID moved.
    ///
    /// # Panics
    ///
    /// Panics when the free-range list cannot satisfy a fresh
    /// allocation. Running out of unicast LIDs means the subnet outgrew
    /// the LID space and no further assignment is meaningful.
    fn resolve(&mut self, st: &mut SmState, port_guid: Guid) -> (LidRange, bool) {
        let lmc = st.subnet.config.lmc;
        let num_lids = st.subnet.num_lids_for_port(port_guid);

        // Persistent hit: the stored base wins, at the width the port
        // needs under the current LMC.
        if let Some(db_range) = st.guid2lid.get(port_guid) {
            let range = LidRange::new(db_range.min, db_range.min.offset(num_lids - 1));
            let changed = if db_range.min == st.subnet.port_base_lid(port_guid) {
                debug!("{port_guid} matches its known lid {}", db_range.min);
                false
            } else {
                debug!(
                    "{port_guid} with lid {} does not match its known lid {}",
                    st.subnet.port_base_lid(port_guid),
                    db_range.min
                );
                true
            };
            self.commit(st, port_guid, range);
            return (range, changed);
        }
        debug!("{port_guid} has no persistent lid assigned");

        // No history: keep the advertised base if policy and occupancy
        // allow. A base below the per-port LID count would mask to zero
        // under LMC, so it is never kept.
        let advertised = st.subnet.port_base_lid(port_guid);
        let renumbering =
            st.subnet.first_time_master_sweep && st.subnet.config.reassign_lids;
        if !advertised.is_zero() && !renumbering {
            if num_lids == 1 || lmc.is_aligned(advertised) {
                // The port's own stale reservations must not evict it.
                self.used_lids
                    .clear_owned_range(advertised, num_lids, port_guid);
                if advertised.value() >= num_lids
                    && self.used_lids.range_is_free(advertised, num_lids)
                {
                    let range = LidRange::new(advertised, advertised.offset(num_lids - 1));
                    debug!("{port_guid} lid range {range} is free");
                    self.commit(st, port_guid, range);
                    return (range, false);
                }
                debug!("{port_guid} existing lid range at {advertised} is not free");
            } else {
                debug!("{port_guid} existing lid range at {advertised} is not lmc aligned");
            }
        }

        // Fresh allocation from the free-range list.
        let Some(range) = self.free_ranges.find(num_lids, lmc) else {
            error!("out of unicast LIDs while assigning {port_guid}");
            panic!("out of unicast LIDs");
        };
        debug!("{port_guid} assigned a new lid range {range}");
        self.commit(st, port_guid, range);
        (range, true)
    }

    /// Assigns and configures the SM's own port.
    ///
    /// Runs the sweep initializer, resolves the SM port first so every
    /// subsequent PortInfo can carry the master SM LID, publishes that
    /// LID on the subnet object and pushes the port's configuration.
    #[instrument(skip(self))]
    pub fn process_sm(&mut self) -> Signal {
        let shared = Arc::clone(&self.state);
        let mut guard = shared.lock();
        let st = &mut *guard;

        self.init_sweep(st);
        self.send_set_reqs = false;

        let sm_guid = st.subnet.sm_port_guid;
        if st.subnet.port(sm_guid).is_none() {
            error!("cannot acquire SM's port object, GUID {sm_guid}");
            return Signal::Done;
        }

        let (range, _) = self.resolve(st, sm_guid);
        debug!("current SM base LID is {}", range.min);

        st.subnet.master_sm_base_lid = range.min;
        st.subnet.sm_base_lid = range.min;

        info!("assigning SM's port {sm_guid} to lid range {range}");
        if port_cfg::configure_physp(&mut st.subnet, sm_guid, range.min, self.transport.as_mut())
        {
            self.send_set_reqs = true;
        }

        if self.send_set_reqs {
            Signal::DonePending
        } else {
            Signal::Done
        }
    }

    /// Assigns and configures every port other than the SM's own, then
    /// flushes the guid2lid domain to disk.
    #[instrument(skip(self))]
    pub fn process_subnet(&mut self) -> Signal {
        let shared = Arc::clone(&self.state);
        let mut guard = shared.lock();
        let st = &mut *guard;

        self.send_set_reqs = false;
        let sm_guid = st.subnet.sm_port_guid;

        for guid in st.subnet.port_guids() {
            // The SM's port was assigned up front in process_sm().
            if guid == sm_guid {
                debug!("skipping our own port {guid}");
                continue;
            }

            let (range, _) = self.resolve(st, guid);
            debug!("assigned port {guid}, lid range {range}");
            if port_cfg::configure_physp(
                &mut st.subnet,
                guid,
                range.min,
                self.transport.as_mut(),
            ) {
                self.send_set_reqs = true;
            }
        }

        st.guid2lid.persist();

        if self.send_set_reqs {
            Signal::DonePending
        } else {
            Signal::Done
        }
    }
}
