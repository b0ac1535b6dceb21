//! Flow Registry
//!
//! One [`Flow`] per application-level conversation: a call (CS domain, CC
//! sub-record) or a packet flow (PS domain, SM sub-record). The registry
//! owns every flow together with the identifier pools they draw from.
//!
//! # Identifier pools
//!
//! | Pool | Values | Used by |
//! |------|--------|---------|
//! | mobile-originated TI | 0..=6 | flows started by the UE |
//! | network-originated TI | 0..=6 | flows started by the network |
//! | NSAPI | 5..=15 | PS flows |
//!
//! Every identifier is returned to its pool exactly once, when the flow is
//! released.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use bitvec::prelude::*;
use bytes::Bytes;
use tracing::{debug, error};
use umtsim_common::{CnDomain, FlowClassifier, FlowDirection, FlowParams, QosDescriptor, SimTime};
use umtsim_l3::{ProtocolDiscriminator, TransactionId};

use crate::app::AppId;
use crate::lower::RbId;
use crate::nas::{CcCall, MmConnKey, SmContext, SmState};
use crate::rrc::Rrc;
use crate::services::UeServices;
use crate::timer::TimerCore;

/// First NSAPI available to PDP contexts; 0..=4 are reserved
pub const FIRST_NSAPI: u8 = 5;
/// Last NSAPI
pub const LAST_NSAPI: u8 = 15;

/// Registry key of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowId(pub u32);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Identifier pool
// ============================================================================

/// Fixed range of small identifiers backed by a bitset.
///
/// ```
/// use umtsim_ue::flow::IdPool;
///
/// let mut pool = IdPool::new(5, 6);
/// assert_eq!(pool.allocate(), Some(5));
/// assert_eq!(pool.allocate(), Some(6));
/// assert_eq!(pool.allocate(), None);
/// pool.release(5);
/// assert!(pool.claim(5));
/// ```
#[derive(Debug, Clone)]
pub struct IdPool {
    first: u8,
    used: BitVec<u8, Lsb0>,
}

impl IdPool {
    pub fn new(first: u8, last: u8) -> Self {
        Self {
            first,
            used: bitvec![u8, Lsb0; 0; usize::from(last - first) + 1],
        }
    }

    /// Takes the lowest free identifier.
    pub fn allocate(&mut self) -> Option<u8> {
        let index = self.used.first_zero()?;
        self.used.set(index, true);
        Some(self.first + index as u8)
    }

    /// Takes a specific identifier. Returns false if it is out of range or
    /// already in use.
    pub fn claim(&mut self, id: u8) -> bool {
        match self.index(id) {
            Some(i) if !self.used[i] => {
                self.used.set(i, true);
                true
            }
            _ => false,
        }
    }

    /// Returns an identifier to the pool.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not allocated.
    pub fn release(&mut self, id: u8) {
        match self.index(id) {
            Some(i) if self.used[i] => self.used.set(i, false),
            _ => {
                error!("Identifier {} released but not allocated", id);
                panic!("identifier {id} released but not allocated");
            }
        }
    }

    pub fn in_use(&self, id: u8) -> bool {
        self.index(id).is_some_and(|i| self.used[i])
    }

    pub fn used_count(&self) -> usize {
        self.used.count_ones()
    }

    fn index(&self, id: u8) -> Option<usize> {
        id.checked_sub(self.first)
            .map(usize::from)
            .filter(|i| *i < self.used.len())
    }
}

// ============================================================================
// Flow
// ============================================================================

/// Protocol sub-record of a flow.
#[derive(Debug)]
pub enum FlowProto {
    Cc(CcCall),
    Sm(SmContext),
}

impl FlowProto {
    pub fn domain(&self) -> CnDomain {
        match self {
            FlowProto::Cc(_) => CnDomain::Cs,
            FlowProto::Sm(_) => CnDomain::Ps,
        }
    }

    pub fn pd(&self) -> ProtocolDiscriminator {
        match self {
            FlowProto::Cc(_) => ProtocolDiscriminator::Cc,
            FlowProto::Sm(_) => ProtocolDiscriminator::Sm,
        }
    }

    fn cancel_timers(&mut self, timers: &mut TimerCore) {
        match self {
            FlowProto::Cc(call) => call.cancel_timers(timers),
            FlowProto::Sm(ctx) => ctx.cancel_timers(timers),
        }
    }
}

/// One application flow.
#[derive(Debug)]
pub struct Flow {
    pub id: FlowId,
    pub direction: FlowDirection,
    ti: u8,
    pub nsapi: Option<u8>,
    pub classifier: Option<FlowClassifier>,
    pub qos: QosDescriptor,
    /// Radio access bearer assigned by the network
    pub rab_id: Option<u8>,
    /// Radio bearer carrying the RAB once RRC has configured it
    pub rb: Option<RbId>,
    pub last_active: SimTime,
    buffer: VecDeque<Bytes>,
    pub proto: FlowProto,
}

impl Flow {
    pub fn domain(&self) -> CnDomain {
        self.proto.domain()
    }

    pub fn pd(&self) -> ProtocolDiscriminator {
        self.proto.pd()
    }

    /// Transaction identifier value.
    pub fn ti(&self) -> u8 {
        self.ti
    }

    /// Transaction identifier as the UE sends it: the flag is set when the
    /// network originated the transaction.
    pub fn ti_sent(&self) -> TransactionId {
        TransactionId::new(self.ti, self.direction == FlowDirection::NetworkOriginated)
    }

    pub fn mm_key(&self) -> MmConnKey {
        MmConnKey::new(self.pd(), self.ti_sent())
    }

    pub fn cc(&self) -> Option<&CcCall> {
        match &self.proto {
            FlowProto::Cc(call) => Some(call),
            FlowProto::Sm(_) => None,
        }
    }

    /// CC sub-record of a flow known to be a call.
    ///
    /// # Panics
    ///
    /// Panics if the flow carries an SM context.
    pub fn cc_mut(&mut self) -> &mut CcCall {
        match &mut self.proto {
            FlowProto::Cc(call) => call,
            FlowProto::Sm(_) => {
                error!("Flow {} has no CC sub-record", self.id);
                panic!("flow {} has no CC sub-record", self.id);
            }
        }
    }

    pub fn sm(&self) -> Option<&SmContext> {
        match &self.proto {
            FlowProto::Sm(ctx) => Some(ctx),
            FlowProto::Cc(_) => None,
        }
    }

    /// SM sub-record of a flow known to be a PDP context.
    ///
    /// # Panics
    ///
    /// Panics if the flow carries a call.
    pub fn sm_mut(&mut self) -> &mut SmContext {
        match &mut self.proto {
            FlowProto::Sm(ctx) => ctx,
            FlowProto::Cc(_) => {
                error!("Flow {} has no SM sub-record", self.id);
                panic!("flow {} has no SM sub-record", self.id);
            }
        }
    }

    pub fn app_id(&self) -> Option<AppId> {
        self.cc().map(|c| c.app_id)
    }

    /// Binds the flow to a radio access bearer, picking up the radio bearer
    /// if RRC already configured it.
    pub fn bind_rab(&mut self, rab_id: u8, rrc: &Rrc) {
        self.rab_id = Some(rab_id);
        self.rb = rrc.rb_for_rab(rab_id);
        debug!("Flow {} bound to RAB {} ({:?})", self.id, rab_id, self.rb);
    }

    /// Queues a payload, dropping the oldest one when the buffer is full.
    /// Returns true if a packet was dropped.
    pub fn buffer_push(&mut self, data: Bytes, capacity: usize) -> bool {
        let dropped = if self.buffer.len() >= capacity {
            self.buffer.pop_front();
            true
        } else {
            false
        };
        self.buffer.push_back(data);
        dropped
    }

    /// Empties the buffer, oldest packet first.
    pub fn take_buffer(&mut self) -> VecDeque<Bytes> {
        std::mem::take(&mut self.buffer)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// PS flows selected by a periodic sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepResult {
    /// Active contexts idle for too long
    pub deactivate: Vec<FlowId>,
    /// Rejected contexts old enough to be forgotten
    pub purge: Vec<FlowId>,
}

/// Owner of every flow of one UE.
#[derive(Debug)]
pub struct FlowRegistry {
    flows: BTreeMap<FlowId, Flow>,
    next_id: u32,
    mo_ti: IdPool,
    mt_ti: IdPool,
    nsapi: IdPool,
    buffer_capacity: usize,
    ps_idle_time: Duration,
    rejected_purge: Duration,
}

impl FlowRegistry {
    pub fn new(params: &FlowParams) -> Self {
        Self {
            flows: BTreeMap::new(),
            next_id: 1,
            mo_ti: IdPool::new(0, TransactionId::MAX_VALUE),
            mt_ti: IdPool::new(0, TransactionId::MAX_VALUE),
            nsapi: IdPool::new(FIRST_NSAPI, LAST_NSAPI),
            buffer_capacity: params.buffer_capacity.max(1),
            ps_idle_time: Duration::from_millis(params.ps_idle_time_ms),
            rejected_purge: Duration::from_millis(params.rejected_purge_ms),
        }
    }

    fn ti_pool(&mut self, direction: FlowDirection) -> &mut IdPool {
        match direction {
            FlowDirection::MobileOriginated => &mut self.mo_ti,
            FlowDirection::NetworkOriginated => &mut self.mt_ti,
        }
    }

    /// Creates a flow.
    ///
    /// Mobile-originated flows draw their transaction identifier from the
    /// pool; network-originated flows pass the identifier the network chose
    /// in `ti`. PS flows also take an NSAPI. Returns `None` when an
    /// identifier is unavailable; nothing is allocated in that case.
    pub fn allocate(
        &mut self,
        direction: FlowDirection,
        domain: CnDomain,
        ti: Option<u8>,
        now: SimTime,
        make: impl FnOnce(FlowId) -> FlowProto,
    ) -> Option<FlowId> {
        let pool = self.ti_pool(direction);
        let ti = match ti {
            Some(value) => pool.claim(value).then_some(value)?,
            None => pool.allocate()?,
        };
        let nsapi = if domain == CnDomain::Ps {
            match self.nsapi.allocate() {
                Some(n) => Some(n),
                None => {
                    self.ti_pool(direction).release(ti);
                    return None;
                }
            }
        } else {
            None
        };

        let id = FlowId(self.next_id);
        self.next_id += 1;
        let proto = make(id);
        assert_eq!(proto.domain(), domain, "flow {id} created with a sub-record of the wrong domain");
        debug!("Flow {} allocated: {} {} TI {} NSAPI {:?}", id, domain, direction, ti, nsapi);
        self.flows.insert(
            id,
            Flow {
                id,
                direction,
                ti,
                nsapi,
                classifier: None,
                qos: QosDescriptor::default(),
                rab_id: None,
                rb: None,
                last_active: now,
                buffer: VecDeque::new(),
                proto,
            },
        );
        Some(id)
    }

    /// Removes a flow: cancels its timers, counts buffered payload as
    /// dropped and returns its identifiers to their pools.
    pub fn release(&mut self, id: FlowId, svc: &mut UeServices) -> Option<Flow> {
        let mut flow = self.flows.remove(&id)?;
        flow.proto.cancel_timers(&mut svc.timers);
        let dropped = flow.take_buffer().len() as u64;
        svc.stats.packets(flow.domain()).dropped += dropped;
        self.ti_pool(flow.direction).release(flow.ti);
        if let Some(nsapi) = flow.nsapi {
            self.nsapi.release(nsapi);
        }
        debug!("Flow {} released ({} packets dropped)", id, dropped);
        Some(flow)
    }

    pub fn get(&self, id: FlowId) -> Option<&Flow> {
        self.flows.get(&id)
    }

    pub fn get_mut(&mut self, id: FlowId) -> Option<&mut Flow> {
        self.flows.get_mut(&id)
    }

    pub fn contains(&self, id: FlowId) -> bool {
        self.flows.contains_key(&id)
    }

    /// Flow addressed by a received CC or SM message. The flag of a received
    /// identifier is set when the UE originated the transaction.
    pub fn by_ti(&self, pd: ProtocolDiscriminator, received: TransactionId) -> Option<FlowId> {
        let direction = if received.flag {
            FlowDirection::MobileOriginated
        } else {
            FlowDirection::NetworkOriginated
        };
        self.find(|f| f.pd() == pd && f.direction == direction && f.ti == received.value)
    }

    /// Flow owning an MM connection.
    pub fn by_key(&self, key: MmConnKey) -> Option<FlowId> {
        self.find(|f| f.mm_key() == key)
    }

    /// PS flow matching `classifier` in either direction.
    pub fn by_classifier(&self, classifier: &FlowClassifier) -> Option<FlowId> {
        let reversed = classifier.reversed();
        self.find(|f| f.classifier.is_some_and(|c| c == *classifier || c == reversed))
    }

    pub fn by_rab(&self, rab_id: u8) -> Option<FlowId> {
        self.find(|f| f.rab_id == Some(rab_id))
    }

    pub fn by_rb(&self, rb: RbId) -> Option<FlowId> {
        self.find(|f| f.rb == Some(rb))
    }

    pub fn by_app(&self, app_id: AppId) -> Option<FlowId> {
        self.find(|f| f.app_id() == Some(app_id))
    }

    fn find(&self, pred: impl Fn(&Flow) -> bool) -> Option<FlowId> {
        self.flows.values().find(|f| pred(f)).map(|f| f.id)
    }

    /// Identifiers of the flows of `domain`.
    pub fn ids_in(&self, domain: CnDomain) -> Vec<FlowId> {
        self.flows
            .values()
            .filter(|f| f.domain() == domain)
            .map(|f| f.id)
            .collect()
    }

    pub fn has_domain(&self, domain: CnDomain) -> bool {
        self.flows.values().any(|f| f.domain() == domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flow> {
        self.flows.values()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// True if `ti` is held in the pool of `direction`.
    pub fn ti_in_use(&self, direction: FlowDirection, ti: u8) -> bool {
        match direction {
            FlowDirection::MobileOriginated => self.mo_ti.in_use(ti),
            FlowDirection::NetworkOriginated => self.mt_ti.in_use(ti),
        }
    }

    pub fn nsapis_in_use(&self) -> usize {
        self.nsapi.used_count()
    }

    /// Selects idle active contexts for deactivation and old rejected
    /// contexts for purging.
    pub fn sweep(&self, now: SimTime) -> SweepResult {
        let mut result = SweepResult::default();
        for flow in self.flows.values() {
            let Some(ctx) = flow.sm() else { continue };
            match ctx.state {
                SmState::Active if now.saturating_since(flow.last_active) > self.ps_idle_time => {
                    result.deactivate.push(flow.id);
                }
                SmState::Rejected
                    if ctx
                        .rejected_at
                        .is_some_and(|t| now.saturating_since(t) > self.rejected_purge) =>
                {
                    result.purge.push(flow.id);
                }
                _ => {}
            }
        }
        result
    }
}
