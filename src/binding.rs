//! Binding engine: the lease table and its state machine.
//!
//! A binding associates a client hardware address with an IPv4 address for a
//! bounded time. Static bindings are seeded by configuration and never
//! deleted; dynamic bindings are created on demand from the configured range.
//!
//! All range arithmetic happens on host-order `u32` values; addresses cross
//! back to wire bytes only at the [`IpV4Addr`] boundary.

use crate::{HwAddr, IpV4Addr};

use std::fmt;

/// Lifecycle state of a binding.
///
/// EMPTY -> (DISCOVER) PENDING -> (REQUEST) ASSOCIATED -> (RELEASE) RELEASED
/// or (time passes) EXPIRED -> reuse. DECLINE returns a binding to EMPTY.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingStatus {
    /// Fresh or cleared slot
    Empty,
    /// Offered, waiting for the client's confirming REQUEST
    Pending,
    /// Leased
    Associated,
    /// Relinquished by the client before the lease ran out
    Released,
    /// Lease ran out
    Expired,
}

impl fmt::Display for BindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BindingStatus::Empty => "empty",
            BindingStatus::Pending => "pending",
            BindingStatus::Associated => "associated",
            BindingStatus::Released => "released",
            BindingStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// How a binding came to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    /// Administratively configured reservation, bypasses pool allocation
    Static,
    /// Drawn from the server's range at runtime
    Dynamic,
}

/// Kind restriction for [`BindingList::search`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindFilter {
    /// Static bindings only
    Static,
    /// Dynamic bindings only
    Dynamic,
    /// Either
    Any,
}

impl KindFilter {
    fn matches(self, kind: BindingKind) -> bool {
        match self {
            KindFilter::Static => kind == BindingKind::Static,
            KindFilter::Dynamic => kind == BindingKind::Dynamic,
            KindFilter::Any => true,
        }
    }
}

/// One lease record.
#[derive(Clone, Copy, Debug)]
pub struct Binding {
    /// Assigned IPv4 address
    pub address: IpV4Addr,
    /// Client hardware address
    pub hw: HwAddr,
    /// Static or dynamic
    pub kind: BindingKind,
    /// Current lifecycle state
    pub status: BindingStatus,
    /// Wall-clock instant (unix seconds) the current status was entered
    pub binding_time: u64,
    /// Duration (seconds) the current status is valid for
    pub lease_time: u64,
}

impl Binding {
    /// True once the current status has outlived its lease
    pub fn expired(&self, now: u64) -> bool {
        now >= self.binding_time + self.lease_time
    }

    /// Enter PENDING for the duration of an offer
    pub fn make_pending(&mut self, now: u64, pending_time: u64) {
        self.status = BindingStatus::Pending;
        self.binding_time = now;
        self.lease_time = pending_time;
    }

    /// Enter ASSOCIATED with a fresh lease
    pub fn associate(&mut self, now: u64, lease_time: u64) {
        self.status = BindingStatus::Associated;
        self.binding_time = now;
        self.lease_time = lease_time;
    }
}

/// Inclusive dynamic allocation range with a rotating cursor, host order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressRange {
    /// First allocatable address
    pub first: u32,
    /// Last allocatable address
    pub last: u32,
    /// Next candidate for allocation
    pub current: u32,
}

impl AddressRange {
    /// New range with the cursor at the start
    pub fn new(first: IpV4Addr, last: IpV4Addr) -> Self {
        AddressRange {
            first: first.to_u32(),
            last: last.to_u32(),
            current: first.to_u32(),
        }
    }

    /// True when the address lies within `[first, last]`
    pub fn contains(&self, address: u32) -> bool {
        self.first <= address && address <= self.last
    }
}

/// The ordered lease table. Linear search, insertion order preserved.
#[derive(Debug, Default)]
pub struct BindingList {
    entries: Vec<Binding>,
}

impl BindingList {
    /// New empty table
    pub fn new() -> Self {
        BindingList { entries: Vec::new() }
    }

    /// First binding matching the kind filter, the status filter, and the
    /// hardware address. A `None` status filter matches any status, which is
    /// how callers find a reusable slot regardless of its lifecycle state.
    pub fn search(
        &mut self,
        hw: &HwAddr,
        kind: KindFilter,
        status: Option<BindingStatus>,
    ) -> Option<&mut Binding> {
        self.entries.iter_mut().find(|b| {
            kind.matches(b.kind) && status.map_or(true, |s| b.status == s) && b.hw == *hw
        })
    }

    /// Attempt to add a fresh DYNAMIC binding for `hw`.
    ///
    /// A requested address is honored when it lies within the range and is
    /// not currently held; otherwise the cursor advances, wrapping at
    /// `last + 1` back to `first`, until an unheld address is found or the
    /// cursor returns to its starting point. Addresses whose old binding is
    /// EMPTY, RELEASED or run out are eligible for reuse; the old record is
    /// overwritten. Returns `None` when the range is exhausted.
    pub fn new_dynamic(
        &mut self,
        range: &mut AddressRange,
        requested: Option<IpV4Addr>,
        hw: &HwAddr,
        now: u64,
    ) -> Option<&mut Binding> {
        if let Some(req) = requested {
            let address = req.to_u32();
            if address != 0 && range.contains(address) && !self.held(address, now) {
                return Some(self.overwrite_slot(address, hw, now));
            }
        }

        let start = range.current;
        loop {
            let candidate = range.current;
            range.current = if range.current >= range.last {
                range.first
            } else {
                range.current + 1
            };
            if !self.held(candidate, now) {
                return Some(self.overwrite_slot(candidate, hw, now));
            }
            if range.current == start {
                return None;
            }
        }
    }

    /// Insert a STATIC binding, overwriting any existing record with the same
    /// hardware address.
    pub fn add_static(&mut self, address: IpV4Addr, hw: HwAddr) {
        let fresh = Binding {
            address,
            hw,
            kind: BindingKind::Static,
            status: BindingStatus::Empty,
            binding_time: 0,
            lease_time: 0,
        };
        match self.entries.iter_mut().find(|b| b.hw == hw) {
            Some(existing) => *existing = fresh,
            None => self.entries.push(fresh),
        }
    }

    /// Drop every binding
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of bindings in the table
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate the bindings in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Binding> {
        self.entries.iter()
    }

    // An address is held while some binding carries it as a static
    // reservation or as a live (pending or associated, not run out) lease.
    fn held(&self, address: u32, now: u64) -> bool {
        self.entries.iter().any(|b| {
            b.address.to_u32() == address
                && (b.kind == BindingKind::Static
                    || (matches!(b.status, BindingStatus::Pending | BindingStatus::Associated)
                        && !b.expired(now)))
        })
    }

    // Reuse the record already carrying this address, or grow the table.
    // The fresh record starts EMPTY with a zero lease so the caller's
    // expiry check sees it as ready for the PENDING transition.
    fn overwrite_slot(&mut self, address: u32, hw: &HwAddr, now: u64) -> &mut Binding {
        let fresh = Binding {
            address: IpV4Addr::from_u32(address),
            hw: *hw,
            kind: BindingKind::Dynamic,
            status: BindingStatus::Empty,
            binding_time: now,
            lease_time: 0,
        };
        let at = match self
            .entries
            .iter()
            .position(|b| b.address.to_u32() == address)
        {
            Some(at) => {
                self.entries[at] = fresh;
                at
            }
            None => {
                self.entries.push(fresh);
                self.entries.len() - 1
            }
        };
        &mut self.entries[at]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hw(tail: u8) -> HwAddr {
        HwAddr::new(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, tail])
    }

    fn range() -> AddressRange {
        AddressRange::new(IpV4Addr::new([192, 168, 2, 2]), IpV4Addr::new([192, 168, 2, 4]))
    }

    #[test]
    fn test_expired_predicate() -> () {
        let binding = Binding {
            address: IpV4Addr::new([192, 168, 2, 2]),
            hw: hw(1),
            kind: BindingKind::Dynamic,
            status: BindingStatus::Pending,
            binding_time: 100,
            lease_time: 60,
        };
        assert!(!binding.expired(159));
        assert!(binding.expired(160));
        assert!(binding.expired(161));
    }

    #[test]
    fn test_search_filters() -> () {
        let mut list = BindingList::new();
        list.add_static(IpV4Addr::new([192, 168, 2, 10]), hw(1));
        let mut r = range();
        list.new_dynamic(&mut r, None, &hw(2), 0).unwrap();

        assert!(list.search(&hw(1), KindFilter::Static, None).is_some());
        assert!(list.search(&hw(1), KindFilter::Dynamic, None).is_none());
        assert!(list.search(&hw(2), KindFilter::Dynamic, None).is_some());
        assert!(list.search(&hw(2), KindFilter::Any, Some(BindingStatus::Empty)).is_some());
        assert!(list.search(&hw(2), KindFilter::Any, Some(BindingStatus::Pending)).is_none());
        assert!(list.search(&hw(3), KindFilter::Any, None).is_none());
    }

    #[test]
    fn test_add_static_overwrites_same_hw() -> () {
        let mut list = BindingList::new();
        list.add_static(IpV4Addr::new([192, 168, 2, 10]), hw(1));
        list.add_static(IpV4Addr::new([192, 168, 2, 11]), hw(1));
        assert_eq!(list.len(), 1);
        let binding = list.search(&hw(1), KindFilter::Static, None).unwrap();
        assert_eq!(binding.address, IpV4Addr::new([192, 168, 2, 11]));
    }

    #[test]
    fn test_new_dynamic_walks_the_range() -> () {
        let mut list = BindingList::new();
        let mut r = range();

        let first = list.new_dynamic(&mut r, None, &hw(1), 0).unwrap();
        assert_eq!(first.address, IpV4Addr::new([192, 168, 2, 2]));
        first.make_pending(0, 60);

        let second = list.new_dynamic(&mut r, None, &hw(2), 0).unwrap();
        assert_eq!(second.address, IpV4Addr::new([192, 168, 2, 3]));
        second.make_pending(0, 60);

        // In-range addresses only
        for binding in list.iter() {
            assert!(r.contains(binding.address.to_u32()));
        }
    }

    #[test]
    fn test_new_dynamic_honors_requested_address() -> () {
        let mut list = BindingList::new();
        let mut r = range();

        let requested = IpV4Addr::new([192, 168, 2, 4]);
        let binding = list
            .new_dynamic(&mut r, Some(requested), &hw(1), 0)
            .unwrap();
        assert_eq!(binding.address, requested);

        // Out-of-range request falls back to the cursor
        let out_of_range = IpV4Addr::new([10, 0, 0, 1]);
        let binding = list
            .new_dynamic(&mut r, Some(out_of_range), &hw(2), 0)
            .unwrap();
        assert_eq!(binding.address, IpV4Addr::new([192, 168, 2, 2]));
    }

    #[test]
    fn test_new_dynamic_skips_held_and_reuses_stale() -> () {
        let mut list = BindingList::new();
        let mut r = range();

        // .2 and .3 pending, .4 released
        list.new_dynamic(&mut r, None, &hw(1), 0).unwrap().make_pending(0, 60);
        list.new_dynamic(&mut r, None, &hw(2), 0).unwrap().make_pending(0, 60);
        let third = list.new_dynamic(&mut r, None, &hw(3), 0).unwrap();
        third.make_pending(0, 60);
        third.status = BindingStatus::Released;

        // At now=10 the pending leases are live; only the released .4 is free
        let binding = list.new_dynamic(&mut r, None, &hw(4), 10).unwrap();
        assert_eq!(binding.address, IpV4Addr::new([192, 168, 2, 4]));
        assert_eq!(list.len(), 3);

        // The overwritten record belongs to the new client now
        assert!(list.search(&hw(3), KindFilter::Any, None).is_none());
        assert!(list.search(&hw(4), KindFilter::Any, None).is_some());
    }

    #[test]
    fn test_new_dynamic_reuses_expired() -> () {
        let mut list = BindingList::new();
        let mut r = range();

        list.new_dynamic(&mut r, None, &hw(1), 0).unwrap().make_pending(0, 60);
        list.new_dynamic(&mut r, None, &hw(2), 0).unwrap().make_pending(0, 60);
        list.new_dynamic(&mut r, None, &hw(3), 0).unwrap().make_pending(0, 60);

        // All three offers have lapsed by now=100
        let binding = list.new_dynamic(&mut r, None, &hw(4), 100).unwrap();
        assert_eq!(binding.address, IpV4Addr::new([192, 168, 2, 2]));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_new_dynamic_exhaustion() -> () {
        let mut list = BindingList::new();
        let mut r = range();
        for tail in 1..=3 {
            list.new_dynamic(&mut r, None, &hw(tail), 0).unwrap().make_pending(0, 60);
        }
        assert!(list.new_dynamic(&mut r, None, &hw(9), 10).is_none());
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_static_reservation_not_dynamically_allocated() -> () {
        let mut list = BindingList::new();
        let mut r = range();
        list.add_static(IpV4Addr::new([192, 168, 2, 2]), hw(1));

        let binding = list.new_dynamic(&mut r, None, &hw(2), 0).unwrap();
        assert_eq!(binding.address, IpV4Addr::new([192, 168, 2, 3]));
    }
}
