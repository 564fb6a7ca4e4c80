//! Per-namespace pid bitmap allocator
//!
//! Each pid namespace issues numeric ids from its own bitmap. Backing pages
//! are allocated lazily as the scan advances past a page boundary, freed ids
//! are reused after wraparound, and storage never shrinks. Page allocation
//! failure is reported as [`Error::AllocationFailure`], distinct from the
//! range itself running out ([`Error::Exhausted`]).

use nucleus_core::{Error, RawPid, Result};

/// Bits tracked per lazily-allocated bitmap page
pub(crate) const BITS_PER_PAGE: usize = 4096;

const WORDS_PER_PAGE: usize = BITS_PER_PAGE / 64;

/// Default upper bound (exclusive) of the numeric id range
pub const PID_MAX_DEFAULT: i32 = 32_768;

/// Scan floor after the allocator wraps around
///
/// Ids below this value are handed out once, early in a namespace's life,
/// and never again after the scan wraps; long-lived system tasks keep their
/// low ids stable that way.
pub const RESERVED_PIDS: i32 = 300;

/// One lazily-allocated page of the free bitmap
struct PidPage {
    words: Vec<u64>,
    nr_free: usize,
}

impl PidPage {
    fn try_new() -> Result<Self> {
        let mut words = Vec::new();
        words
            .try_reserve_exact(WORDS_PER_PAGE)
            .map_err(|_| Error::AllocationFailure {
                what: "pid bitmap page",
            })?;
        words.resize(WORDS_PER_PAGE, 0);
        Ok(Self {
            words,
            nr_free: BITS_PER_PAGE,
        })
    }

    fn test(&self, bit: usize) -> bool {
        self.words[bit / 64] & (1 << (bit % 64)) != 0
    }

    fn set(&mut self, bit: usize) {
        debug_assert!(!self.test(bit));
        self.words[bit / 64] |= 1 << (bit % 64);
        self.nr_free -= 1;
    }

    fn clear(&mut self, bit: usize) {
        debug_assert!(self.test(bit));
        self.words[bit / 64] &= !(1 << (bit % 64));
        self.nr_free += 1;
    }
}

/// Numeric id allocator for one pid namespace
///
/// Issues unique ids in `[1, pid_max)`, continuing the scan from the last
/// issued id and wrapping around to [`RESERVED_PIDS`] when the top of the
/// range is reached. An id is never reissued while its bit is still set;
/// the bit is only cleared by [`PidBitmap::free`], which the identity
/// object's teardown drives once no holder remains.
pub struct PidBitmap {
    pages: Vec<Option<PidPage>>,
    last: i32,
    pid_max: i32,
    level: u32,
}

impl PidBitmap {
    /// Create an allocator covering `[1, pid_max)` for a namespace at the
    /// given depth
    ///
    /// No page storage is allocated up front; pages appear as the scan
    /// first touches them.
    #[must_use]
    pub fn new(pid_max: i32, level: u32) -> Self {
        let pid_max = pid_max.max(2);
        let npages = (pid_max as usize).div_ceil(BITS_PER_PAGE);
        Self {
            pages: (0..npages).map(|_| None).collect(),
            last: 0,
            pid_max,
            level,
        }
    }

    /// Upper bound (exclusive) of the id range
    #[must_use]
    pub const fn pid_max(&self) -> i32 {
        self.pid_max
    }

    /// Issue the next free id
    ///
    /// # Errors
    /// [`Error::Exhausted`] when every reachable id is in use,
    /// [`Error::AllocationFailure`] when a backing page cannot be obtained.
    pub fn allocate(&mut self) -> Result<RawPid> {
        let floor = self.wrap_floor();
        let mut pid = self.last.saturating_add(1);
        if pid >= self.pid_max {
            pid = floor;
        }
        // Candidates reachable in one sweep: up from `pid` to the top of the
        // range, then from the wrap floor back up to `pid`.
        let mut budget = (self.pid_max - pid.min(floor)) as usize;

        while budget > 0 {
            let page_idx = pid as usize / BITS_PER_PAGE;
            let page = self.page_mut(page_idx)?;
            if page.nr_free == 0 {
                // Page fully occupied: skip ahead to the next boundary.
                let next = ((page_idx + 1) * BITS_PER_PAGE) as i32;
                budget = budget.saturating_sub((next - pid) as usize);
                pid = if next >= self.pid_max { floor } else { next };
                continue;
            }
            let bit = pid as usize % BITS_PER_PAGE;
            if !page.test(bit) {
                page.set(bit);
                self.last = pid;
                return Ok(RawPid::from_raw(pid));
            }
            budget -= 1;
            pid += 1;
            if pid >= self.pid_max {
                pid = floor;
            }
        }

        Err(Error::Exhausted { level: self.level })
    }

    /// Return an id to the free pool
    ///
    /// Storage is retained; only the bit is cleared. Freeing an id that was
    /// never issued is a caller bug and is logged, not propagated.
    pub fn free(&mut self, id: RawPid) {
        let nr = id.as_raw();
        if nr <= 0 || nr >= self.pid_max {
            tracing::warn!(pid = nr, "freeing an id outside the allocator range");
            return;
        }
        let page_idx = nr as usize / BITS_PER_PAGE;
        let bit = nr as usize % BITS_PER_PAGE;
        match self.pages.get_mut(page_idx).and_then(Option::as_mut) {
            Some(page) if page.test(bit) => page.clear(bit),
            _ => tracing::warn!(pid = nr, "freeing an id that was not allocated"),
        }
    }

    /// Whether an id is currently marked in use
    #[must_use]
    pub fn is_used(&self, id: RawPid) -> bool {
        let nr = id.as_raw();
        if nr <= 0 || nr >= self.pid_max {
            return false;
        }
        self.pages[nr as usize / BITS_PER_PAGE]
            .as_ref()
            .is_some_and(|page| page.test(nr as usize % BITS_PER_PAGE))
    }

    fn wrap_floor(&self) -> i32 {
        if self.pid_max > RESERVED_PIDS {
            RESERVED_PIDS
        } else {
            1
        }
    }

    fn page_mut(&mut self, idx: usize) -> Result<&mut PidPage> {
        let slot = &mut self.pages[idx];
        if slot.is_none() {
            *slot = Some(PidPage::try_new()?);
            tracing::trace!(page = idx, level = self.level, "pid bitmap page allocated");
        }
        slot.as_mut().ok_or(Error::AllocationFailure {
            what: "pid bitmap page",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn first_id_is_one() {
        let mut map = PidBitmap::new(PID_MAX_DEFAULT, 0);
        assert_eq!(map.allocate().unwrap().as_raw(), 1);
        assert_eq!(map.allocate().unwrap().as_raw(), 2);
    }

    #[test]
    fn live_ids_are_unique() {
        let mut map = PidBitmap::new(PID_MAX_DEFAULT, 0);
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = map.allocate().unwrap();
            assert!(seen.insert(id), "duplicate live id {id}");
            assert!(map.is_used(id));
        }
    }

    #[test]
    fn freed_id_is_reusable_after_wrap() {
        // Small range, floor collapses to 1, so a full sweep revisits
        // everything.
        let mut map = PidBitmap::new(8, 0);
        let ids: Vec<_> = (0..7).map(|_| map.allocate().unwrap()).collect();
        assert_eq!(ids.last().unwrap().as_raw(), 7);

        map.free(RawPid::from_raw(3));
        assert!(!map.is_used(RawPid::from_raw(3)));
        // Scan continues past 7, wraps, and lands on the freed slot.
        assert_eq!(map.allocate().unwrap().as_raw(), 3);
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut map = PidBitmap::new(4, 2);
        for _ in 1..4 {
            map.allocate().unwrap();
        }
        match map.allocate() {
            Err(Error::Exhausted { level }) => assert_eq!(level, 2),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn allocation_crosses_page_boundary() {
        let max = (BITS_PER_PAGE * 2) as i32;
        let mut map = PidBitmap::new(max, 0);
        let mut last = 0;
        for _ in 1..=BITS_PER_PAGE + 10 {
            last = map.allocate().unwrap().as_raw();
        }
        assert!(last as usize > BITS_PER_PAGE);
        assert!(map.is_used(RawPid::from_raw(last)));
    }

    #[test]
    fn wrap_respects_reserved_floor() {
        let mut map = PidBitmap::new(400, 0);
        // Use up the whole range once.
        for _ in 1..400 {
            map.allocate().unwrap();
        }
        // Ids below the floor stay retired after wrap; one above it comes
        // back.
        map.free(RawPid::from_raw(5));
        map.free(RawPid::from_raw(350));
        assert_eq!(map.allocate().unwrap().as_raw(), 350);
        assert!(map.allocate().is_err());
    }

    #[test]
    fn free_is_idempotent_for_unallocated_ids() {
        let mut map = PidBitmap::new(PID_MAX_DEFAULT, 0);
        map.free(RawPid::from_raw(10));
        map.free(RawPid::from_raw(-1));
        map.free(RawPid::from_raw(PID_MAX_DEFAULT));
        assert_eq!(map.allocate().unwrap().as_raw(), 1);
    }
}
