use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::mem;

/// Seedless avalanche mix for 64-bit keys.
///
/// Xor-shift / multiply / xor-shift finalizer using the 64-bit MurmurHash3
/// finalizer constant. Bijective over `u64`, so distinct keys never collide
/// before masking, and the low bits are well distributed for power-of-two
/// index masks.
#[inline(always)]
fn mix(key: u64) -> u64 {
    let mut k = key;
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k
}

/// A single table slot. `occupied` is the source of truth for emptiness;
/// `key`, `value`, and `psl` are meaningful only when it is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Slot {
    key: u64,
    value: u64,
    psl: i16,
    occupied: bool,
}

impl Slot {
    const EMPTY: Slot = Slot {
        key: 0,
        value: 0,
        psl: 0,
        occupied: false,
    };
}

/// Error returned when a table cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityError {
    /// The requested capacity was zero or not a power of two.
    InvalidCapacity(usize),
    /// The allocator could not provide the slot buffer.
    AllocationFailed(usize),
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityError::InvalidCapacity(capacity) => {
                write!(f, "capacity {capacity} is not a nonzero power of two")
            }
            CapacityError::AllocationFailed(capacity) => {
                write!(f, "failed to allocate {capacity} slots")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CapacityError {}

/// Error returned by [`RobinHoodTable::insert`] when every slot is occupied
/// by some other key.
///
/// The insertion leaves the table unchanged: no resident is evicted to make
/// room, and the rejected key is simply not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFull;

impl fmt::Display for TableFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("table is at capacity")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TableFull {}

/// Successful result of [`RobinHoodTable::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was not present and now occupies a slot.
    Inserted,
    /// The key was already present; the stored value is unchanged.
    Duplicate,
}

/// Probe statistics for a table, computed on demand.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of keys currently stored.
    pub populated: usize,
    /// Total number of slots.
    pub capacity: usize,
    /// `populated / capacity`.
    pub load_factor: f64,
    /// Largest probe-sequence length over all occupied slots.
    pub max_psl: i16,
    /// Mean probe-sequence length over all occupied slots.
    pub mean_psl: f64,
    /// Bytes held by the slot buffer.
    pub total_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the statistics to stdout.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Robin Hood Table Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor)",
            self.populated,
            self.capacity,
            self.load_factor * 100.0
        );
        println!(
            "Probe lengths: max {} / mean {:.3}",
            self.max_psl, self.mean_psl
        );
        println!("Slot buffer: {} bytes", self.total_bytes);
    }
}

/// A fixed-capacity hash table mapping `u64` keys to `u64` values, using
/// Robin Hood open addressing.
///
/// The table owns a single contiguous slot buffer allocated at construction
/// and released on drop. Capacity must be a power of two and never changes;
/// there is no rehashing and no deletion. Each occupied slot records its
/// probe-sequence length (PSL) -- the distance from the slot the key's hash
/// points at -- and insertion displaces residents that sit closer to their
/// ideal slot than the incoming record does. Lookups exploit the resulting
/// ordering to stop probing as soon as the sought key can no longer be
/// present.
///
/// Duplicate insertion is first-write-wins: the stored value is kept and the
/// insert reports [`InsertOutcome::Duplicate`].
///
/// All operations are single-threaded and CPU-bound; callers that share a
/// table across threads must impose their own synchronization.
///
/// # Examples
///
/// ```rust
/// # use rh_hash::RobinHoodTable;
/// #
/// let mut table = RobinHoodTable::with_capacity(8).unwrap();
/// table.insert(1, 100).unwrap();
/// table.insert(2, 200).unwrap();
///
/// assert_eq!(table.find(1), Some(100));
/// assert_eq!(table.find(3), None);
/// assert_eq!(table.len(), 2);
/// ```
#[derive(Clone)]
pub struct RobinHoodTable {
    slots: Box<[Slot]>,
    mask: usize,
    len: usize,
}

impl fmt::Debug for RobinHoodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RobinHoodTable")
            .field("len", &self.len)
            .field("capacity", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl RobinHoodTable {
    /// Creates a table with exactly `capacity` slots.
    ///
    /// `capacity` must be a nonzero power of two; anything else is rejected
    /// with [`CapacityError::InvalidCapacity`] rather than rounded. The slot
    /// buffer is allocated here and never grows; if the allocator cannot
    /// provide it, [`CapacityError::AllocationFailed`] is returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rh_hash::CapacityError;
    /// # use rh_hash::RobinHoodTable;
    /// #
    /// let table = RobinHoodTable::with_capacity(1024).unwrap();
    /// assert_eq!(table.capacity(), 1024);
    ///
    /// assert_eq!(
    ///     RobinHoodTable::with_capacity(1000).unwrap_err(),
    ///     CapacityError::InvalidCapacity(1000),
    /// );
    /// ```
    pub fn with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        if !capacity.is_power_of_two() {
            return Err(CapacityError::InvalidCapacity(capacity));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| CapacityError::AllocationFailed(capacity))?;
        slots.resize(capacity, Slot::EMPTY);

        Ok(Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            len: 0,
        })
    }

    /// The slot a key's hash points at before any displacement.
    #[inline(always)]
    fn ideal_index(&self, key: u64) -> usize {
        (mix(key) as usize) & self.mask
    }

    /// Inserts a key/value pair.
    ///
    /// Probing starts at the key's ideal slot and walks forward, swapping the
    /// in-flight record with any resident whose PSL is smaller (the resident
    /// closer to home yields; the evicted record keeps probing). An existing
    /// key is left untouched and reported as [`InsertOutcome::Duplicate`].
    ///
    /// A saturated table reports [`TableFull`] without modifying any slot,
    /// unless the key is already present, in which case the insert is still a
    /// duplicate no-op.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rh_hash::InsertOutcome;
    /// # use rh_hash::RobinHoodTable;
    /// # use rh_hash::TableFull;
    /// #
    /// let mut table = RobinHoodTable::with_capacity(2).unwrap();
    ///
    /// assert_eq!(table.insert(1, 10), Ok(InsertOutcome::Inserted));
    /// assert_eq!(table.insert(1, 99), Ok(InsertOutcome::Duplicate));
    /// assert_eq!(table.find(1), Some(10));
    ///
    /// table.insert(2, 20).unwrap();
    /// assert_eq!(table.insert(3, 30), Err(TableFull));
    /// ```
    pub fn insert(&mut self, key: u64, value: u64) -> Result<InsertOutcome, TableFull> {
        // A full table has no empty slot to terminate the displacement loop,
        // and running it anyway would evict a resident to make room for the
        // new key and then drop the resident. Answer from lookup instead and
        // leave the slots untouched.
        if self.len == self.slots.len() {
            return if self.find(key).is_some() {
                Ok(InsertOutcome::Duplicate)
            } else {
                Err(TableFull)
            };
        }

        let mut curr = Slot {
            key,
            value,
            psl: 0,
            occupied: true,
        };
        let mut idx = self.ideal_index(key);

        // With at least one empty slot, linear probing reaches either that
        // slot or the duplicate within `capacity` steps.
        for _ in 0..self.slots.len() {
            let slot = &mut self.slots[idx];

            if !slot.occupied {
                *slot = curr;
                self.len += 1;
                return Ok(InsertOutcome::Inserted);
            }
            if slot.key == curr.key {
                return Ok(InsertOutcome::Duplicate);
            }

            if curr.psl > slot.psl {
                mem::swap(&mut curr, slot);
            }

            debug_assert!(curr.psl < i16::MAX);
            curr.psl += 1;
            idx = (idx + 1) & self.mask;
        }

        Err(TableFull)
    }

    /// Looks up a key, returning its value if present.
    ///
    /// Probing starts at the key's ideal slot and tracks its own distance
    /// `d`. An empty slot proves absence, and so does `d` exceeding the PSL
    /// stored in the probed slot: had the key been inserted, the Robin Hood
    /// swap discipline would have placed it at or before that point. The
    /// probe loop never exceeds `capacity` steps, even on a saturated table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rh_hash::RobinHoodTable;
    /// #
    /// let mut table = RobinHoodTable::with_capacity(16).unwrap();
    /// table.insert(7, 70).unwrap();
    ///
    /// assert_eq!(table.find(7), Some(70));
    /// assert_eq!(table.find(8), None);
    /// ```
    #[inline]
    pub fn find(&self, key: u64) -> Option<u64> {
        let mut idx = self.ideal_index(key);
        let mut d = 0usize;

        for _ in 0..self.slots.len() {
            let slot = &self.slots[idx];

            if !slot.occupied || d > slot.psl as usize {
                return None;
            }
            if slot.key == key {
                return Some(slot.value);
            }

            d += 1;
            idx = (idx + 1) & self.mask;
        }

        None
    }

    /// Returns the number of keys stored in the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rh_hash::RobinHoodTable;
    /// #
    /// let mut table = RobinHoodTable::with_capacity(8).unwrap();
    /// assert_eq!(table.len(), 0);
    ///
    /// table.insert(1, 1).unwrap();
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table contains no keys.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rh_hash::RobinHoodTable;
    /// #
    /// let table = RobinHoodTable::with_capacity(8).unwrap();
    /// assert!(table.is_empty());
    /// ```
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the total number of slots.
    ///
    /// Fixed for the lifetime of the table; inserting `capacity` distinct
    /// keys fills it completely.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Computes a histogram of probe-sequence lengths for the current table
    /// state.
    ///
    /// Bin `i` counts the occupied slots displaced exactly `i` positions from
    /// their ideal slot; the bins sum to [`len`](Self::len). Available with
    /// the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> Vec<usize> {
        let max_psl = self
            .slots
            .iter()
            .filter(|slot| slot.occupied)
            .map(|slot| slot.psl)
            .max()
            .unwrap_or(0);

        let mut hist = alloc::vec![0usize; max_psl as usize + 1];
        for slot in self.slots.iter().filter(|slot| slot.occupied) {
            hist[slot.psl as usize] += 1;
        }
        hist
    }

    /// Returns utilization and probe-length statistics.
    ///
    /// Available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let mut max_psl = 0i16;
        let mut total_psl = 0u64;
        for slot in self.slots.iter().filter(|slot| slot.occupied) {
            max_psl = max_psl.max(slot.psl);
            total_psl += slot.psl as u64;
        }

        DebugStats {
            populated: self.len,
            capacity: self.slots.len(),
            load_factor: self.len as f64 / self.slots.len() as f64,
            max_psl,
            mean_psl: if self.len == 0 {
                0.0
            } else {
                total_psl as f64 / self.len as f64
            },
            total_bytes: self.slots.len() * mem::size_of::<Slot>(),
        }
    }

    /// Pretty-prints the probe-length histogram horizontally to stdout.
    ///
    /// Each row is a PSL bin with a bar scaled to the fullest bin. Available
    /// with the `stats` feature, requires `std`.
    #[cfg(all(any(test, feature = "stats"), feature = "std"))]
    pub fn print_probe_histogram(&self) {
        let hist = self.probe_histogram();
        let max = hist.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        println!("probe histogram ({} entries):", self.len);
        for (psl, &count) in hist.iter().enumerate() {
            let width = (count * max_bar).div_ceil(max);
            println!("{psl:>3} | {} ({count})", "\u{2588}".repeat(width));
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    /// First key at or after `start` whose ideal slot under `mask` is
    /// `target`.
    fn key_with_ideal(target: usize, mask: usize, start: u64) -> u64 {
        (start..)
            .find(|&k| (mix(k) as usize) & mask == target)
            .unwrap()
    }

    #[test]
    fn insert_and_find() {
        let mut table = RobinHoodTable::with_capacity(64).unwrap();
        for k in 0..32u64 {
            assert_eq!(table.insert(k, k * 2), Ok(InsertOutcome::Inserted));
            assert_eq!(table.find(k), Some(k * 2), "{:#?}", table);
        }
        assert_eq!(table.len(), 32);

        for k in 0..32u64 {
            assert_eq!(table.find(k), Some(k * 2), "{:#?}", table);
        }
        assert_eq!(table.find(999), None);
    }

    #[test]
    fn duplicate_insert_keeps_first_value() {
        let mut table = RobinHoodTable::with_capacity(16).unwrap();

        assert_eq!(table.insert(42, 7), Ok(InsertOutcome::Inserted));
        assert_eq!(table.insert(42, 11), Ok(InsertOutcome::Duplicate));

        assert_eq!(table.find(42), Some(7));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn miss_on_empty_table() {
        let table = RobinHoodTable::with_capacity(8).unwrap();
        assert_eq!(table.find(0), None);
        assert_eq!(table.find(u64::MAX), None);
    }

    #[test]
    fn miss_at_three_quarters_load() {
        let mut table = RobinHoodTable::with_capacity(4).unwrap();
        for k in [3u64, 17, 90] {
            table.insert(k, k).unwrap();
        }
        assert_eq!(table.len(), 3);
        assert_eq!(table.find(1234), None);
    }

    #[test]
    fn invalid_capacities_are_rejected() {
        for capacity in [0usize, 3, 12, 100, 1000, (1 << 20) + 1] {
            assert_eq!(
                RobinHoodTable::with_capacity(capacity).unwrap_err(),
                CapacityError::InvalidCapacity(capacity),
            );
        }
        assert!(RobinHoodTable::with_capacity(1).is_ok());
        assert!(RobinHoodTable::with_capacity(1 << 20).is_ok());
    }

    #[test]
    fn collision_chain_psls_count_from_ideal_slot() {
        let mut table = RobinHoodTable::with_capacity(8).unwrap();

        let k1 = key_with_ideal(3, table.mask, 0);
        let k2 = key_with_ideal(3, table.mask, k1 + 1);
        let k3 = key_with_ideal(3, table.mask, k2 + 1);

        table.insert(k1, 1).unwrap();
        table.insert(k2, 2).unwrap();
        table.insert(k3, 3).unwrap();

        // Equal PSLs never swap, so arrival order is preserved along the run.
        for (offset, key) in [(0usize, k1), (1, k2), (2, k3)] {
            let slot = &table.slots[(3 + offset) & table.mask];
            assert!(slot.occupied);
            assert_eq!(slot.key, key);
            assert_eq!(slot.psl as usize, offset, "{:#?}", table);
        }

        assert_eq!(table.find(k1), Some(1));
        assert_eq!(table.find(k2), Some(2));
        assert_eq!(table.find(k3), Some(3));
    }

    #[test]
    fn psl_matches_true_displacement() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut table = RobinHoodTable::with_capacity(256).unwrap();
        while table.len() < 224 {
            table.insert(rng.random(), rng.random()).unwrap();
        }

        let capacity = table.capacity();
        for (i, slot) in table.slots.iter().enumerate() {
            if !slot.occupied {
                continue;
            }
            let ideal = (mix(slot.key) as usize) & table.mask;
            let displacement = (i + capacity - ideal) & table.mask;
            assert_eq!(slot.psl as usize, displacement, "slot {i}");
        }
    }

    #[test]
    fn fills_to_capacity_then_reports_full() {
        let capacity = 16usize;
        let mut table = RobinHoodTable::with_capacity(capacity).unwrap();

        for k in 0..capacity as u64 {
            assert_eq!(table.insert(k, k + 100), Ok(InsertOutcome::Inserted));
        }
        assert_eq!(table.len(), capacity);

        let before = table.slots.clone();
        assert_eq!(table.insert(1_000, 0), Err(TableFull));
        assert_eq!(table.slots, before, "failed insert must not move slots");
        assert_eq!(table.len(), capacity);

        // Duplicates are still recognized at full occupancy and never error.
        assert_eq!(table.insert(5, 999), Ok(InsertOutcome::Duplicate));
        assert_eq!(table.find(5), Some(105));

        for k in 0..capacity as u64 {
            assert_eq!(table.find(k), Some(k + 100));
        }
        assert_eq!(table.find(1_000), None);
    }

    #[test]
    fn saturated_lookup_miss_terminates() {
        let mut table = RobinHoodTable::with_capacity(1).unwrap();
        table.insert(9, 90).unwrap();

        assert_eq!(table.insert(10, 0), Err(TableFull));
        assert_eq!(table.find(9), Some(90));
        assert_eq!(table.find(10), None);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn insert_many_round_trip() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut keys: Vec<u64> = (0..12_000).map(|_| rng.random()).collect();
        keys.sort_unstable();
        keys.dedup();

        let mut table = RobinHoodTable::with_capacity(1 << 14).unwrap();
        for &k in &keys {
            assert_eq!(
                table.insert(k, k.wrapping_mul(31)),
                Ok(InsertOutcome::Inserted)
            );
        }
        assert_eq!(table.len(), keys.len());

        for &k in &keys {
            assert_eq!(table.find(k), Some(k.wrapping_mul(31)));
        }

        let mut misses = 0usize;
        while misses < 1_000 {
            let probe: u64 = rng.random();
            if keys.binary_search(&probe).is_err() {
                assert_eq!(table.find(probe), None);
                misses += 1;
            }
        }
    }

    #[test]
    fn histogram_accounts_for_every_entry() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut table = RobinHoodTable::with_capacity(128).unwrap();
        while table.len() < 96 {
            table.insert(rng.random(), 0).unwrap();
        }

        let hist = table.probe_histogram();
        assert_eq!(hist.iter().sum::<usize>(), table.len());

        let stats = table.debug_stats();
        assert_eq!(stats.populated, 96);
        assert_eq!(stats.capacity, 128);
        assert_eq!(stats.max_psl as usize + 1, hist.len());
        assert!((stats.load_factor - 0.75).abs() < 1e-9);
    }

    #[test]
    fn stats_on_empty_table() {
        let table = RobinHoodTable::with_capacity(8).unwrap();

        assert_eq!(table.probe_histogram(), alloc::vec![0]);

        let stats = table.debug_stats();
        assert_eq!(stats.populated, 0);
        assert_eq!(stats.max_psl, 0);
        assert_eq!(stats.mean_psl, 0.0);
    }
}
