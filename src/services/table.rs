//! The slot table: fixed-layout publication records shared between a
//! coordinator and its pane workers.
//!
//! A table for capacity N is N+1 records of two machine words each. Record 0
//! is metadata (the table key, and an init flag the creator sets last); records
//! 1..=N belong to panes. A pane publishes by writing its pid and then its
//! window handle; the handle doubles as the readiness flag, so it is always
//! written last and read first.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::domain::{PaneIndex, Slot, TableKey, WindowHandle, UNASSIGNED_PID, UNPUBLISHED_HANDLE};
use crate::error::{ContractResult, ContractViolation, ResourceError, ResourceResult, Result};
use crate::services::shm::ShmSegment;

/// Size in bytes of one slot record
pub const SLOT_SIZE: usize = std::mem::size_of::<RawSlot>();

/// Value of the metadata slot's second word once the table is initialized
const INIT_FLAG: u64 = 1;

/// Total segment size for a table of the given capacity
pub fn byte_len_for(capacity: usize) -> usize {
    (capacity + 1) * SLOT_SIZE
}

/// Same, refusing capacities whose layout does not fit in usize. Worker
/// invocations carry the capacity in argv, so it arrives untrusted.
fn checked_byte_len(capacity: usize) -> ContractResult<usize> {
    capacity
        .checked_add(1)
        .and_then(|records| records.checked_mul(SLOT_SIZE))
        .ok_or(ContractViolation::CapacityOverflow(capacity))
}

#[repr(C)]
struct RawSlot {
    owner_pid: AtomicI64,
    window_handle: AtomicU64,
}

/// Storage a slot table lives in.
///
/// Production tables sit in a shared segment; tests use process-local heap
/// backing so table semantics are checkable without touching the OS.
pub trait TableBacking {
    /// Base address of the backing memory; stable for the backing's lifetime
    fn base(&self) -> *mut u8;
    /// Usable length in bytes
    fn byte_len(&self) -> usize;
    /// Remove the backing's OS name, if it has one
    fn unlink(&self) -> ResourceResult<()>;
}

impl TableBacking for ShmSegment {
    fn base(&self) -> *mut u8 {
        self.base_ptr()
    }

    fn byte_len(&self) -> usize {
        self.byte_len()
    }

    fn unlink(&self) -> ResourceResult<()> {
        self.unlink()
    }
}

/// Heap-backed table storage for single-process use and tests
pub struct MemBacking {
    base: *mut u8,
    len: usize,
    _buf: Box<[u64]>,
}

// The buffer is owned and its allocation never moves; access goes through
// atomics derived from `base`.
unsafe impl Send for MemBacking {}
unsafe impl Sync for MemBacking {}

impl MemBacking {
    /// Zeroed backing sized for a table of the given capacity.
    ///
    /// u64 storage keeps the base address aligned for the slot atomics.
    pub fn for_capacity(capacity: usize) -> Self {
        let len = byte_len_for(capacity);
        let mut buf = vec![0u64; len / 8].into_boxed_slice();
        let base = buf.as_mut_ptr() as *mut u8;
        Self {
            base,
            len,
            _buf: buf,
        }
    }
}

impl TableBacking for MemBacking {
    fn base(&self) -> *mut u8 {
        self.base
    }

    fn byte_len(&self) -> usize {
        self.len
    }

    fn unlink(&self) -> ResourceResult<()> {
        Ok(())
    }
}

/// A slot table over some backing.
///
/// All reads and writes are atomic; readers always see either the sentinel
/// or a completed publish, never a torn record.
pub struct SlotTable<B: TableBacking = ShmSegment> {
    backing: B,
    capacity: usize,
    key: TableKey,
}

impl<B: TableBacking> SlotTable<B> {
    /// Initialize a fresh table over the given backing (creator side).
    ///
    /// Writes the sentinel into every pane slot, records the key in the
    /// metadata slot, and sets the init flag last so attachers never observe
    /// a half-initialized table.
    pub fn create_in(key: TableKey, capacity: usize, backing: B) -> Result<Self> {
        let table = Self::over(key, capacity, backing)?;
        for i in 1..=capacity {
            let slot = table.slot(i);
            slot.owner_pid.store(UNASSIGNED_PID, Ordering::Relaxed);
            slot.window_handle.store(UNPUBLISHED_HANDLE, Ordering::Relaxed);
        }
        let meta = table.slot(0);
        meta.owner_pid.store(key.raw() as i64, Ordering::Relaxed);
        meta.window_handle.store(INIT_FLAG, Ordering::Release);
        Ok(table)
    }

    /// View an existing table over the given backing (attacher side).
    ///
    /// Does not require the init flag; attachers poll `is_initialized` until
    /// the creator has finished.
    pub fn open_in(key: TableKey, capacity: usize, backing: B) -> Result<Self> {
        Self::over(key, capacity, backing)
    }

    fn over(key: TableKey, capacity: usize, backing: B) -> Result<Self> {
        if capacity == 0 {
            return Err(ContractViolation::ZeroCapacity.into());
        }
        let expected = checked_byte_len(capacity)?;
        if backing.byte_len() != expected {
            return Err(ResourceError::SizeMismatch {
                key,
                expected: expected as u64,
                actual: backing.byte_len() as u64,
            }
            .into());
        }
        Ok(Self {
            backing,
            capacity,
            key,
        })
    }

    pub fn key(&self) -> TableKey {
        self.key
    }

    /// Number of pane slots (the metadata slot is not counted)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once the creator has finished initializing the table
    pub fn is_initialized(&self) -> bool {
        self.slot(0).window_handle.load(Ordering::Acquire) == INIT_FLAG
    }

    /// The key recorded in the metadata slot
    pub fn stored_key(&self) -> i64 {
        self.slot(0).owner_pid.load(Ordering::Relaxed)
    }

    fn slot(&self, index: usize) -> &RawSlot {
        debug_assert!(index <= self.capacity);
        // in bounds: construction verified the backing covers capacity+1 records
        unsafe { &*(self.backing.base().add(index * SLOT_SIZE) as *const RawSlot) }
    }

    fn check_index(&self, index: PaneIndex) -> ContractResult<usize> {
        let raw = index.raw();
        if raw > self.capacity {
            return Err(ContractViolation::IndexOutOfRange {
                index: raw,
                capacity: self.capacity,
            });
        }
        Ok(raw)
    }

    /// Snapshot one pane slot
    pub fn get(&self, index: PaneIndex) -> ContractResult<Slot> {
        let raw = self.check_index(index)?;
        let slot = self.slot(raw);
        // handle first: publishers write it last
        let window_handle = slot.window_handle.load(Ordering::Acquire);
        let owner_pid = slot.owner_pid.load(Ordering::Relaxed);
        Ok(Slot {
            owner_pid,
            window_handle,
        })
    }

    /// The single-use write capability for one pane slot
    pub fn pane_writer(&self, index: PaneIndex) -> ContractResult<PaneSlotWriter<'_, B>> {
        self.check_index(index)?;
        Ok(PaneSlotWriter { table: self, index })
    }

    fn publish(
        &self,
        index: PaneIndex,
        owner_pid: i64,
        handle: WindowHandle,
    ) -> ContractResult<()> {
        let raw = self.check_index(index)?;
        if owner_pid <= 0 {
            return Err(ContractViolation::InvalidPid(owner_pid));
        }
        if handle.raw() == UNPUBLISHED_HANDLE {
            return Err(ContractViolation::SentinelHandle);
        }
        let slot = self.slot(raw);
        // claim by pid first; the loser of a racing double publish fails here
        slot.owner_pid
            .compare_exchange(
                UNASSIGNED_PID,
                owner_pid,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ContractViolation::AlreadyPublished(index))?;
        slot.window_handle.store(handle.raw(), Ordering::Release);
        Ok(())
    }

    /// Consume the table and remove its backing's OS name.
    ///
    /// Mappings held by still-attached processes stay valid until they drop.
    pub fn destroy(self) -> ResourceResult<()> {
        self.backing.unlink()
    }
}

impl SlotTable<ShmSegment> {
    /// Create the shared table for a fresh composite (coordinator side)
    pub fn create(key: TableKey, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ContractViolation::ZeroCapacity.into());
        }
        let segment = ShmSegment::create(key, checked_byte_len(capacity)?)?;
        Self::create_in(key, capacity, segment)
    }

    /// Attach to an existing shared table (worker side)
    pub fn attach(key: TableKey, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ContractViolation::ZeroCapacity.into());
        }
        let segment = ShmSegment::attach(key, checked_byte_len(capacity)?)?;
        Self::open_in(key, capacity, segment)
    }
}

/// Single-use write capability for one pane slot.
///
/// `publish` consumes the writer, so one capability can never write twice;
/// a second writer aimed at an already-claimed slot is rejected at publish
/// time by the slot's pid claim.
pub struct PaneSlotWriter<'a, B: TableBacking> {
    table: &'a SlotTable<B>,
    index: PaneIndex,
}

impl<B: TableBacking> PaneSlotWriter<'_, B> {
    pub fn index(&self) -> PaneIndex {
        self.index
    }

    /// Write owner pid and window handle, in that order
    pub fn publish(self, owner_pid: i64, handle: WindowHandle) -> ContractResult<()> {
        self.table.publish(self.index, owner_pid, handle)
    }
}
