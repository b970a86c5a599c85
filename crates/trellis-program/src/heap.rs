//! Program heap
//!
//! A growable buffer of instruction words plus a side table of allocation
//! records. Handles index the side table, so compaction can relocate bytes
//! without invalidating handles: only raw addresses go stale.
//!
//! Words whose value is not yet known at emission time (handles of
//! templates still being compiled, stdlib entry points) are written as the
//! placeholder sentinel and recorded as pending sites; the two patch
//! passes resolve them once, after all emission is complete.

use crate::opcode::PLACEHOLDER_WORD;
use crate::stdlib::{StdLib, StdlibRef};
use serde::{Deserialize, Serialize};

/// Opaque reference to a heap allocation. Stable across compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u32);

impl Handle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionState {
    Allocated,
    Freed,
    Purged,
    Pointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub offset: u32,
    pub size: u32,
    pub scope_size: u32,
    pub state: RegionState,
}

/// Persistable snapshot of a finalized heap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeapSnapshot {
    pub buffer: Vec<i32>,
    pub table: Vec<AllocationRecord>,
    pub next_handle: u32,
}

type PlaceholderResolver = Box<dyn FnOnce() -> i32>;

pub struct Heap {
    buffer: Vec<i32>,
    table: Vec<AllocationRecord>,
    open_region: Option<Handle>,
    placeholders: Vec<(u32, PlaceholderResolver)>,
    stdlib_sites: Vec<(u32, StdlibRef)>,
    placeholders_patched: bool,
    stdlibs_patched: bool,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            buffer: Vec::with_capacity(0x10000),
            table: Vec::new(),
            open_region: None,
            placeholders: Vec::new(),
            stdlib_sites: Vec::new(),
            placeholders_patched: false,
            stdlibs_patched: false,
        }
    }

    /// Current logical write offset, in words.
    pub fn offset(&self) -> u32 {
        self.buffer.len() as u32
    }

    /// Opens a new allocation region at the current write offset. The
    /// region's size is unknown until [`Heap::finish_malloc`].
    pub fn malloc(&mut self) -> Handle {
        assert!(
            self.open_region.is_none(),
            "heap: malloc while a region is still open"
        );
        let handle = Handle(self.table.len() as u32);
        self.table.push(AllocationRecord {
            offset: self.offset(),
            size: 0,
            scope_size: 0,
            state: RegionState::Allocated,
        });
        self.open_region = Some(handle);
        handle
    }

    /// Closes the open region, recording its word length and the variable
    /// scope size its code requires.
    pub fn finish_malloc(&mut self, handle: Handle, scope_size: u32) {
        assert_eq!(
            self.open_region.take(),
            Some(handle),
            "heap: finish_malloc on a region that is not open"
        );
        let offset = self.offset();
        let record = &mut self.table[handle.index()];
        record.size = offset - record.offset;
        record.scope_size = scope_size;
    }

    pub fn push(&mut self, word: i32) {
        self.buffer.push(word);
    }

    /// Appends the sentinel word and defers its true value to `resolver`,
    /// invoked once during the placeholder patch pass. This is how an
    /// instruction can reference a handle that does not exist yet, e.g. a
    /// template invoking itself.
    pub fn push_placeholder(&mut self, resolver: PlaceholderResolver) {
        let address = self.offset();
        self.buffer.push(PLACEHOLDER_WORD);
        self.placeholders.push((address, resolver));
    }

    /// Appends the sentinel word, to be resolved from the stdlib
    /// entry-point table during the stdlib patch pass.
    pub fn push_stdlib(&mut self, stdlib: StdlibRef) {
        let address = self.offset();
        self.buffer.push(PLACEHOLDER_WORD);
        self.stdlib_sites.push((address, stdlib));
    }

    /// Resolves every pending placeholder site. Runs exactly once, after
    /// all emission and before serialization.
    pub fn patch_placeholders(&mut self) {
        assert!(
            !self.placeholders_patched,
            "heap: patch_placeholders ran twice"
        );
        self.placeholders_patched = true;
        for (address, resolver) in std::mem::take(&mut self.placeholders) {
            self.patch_word(address, resolver());
        }
    }

    /// Resolves every pending stdlib site from `stdlib`. Runs exactly once.
    pub fn patch_stdlibs(&mut self, stdlib: &StdLib) {
        assert!(!self.stdlibs_patched, "heap: patch_stdlibs ran twice");
        self.stdlibs_patched = true;
        for (address, slot) in std::mem::take(&mut self.stdlib_sites) {
            self.patch_word(address, stdlib.get(slot).0 as i32);
        }
    }

    fn patch_word(&mut self, address: u32, word: i32) {
        let site = &mut self.buffer[address as usize];
        assert_eq!(
            *site, PLACEHOLDER_WORD,
            "heap: patch site {address} no longer holds the sentinel"
        );
        *site = word;
    }

    /// Marks a handle's region as reclaimable. Space is reused at the next
    /// [`Heap::compact`].
    pub fn free(&mut self, handle: Handle) {
        let record = &mut self.table[handle.index()];
        assert!(
            record.state != RegionState::Purged,
            "heap: free on a purged handle"
        );
        record.state = RegionState::Freed;
    }

    /// Creates a zero-sized alias of `target`'s current location. Alias
    /// offsets are rewritten on compaction along with their targets.
    pub fn alias(&mut self, target: Handle) -> Handle {
        let offset = self.table[target.index()].offset;
        let handle = Handle(self.table.len() as u32);
        self.table.push(AllocationRecord {
            offset,
            size: 0,
            scope_size: 0,
            state: RegionState::Pointer,
        });
        handle
    }

    /// Left-shifts live regions over freed ones, transitioning Freed to
    /// Purged and shrinking the logical write offset by the reclaimed word
    /// count. Must only run between compilation units: the heap has to be
    /// quiesced (no open region).
    pub fn compact(&mut self) {
        assert!(
            self.open_region.is_none(),
            "heap: compact while a region is open"
        );

        // (region start, shift applied to addresses at or after it)
        let mut shifts: Vec<(u32, u32)> = Vec::new();
        // Word ranges reclaimed by this pass, before any shifting.
        let mut reclaimed: Vec<(u32, u32)> = Vec::new();
        let mut compacted = 0u32;

        for record in &mut self.table {
            match record.state {
                RegionState::Purged | RegionState::Pointer => {}
                RegionState::Freed => {
                    record.state = RegionState::Purged;
                    compacted += record.size;
                    reclaimed.push((record.offset, record.offset + record.size));
                    shifts.push((record.offset + record.size, compacted));
                }
                RegionState::Allocated => {
                    if compacted > 0 {
                        let start = record.offset as usize;
                        let end = start + record.size as usize;
                        self.buffer.copy_within(start..end, start - compacted as usize);
                        record.offset -= compacted;
                    }
                }
            }
        }

        let shift_for = |offset: u32| -> u32 {
            let mut shift = 0;
            for &(start, amount) in &shifts {
                if offset >= start {
                    shift = amount;
                } else {
                    break;
                }
            }
            shift
        };

        for record in &mut self.table {
            if record.state == RegionState::Pointer {
                record.offset -= shift_for(record.offset);
            }
        }

        // Pending patch sites inside relocated regions move with them;
        // sites inside reclaimed regions target dead code and are dropped.
        let live = |address: u32| {
            !reclaimed
                .iter()
                .any(|&(start, end)| address >= start && address < end)
        };
        self.placeholders.retain(|(address, _)| live(*address));
        self.stdlib_sites.retain(|(address, _)| live(*address));
        for (address, _) in &mut self.placeholders {
            *address -= shift_for(*address);
        }
        for (address, _) in &mut self.stdlib_sites {
            *address -= shift_for(*address);
        }

        self.buffer.truncate(self.buffer.len() - compacted as usize);
    }

    /// Finalizes the heap into a persistable snapshot, running any patch
    /// pass that has not run yet. A second capture after patching is a
    /// no-op with respect to the patch passes.
    pub fn capture(&mut self, stdlib: &StdLib, offset: Option<u32>) -> HeapSnapshot {
        if !self.placeholders_patched {
            self.patch_placeholders();
        }
        if !self.stdlibs_patched {
            self.patch_stdlibs(stdlib);
        }
        let end = offset.unwrap_or_else(|| self.offset()) as usize;
        HeapSnapshot {
            buffer: self.buffer[..end].to_vec(),
            table: self.table.clone(),
            next_handle: self.table.len() as u32,
        }
    }

    pub fn record(&self, handle: Handle) -> &AllocationRecord {
        &self.table[handle.index()]
    }

    /// Word at `address`. Compiler-side accessor for patching and tests;
    /// the hydrated equivalent lives on [`RuntimeHeap`].
    pub fn get(&self, address: u32) -> i32 {
        self.buffer[address as usize]
    }

    /// Overwrites a previously reserved operand word. The site must still
    /// hold the sentinel.
    pub fn set_reserved(&mut self, address: u32, word: i32) {
        self.patch_word(address, word);
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only heap hydrated from a snapshot.
#[derive(Debug, Clone)]
pub struct RuntimeHeap {
    buffer: Vec<i32>,
    table: Vec<AllocationRecord>,
}

impl RuntimeHeap {
    pub fn hydrate(snapshot: HeapSnapshot) -> Self {
        RuntimeHeap {
            buffer: snapshot.buffer,
            table: snapshot.table,
        }
    }

    pub fn address_of(&self, handle: Handle) -> u32 {
        let record = &self.table[handle.index()];
        assert!(
            record.state != RegionState::Purged,
            "heap: address_of on a purged handle"
        );
        record.offset
    }

    /// Region size in words. Debug builds only; returns -1 otherwise.
    pub fn size_of(&self, handle: Handle) -> i32 {
        if cfg!(debug_assertions) {
            self.table[handle.index()].size as i32
        } else {
            -1
        }
    }

    pub fn scope_size_of(&self, handle: Handle) -> u32 {
        self.table[handle.index()].scope_size
    }

    pub fn get(&self, address: u32) -> i32 {
        assert!(
            (address as usize) < self.buffer.len(),
            "heap: address {address} out of bounds"
        );
        self.buffer[address as usize]
    }

    pub fn len(&self) -> u32 {
        self.buffer.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdlib() -> StdLib {
        StdLib {
            main: Handle(0),
            trusting_guarded_append: Handle(1),
            cautious_guarded_append: Handle(2),
        }
    }

    fn alloc(heap: &mut Heap, words: &[i32]) -> Handle {
        let handle = heap.malloc();
        for &word in words {
            heap.push(word);
        }
        heap.finish_malloc(handle, 0);
        handle
    }

    #[test]
    fn test_malloc_records_offset_and_size() {
        let mut heap = Heap::new();
        let a = alloc(&mut heap, &[10, 11, 12]);
        let b = alloc(&mut heap, &[20, 21]);

        assert_eq!(heap.record(a).offset, 0);
        assert_eq!(heap.record(a).size, 3);
        assert_eq!(heap.record(b).offset, 3);
        assert_eq!(heap.record(b).size, 2);
    }

    #[test]
    fn test_placeholder_patching() {
        let mut heap = Heap::new();
        let handle = heap.malloc();
        heap.push(1);
        heap.push_placeholder(Box::new(|| 99));
        heap.finish_malloc(handle, 0);

        assert_eq!(heap.get(1), PLACEHOLDER_WORD);
        heap.patch_placeholders();
        assert_eq!(heap.get(1), 99);
    }

    #[test]
    #[should_panic(expected = "ran twice")]
    fn test_double_patch_pass_panics() {
        let mut heap = Heap::new();
        heap.patch_placeholders();
        heap.patch_placeholders();
    }

    #[test]
    #[should_panic(expected = "no longer holds the sentinel")]
    fn test_patching_overwritten_site_panics() {
        let mut heap = Heap::new();
        let handle = heap.malloc();
        heap.push_placeholder(Box::new(|| 5));
        heap.finish_malloc(handle, 0);

        heap.set_reserved(0, 7);
        heap.patch_placeholders();
    }

    #[test]
    fn test_stdlib_patching() {
        let mut heap = Heap::new();
        let handle = heap.malloc();
        heap.push_stdlib(StdlibRef::Main);
        heap.push_stdlib(StdlibRef::CautiousGuardedAppend);
        heap.finish_malloc(handle, 0);

        heap.patch_stdlibs(&stdlib());
        assert_eq!(heap.get(0), 0);
        assert_eq!(heap.get(1), 2);
    }

    #[test]
    fn test_compaction_preserves_live_bytes() {
        let mut heap = Heap::new();
        let a = alloc(&mut heap, &[1, 2, 3]);
        let b = alloc(&mut heap, &[4, 5]);
        let c = alloc(&mut heap, &[6, 7, 8, 9]);

        let live_before: i64 = (heap.record(a).size + heap.record(c).size) as i64;

        heap.free(b);
        heap.compact();

        assert_eq!(heap.record(b).state, RegionState::Purged);
        assert_eq!(heap.offset(), 7);
        assert_eq!(
            live_before,
            (heap.record(a).size + heap.record(c).size) as i64
        );

        // Surviving regions are byte-identical at their new offsets.
        let c_offset = heap.record(c).offset;
        assert_eq!(c_offset, 3);
        assert_eq!(
            (0..4).map(|i| heap.get(c_offset + i)).collect::<Vec<_>>(),
            vec![6, 7, 8, 9]
        );
        let a_offset = heap.record(a).offset;
        assert_eq!(a_offset, 0);
        assert_eq!(
            (0..3).map(|i| heap.get(a_offset + i)).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_compaction_rewrites_pointer_aliases() {
        let mut heap = Heap::new();
        let a = alloc(&mut heap, &[1, 2]);
        let b = alloc(&mut heap, &[3, 4, 5]);
        let alias = heap.alias(b);

        heap.free(a);
        heap.compact();

        assert_eq!(heap.record(b).offset, 0);
        assert_eq!(heap.record(alias).offset, 0);
    }

    #[test]
    fn test_compaction_moves_pending_patch_sites() {
        let mut heap = Heap::new();
        let a = alloc(&mut heap, &[1, 2]);
        let b = heap.malloc();
        heap.push(3);
        heap.push_placeholder(Box::new(|| 42));
        heap.finish_malloc(b, 0);

        heap.free(a);
        heap.compact();
        heap.patch_placeholders();

        assert_eq!(heap.get(heap.record(b).offset + 1), 42);
    }

    #[test]
    fn test_capture_is_idempotent_after_patching() {
        let mut heap = Heap::new();
        let handle = heap.malloc();
        heap.push_placeholder(Box::new(|| 13));
        heap.finish_malloc(handle, 2);

        let lib = stdlib();
        let first = heap.capture(&lib, None);
        let second = heap.capture(&lib, None);
        assert_eq!(first, second);
        assert_eq!(first.buffer, vec![13]);
    }

    #[test]
    fn test_runtime_heap_views() {
        let mut heap = Heap::new();
        let handle = heap.malloc();
        heap.push(7);
        heap.push(8);
        heap.finish_malloc(handle, 3);

        let runtime = RuntimeHeap::hydrate(heap.capture(&stdlib(), None));
        assert_eq!(runtime.address_of(handle), 0);
        assert_eq!(runtime.scope_size_of(handle), 3);
        assert_eq!(runtime.get(1), 8);
        if cfg!(debug_assertions) {
            assert_eq!(runtime.size_of(handle), 2);
        }
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_runtime_heap_bounds_assertion() {
        let mut heap = Heap::new();
        let runtime = RuntimeHeap::hydrate(heap.capture(&stdlib(), None));
        runtime.get(10);
    }
}
