// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! The heap: a reference-counted slot array.
//!
//! A slot holds either a string or a page. Slot 0 is permanently reserved
//! for the global page; its reference count is pinned for the life of the
//! program. A slot's kind never changes while its count is above zero,
//! and a slot whose count is zero sits on the free list.
//!
//! Every allocation stamps the slot with a fresh generation tag (`seq`).
//! Delegates record the tag of the object they bind; when the object dies
//! and the slot is reused, the tag no longer matches and the entry is
//! garbage collected by the delegate operations.
//!
//! Releasing a slot whose contents require destructor calls re-enters the
//! dispatcher, so the destructor-running `unref` lives on the VM. The
//! shutdown path (`exit_unref`) releases storage without ever calling
//! back into bytecode.


use ain_image::Image;
use tracing::warn;

use crate::error::VmError;
use crate::page::Page;

/// Slot index of the global page.
pub const GLOBAL_PAGE_SLOT: i32 = 0;

const INITIAL_HEAP_SIZE: usize = 4096;
const HEAP_ALLOC_STEP: usize = 4096;

/// What kind of object a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Page,
    String,
}

impl SlotKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Page => "VM_PAGE",
            Self::String => "VM_STRING",
        }
    }
}

/// The object held by a live slot.
///
/// A `Page` slot may hold no page at all: empty arrays and delegates keep
/// their slot but drop the storage.
#[derive(Debug)]
pub enum HeapObject {
    Page(Option<Page>),
    String(String),
}

#[derive(Debug, Default)]
struct Slot {
    ref_count: i32,
    seq: u32,
    obj: Option<HeapObject>,
}

/// The slot array plus its free list.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<i32>,
    next_seq: u32,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// A fresh heap with slot 0 allocated for the global page.
    #[must_use]
    pub fn new() -> Self {
        let mut heap = Self { slots: Vec::new(), free: Vec::new(), next_seq: 1 };
        heap.grow(INITIAL_HEAP_SIZE);
        let slot0 = heap.free.pop();
        debug_assert_eq!(slot0, Some(GLOBAL_PAGE_SLOT));
        heap.slots[0] = Slot { ref_count: 1, seq: heap.bump_seq(), obj: Some(HeapObject::Page(None)) };
        heap
    }

    fn grow(&mut self, step: usize) {
        let old = self.slots.len();
        self.slots.resize_with(old + step, Slot::default);
        for i in (old..old + step).rev() {
            self.free.push(i as i32);
        }
    }

    fn bump_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Number of slots (live and free).
    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Allocate a slot holding the given object, with ref count 1.
    pub fn alloc(&mut self, obj: HeapObject) -> i32 {
        if self.free.is_empty() {
            self.grow(HEAP_ALLOC_STEP);
        }
        let slot = self.free.pop().unwrap_or_else(|| unreachable!("free list refilled above"));
        let seq = self.bump_seq();
        self.slots[slot as usize] = Slot { ref_count: 1, seq, obj: Some(obj) };
        slot
    }

    /// Allocate a page slot.
    pub fn alloc_page_slot(&mut self, page: Option<Page>) -> i32 {
        self.alloc(HeapObject::Page(page))
    }

    /// Allocate a string slot.
    pub fn alloc_string_slot(&mut self, s: String) -> i32 {
        self.alloc(HeapObject::String(s))
    }

    /// Increment a slot's reference count. No-op for -1.
    pub fn add_ref(&mut self, slot: i32) {
        if slot == -1 {
            return;
        }
        if let Some(s) = self.slots.get_mut(slot as usize) {
            s.ref_count += 1;
        }
    }

    /// Current reference count (0 for free or out-of-range slots).
    #[must_use]
    pub fn ref_count(&self, slot: i32) -> i32 {
        usize::try_from(slot)
            .ok()
            .and_then(|i| self.slots.get(i))
            .map_or(0, |s| s.ref_count)
    }

    /// Generation tag of a live slot; 0 when the slot is not live, which
    /// never matches a recorded tag.
    #[must_use]
    pub fn seq(&self, slot: i32) -> u32 {
        usize::try_from(slot)
            .ok()
            .and_then(|i| self.slots.get(i))
            .map_or(0, |s| if s.ref_count > 0 { s.seq } else { 0 })
    }

    /// True when `slot` indexes a live slot.
    #[must_use]
    pub fn index_valid(&self, slot: i32) -> bool {
        self.ref_count(slot) > 0
    }

    /// True when `slot` indexes a live page slot.
    #[must_use]
    pub fn page_index_valid(&self, slot: i32) -> bool {
        matches!(self.object(slot), Some(HeapObject::Page(_)))
    }

    /// Kind of a live slot.
    #[must_use]
    pub fn kind(&self, slot: i32) -> Option<SlotKind> {
        match self.object(slot)? {
            HeapObject::Page(_) => Some(SlotKind::Page),
            HeapObject::String(_) => Some(SlotKind::String),
        }
    }

    fn object(&self, slot: i32) -> Option<&HeapObject> {
        let s = usize::try_from(slot).ok().and_then(|i| self.slots.get(i))?;
        if s.ref_count > 0 { s.obj.as_ref() } else { None }
    }

    /// The string held by `slot`.
    pub fn string(&self, slot: i32) -> Result<&str, VmError> {
        match self.object(slot) {
            Some(HeapObject::String(s)) => Ok(s),
            _ => Err(VmError::HeapOutOfBounds { slot }),
        }
    }

    /// Mutable access to the string held by `slot`.
    pub fn string_mut(&mut self, slot: i32) -> Result<&mut String, VmError> {
        match self.slots.get_mut(slot as usize).filter(|s| s.ref_count > 0).and_then(|s| s.obj.as_mut())
        {
            Some(HeapObject::String(s)) => Ok(s),
            _ => Err(VmError::HeapOutOfBounds { slot }),
        }
    }

    /// Replace the contents of the string held by `slot`. Assignment
    /// copies contents; it never rebinds the slot.
    pub fn string_assign(&mut self, slot: i32, contents: &str) -> Result<(), VmError> {
        let s = self.string_mut(slot)?;
        s.clear();
        s.push_str(contents);
        Ok(())
    }

    /// The page held by `slot`, which must be a live page slot.
    pub fn page(&self, slot: i32) -> Result<Option<&Page>, VmError> {
        match self.object(slot) {
            Some(HeapObject::Page(p)) => Ok(p.as_ref()),
            _ => Err(VmError::InvalidPageIndex { slot }),
        }
    }

    /// The page held by `slot`, which must be present.
    pub fn expect_page(&self, slot: i32) -> Result<&Page, VmError> {
        self.page(slot)?.ok_or(VmError::InvalidPageIndex { slot })
    }

    /// Mutable access to the page held by `slot`.
    pub fn page_mut(&mut self, slot: i32) -> Result<Option<&mut Page>, VmError> {
        match self.slots.get_mut(slot as usize).filter(|s| s.ref_count > 0).and_then(|s| s.obj.as_mut())
        {
            Some(HeapObject::Page(p)) => Ok(p.as_mut()),
            _ => Err(VmError::InvalidPageIndex { slot }),
        }
    }

    /// Detach the page from `slot`, leaving the slot live and empty.
    ///
    /// Operations that restructure a page (array growth, sorting with a
    /// bytecode comparator) take the page out, work on it, and put it
    /// back; the reference points at the slot, not the storage, so this
    /// survives reallocation.
    pub fn take_page(&mut self, slot: i32) -> Result<Option<Page>, VmError> {
        match self.slots.get_mut(slot as usize).filter(|s| s.ref_count > 0).and_then(|s| s.obj.as_mut())
        {
            Some(HeapObject::Page(p)) => Ok(p.take()),
            _ => Err(VmError::InvalidPageIndex { slot }),
        }
    }

    /// Attach a page to a live page slot.
    pub fn put_page(&mut self, slot: i32, page: Option<Page>) {
        if let Some(HeapObject::Page(p)) =
            self.slots.get_mut(slot as usize).filter(|s| s.ref_count > 0).and_then(|s| s.obj.as_mut())
        {
            *p = page;
        }
    }

    /// Decrement a slot's reference count without freeing.
    ///
    /// Returns the new count. The caller (the VM's `unref`) finalizes the
    /// slot when the count would drop from one.
    pub fn dec(&mut self, slot: i32) -> Result<i32, VmError> {
        let s = self
            .slots
            .get_mut(slot as usize)
            .ok_or(VmError::HeapOutOfBounds { slot })?;
        if s.ref_count <= 0 {
            return Err(VmError::DoubleFree { slot });
        }
        s.ref_count -= 1;
        Ok(s.ref_count)
    }

    /// Release a slot whose count has reached zero, returning its object.
    pub(crate) fn free_slot(&mut self, slot: i32) -> Option<HeapObject> {
        let s = self.slots.get_mut(slot as usize)?;
        s.ref_count = 0;
        let obj = s.obj.take();
        self.free.push(slot);
        obj
    }

    /// Shutdown-path release: recursively drop a reference, releasing
    /// reachable storage but never invoking destructors. Problems are
    /// logged, not fatal; this path runs while unwinding.
    pub fn exit_unref(&mut self, image: &Image, slot: i32) {
        if slot < 0 || slot as usize >= self.slots.len() {
            warn!(slot, "out of bounds heap index");
            return;
        }
        if self.slots[slot as usize].ref_count <= 0 {
            warn!(slot, "double free");
            return;
        }
        if self.slots[slot as usize].ref_count > 1 {
            self.slots[slot as usize].ref_count -= 1;
            return;
        }
        if let Some(HeapObject::Page(Some(page))) = self.free_slot(slot) {
            for i in 0..page.nr_vars() {
                let ty = page.variable_type(image, i).data;
                if ty.is_heap_backed() && page.get(i).as_int() != -1 {
                    self.exit_unref(image, page.get(i).as_int());
                }
            }
        }
    }

    /// Iterate live slots as (index, ref count, seq, object).
    pub fn entries(&self) -> impl Iterator<Item = (i32, i32, u32, &HeapObject)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            let obj = s.obj.as_ref()?;
            (s.ref_count > 0).then_some((i as i32, s.ref_count, s.seq, obj))
        })
    }

    /// Replace the entire heap with restored slots (snapshot load).
    ///
    /// Every index not present in `entries` lands on the free list.
    pub(crate) fn restore(&mut self, entries: Vec<(i32, i32, u32, HeapObject)>) {
        let max = entries
            .iter()
            .map(|&(i, ..)| i as usize + 1)
            .max()
            .unwrap_or(0)
            .max(INITIAL_HEAP_SIZE);
        let size = max.div_ceil(HEAP_ALLOC_STEP) * HEAP_ALLOC_STEP;

        self.slots = Vec::new();
        self.slots.resize_with(size, Slot::default);
        let mut max_seq = 0;
        for (slot, ref_count, seq, obj) in entries {
            max_seq = max_seq.max(seq);
            self.slots[slot as usize] = Slot { ref_count, seq, obj: Some(obj) };
        }
        self.next_seq = max_seq + 1;
        self.free = (0..size as i32).rev().filter(|&i| self.slots[i as usize].ref_count == 0).collect();
    }
}
