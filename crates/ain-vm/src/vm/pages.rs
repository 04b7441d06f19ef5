// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Reference release, struct lifecycle and global assignment.
//!
//! Dropping the last reference to a struct page runs its destructor,
//! which re-enters the dispatcher; everything on this path therefore
//! lives on the VM rather than the heap. The shutdown-path variant
//! (`Heap::exit_unref`) releases the same storage without destructors.

use ain_image::DataType;

use crate::error::{Exec, VmError};
use crate::heap::{GLOBAL_PAGE_SLOT, HeapObject};
use crate::page::{self, PageKind};
use crate::value::Value;
use crate::vm::Vm;

impl Vm {
    /// Drop one reference; on zero, run the destructor (for struct
    /// pages), finalize every member, and free the slot.
    ///
    /// Slot 0 (the global page) is pinned and may never be released this
    /// way.
    pub(crate) fn unref(&mut self, slot: i32) -> Exec<()> {
        if slot == GLOBAL_PAGE_SLOT {
            return Err(VmError::Fatal("attempted to unref the global page".to_owned()).into());
        }
        if self.heap.ref_count(slot) <= 0 {
            return Err(VmError::DoubleFree { slot }.into());
        }
        if self.heap.ref_count(slot) > 1 {
            self.heap.dec(slot)?;
            return Ok(());
        }
        // The last reference is going away: the destructor (if any) runs
        // while the slot is still intact, then members are finalized.
        if let Ok(Some(p)) = self.heap.page(slot) {
            if let PageKind::Struct { struct_type } = p.kind {
                let dtor = self.image.structures[struct_type as usize].destructor;
                if dtor > 0 {
                    self.call_function(dtor, slot)?;
                }
            }
        }
        self.heap.dec(slot)?;
        match self.heap.free_slot(slot) {
            Some(HeapObject::Page(Some(p))) => {
                for i in 0..p.nr_vars() {
                    let ty = p.variable_type(&self.image, i).data;
                    self.variable_fini(p.get(i), ty, true)?;
                }
            }
            Some(_) | None => {}
        }
        Ok(())
    }

    /// Finalize one variable: strings, structs, delegates, arrays and
    /// references drop the slot they hold; value scalars need nothing.
    pub(crate) fn variable_fini(&mut self, v: Value, ty: DataType, call_dtor: bool) -> Exec<()> {
        if !ty.is_heap_backed() || v.as_int() == -1 {
            return Ok(());
        }
        if call_dtor {
            self.unref(v.as_int())
        } else {
            self.heap.exit_unref(&self.image, v.as_int());
            Ok(())
        }
    }

    /// Finalize and replace one cell of the page held by `array_slot`.
    ///
    /// The old value is released after the new one is in place, so a
    /// destructor re-entering the dispatcher sees a consistent page.
    pub(crate) fn variable_set_in(
        &mut self,
        page_slot: i32,
        index: usize,
        ty: DataType,
        v: Value,
    ) -> Exec<()> {
        let old = match self.heap.page_mut(page_slot)? {
            Some(p) if index < p.nr_vars() => {
                let old = p.get(index);
                p.set(index, v);
                old
            }
            _ => {
                return Err(
                    VmError::PageIndexOutOfBounds { slot: page_slot, index: index as i32 }.into()
                );
            }
        };
        self.variable_fini(old, ty, true)
    }

    /// Drop a page's storage (finalizing every member) while keeping the
    /// slot itself alive and empty.
    pub(crate) fn delete_page_storage(&mut self, slot: i32) -> Exec<()> {
        let Some(p) = self.heap.take_page(slot)? else {
            return Ok(());
        };
        for i in 0..p.nr_vars() {
            let ty = p.variable_type(&self.image, i).data;
            self.variable_fini(p.get(i), ty, true)?;
        }
        Ok(())
    }

    /// Allocate and construct a struct object: storage first, then the
    /// constructor chain.
    pub(crate) fn create_struct(&mut self, struct_no: i32) -> Exec<i32> {
        let slot = page::alloc_struct(&self.image, &mut self.heap, struct_no)?;
        self.init_struct(struct_no, slot)?;
        Ok(slot)
    }

    /// Run constructors over an allocated struct: members first, then the
    /// struct's own constructor (bound to the page as `this`).
    pub(crate) fn init_struct(&mut self, struct_no: i32, slot: i32) -> Exec<()> {
        let nr_members = self.image.structures[struct_no as usize].members.len();
        for i in 0..nr_members {
            let ty = self.image.structures[struct_no as usize].members[i].ty;
            if ty.data == DataType::Struct {
                let member_slot = self.heap.expect_page(slot)?.get(i).as_int();
                self.init_struct(ty.struc, member_slot)?;
            }
        }
        let ctor = self.image.structures[struct_no as usize].constructor;
        if ctor > 0 {
            self.call_function(ctor, slot)?;
        }
        Ok(())
    }

    /// Struct assignment: the destructor runs on the left-hand object,
    /// its members are finalized, and the right-hand page is deep-copied
    /// into the same slot (identity is preserved).
    pub(crate) fn struct_assign(&mut self, lval: i32, rval: i32) -> Exec<()> {
        if let Ok(Some(p)) = self.heap.page(lval) {
            if let PageKind::Struct { struct_type } = p.kind {
                let dtor = self.image.structures[struct_type as usize].destructor;
                if dtor > 0 {
                    self.call_function(dtor, lval)?;
                }
            }
        }
        if let Some(p) = self.heap.take_page(lval)? {
            for i in 0..p.nr_vars() {
                let ty = p.variable_type(&self.image, i).data;
                self.variable_fini(p.get(i), ty, true)?;
            }
        }
        let copy = {
            let taken = self.heap.take_page(rval)?;
            let copy = match &taken {
                Some(p) => Some(page::copy_page(&self.image, &mut self.heap, p)?),
                None => None,
            };
            self.heap.put_page(rval, taken);
            copy
        };
        self.heap.put_page(lval, copy);
        Ok(())
    }

    /// Assign a global, finalizing the old value for owned heap types.
    /// Loads pass `call_dtors = false`: destructors for replaced objects
    /// are not called.
    pub(crate) fn global_set(&mut self, varno: usize, val: Value, call_dtors: bool) -> Exec<()> {
        let ty = self.image.globals[varno].ty.data;
        if ty.is_heap_backed() {
            let old = self.global_get(varno)?.as_int();
            if old > 0 {
                if call_dtors {
                    self.unref(old)?;
                } else {
                    self.heap.exit_unref(&self.image, old);
                }
            }
        }
        if let Some(p) = self.heap.page_mut(GLOBAL_PAGE_SLOT)? {
            p.set(varno, val);
        }
        Ok(())
    }
}
