// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Delegate operations and the two-opcode call protocol.
//!
//! A delegate page stores (object, function, seq) triples. The seq field
//! is the generation tag the bound object's heap slot carried when the
//! binding was made; a mismatch means the object has died (and possibly
//! the slot was reused), and the entry is compacted away.
//!
//! Invocation is deliberately split across two opcodes: `DG_CALLBEGIN`
//! reshapes the stack, and `DG_CALL` re-executes once per entry. The
//! per-iteration re-execution lets the surrounding frame unwind cleanly
//! if a callee triggers a reset.

use ain_image::{DataType, Opcode};

use crate::error::{Exec, VmError};
use crate::page::{self, Page, PageKind};
use crate::vm::{VM_RETURN, Vm};

/// Remove the first entry binding (obj, fun), regardless of liveness.
pub(crate) fn delegate_erase(page: &mut Page, obj: i32, fun: i32) {
    for i in 0..page.delegate_len() {
        let (o, f, _) = page.delegate_entry(i);
        if o == obj && f == fun {
            page.delegate_remove(i);
            return;
        }
    }
}

impl Vm {
    /// A fresh one-entry delegate page bound to (obj, fun).
    pub(crate) fn delegate_new_from_method(&self, obj: i32, fun: i32) -> Page {
        let mut page = Page::new(PageKind::Delegate, 0);
        page.delegate_push(obj, fun, self.heap.seq(obj) as i32);
        page
    }

    /// Membership is identity on (obj, fun) with a live seq tag.
    pub(crate) fn delegate_contains(&self, page: Option<&Page>, obj: i32, fun: i32) -> bool {
        let Some(page) = page else { return false };
        (0..page.delegate_len()).any(|i| {
            let (o, f, seq) = page.delegate_entry(i);
            o == obj && f == fun && seq == self.heap.seq(obj) as i32
        })
    }

    /// Set-insertion append into the delegate held by `slot`.
    pub(crate) fn delegate_append_slot(&mut self, slot: i32, obj: i32, fun: i32) -> Exec<()> {
        let taken = self.heap.take_page(slot)?;
        let appended = self.delegate_append(taken, obj, fun);
        match appended {
            Ok(page) => {
                self.heap.put_page(slot, page);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Set-insertion append: duplicates (same object and function, still
    /// live) are not added twice.
    pub(crate) fn delegate_append(
        &mut self,
        page: Option<Page>,
        obj: i32,
        fun: i32,
    ) -> Exec<Option<Page>> {
        let Some(mut page) = page else {
            return Ok(Some(self.delegate_new_from_method(obj, fun)));
        };
        if page.kind != PageKind::Delegate {
            return Err(VmError::Fatal("not a delegate".to_owned()).into());
        }
        if self.delegate_contains(Some(&page), obj, fun) {
            return Ok(Some(page));
        }
        page.delegate_push(obj, fun, self.heap.seq(obj) as i32);
        Ok(Some(page))
    }

    /// Live entry count. Compacts stale entries first, so this doubles as
    /// the delegate garbage collector.
    pub(crate) fn delegate_numof(&mut self, slot: i32) -> Exec<i32> {
        let Some(mut page) = self.heap.take_page(slot)? else {
            return Ok(0);
        };
        if page.kind != PageKind::Delegate {
            self.heap.put_page(slot, Some(page));
            return Err(VmError::Fatal("not a delegate".to_owned()).into());
        }
        let mut i = 0;
        while i < page.delegate_len() {
            let (obj, _, seq) = page.delegate_entry(i);
            if self.heap.seq(obj) as i32 == seq {
                i += 1;
            } else {
                page.delegate_remove(i);
            }
        }
        let n = page.delegate_len() as i32;
        self.heap.put_page(slot, Some(page));
        Ok(n)
    }

    /// Entry `i`, compacting stale entries encountered on the way.
    pub(crate) fn delegate_get(&mut self, slot: i32, i: i32) -> Exec<Option<(i32, i32)>> {
        let Some(mut page) = self.heap.take_page(slot)? else {
            return Ok(None);
        };
        if page.kind != PageKind::Delegate {
            self.heap.put_page(slot, Some(page));
            return Err(VmError::Fatal("not a delegate".to_owned()).into());
        }
        let i = i.max(0) as usize;
        let mut result = None;
        while i < page.delegate_len() {
            let (obj, fun, seq) = page.delegate_entry(i);
            if self.heap.seq(obj) as i32 == seq {
                result = Some((obj, fun));
                break;
            }
            page.delegate_remove(i);
        }
        self.heap.put_page(slot, Some(page));
        Ok(result)
    }

    /// Union: append every live entry of `add` into `dst`.
    pub(crate) fn delegate_plusa(&mut self, dst: i32, add: i32) -> Exec<()> {
        if dst == add {
            // every entry is already a member of itself
            return Ok(());
        }
        let Some(add_page) = self.heap.take_page(add)? else {
            return Ok(());
        };
        let mut result = Ok(());
        for i in 0..add_page.delegate_len() {
            let (obj, fun, seq) = add_page.delegate_entry(i);
            if self.heap.seq(obj) as i32 == seq {
                result = self.delegate_append_slot(dst, obj, fun);
                if result.is_err() {
                    break;
                }
            }
        }
        self.heap.put_page(add, Some(add_page));
        result
    }

    /// Difference: erase every live entry of `minus` from `dst`.
    pub(crate) fn delegate_minusa(&mut self, dst: i32, minus: i32) -> Exec<()> {
        if dst == minus {
            if let Some(p) = self.heap.page_mut(dst)? {
                p.values_mut().clear();
            }
            return Ok(());
        }
        let Some(minus_page) = self.heap.take_page(minus)? else {
            return Ok(());
        };
        for i in 0..minus_page.delegate_len() {
            let (obj, fun, seq) = minus_page.delegate_entry(i);
            if self.heap.seq(obj) as i32 == seq {
                if let Ok(Some(p)) = self.heap.page_mut(dst) {
                    delegate_erase(p, obj, fun);
                }
            }
        }
        self.heap.put_page(minus, Some(minus_page));
        Ok(())
    }

    /// One delegate invocation: call the entry at the index on top of the
    /// stack with a copy of the marshalled arguments, bound to its
    /// object, and run it to completion.
    fn delegate_call(&mut self, dg_no: i32) -> Exec<()> {
        let saved_ip = self.ip;
        // stack: [arg0, ..., dg_page, dg_index]
        let dg_page = self.peek(1)?.as_int();
        let dg_index = self.peek(0)?.as_int();
        let Some((obj, fun)) = self.delegate_get(dg_page, dg_index)? else {
            return Err(VmError::Fatal("stale delegate entry invoked".to_owned()).into());
        };

        let slot = self.function_call_base(fun, VM_RETURN)?;
        let nr_args = self.image.delegates[dg_no as usize].nr_args;
        for i in 0..nr_args {
            let arg = self.peek(nr_args + 1 - i)?;
            let ty = self.image.delegates[dg_no as usize].variables[i].ty.data;
            let copied = page::vm_copy(&self.image, &mut self.heap, arg, ty)?;
            if let Some(p) = self.heap.page_mut(slot)? {
                p.set(i, copied);
            }
        }
        if let Some(frame) = self.call_stack.last_mut() {
            frame.struct_page = obj;
        }
        self.execute()?;
        self.ip = saved_ip;
        Ok(())
    }

    /// The `DG_CALLBEGIN` stack reshape:
    /// before `[dg_page, arg0, ...]`, after `[arg0, ..., dg_page, 0]`,
    /// plus a return-value placeholder for non-void delegates.
    pub(crate) fn op_dg_callbegin(&mut self) -> Exec<()> {
        let dg_no = self.arg(0)?;
        let dg = self
            .image
            .delegates
            .get(dg_no as usize)
            .ok_or(VmError::InvalidDelegate { index: dg_no })?;
        let nr_args = dg.nr_args;
        let returns = dg.return_type.data != DataType::Void;

        let dg_page = self.peek(nr_args)?;
        for n in (0..nr_args).rev() {
            let v = self.peek(n)?;
            self.stack_set(n + 1, v)?;
        }
        self.stack_set(0, dg_page)?;
        self.push(0);
        if returns {
            // dummy cell for DG_CALL to replace with each return value
            self.push(0);
        }
        Ok(())
    }

    /// The `DG_CALL` step: invoke the next live entry and re-execute, or
    /// tear the iteration down and fall through to the exit address.
    pub(crate) fn op_dg_call(&mut self) -> Exec<bool> {
        let dg_no = self.arg(0)?;
        let dg = self
            .image
            .delegates
            .get(dg_no as usize)
            .ok_or(VmError::InvalidDelegate { index: dg_no })?;
        let returns = dg.return_type.data != DataType::Void;
        let nr_args = dg.nr_args;
        let rv = usize::from(returns);

        // stack: [arg0, ..., dg_page, dg_index, [return_value]]
        let dg_page = self.peek(1 + rv)?.as_int();
        let dg_index = self.peek(rv)?.as_int();

        if dg_index < self.delegate_numof(dg_page)? {
            if returns {
                self.pop()?; // previous iteration's return value
            }
            self.delegate_call(dg_no)?;
            // advance the index beneath the fresh return value
            let index = self.peek(rv)?.as_int();
            self.stack_set(rv, index + 1)?;
            self.ip += Opcode::DG_CALL.width();
            return Ok(false);
        }

        // iteration finished: drop the bookkeeping and the argument
        // copies, keeping only the final return value
        let result = if returns { Some(self.pop()?) } else { None };
        self.pop()?; // dg_index
        self.pop()?; // dg_page
        for i in (0..nr_args).rev() {
            let ty = self.image.delegates[dg_no as usize].variables[i].ty.data;
            let v = self.pop()?;
            self.variable_fini(v, ty, true)?;
        }
        if let Some(r) = result {
            self.push(r);
        }
        let exit = self.arg(1)?;
        self.ip = exit as u32;
        Ok(false)
    }
}
