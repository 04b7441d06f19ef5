// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! The fused shorthand opcodes.
//!
//! Each of these is the literal fusion of a short sequence of simpler
//! opcodes and must produce identical observable state. They are kept in
//! one place and written mechanically; nothing here introduces semantics
//! of its own.

use ain_image::{DataType, Opcode};

use crate::error::{Exec, VmError};
use crate::page;
use crate::value::Value;
use crate::vm::{VarRef, Vm};

impl Vm {
    /// Execute one shorthand instruction. Same return contract as
    /// `execute_instruction`.
    #[allow(clippy::too_many_lines)]
    pub(crate) fn execute_shorthand(&mut self, op: Opcode) -> Exec<bool> {
        match op {
            Opcode::SH_GLOBALREF => {
                let v = self.global_get(self.arg(0)? as usize)?;
                self.push(v);
            }
            Opcode::SH_LOCALREF => {
                let v = self.local_get(self.arg(0)?)?;
                self.push(v);
            }
            Opcode::SH_STRUCTREF => {
                let v = self.member_get(self.arg(0)?)?;
                self.push(v);
            }
            Opcode::SH_LOCALASSIGN => {
                let varno = self.arg(0)?;
                let value = self.arg(1)?;
                self.local_set(varno, value)?;
            }
            Opcode::SH_LOCALINC => {
                let varno = self.arg(0)?;
                let v = self.local_get(varno)?.as_int();
                self.local_set(varno, v.wrapping_add(1))?;
            }
            Opcode::SH_LOCALDEC => {
                let varno = self.arg(0)?;
                let v = self.local_get(varno)?.as_int();
                self.local_set(varno, v.wrapping_sub(1))?;
            }
            Opcode::SH_LOCALDELETE => {
                let varno = self.arg(0)?;
                let slot = self.local_get(varno)?.as_int();
                if slot != -1 {
                    self.unref(slot)?;
                    self.local_set(varno, -1)?;
                }
            }
            Opcode::SH_LOCALCREATE => {
                // storage becomes visible through the variable before the
                // constructor chain runs
                let varno = self.arg(0)?;
                let struct_no = self.arg(1)?;
                let slot = page::alloc_struct(&self.image, &mut self.heap, struct_no)?;
                self.local_set(varno, slot)?;
                self.init_struct(struct_no, slot)?;
            }
            Opcode::SH_SR_ASSIGN => {
                let var_ref = self.pop_var()?;
                let rval = self.var_get(var_ref)?.as_int();
                let lval = self.pop()?.as_int();
                self.struct_assign(lval, rval)?;
            }
            Opcode::SH_MEM_ASSIGN_LOCAL => {
                let v = self.local_get(self.arg(1)?)?;
                self.member_set(self.arg(0)?, v)?;
            }
            Opcode::SH_MEM_ASSIGN_IMM => {
                let value = self.arg(1)?;
                self.member_set(self.arg(0)?, value)?;
            }
            Opcode::A_NUMOF_GLOB_1 => {
                let array = self.global_get(self.arg(0)? as usize)?.as_int();
                let n = super::array_numof(&self.heap, self.heap.page(array)?, 1);
                self.push(n);
            }
            Opcode::A_NUMOF_STRUCT_1 => {
                let array = self.member_get(self.arg(0)?)?.as_int();
                let n = super::array_numof(&self.heap, self.heap.page(array)?, 1);
                self.push(n);
            }
            Opcode::SH_LOCALREFREF => {
                let varno = self.arg(0)?;
                let outer = self.local_get(varno)?;
                let inner = self.local_get(varno + 1)?;
                self.push(outer);
                self.push(inner);
            }
            Opcode::SH_LOCALASSIGN_SUB_IMM => {
                let varno = self.arg(0)?;
                let imm = self.arg(1)?;
                let v = self.local_get(varno)?.as_int();
                self.local_set(varno, v.wrapping_sub(imm))?;
            }
            Opcode::SH_IF_LOC_LT_IMM => {
                return self.branch_if(self.local_get(self.arg(0)?)?.as_int() < self.arg(1)?, 2, op);
            }
            Opcode::SH_IF_LOC_GE_IMM => {
                return self.branch_if(self.local_get(self.arg(0)?)?.as_int() >= self.arg(1)?, 2, op);
            }
            Opcode::SH_IF_LOC_GT_IMM => {
                return self.branch_if(self.local_get(self.arg(0)?)?.as_int() > self.arg(1)?, 2, op);
            }
            Opcode::SH_IF_LOC_NE_IMM => {
                return self.branch_if(self.local_get(self.arg(0)?)?.as_int() != self.arg(1)?, 2, op);
            }
            Opcode::SH_LOCREF_ASSIGN_MEM => {
                let varno = self.arg(0)?;
                let slot = self.local_get(varno)?.as_int();
                let index = self.local_get(varno + 1)?.as_int();
                let v = self.member_get(self.arg(1)?)?;
                self.var_set(VarRef { slot, index }, v)?;
            }
            Opcode::PAGE_REF => {
                let varno = self.arg(0)?;
                let slot = self.pop()?.as_int();
                let v = self.heap.expect_page(slot)?.get(varno as usize);
                self.push(v);
            }
            Opcode::SH_GLOBAL_ASSIGN_LOCAL => {
                let v = self.local_get(self.arg(1)?)?;
                self.global_set(self.arg(0)? as usize, v, true)?;
            }
            Opcode::SH_GLOBAL_ASSIGN_IMM => {
                let value = self.arg(1)?;
                self.global_set(self.arg(0)? as usize, Value::int(value), false)?;
            }
            Opcode::SH_LOCALSTRUCT_ASSIGN_IMM => {
                let slot = self.local_get(self.arg(0)?)?.as_int();
                let index = self.arg(1)?;
                let value = self.arg(2)?;
                self.var_set(VarRef { slot, index }, Value::int(value))?;
            }
            Opcode::SH_STRUCTREF_GT_IMM => {
                let v = self.member_get(self.arg(0)?)?.as_int();
                self.push(v > self.arg(1)?);
            }
            Opcode::SH_STRUCT_ASSIGN_LOCALREF_ITOB => {
                let v = self.local_get(self.arg(1)?)?.as_int();
                self.member_set(self.arg(0)?, v != 0)?;
            }
            Opcode::SH_LOCAL_ASSIGN_STRUCTREF => {
                let v = self.member_get(self.arg(1)?)?;
                self.local_set(self.arg(0)?, v)?;
            }
            Opcode::SH_IF_STRUCTREF_NE_LOCALREF => {
                let cond =
                    self.member_get(self.arg(0)?)?.as_int() != self.local_get(self.arg(1)?)?.as_int();
                return self.branch_if(cond, 2, op);
            }
            Opcode::SH_IF_STRUCTREF_GT_IMM => {
                return self.branch_if(self.member_get(self.arg(0)?)?.as_int() > self.arg(1)?, 2, op);
            }
            Opcode::SH_IF_STRUCTREF_NE_IMM => {
                return self.branch_if(self.member_get(self.arg(0)?)?.as_int() != self.arg(1)?, 2, op);
            }
            Opcode::SH_IF_STRUCTREF_EQ_IMM => {
                return self.branch_if(self.member_get(self.arg(0)?)?.as_int() == self.arg(1)?, 2, op);
            }
            Opcode::SH_IF_STRUCTREF_Z => {
                return self.branch_if(self.member_get(self.arg(0)?)?.as_int() == 0, 1, op);
            }
            Opcode::SH_IF_STRUCT_A_NOT_EMPTY => {
                let array = self.member_get(self.arg(0)?)?.as_int();
                let not_empty = self.heap.page(array)?.map_or(false, |p| p.nr_vars() > 0);
                return self.branch_if(not_empty, 1, op);
            }
            Opcode::SH_STRUCTREF_CALLMETHOD_NO_PARAM => {
                let receiver = self.member_get(self.arg(0)?)?.as_int();
                let fno = self.arg(1)?;
                return self.call_bound(fno, receiver, op);
            }
            Opcode::SH_STRUCTREF2 => {
                let memb = self.member_get(self.arg(0)?)?.as_int();
                let v = self.heap.expect_page(memb)?.get(self.arg(1)? as usize);
                self.push(v);
            }
            Opcode::SH_REF_STRUCTREF2 => {
                let slot = self.pop()?.as_int();
                let memb = self.heap.expect_page(slot)?.get(self.arg(0)? as usize).as_int();
                let v = self.heap.expect_page(memb)?.get(self.arg(1)? as usize);
                self.push(v);
            }
            Opcode::SH_STRUCTREF3 => {
                let memb0 = self.member_get(self.arg(0)?)?.as_int();
                let memb1 = self.heap.expect_page(memb0)?.get(self.arg(1)? as usize).as_int();
                let v = self.heap.expect_page(memb1)?.get(self.arg(2)? as usize);
                self.push(v);
            }
            Opcode::SH_STRUCTREF2_CALLMETHOD_NO_PARAM => {
                let memb0 = self.member_get(self.arg(0)?)?.as_int();
                let receiver = self.heap.expect_page(memb0)?.get(self.arg(1)? as usize).as_int();
                let fno = self.arg(2)?;
                return self.call_bound(fno, receiver, op);
            }
            Opcode::THISCALLMETHOD_NOPARAM => {
                let receiver = self.struct_page_slot()?;
                let fno = self.arg(0)?;
                return self.call_bound(fno, receiver, op);
            }
            Opcode::SH_STRUCT_A_PUSHBACK_LOCAL_STRUCT => {
                let array = self.member_get(self.arg(0)?)?.as_int();
                let v = self.local_get(self.arg(1)?)?;
                let copied = page::vm_copy(&self.image, &mut self.heap, v, DataType::Struct)?;
                let page_slot = self.struct_page_slot()?;
                let ty = self
                    .heap
                    .expect_page(page_slot)?
                    .variable_type(&self.image, self.arg(0)? as usize);
                self.array_pushback(array, copied, ty.data, ty.struc)?;
            }
            Opcode::SH_GLOBAL_A_PUSHBACK_LOCAL_STRUCT => {
                let array = self.global_get(self.arg(0)? as usize)?.as_int();
                let v = self.local_get(self.arg(1)?)?;
                let copied = page::vm_copy(&self.image, &mut self.heap, v, DataType::Struct)?;
                let ty = self.image.globals[self.arg(0)? as usize].ty;
                self.array_pushback(array, copied, ty.data, ty.struc)?;
            }
            Opcode::SH_LOCAL_A_PUSHBACK_LOCAL_STRUCT => {
                let array = self.local_get(self.arg(0)?)?.as_int();
                let v = self.local_get(self.arg(1)?)?;
                let copied = page::vm_copy(&self.image, &mut self.heap, v, DataType::Struct)?;
                let page_slot = self.local_page_slot()?;
                let ty = self
                    .heap
                    .expect_page(page_slot)?
                    .variable_type(&self.image, self.arg(0)? as usize);
                self.array_pushback(array, copied, ty.data, ty.struc)?;
            }
            Opcode::SH_IF_SREF_NE_STR0 => {
                let var_ref = self.pop_var()?;
                let slot = self.var_get(var_ref)?.as_int();
                let a = self.heap.string(slot)?;
                let b = self.image_string(self.arg(0)?)?;
                let cond = a != b;
                return self.branch_if(cond, 1, op);
            }
            Opcode::SH_S_ASSIGN_REF => {
                let var_ref = self.pop_var()?;
                let rval = self.var_get(var_ref)?.as_int();
                let lval = self.pop()?.as_int();
                let s = self.heap.string(rval)?.to_owned();
                self.heap.string_assign(lval, &s)?;
            }
            Opcode::SH_A_FIND_SREF => {
                let var_ref = self.pop_var()?;
                let v = self.var_get(var_ref)?;
                let end = self.pop()?.as_int();
                let start = self.pop()?.as_int();
                let var_ref = self.pop_var()?;
                let array = self.var_get(var_ref)?.as_int();
                let found = self.array_find(array, start, end, v, 0)?;
                self.push(found);
            }
            Opcode::SH_SREF_EMPTY => {
                let var_ref = self.pop_var()?;
                let slot = self.var_get(var_ref)?.as_int();
                let empty = self.heap.string(slot)?.is_empty();
                self.push(empty);
            }
            Opcode::SH_STRUCTSREF_EQ_LOCALSREF => {
                let a = self.member_get(self.arg(0)?)?.as_int();
                let b = self.local_get(self.arg(1)?)?.as_int();
                let eq = self.heap.string(a)? == self.heap.string(b)?;
                self.push(eq);
            }
            Opcode::SH_LOCALSREF_EQ_STR0 => {
                let a = self.local_get(self.arg(0)?)?.as_int();
                let eq = self.heap.string(a)? == self.image_string(self.arg(1)?)?;
                self.push(eq);
            }
            Opcode::SH_STRUCTSREF_NE_LOCALSREF => {
                let a = self.member_get(self.arg(0)?)?.as_int();
                let b = self.local_get(self.arg(1)?)?.as_int();
                let ne = self.heap.string(a)? != self.heap.string(b)?;
                self.push(ne);
            }
            Opcode::SH_LOCALSREF_NE_STR0 => {
                let a = self.local_get(self.arg(0)?)?.as_int();
                let ne = self.heap.string(a)? != self.image_string(self.arg(1)?)?;
                self.push(ne);
            }
            Opcode::SH_STRUCT_SR_REF => {
                // operand 1 (struct type) is not needed at runtime
                let sr = self.member_get(self.arg(0)?)?.as_int();
                let copy = page::copy_page_slot(&self.image, &mut self.heap, sr)?;
                self.push(copy);
            }
            Opcode::SH_STRUCT_S_REF => {
                let slot = self.member_get(self.arg(0)?)?.as_int();
                let s = self.heap.string(slot)?.to_owned();
                self.push_string(s);
            }
            Opcode::SH_REF_LOCAL_ASSIGN_STRUCTREF2 => {
                let memb = self.member_get(self.arg(0)?)?.as_int();
                let v = self.heap.expect_page(memb)?.get(self.arg(2)? as usize);
                let varno = self.arg(1)?;
                let slot = self.local_get(varno)?.as_int();
                let index = self.local_get(varno + 1)?.as_int();
                self.var_set(VarRef { slot, index }, v)?;
            }
            Opcode::SH_GLOBAL_S_REF => {
                let slot = self.global_get(self.arg(0)? as usize)?.as_int();
                let s = self.heap.string(slot)?.to_owned();
                self.push_string(s);
            }
            Opcode::SH_LOCAL_S_REF => {
                let slot = self.local_get(self.arg(0)?)?.as_int();
                let s = self.heap.string(slot)?.to_owned();
                self.push_string(s);
            }
            Opcode::SH_LOCALREF_SASSIGN_LOCALSREF => {
                let lval = self.local_get(self.arg(0)?)?.as_int();
                let rval = self.local_get(self.arg(1)?)?.as_int();
                let s = self.heap.string(rval)?.to_owned();
                self.heap.string_assign(lval, &s)?;
            }
            Opcode::SH_LOCAL_APUSHBACK_LOCALSREF => {
                let array = self.local_get(self.arg(0)?)?.as_int();
                let v = self.local_get(self.arg(1)?)?;
                let copied = page::vm_copy(&self.image, &mut self.heap, v, DataType::String)?;
                self.array_pushback(array, copied, DataType::ArrayString, -1)?;
            }
            Opcode::SH_GLOBAL_APUSHBACK_LOCALSREF => {
                let array = self.global_get(self.arg(0)? as usize)?.as_int();
                let v = self.local_get(self.arg(1)?)?;
                let copied = page::vm_copy(&self.image, &mut self.heap, v, DataType::String)?;
                self.array_pushback(array, copied, DataType::ArrayString, -1)?;
            }
            Opcode::SH_STRUCT_APUSHBACK_LOCALSREF => {
                let array = self.member_get(self.arg(0)?)?.as_int();
                let v = self.local_get(self.arg(1)?)?;
                let copied = page::vm_copy(&self.image, &mut self.heap, v, DataType::String)?;
                self.array_pushback(array, copied, DataType::ArrayString, -1)?;
            }
            Opcode::SH_S_ASSIGN_CALLSYS19 => {
                let index = self.pop()?.as_int();
                let name = self.get_func_stack_name(index);
                let lval = self.pop()?.as_int();
                self.heap.string_assign(lval, &name)?;
            }
            Opcode::SH_S_ASSIGN_STR0 => {
                let lval = self.pop()?.as_int();
                let s = self.image_string(self.arg(0)?)?.to_owned();
                self.heap.string_assign(lval, &s)?;
            }
            Opcode::SH_SASSIGN_LOCALSREF => {
                let lval = self.pop()?.as_int();
                let rval = self.local_get(self.arg(0)?)?.as_int();
                let s = self.heap.string(rval)?.to_owned();
                self.heap.string_assign(lval, &s)?;
            }
            Opcode::SH_SASSIGN_STRUCTSREF => {
                let lval = self.pop()?.as_int();
                let rval = self.member_get(self.arg(0)?)?.as_int();
                let s = self.heap.string(rval)?.to_owned();
                self.heap.string_assign(lval, &s)?;
            }
            Opcode::SH_SASSIGN_GLOBALSREF => {
                let lval = self.pop()?.as_int();
                let rval = self.global_get(self.arg(0)? as usize)?.as_int();
                let s = self.heap.string(rval)?.to_owned();
                self.heap.string_assign(lval, &s)?;
            }
            Opcode::SH_STRUCTREF_SASSIGN_LOCALSREF => {
                let lval = self.member_get(self.arg(0)?)?.as_int();
                let rval = self.local_get(self.arg(1)?)?.as_int();
                let s = self.heap.string(rval)?.to_owned();
                self.heap.string_assign(lval, &s)?;
            }
            Opcode::SH_LOCALSREF_EMPTY => {
                let slot = self.local_get(self.arg(0)?)?.as_int();
                let empty = self.heap.string(slot)?.is_empty();
                self.push(empty);
            }
            Opcode::SH_STRUCTSREF_EMPTY => {
                let slot = self.member_get(self.arg(0)?)?.as_int();
                let empty = self.heap.string(slot)?.is_empty();
                self.push(empty);
            }
            Opcode::SH_GLOBALSREF_EMPTY => {
                let slot = self.global_get(self.arg(0)? as usize)?.as_int();
                let empty = self.heap.string(slot)?.is_empty();
                self.push(empty);
            }
            Opcode::SH_STRUCTSREF_NE_STR0 => {
                let a = self.member_get(self.arg(0)?)?.as_int();
                let ne = self.heap.string(a)? != self.image_string(self.arg(1)?)?;
                self.push(ne);
            }
            Opcode::SH_GLOBALSREF_NE_STR0 => {
                let a = self.global_get(self.arg(0)? as usize)?.as_int();
                let ne = self.heap.string(a)? != self.image_string(self.arg(1)?)?;
                self.push(ne);
            }
            Opcode::SH_LOC_LT_IMM_OR_LOC_GE_IMM => {
                let v = self.local_get(self.arg(0)?)?.as_int();
                self.push(v < self.arg(1)? || v >= self.arg(2)?);
            }
            other => {
                return Err(VmError::IllegalOpcode { opcode: other.into(), ip: self.ip }.into());
            }
        }
        Ok(true)
    }

    /// Shared body of the fused conditional branches: jump to the target
    /// in operand `target_arg` when `cond` holds, fall through otherwise.
    fn branch_if(&mut self, cond: bool, target_arg: usize, op: Opcode) -> Exec<bool> {
        if cond {
            self.ip = self.arg(target_arg)? as u32;
        } else {
            self.ip += op.width();
        }
        Ok(false)
    }

    /// Shared body of the fused no-argument method calls.
    fn call_bound(&mut self, fno: i32, receiver: i32, op: Opcode) -> Exec<bool> {
        let ret = self.ip + op.width();
        self.function_call(fno, ret)?;
        if let Some(frame) = self.call_stack.last_mut() {
            frame.struct_page = receiver;
        }
        Ok(false)
    }

    fn image_string(&self, index: i32) -> Exec<&str> {
        self.image
            .strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| VmError::Fatal(format!("invalid string index: {index}")).into())
    }
}
