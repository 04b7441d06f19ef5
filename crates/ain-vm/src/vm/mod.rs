// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! The bytecode interpreter.
//!
//! A single [`Vm`] value owns all mutable machine state: the heap, the
//! operand stack, the call stack and the instruction pointer. The image
//! is read-only. Execution is strictly single-threaded and cooperative;
//! re-entrant calls (constructors, destructors, sort comparators,
//! delegate invocation) go through `call_function`, which installs a
//! sentinel return address and restores the instruction pointer when the
//! inner execution completes.


mod arrays;
mod delegates;
mod pages;
mod resume;
mod savedata;
mod shorthand;
pub mod syscall;

pub use syscall::SysCall;

use std::collections::HashSet;

use ain_image::instructions::{is_breakpoint, strip_flags};
use ain_image::{DataType, Image, Opcode};
use tracing::{error, info};

use crate::bridge::{Bridge, HostArg, HostLibrary, HostContext, HostValue};
use crate::error::{Exec, Signal, VmError};
use crate::format::{self, FormatType};
use crate::heap::{GLOBAL_PAGE_SLOT, Heap};
use crate::page::{self, Page, PageKind};
use crate::platform::{Config, Host};
use crate::strings;
use crate::value::Value;

/// Sentinel return address: the innermost execute loop ends here.
pub(crate) const VM_RETURN: u32 = 0xffff_ffff;

/// Maximum call depth; exceeding it is fatal.
const MAX_CALL_STACK: usize = 4096;

/// Saturate a 64-bit intermediate into the long-integer value range.
///
/// The original engine clamps negative overflow to 0 rather than
/// `i32::MIN`; that quirk is load-bearing and reproduced exactly.
#[inline]
#[must_use]
pub(crate) fn lint_clamp(n: i64) -> i32 {
    if n < 0 {
        0
    } else if n > i64::from(i32::MAX) {
        i32::MAX
    } else {
        n as i32
    }
}

/// One call-stack record.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// Callee function index.
    pub function: i32,
    /// Address of the call instruction.
    pub call_address: u32,
    pub return_address: u32,
    /// Heap slot of the callee's local page.
    pub page_slot: i32,
    /// Heap slot of the bound struct page, or -1 for plain functions.
    pub struct_page: i32,
}

/// A popped reference: a (heap slot, variable index) pair.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VarRef {
    pub slot: i32,
    pub index: i32,
}

/// The virtual machine.
pub struct Vm {
    image: Image,
    pub(crate) heap: Heap,
    stack: Vec<Value>,
    call_stack: Vec<Frame>,
    ip: u32,
    bridge: Bridge,
    host: Box<dyn Host>,
    pub(crate) config: Config,
    breakpoints: HashSet<u32>,
}

impl Vm {
    /// Build a machine around an image, linking `registry` against the
    /// image's library declarations.
    #[must_use]
    pub fn new(image: Image, registry: &[HostLibrary], host: Box<dyn Host>, config: Config) -> Self {
        let bridge = Bridge::link(&image, registry);
        Self {
            image,
            heap: Heap::new(),
            stack: Vec::with_capacity(4096),
            call_stack: Vec::new(),
            ip: 0,
            bridge,
            host,
            config,
            breakpoints: HashSet::new(),
        }
    }

    /// The image this machine executes.
    #[must_use]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Current instruction pointer.
    #[must_use]
    pub fn ip(&self) -> u32 {
        self.ip
    }

    /// Call frames, innermost last.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.call_stack
    }

    /// Operand stack contents, top last.
    #[must_use]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Arm a breakpoint. The host is notified when the address is
    /// fetched; the instruction executes afterwards.
    pub fn set_breakpoint(&mut self, addr: u32) {
        self.breakpoints.insert(addr);
    }

    /// Disarm a breakpoint.
    pub fn clear_breakpoint(&mut self, addr: u32) {
        self.breakpoints.remove(&addr);
    }

    /// Run the program: initialize globals, call `alloc` and the global
    /// constructors, then `main`. `system.Reset` restarts from the top;
    /// the returned value is `main`'s result or the `system.Exit` status.
    pub fn run(&mut self) -> Result<i32, VmError> {
        loop {
            match self.boot() {
                Ok(code) => {
                    self.shutdown();
                    return Ok(code);
                }
                Err(Signal::Exit(code)) => {
                    self.shutdown();
                    return Ok(code);
                }
                Err(Signal::Reset) => {
                    self.shutdown();
                }
                Err(Signal::Fault(e)) => {
                    self.report_fault(&e);
                    self.shutdown();
                    return Err(e);
                }
            }
        }
    }

    /// One-shot entry for embedders and tests: call a single function to
    /// completion and return the value it left on the stack.
    pub fn call(&mut self, function: i32, struct_page: i32) -> Result<Value, VmError> {
        match self.call_function(function, struct_page).and_then(|()| self.pop()) {
            Ok(v) => Ok(v),
            Err(Signal::Exit(code)) => Ok(Value::int(code)),
            Err(Signal::Reset) => Err(VmError::Fatal("reset outside run()".to_owned())),
            Err(Signal::Fault(e)) => {
                self.report_fault(&e);
                Err(e)
            }
        }
    }

    fn boot(&mut self) -> Exec<i32> {
        self.init_globals()?;
        let main = self.image.main;
        if main < 0 {
            return Err(VmError::InvalidFunction { function: main }.into());
        }
        self.call_function(main, -1)?;
        self.pop().map(Value::as_int)
    }

    /// Reinitialize the machine and build the global page: allocate
    /// storage, apply init values, run the `alloc` entry, then the global
    /// struct constructors.
    pub(crate) fn init_globals(&mut self) -> Exec<()> {
        self.heap = Heap::new();
        self.stack.clear();
        self.call_stack.clear();
        self.ip = 0;

        // Storage for global structs is allocated before any constructor
        // runs; constructors run after init values are applied, otherwise
        // a global set in a constructor would be clobbered by its initval.
        let mut globals = Page::new(PageKind::Global, self.image.globals.len());
        for i in 0..self.image.globals.len() {
            let ty = self.image.globals[i].ty;
            let v = if ty.data == DataType::Struct {
                Value::int(page::alloc_struct(&self.image, &mut self.heap, ty.struc)?)
            } else {
                page::variable_initval(&mut self.heap, ty.data)
            };
            globals.set(i, v);
        }
        self.heap.put_page(GLOBAL_PAGE_SLOT, Some(globals));

        for iv in self.image.initvals.clone() {
            let (global, value) = match iv {
                ain_image::InitValue::Int { global, value } => (global, Value::int(value)),
                ain_image::InitValue::Float { global, value } => (global, Value::float(value)),
                ain_image::InitValue::String { global, value } => {
                    let slot = self.heap.alloc_string_slot(value);
                    (global, Value::int(slot))
                }
            };
            if let Some(p) = self.heap.page_mut(GLOBAL_PAGE_SLOT)? {
                p.set(global, value);
            }
        }

        if self.image.alloc >= 0 {
            self.call_function(self.image.alloc, -1)?;
        }

        for i in 0..self.image.globals.len() {
            let ty = self.image.globals[i].ty;
            if ty.data == DataType::Struct {
                let slot = self.global_get(i)?.as_int();
                self.init_struct(ty.struc, slot)?;
            }
        }
        Ok(())
    }

    /// Release everything still reachable without invoking destructors.
    fn shutdown(&mut self) {
        for i in (0..self.call_stack.len()).rev() {
            let slot = self.call_stack[i].page_slot;
            self.heap.exit_unref(&self.image, slot);
        }
        self.call_stack.clear();
        self.heap.exit_unref(&self.image, GLOBAL_PAGE_SLOT);
    }

    fn report_fault(&mut self, e: &VmError) {
        let name = self
            .image
            .read_opcode(self.ip)
            .map(strip_flags)
            .and_then(|raw| Opcode::try_from(raw).ok())
            .map_or("UNKNOWN OPCODE", Opcode::name);
        error!(ip = self.ip, opcode = name, "{e}");
        for line in self.stack_trace() {
            error!("\t{line}");
        }
    }

    /// The walked call stack, innermost first.
    #[must_use]
    pub fn stack_trace(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.call_stack.len());
        for i in (0..self.call_stack.len()).rev() {
            let frame = &self.call_stack[i];
            let name = self
                .image
                .functions
                .get(frame.function as usize)
                .map_or("?", |f| f.name.as_str());
            let addr = if i == self.call_stack.len() - 1 {
                self.ip
            } else {
                self.call_stack[i + 1].call_address
            };
            lines.push(format!("{addr:#010x} in {name}"));
        }
        lines
    }

    // --- operand stack ---

    pub(crate) fn push(&mut self, v: impl Into<Value>) {
        self.stack.push(v.into());
    }

    pub(crate) fn pop(&mut self) -> Exec<Value> {
        self.stack.pop().ok_or_else(|| VmError::StackUnderflow.into())
    }

    pub(crate) fn peek(&self, n: usize) -> Exec<Value> {
        let len = self.stack.len();
        if n >= len {
            return Err(VmError::StackUnderflow.into());
        }
        Ok(self.stack[len - 1 - n])
    }

    /// Set the Nth value from the top of the stack.
    pub(crate) fn stack_set(&mut self, n: usize, v: impl Into<Value>) -> Exec<()> {
        let len = self.stack.len();
        if n >= len {
            return Err(VmError::StackUnderflow.into());
        }
        self.stack[len - 1 - n] = v.into();
        Ok(())
    }

    /// Pop a reference pair, validating that it points into a live page.
    pub(crate) fn pop_var(&mut self) -> Exec<VarRef> {
        let index = self.pop()?.as_int();
        let slot = self.pop()?.as_int();
        if !self.heap.index_valid(slot) {
            return Err(VmError::HeapOutOfBounds { slot }.into());
        }
        match self.heap.page(slot) {
            Ok(Some(p)) if p.index_ok(index) => Ok(VarRef { slot, index }),
            _ => Err(VmError::PageIndexOutOfBounds { slot, index }.into()),
        }
    }

    pub(crate) fn var_get(&self, r: VarRef) -> Exec<Value> {
        Ok(self.heap.expect_page(r.slot)?.get(r.index as usize))
    }

    pub(crate) fn var_set(&mut self, r: VarRef, v: Value) -> Exec<()> {
        match self.heap.page_mut(r.slot)? {
            Some(p) if p.index_ok(r.index) => {
                p.set(r.index as usize, v);
                Ok(())
            }
            _ => Err(VmError::PageIndexOutOfBounds { slot: r.slot, index: r.index }.into()),
        }
    }

    fn push_string(&mut self, s: String) {
        let slot = self.heap.alloc_string_slot(s);
        self.push(slot);
    }

    fn string_at(&self, n: usize) -> Exec<String> {
        Ok(self.heap.string(self.peek(n)?.as_int())?.to_owned())
    }

    // --- frames and pages ---

    fn frame(&self) -> Exec<&Frame> {
        self.call_stack
            .last()
            .ok_or_else(|| VmError::Fatal("no active call frame".to_owned()).into())
    }

    pub(crate) fn local_page_slot(&self) -> Exec<i32> {
        Ok(self.frame()?.page_slot)
    }

    pub(crate) fn struct_page_slot(&self) -> Exec<i32> {
        Ok(self.frame()?.struct_page)
    }

    pub(crate) fn local_get(&self, varno: i32) -> Exec<Value> {
        let slot = self.local_page_slot()?;
        Ok(self.heap.expect_page(slot)?.get(varno as usize))
    }

    pub(crate) fn local_set(&mut self, varno: i32, v: impl Into<Value>) -> Exec<()> {
        let slot = self.local_page_slot()?;
        match self.heap.page_mut(slot)? {
            Some(p) if p.index_ok(varno) => {
                p.set(varno as usize, v.into());
                Ok(())
            }
            _ => Err(VmError::PageIndexOutOfBounds { slot, index: varno }.into()),
        }
    }

    pub(crate) fn member_get(&self, varno: i32) -> Exec<Value> {
        let slot = self.struct_page_slot()?;
        Ok(self.heap.expect_page(slot)?.get(varno as usize))
    }

    pub(crate) fn member_set(&mut self, varno: i32, v: impl Into<Value>) -> Exec<()> {
        let slot = self.struct_page_slot()?;
        match self.heap.page_mut(slot)? {
            Some(p) if p.index_ok(varno) => {
                p.set(varno as usize, v.into());
                Ok(())
            }
            _ => Err(VmError::PageIndexOutOfBounds { slot, index: varno }.into()),
        }
    }

    pub(crate) fn global_get(&self, varno: usize) -> Exec<Value> {
        Ok(self.heap.expect_page(GLOBAL_PAGE_SLOT)?.get(varno))
    }

    // --- instruction operands ---

    fn arg(&self, n: usize) -> Exec<i32> {
        self.image
            .read_arg(self.ip, n)
            .ok_or_else(|| VmError::BadInstructionPointer { ip: self.ip }.into())
    }

    fn arg_f(&self, n: usize) -> Exec<f32> {
        Ok(f32::from_bits(self.arg(n)? as u32))
    }

    // --- calls ---

    fn push_frame(&mut self, frame: Frame) -> Exec<()> {
        if self.call_stack.len() >= MAX_CALL_STACK {
            return Err(VmError::CallStackOverflow.into());
        }
        self.call_stack.push(frame);
        Ok(())
    }

    /// Allocate a local page, push a frame and jump to the function
    /// entry. Arguments are NOT popped here; locals beyond `nr_args` are
    /// initialized per type. Returns the local page slot.
    fn function_call_base(&mut self, fno: i32, return_address: u32) -> Exec<i32> {
        let f = usize::try_from(fno)
            .ok()
            .and_then(|i| self.image.functions.get(i))
            .ok_or(VmError::InvalidFunction { function: fno })?;
        let nr_vars = f.nr_vars();
        let nr_args = f.nr_args;
        let address = f.address;

        let slot = self
            .heap
            .alloc_page_slot(Some(Page::new(PageKind::Local { function: fno, struct_ptr: -1 }, nr_vars)));
        self.push_frame(Frame {
            function: fno,
            call_address: self.ip,
            return_address,
            page_slot: slot,
            struct_page: -1,
        })?;
        for i in nr_args..nr_vars {
            let ty = self.image.functions[fno as usize].vars[i].ty.data;
            let v = page::variable_initval(&mut self.heap, ty);
            if let Some(p) = self.heap.page_mut(slot)? {
                p.set(i, v);
            }
        }
        self.ip = address;
        Ok(slot)
    }

    /// Calling convention: the caller pushed arguments in order; pop them
    /// into the first `nr_args` local slots, counting a reference for
    /// reference-typed arguments.
    fn function_call(&mut self, fno: i32, return_address: u32) -> Exec<()> {
        let slot = self.function_call_base(fno, return_address)?;
        let nr_args = self.image.functions[fno as usize].nr_args;
        for i in (0..nr_args).rev() {
            let v = self.pop()?;
            let ty = self.image.functions[fno as usize].vars[i].ty.data;
            if ty.is_ref() {
                self.heap.add_ref(v.as_int());
            }
            if let Some(p) = self.heap.page_mut(slot)? {
                p.set(i, v);
            }
        }
        Ok(())
    }

    /// Method call: like `function_call`, then pop the receiver's struct
    /// page into the frame.
    fn method_call(&mut self, fno: i32, return_address: u32) -> Exec<()> {
        self.function_call(fno, return_address)?;
        let receiver = self.pop()?.as_int();
        if let Some(frame) = self.call_stack.last_mut() {
            frame.struct_page = receiver;
        }
        Ok(())
    }

    fn function_return(&mut self) -> Exec<()> {
        let frame = *self.frame()?;
        self.unref(frame.page_slot)?;
        self.ip = frame.return_address;
        self.call_stack.pop();
        Ok(())
    }

    /// Re-entrant call: run `function` to completion and restore the
    /// instruction pointer. Used by constructors, destructors, sort
    /// comparators and delegate invocation. `struct_page` < 0 calls a
    /// plain function.
    pub(crate) fn call_function(&mut self, function: i32, struct_page: i32) -> Exec<()> {
        let saved_ip = self.ip;
        if struct_page < 0 {
            self.function_call(function, VM_RETURN)?;
        } else {
            self.push(struct_page);
            self.method_call(function, VM_RETURN)?;
        }
        self.execute()?;
        self.ip = saved_ip;
        Ok(())
    }

    // --- scenario calls ---

    /// Pre-allocate the named scenario function's local page.
    fn alloc_scenario_page(&mut self, name: &str) -> Exec<i32> {
        let fno = self
            .image
            .function_by_name(name)
            .ok_or_else(|| VmError::InvalidScenarioFunction { name: name.to_owned() })?;
        let nr_vars = self.image.functions[fno].nr_vars();
        let slot = self.heap.alloc_page_slot(Some(Page::new(
            PageKind::Local { function: fno as i32, struct_ptr: -1 },
            nr_vars,
        )));
        for i in 0..nr_vars {
            let ty = self.image.functions[fno].vars[i].ty.data;
            let v = page::variable_initval(&mut self.heap, ty);
            if let Some(p) = self.heap.page_mut(slot)? {
                p.set(i, v);
            }
        }
        Ok(slot)
    }

    /// Tail-like scenario transition: flush the entire call stack and
    /// install the pre-allocated page as the sole frame, with a sentinel
    /// return address. No frames beneath it survive.
    fn scenario_call(&mut self, slot: i32) -> Exec<()> {
        let fno = match self.heap.expect_page(slot)?.kind {
            PageKind::Local { function, .. } => function,
            _ => return Err(VmError::InvalidPageIndex { slot }.into()),
        };
        for i in (0..self.call_stack.len()).rev() {
            let page_slot = self.call_stack[i].page_slot;
            self.unref(page_slot)?;
        }
        self.call_stack.clear();
        self.push_frame(Frame {
            function: fno,
            call_address: self.ip,
            return_address: VM_RETURN,
            page_slot: slot,
            struct_page: -1,
        })?;
        self.ip = self.image.functions[fno as usize].address;
        Ok(())
    }

    fn get_func_stack_name(&self, index: i32) -> String {
        let len = self.call_stack.len() as i32;
        let i = len - (1 + index);
        if i < 0 || i >= len {
            return String::new();
        }
        let fno = self.call_stack[i as usize].function;
        self.image
            .functions
            .get(fno as usize)
            .map_or_else(String::new, |f| f.name.clone())
    }

    // --- switch tables ---

    fn exec_switch(&mut self, no: i32, val: i32) -> Exec<()> {
        let s = self
            .image
            .switches
            .get(no as usize)
            .ok_or_else(|| VmError::Fatal(format!("invalid switch table: {no}")))?;
        for case in &s.cases {
            if case.value == val {
                self.ip = case.address;
                return Ok(());
            }
        }
        match s.default_address {
            Some(addr) => self.ip = addr,
            None => self.ip += Opcode::SWITCH.width(),
        }
        Ok(())
    }

    fn exec_strswitch(&mut self, no: i32, val: &str) -> Exec<()> {
        let s = self
            .image
            .switches
            .get(no as usize)
            .ok_or_else(|| VmError::Fatal(format!("invalid switch table: {no}")))?;
        for case in &s.cases {
            if self.image.strings.get(case.value as usize).is_some_and(|s| s.as_str() == val) {
                self.ip = case.address;
                return Ok(());
            }
        }
        match s.default_address {
            Some(addr) => self.ip = addr,
            None => self.ip += Opcode::STRSWITCH.width(),
        }
        Ok(())
    }

    // --- native calls ---

    fn hll_call(&mut self, libno: i32, fno: i32) -> Exec<()> {
        let Some(resolved) = self.bridge.get(libno, fno).cloned() else {
            let library = self
                .image
                .libraries
                .get(libno as usize)
                .map_or_else(|| libno.to_string(), |l| l.name.clone());
            let function = self
                .image
                .libraries
                .get(libno as usize)
                .and_then(|l| l.functions.get(fno as usize))
                .map_or_else(|| fno.to_string(), |f| f.name.clone());
            return Err(VmError::UnimplementedLibraryFunction { library, function }.into());
        };

        // Pop right-to-left per the marshalling descriptor.
        use crate::bridge::ArgClass;
        let mut args = vec![HostArg::Word(Value::int(0)); resolved.args.len()];
        let mut popped = vec![Value::int(0); resolved.args.len()];
        for (i, &(class, _)) in resolved.args.iter().enumerate().rev() {
            match class {
                ArgClass::RefScalar => {
                    let index = self.pop()?.as_int();
                    let page = self.pop()?.as_int();
                    args[i] = HostArg::RefScalar { page, index };
                }
                ArgClass::Str => {
                    let v = self.pop()?;
                    popped[i] = v;
                    args[i] = HostArg::String(v.as_int());
                }
                ArgClass::RefStr => {
                    args[i] = HostArg::RefString(self.pop()?.as_int());
                }
                ArgClass::Page => {
                    let v = self.pop()?;
                    popped[i] = v;
                    args[i] = HostArg::Page(v.as_int());
                }
                ArgClass::RefPage => {
                    args[i] = HostArg::RefPage(self.pop()?.as_int());
                }
                ArgClass::Word => {
                    let v = self.pop()?;
                    popped[i] = v;
                    args[i] = HostArg::Word(v);
                }
            }
        }

        let ret = {
            let mut ctx = HostContext {
                image: &self.image,
                heap: &mut self.heap,
                host: self.host.as_mut(),
            };
            (resolved.fun)(&mut ctx, &args)
        };

        // Reference arguments never gained a count, so only the others
        // are finalized.
        for (i, &(class, ty)) in resolved.args.iter().enumerate() {
            if class.finalized() {
                self.variable_fini(popped[i], ty, true)?;
            }
        }

        match ret {
            HostValue::Void => {
                if !resolved.returns_void && !resolved.returns_string {
                    self.push(0);
                }
            }
            HostValue::Word(v) => {
                if !resolved.returns_void {
                    self.push(v);
                }
            }
            HostValue::String(s) => {
                if resolved.returns_string {
                    self.push_string(s);
                } else if !resolved.returns_void {
                    self.push(0);
                }
            }
        }
        Ok(())
    }

    // --- the dispatch loop ---

    /// Run until the instruction pointer reaches the sentinel.
    pub(crate) fn execute(&mut self) -> Exec<()> {
        loop {
            if self.ip == VM_RETURN {
                return Ok(());
            }
            let raw = self
                .image
                .read_opcode(self.ip)
                .ok_or(VmError::BadInstructionPointer { ip: self.ip })?;
            if self.breakpoints.contains(&self.ip) {
                self.host.breakpoint_hit(self.ip);
            }
            let raw = if is_breakpoint(raw) {
                self.host.breakpoint_hit(self.ip);
                strip_flags(raw)
            } else {
                raw
            };
            let op = Opcode::try_from(raw)
                .map_err(|_| VmError::IllegalOpcode { opcode: raw, ip: self.ip })?;
            if self.execute_instruction(op)? {
                self.ip += op.width();
            }
        }
    }

    /// Execute one instruction. Returns true when the instruction pointer
    /// should advance by the instruction's width, false when the
    /// instruction assigned it directly.
    #[allow(clippy::too_many_lines)]
    fn execute_instruction(&mut self, op: Opcode) -> Exec<bool> {
        match op {
            //
            // --- Stack Management ---
            //
            Opcode::PUSH => {
                let v = self.arg(0)?;
                self.push(v);
            }
            Opcode::POP => {
                self.pop()?;
            }
            Opcode::F_PUSH => {
                let v = self.arg_f(0)?;
                self.push(v);
            }
            Opcode::REF => {
                let r = self.pop_var()?;
                let v = self.var_get(r)?;
                self.push(v);
            }
            Opcode::REFREF => {
                let r = self.pop_var()?;
                let outer = self.var_get(r)?;
                let inner = self.var_get(VarRef { slot: r.slot, index: r.index + 1 })?;
                self.push(outer);
                self.push(inner);
            }
            Opcode::DUP => {
                // A -> AA
                let a = self.peek(0)?;
                self.push(a);
            }
            Opcode::DUP2 => {
                // AB -> ABAB
                let a = self.peek(1)?;
                let b = self.peek(0)?;
                self.push(a);
                self.push(b);
            }
            Opcode::DUP_X2 => {
                // ABC -> CABC
                let a = self.peek(2)?;
                let b = self.peek(1)?;
                let c = self.peek(0)?;
                self.stack_set(2, c)?;
                self.stack_set(1, a)?;
                self.stack_set(0, b)?;
                self.push(c);
            }
            Opcode::DUP2_X1 => {
                // ABC -> BCABC
                let a = self.peek(2)?;
                let b = self.peek(1)?;
                let c = self.peek(0)?;
                self.stack_set(2, b)?;
                self.stack_set(1, c)?;
                self.stack_set(0, a)?;
                self.push(b);
                self.push(c);
            }
            Opcode::DUP_U2 => {
                // AB -> ABA
                let a = self.peek(1)?;
                self.push(a);
            }
            Opcode::SWAP => {
                let a = self.peek(1)?;
                let b = self.peek(0)?;
                self.stack_set(1, b)?;
                self.stack_set(0, a)?;
            }
            //
            // --- Variables ---
            //
            Opcode::PUSHGLOBALPAGE => self.push(GLOBAL_PAGE_SLOT),
            Opcode::PUSHLOCALPAGE => {
                let slot = self.local_page_slot()?;
                self.push(slot);
            }
            Opcode::PUSHSTRUCTPAGE => {
                let slot = self.struct_page_slot()?;
                self.push(slot);
            }
            Opcode::ASSIGN | Opcode::F_ASSIGN => {
                let val = self.pop()?;
                let r = self.pop_var()?;
                self.var_set(r, val)?;
                self.push(val);
            }
            Opcode::R_ASSIGN => {
                let src_var = self.pop()?.as_int();
                let src_page = self.pop()?.as_int();
                let dst_var = self.pop()?.as_int();
                let dst_page = self.pop()?.as_int();
                self.var_set(VarRef { slot: dst_page, index: dst_var }, Value::int(src_page))?;
                self.var_set(VarRef { slot: dst_page, index: dst_var + 1 }, Value::int(src_var))?;
                self.push(src_page);
                self.push(src_var);
            }
            Opcode::R_EQUALE => {
                // Reference identity: the pair compares equal only when
                // both the page slot and the variable index match.
                let rhs_var = self.pop()?.as_int();
                let rhs_page = self.pop()?.as_int();
                let lhs_var = self.pop()?.as_int();
                let lhs_page = self.pop()?.as_int();
                self.push(lhs_page == rhs_page && lhs_var == rhs_var);
            }
            Opcode::NEW => {
                let struct_no = self.pop()?.as_int();
                let slot = self.create_struct(struct_no)?;
                self.push(slot);
            }
            Opcode::DELETE => {
                let slot = self.pop()?.as_int();
                if slot != -1 {
                    self.unref(slot)?;
                }
            }
            Opcode::SP_INC => {
                let slot = self.pop()?.as_int();
                self.heap.add_ref(slot);
            }
            Opcode::OBJSWAP => {
                self.pop()?; // type
                let b = self.pop_var()?;
                let a = self.pop_var()?;
                let tmp = self.var_get(a)?;
                let bv = self.var_get(b)?;
                self.var_set(a, bv)?;
                self.var_set(b, tmp)?;
            }
            //
            // --- Control Flow ---
            //
            Opcode::CALLFUNC => {
                let fno = self.arg(0)?;
                let ret = self.ip + op.width();
                self.function_call(fno, ret)?;
                return Ok(false);
            }
            Opcode::CALLFUNC2 => {
                self.pop()?; // function-type index (compile-time only)
                let fno = self.pop()?.as_int();
                let ret = self.ip + op.width();
                self.function_call(fno, ret)?;
                return Ok(false);
            }
            Opcode::CALLMETHOD => {
                let fno = self.arg(0)?;
                let ret = self.ip + op.width();
                self.method_call(fno, ret)?;
                return Ok(false);
            }
            Opcode::CALLHLL => {
                let libno = self.arg(0)?;
                let fno = self.arg(1)?;
                self.hll_call(libno, fno)?;
            }
            Opcode::RETURN => {
                self.function_return()?;
                return Ok(false);
            }
            Opcode::CALLSYS => {
                let code = self.arg(0)?;
                return self.system_call(code);
            }
            Opcode::CALLONJUMP => {
                let str_slot = self.pop()?.as_int();
                let name = self.heap.string(str_slot)?.to_owned();
                let page_slot = self.alloc_scenario_page(&name)?;
                self.push(page_slot);
                self.unref(str_slot)?;
            }
            Opcode::SJUMP => {
                let slot = self.pop()?.as_int();
                self.scenario_call(slot)?;
                return Ok(false);
            }
            Opcode::MSG => {
                let no = self.arg(0)?;
                let text = self
                    .image
                    .messages
                    .get(no as usize)
                    .cloned()
                    .ok_or_else(|| VmError::Fatal(format!("invalid message index: {no}")))?;
                if self.config.echo {
                    info!(msg = no, "{text}");
                }
                if self.image.msgf < 0 {
                    return Ok(true);
                }
                let ret = self.ip + op.width();
                self.push(no);
                self.push(self.image.messages.len() as i32);
                self.push_string(text);
                let msgf = self.image.msgf;
                self.function_call(msgf, ret)?;
                return Ok(false);
            }
            Opcode::JUMP => {
                self.ip = self.arg(0)? as u32;
                return Ok(false);
            }
            Opcode::IFZ => {
                if self.pop()?.as_int() == 0 {
                    self.ip = self.arg(0)? as u32;
                } else {
                    self.ip += op.width();
                }
                return Ok(false);
            }
            Opcode::IFNZ => {
                if self.pop()?.as_int() != 0 {
                    self.ip = self.arg(0)? as u32;
                } else {
                    self.ip += op.width();
                }
                return Ok(false);
            }
            Opcode::SWITCH => {
                let no = self.arg(0)?;
                let val = self.pop()?.as_int();
                self.exec_switch(no, val)?;
                return Ok(false);
            }
            Opcode::STRSWITCH => {
                let no = self.arg(0)?;
                let slot = self.pop()?.as_int();
                let val = self.heap.string(slot)?.to_owned();
                self.exec_strswitch(no, &val)?;
                self.unref(slot)?;
                return Ok(false);
            }
            Opcode::ASSERT => {
                let line = self.pop()?.as_int();
                let file = self.pop()?.as_int();
                let expr = self.pop()?.as_int();
                if self.pop()?.as_int() == 0 {
                    let file = self.heap.string(file)?.to_owned();
                    let expr = self.heap.string(expr)?.to_owned();
                    self.host
                        .output(&format!("Assertion failed at {file}:{line}: {expr}"));
                    return Err(Signal::Exit(1));
                }
                self.unref(file)?;
                self.unref(expr)?;
            }
            Opcode::FUNC => {} // marker, no effect
            //
            // --- Arithmetic ---
            //
            Opcode::INV => {
                let v = self.pop()?.as_int();
                self.push(v.wrapping_neg());
            }
            Opcode::NOT => {
                let v = self.pop()?.as_int();
                self.push(v == 0);
            }
            Opcode::COMPL => {
                let v = self.pop()?.as_int();
                self.push(!v);
            }
            Opcode::ADD => self.binop_int(i32::wrapping_add)?,
            Opcode::SUB => self.binop_int(i32::wrapping_sub)?,
            Opcode::MUL => self.binop_int(i32::wrapping_mul)?,
            Opcode::DIV => self.binop_int(|a, b| if b == 0 { 0 } else { a.wrapping_div(b) })?,
            Opcode::MOD => self.binop_int(|a, b| if b == 0 { 0 } else { a.wrapping_rem(b) })?,
            Opcode::AND => self.binop_int(|a, b| a & b)?,
            Opcode::OR => self.binop_int(|a, b| a | b)?,
            Opcode::XOR => self.binop_int(|a, b| a ^ b)?,
            Opcode::LSHIFT => self.binop_int(|a, b| a.wrapping_shl(b as u32))?,
            Opcode::RSHIFT => self.binop_int(|a, b| a.wrapping_shr(b as u32))?,
            // Comparisons produce 0/1 integers.
            Opcode::LT => self.binop_cmp(|a, b| a < b)?,
            Opcode::GT => self.binop_cmp(|a, b| a > b)?,
            Opcode::LTE => self.binop_cmp(|a, b| a <= b)?,
            Opcode::GTE => self.binop_cmp(|a, b| a >= b)?,
            Opcode::NOTE => self.binop_cmp(|a, b| a != b)?,
            Opcode::EQUALE => self.binop_cmp(|a, b| a == b)?,
            // Compound assignment through a reference.
            Opcode::PLUSA => self.compound_assign(i32::wrapping_add)?,
            Opcode::MINUSA => self.compound_assign(i32::wrapping_sub)?,
            Opcode::MULA => self.compound_assign(i32::wrapping_mul)?,
            Opcode::DIVA => self.compound_assign(|a, b| if b == 0 { 0 } else { a.wrapping_div(b) })?,
            Opcode::MODA => self.compound_assign(|a, b| if b == 0 { 0 } else { a.wrapping_rem(b) })?,
            Opcode::ANDA => self.compound_assign(|a, b| a & b)?,
            Opcode::ORA => self.compound_assign(|a, b| a | b)?,
            Opcode::XORA => self.compound_assign(|a, b| a ^ b)?,
            Opcode::LSHIFTA => self.compound_assign(|a, b| a.wrapping_shl(b as u32))?,
            Opcode::RSHIFTA => self.compound_assign(|a, b| a.wrapping_shr(b as u32))?,
            Opcode::INC => {
                let r = self.pop_var()?;
                let v = self.var_get(r)?.as_int();
                self.var_set(r, Value::int(v.wrapping_add(1)))?;
            }
            Opcode::DEC => {
                let r = self.pop_var()?;
                let v = self.var_get(r)?.as_int();
                self.var_set(r, Value::int(v.wrapping_sub(1)))?;
            }
            Opcode::ITOB => {
                let v = self.peek(0)?.as_int();
                self.stack_set(0, v != 0)?;
            }
            //
            // --- Long Integers ---
            //
            Opcode::ITOLI => {
                let v = self.peek(0)?.as_int();
                self.stack_set(0, lint_clamp(i64::from(v)))?;
            }
            Opcode::LI_ADD => self.binop_long(|a, b| a + b)?,
            Opcode::LI_SUB => self.binop_long(|a, b| a - b)?,
            Opcode::LI_MUL => self.binop_long(|a, b| a * b)?,
            Opcode::LI_DIV => self.binop_long(|a, b| if b == 0 { 0 } else { a / b })?,
            Opcode::LI_MOD => self.binop_long(|a, b| if b == 0 { 0 } else { a % b })?,
            Opcode::LI_ASSIGN => {
                let v = i64::from(self.pop()?.as_int());
                let r = self.pop_var()?;
                let clamped = lint_clamp(v);
                self.var_set(r, Value::int(clamped))?;
                self.push(clamped);
            }
            Opcode::LI_PLUSA => self.compound_assign_long(|a, b| a + b)?,
            Opcode::LI_MINUSA => self.compound_assign_long(|a, b| a - b)?,
            Opcode::LI_MULA => self.compound_assign_long(|a, b| a * b)?,
            Opcode::LI_DIVA => self.compound_assign_long(|a, b| if b == 0 { 0 } else { a / b })?,
            Opcode::LI_MODA => self.compound_assign_long(|a, b| if b == 0 { 0 } else { a % b })?,
            Opcode::LI_ANDA => self.compound_assign_long(|a, b| a & b)?,
            Opcode::LI_ORA => self.compound_assign_long(|a, b| a | b)?,
            Opcode::LI_XORA => self.compound_assign_long(|a, b| a ^ b)?,
            Opcode::LI_LSHIFTA => {
                self.compound_assign_long(|a, b| a.wrapping_shl((b & 63) as u32))?;
            }
            Opcode::LI_RSHIFTA => {
                self.compound_assign_long(|a, b| a.wrapping_shr((b & 63) as u32))?;
            }
            Opcode::LI_INC => {
                let r = self.pop_var()?;
                let v = i64::from(self.var_get(r)?.as_int());
                self.var_set(r, Value::int(lint_clamp(v + 1)))?;
            }
            Opcode::LI_DEC => {
                let r = self.pop_var()?;
                let v = i64::from(self.var_get(r)?.as_int());
                self.var_set(r, Value::int(lint_clamp(v - 1)))?;
            }
            //
            // --- Floating Point ---
            //
            Opcode::FTOI => {
                let f = self.peek(0)?.as_float();
                self.stack_set(0, f as i32)?;
            }
            Opcode::ITOF => {
                let v = self.peek(0)?.as_int();
                self.stack_set(0, v as f32)?;
            }
            Opcode::F_INV => {
                let f = self.peek(0)?.as_float();
                self.stack_set(0, -f)?;
            }
            Opcode::F_ADD => self.binop_float(|a, b| a + b)?,
            Opcode::F_SUB => self.binop_float(|a, b| a - b)?,
            Opcode::F_MUL => self.binop_float(|a, b| a * b)?,
            Opcode::F_DIV => self.binop_float(|a, b| a / b)?,
            Opcode::F_LT => self.binop_float_cmp(|a, b| a < b)?,
            Opcode::F_GT => self.binop_float_cmp(|a, b| a > b)?,
            Opcode::F_LTE => self.binop_float_cmp(|a, b| a <= b)?,
            Opcode::F_GTE => self.binop_float_cmp(|a, b| a >= b)?,
            Opcode::F_NOTE => self.binop_float_cmp(|a, b| a != b)?,
            Opcode::F_EQUALE => self.binop_float_cmp(|a, b| a == b)?,
            Opcode::F_PLUSA => self.compound_assign_float(|a, b| a + b)?,
            Opcode::F_MINUSA => self.compound_assign_float(|a, b| a - b)?,
            Opcode::F_MULA => self.compound_assign_float(|a, b| a * b)?,
            Opcode::F_DIVA => self.compound_assign_float(|a, b| a / b)?,
            //
            // --- Strings ---
            //
            Opcode::S_PUSH => {
                let no = self.arg(0)?;
                let s = self
                    .image
                    .strings
                    .get(no as usize)
                    .cloned()
                    .ok_or_else(|| VmError::Fatal(format!("invalid string index: {no}")))?;
                self.push_string(s);
            }
            Opcode::S_POP => {
                let slot = self.pop()?.as_int();
                self.unref(slot)?;
            }
            Opcode::S_REF => {
                let var_ref = self.pop_var()?;
                let slot = self.var_get(var_ref)?.as_int();
                let s = self.heap.string(slot)?.to_owned();
                self.push_string(s);
            }
            Opcode::S_REF2 => {
                let varno = self.arg(0)?;
                let page_slot = self.pop()?.as_int();
                let slot = self.heap.expect_page(page_slot)?.get(varno as usize).as_int();
                let s = self.heap.string(slot)?.to_owned();
                self.push_string(s);
            }
            Opcode::S_ASSIGN => {
                // A = B; remove A from the stack but leave B.
                let rval = self.peek(0)?.as_int();
                let lval = self.peek(1)?.as_int();
                let s = self.heap.string(rval)?.to_owned();
                self.heap.string_assign(lval, &s)?;
                self.stack_set(1, rval)?;
                self.pop()?;
            }
            Opcode::S_PLUSA2 => {
                let a = self.peek(1)?.as_int();
                let b = self.peek(0)?.as_int();
                let appended = self.heap.string(b)?.to_owned();
                self.heap.string_mut(a)?.push_str(&appended);
                self.unref(b)?;
                self.pop()?;
                self.pop()?;
                let s = self.heap.string(a)?.to_owned();
                self.push_string(s);
            }
            Opcode::S_ADD => {
                let b = self.pop()?.as_int();
                let a = self.pop()?.as_int();
                let mut s = self.heap.string(a)?.to_owned();
                s.push_str(self.heap.string(b)?);
                self.push_string(s);
                self.unref(a)?;
                self.unref(b)?;
            }
            Opcode::S_LT => self.string_cmp(|a, b| a < b)?,
            Opcode::S_GT => self.string_cmp(|a, b| a > b)?,
            Opcode::S_LTE => self.string_cmp(|a, b| a <= b)?,
            Opcode::S_GTE => self.string_cmp(|a, b| a >= b)?,
            Opcode::S_NOTE => self.string_cmp(|a, b| a != b)?,
            Opcode::S_EQUALE => self.string_cmp(|a, b| a == b)?,
            Opcode::S_LENGTH => {
                let var_ref = self.pop_var()?;
                let slot = self.var_get(var_ref)?.as_int();
                let n = strings::count_chars(self.heap.string(slot)?);
                self.push(n);
            }
            Opcode::S_LENGTH2 => {
                let slot = self.pop()?.as_int();
                let n = strings::count_chars(self.heap.string(slot)?);
                self.push(n);
                self.unref(slot)?;
            }
            Opcode::S_LENGTHBYTE => {
                let var_ref = self.pop_var()?;
                let slot = self.var_get(var_ref)?.as_int();
                let n = self.heap.string(slot)?.len() as i32;
                self.push(n);
            }
            Opcode::S_EMPTY => {
                let empty = self.string_at(0)?.is_empty();
                let slot = self.pop()?.as_int();
                self.unref(slot)?;
                self.push(empty);
            }
            Opcode::S_FIND => {
                let i = strings::find(&self.string_at(1)?, &self.string_at(0)?);
                let b = self.pop()?.as_int();
                let a = self.pop()?.as_int();
                self.unref(b)?;
                self.unref(a)?;
                self.push(i);
            }
            Opcode::S_GETPART => {
                let len = self.pop()?.as_int();
                let i = self.pop()?.as_int();
                let s = strings::copy_part(&self.string_at(0)?, i, len);
                let slot = self.pop()?.as_int();
                self.unref(slot)?;
                self.push_string(s);
            }
            Opcode::S_PUSHBACK2 => {
                let c = self.pop()?.as_int();
                let slot = self.pop()?.as_int();
                strings::push_back_char(self.heap.string_mut(slot)?, c);
            }
            Opcode::S_POPBACK2 => {
                let slot = self.pop()?.as_int();
                strings::pop_back_char(self.heap.string_mut(slot)?);
            }
            Opcode::S_ERASE2 => {
                self.pop()?; // unused operand
                let i = self.pop()?.as_int();
                let slot = self.pop()?.as_int();
                strings::erase_char(self.heap.string_mut(slot)?, i);
            }
            Opcode::S_MOD => {
                let ty = self.arg(0)?;
                let val = self.pop()?;
                let fmt_slot = self.pop()?.as_int();
                let fmt = self.heap.string(fmt_slot)?.to_owned();
                let (out, consumed) = match FormatType::try_from(ty) {
                    Ok(ty) => format::string_format(&self.heap, &fmt, val, ty)?,
                    Err(_) => {
                        tracing::warn!(ty, "unknown format type");
                        (fmt, false)
                    }
                };
                if consumed {
                    self.unref(val.as_int())?;
                }
                self.unref(fmt_slot)?;
                self.push_string(out);
            }
            Opcode::I_STRING => {
                let v = self.pop()?.as_int();
                self.push_string(v.to_string());
            }
            Opcode::FTOS => {
                let precision = self.pop()?.as_int().max(0) as usize;
                let f = self.pop()?.as_float();
                self.push_string(format!("{f:.precision$}"));
            }
            Opcode::STOI => {
                let slot = self.pop()?.as_int();
                let v = strings::to_integer(self.heap.string(slot)?);
                self.push(v);
                self.unref(slot)?;
            }
            Opcode::FT_ASSIGNS => {
                self.pop()?; // function-type index
                let str_slot = self.pop()?.as_int();
                let name = self.heap.string(str_slot)?.to_owned();
                let fno = self.image.function_by_name(&name).map_or(0, |i| i as i32);
                let r = self.pop_var()?;
                self.var_set(r, Value::int(if fno > 0 { fno } else { 0 }))?;
                self.push(str_slot);
            }
            //
            // --- Characters ---
            //
            Opcode::C_REF => {
                let i = self.pop()?.as_int();
                let slot = self.pop()?.as_int();
                let c = strings::get_char(self.heap.string(slot)?, i);
                self.push(c);
            }
            Opcode::C_ASSIGN => {
                let c = self.pop()?.as_int();
                let i = self.pop()?.as_int();
                let slot = self.pop()?.as_int();
                strings::set_char(self.heap.string_mut(slot)?, i, c);
                self.push(c);
            }
            //
            // --- Structs ---
            //
            Opcode::SR_REF => {
                // operand (struct type) is not needed at runtime
                let var_ref = self.pop_var()?;
                let slot = self.var_get(var_ref)?.as_int();
                let copy = page::copy_page_slot(&self.image, &mut self.heap, slot)?;
                self.push(copy);
            }
            Opcode::SR_REF2 => {
                let slot = self.pop()?.as_int();
                let copy = page::copy_page_slot(&self.image, &mut self.heap, slot)?;
                self.push(copy);
            }
            Opcode::SR_POP => {
                let slot = self.pop()?.as_int();
                self.unref(slot)?;
            }
            Opcode::SR_ASSIGN => {
                self.pop()?; // struct type
                let rval = self.pop()?.as_int();
                let lval = self.pop()?.as_int();
                self.struct_assign(lval, rval)?;
                self.push(rval);
            }
            //
            // --- Arrays ---
            //
            Opcode::A_ALLOC => return self.op_array_alloc(false).map(|()| true),
            Opcode::A_REALLOC => return self.op_array_alloc(true).map(|()| true),
            Opcode::A_FREE => {
                let var_ref = self.pop_var()?;
                let array = self.var_get(var_ref)?.as_int();
                self.delete_page_storage(array)?;
            }
            Opcode::A_REF => {
                let array = self.pop()?.as_int();
                let copy = page::copy_page_slot(&self.image, &mut self.heap, array)?;
                self.push(copy);
            }
            Opcode::A_NUMOF => {
                let rank = self.pop()?.as_int();
                let var_ref = self.pop_var()?;
                let array = self.var_get(var_ref)?.as_int();
                let n = arrays::array_numof(&self.heap, self.heap.page(array)?, rank);
                self.push(n);
            }
            Opcode::A_COPY => {
                let n = self.pop()?.as_int();
                let src_i = self.pop()?.as_int();
                let src = self.pop()?.as_int();
                let dst_i = self.pop()?.as_int();
                let var_ref = self.pop_var()?;
                let dst = self.var_get(var_ref)?.as_int();
                self.array_copy(dst, dst_i, src, src_i, n)?;
                self.push(n);
            }
            Opcode::A_FILL => {
                let val = self.pop()?;
                let n = self.pop()?.as_int();
                let i = self.pop()?.as_int();
                let var_ref = self.pop_var()?;
                let array = self.var_get(var_ref)?.as_int();
                let filled = self.array_fill(array, i, n, val)?;
                self.push(filled);
            }
            Opcode::A_PUSHBACK => {
                let val = self.pop()?;
                let varno = self.pop()?.as_int();
                let pageno = self.pop()?.as_int();
                let (array, ty) = self.array_var(pageno, varno)?;
                self.array_pushback(array, val, ty.data, ty.struc)?;
            }
            Opcode::A_POPBACK => {
                let var_ref = self.pop_var()?;
                let array = self.var_get(var_ref)?.as_int();
                self.array_popback(array)?;
            }
            Opcode::A_EMPTY => {
                let var_ref = self.pop_var()?;
                let array = self.var_get(var_ref)?.as_int();
                let empty = self.heap.page(array)?.map_or(true, |p| p.nr_vars() == 0);
                self.push(empty);
            }
            Opcode::A_ERASE => {
                let i = self.pop()?.as_int();
                let var_ref = self.pop_var()?;
                let array = self.var_get(var_ref)?.as_int();
                let success = self.array_erase(array, i)?;
                self.push(success);
            }
            Opcode::A_INSERT => {
                let val = self.pop()?;
                let i = self.pop()?.as_int();
                let varno = self.pop()?.as_int();
                let pageno = self.pop()?.as_int();
                let (array, ty) = self.array_var(pageno, varno)?;
                self.array_insert(array, i, val, ty.data, ty.struc)?;
            }
            Opcode::A_SORT => {
                let fno = self.pop()?.as_int();
                let var_ref = self.pop_var()?;
                let array = self.var_get(var_ref)?.as_int();
                self.array_sort(array, fno)?;
            }
            Opcode::A_SORT_MEM => {
                let member = self.pop()?.as_int();
                let var_ref = self.pop_var()?;
                let array = self.var_get(var_ref)?.as_int();
                self.array_sort_mem(array, member)?;
            }
            Opcode::A_FIND => {
                let fno = self.pop()?.as_int();
                let v = self.pop()?;
                let end = self.pop()?.as_int();
                let start = self.pop()?.as_int();
                let var_ref = self.pop_var()?;
                let array = self.var_get(var_ref)?.as_int();
                let found = self.array_find(array, start, end, v, fno)?;
                self.push(found);
                // The search key is only released for string arrays; an
                // absent page keeps the key alive.
                let is_string = matches!(
                    self.heap.page(array)?.map(|p| p.kind),
                    Some(PageKind::Array { data_type, .. })
                        if data_type.element_type() == DataType::String
                );
                if is_string {
                    self.unref(v.as_int())?;
                }
            }
            Opcode::A_REVERSE => {
                let var_ref = self.pop_var()?;
                let array = self.var_get(var_ref)?.as_int();
                if let Some(p) = self.heap.page_mut(array)? {
                    p.values_mut().reverse();
                }
            }
            //
            // --- Delegates ---
            //
            Opcode::DG_ADD => {
                let fun = self.pop()?.as_int();
                let obj = self.pop()?.as_int();
                let dg = self.pop()?.as_int();
                self.delete_page_storage(dg)?;
                let page = self.delegate_new_from_method(obj, fun);
                self.heap.put_page(dg, Some(page));
            }
            Opcode::DG_SET => {
                let fun = self.pop()?.as_int();
                let obj = self.pop()?.as_int();
                let dg = self.pop()?.as_int();
                self.delegate_append_slot(dg, obj, fun)?;
            }
            Opcode::DG_CALL => return self.op_dg_call(),
            Opcode::DG_NUMOF => {
                let dg = self.pop()?.as_int();
                let n = self.delegate_numof(dg)?;
                self.push(n);
            }
            Opcode::DG_EXIST => {
                let fun = self.pop()?.as_int();
                let obj = self.pop()?.as_int();
                let dg = self.pop()?.as_int();
                let found = self.delegate_contains(self.heap.page(dg)?, obj, fun);
                self.push(found);
            }
            Opcode::DG_ERASE => {
                let fun = self.pop()?.as_int();
                let obj = self.pop()?.as_int();
                let dg = self.pop()?.as_int();
                if let Some(p) = self.heap.page_mut(dg)? {
                    delegates::delegate_erase(p, obj, fun);
                }
            }
            Opcode::DG_CLEAR => {
                let slot = self.pop()?.as_int();
                if slot == 0 {
                    return Ok(true);
                }
                if let Some(p) = self.heap.page_mut(slot)? {
                    p.values_mut().clear();
                }
            }
            Opcode::DG_COPY => {
                let slot = self.pop()?.as_int();
                let copy = page::copy_page_slot(&self.image, &mut self.heap, slot)?;
                self.push(copy);
            }
            Opcode::DG_ASSIGN => {
                let set_i = self.pop()?.as_int();
                let dst_i = self.pop()?.as_int();
                let new_dg = {
                    let taken = self.heap.take_page(set_i)?;
                    let copy = match &taken {
                        Some(p) => Some(page::copy_page(&self.image, &mut self.heap, p)?),
                        None => None,
                    };
                    self.heap.put_page(set_i, taken);
                    copy
                };
                self.delete_page_storage(dst_i)?;
                self.heap.put_page(dst_i, new_dg);
                self.push(set_i);
            }
            Opcode::DG_PLUSA => {
                let add_i = self.pop()?.as_int();
                let dst_i = self.pop()?.as_int();
                self.delegate_plusa(dst_i, add_i)?;
                self.push(add_i);
            }
            Opcode::DG_MINUSA => {
                let minus_i = self.pop()?.as_int();
                let dst_i = self.pop()?.as_int();
                self.delegate_minusa(dst_i, minus_i)?;
                self.push(minus_i);
            }
            Opcode::DG_POP => {
                let slot = self.pop()?.as_int();
                self.unref(slot)?;
            }
            Opcode::DG_NEW_FROM_METHOD => {
                let fun = self.pop()?.as_int();
                let obj = self.pop()?.as_int();
                let page = self.delegate_new_from_method(obj, fun);
                let slot = self.heap.alloc_page_slot(Some(page));
                self.push(slot);
            }
            Opcode::DG_CALLBEGIN => self.op_dg_callbegin()?,
            //
            // --- Shorthand ---
            //
            _ => return self.execute_shorthand(op),
        }
        Ok(true)
    }

    // --- arithmetic helpers ---

    fn binop_int(&mut self, f: impl FnOnce(i32, i32) -> i32) -> Exec<()> {
        let b = self.pop()?.as_int();
        let a = self.pop()?.as_int();
        self.push(f(a, b));
        Ok(())
    }

    fn binop_cmp(&mut self, f: impl FnOnce(i32, i32) -> bool) -> Exec<()> {
        let b = self.pop()?.as_int();
        let a = self.pop()?.as_int();
        self.push(f(a, b));
        Ok(())
    }

    fn binop_long(&mut self, f: impl FnOnce(i64, i64) -> i64) -> Exec<()> {
        let b = i64::from(self.pop()?.as_int());
        let a = i64::from(self.pop()?.as_int());
        self.push(lint_clamp(f(a, b)));
        Ok(())
    }

    fn binop_float(&mut self, f: impl FnOnce(f32, f32) -> f32) -> Exec<()> {
        let b = self.pop()?.as_float();
        let a = self.pop()?.as_float();
        self.push(f(a, b));
        Ok(())
    }

    fn binop_float_cmp(&mut self, f: impl FnOnce(f32, f32) -> bool) -> Exec<()> {
        let b = self.pop()?.as_float();
        let a = self.pop()?.as_float();
        self.push(f(a, b));
        Ok(())
    }

    fn compound_assign(&mut self, f: impl FnOnce(i32, i32) -> i32) -> Exec<()> {
        let n = self.pop()?.as_int();
        let r = self.pop_var()?;
        let result = f(self.var_get(r)?.as_int(), n);
        self.var_set(r, Value::int(result))?;
        self.push(result);
        Ok(())
    }

    fn compound_assign_long(&mut self, f: impl FnOnce(i64, i64) -> i64) -> Exec<()> {
        let n = i64::from(self.pop()?.as_int());
        let r = self.pop_var()?;
        let result = lint_clamp(f(i64::from(self.var_get(r)?.as_int()), n));
        self.var_set(r, Value::int(result))?;
        self.push(result);
        Ok(())
    }

    fn compound_assign_float(&mut self, f: impl FnOnce(f32, f32) -> f32) -> Exec<()> {
        let n = self.pop()?.as_float();
        let r = self.pop_var()?;
        let result = f(self.var_get(r)?.as_float(), n);
        self.var_set(r, Value::float(result))?;
        self.push(result);
        Ok(())
    }

    fn string_cmp(&mut self, f: impl FnOnce(&str, &str) -> bool) -> Exec<()> {
        let result = f(&self.string_at(1)?, &self.string_at(0)?);
        let b = self.pop()?.as_int();
        let a = self.pop()?.as_int();
        self.unref(b)?;
        self.unref(a)?;
        self.push(result);
        Ok(())
    }

    /// Resolve an (page slot, varno) pair naming an array variable to the
    /// array's own slot plus its declared type.
    fn array_var(&mut self, pageno: i32, varno: i32) -> Exec<(i32, ain_image::Type)> {
        let page = self.heap.expect_page(pageno)?;
        if !page.index_ok(varno) {
            return Err(VmError::PageIndexOutOfBounds { slot: pageno, index: varno }.into());
        }
        let ty = page.variable_type(&self.image, varno as usize);
        let array = page.get(varno as usize).as_int();
        Ok((array, ty))
    }
}

pub(crate) use arrays::array_numof;
