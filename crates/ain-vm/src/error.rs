// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Error and control-transfer types.
//!
//! `VmError` covers the fatal machine faults (bad IP, illegal opcode,
//! heap corruption, stack exhaustion) and the data errors raised by the
//! snapshot files. `Exit` and `Reset` are not errors but ride the same
//! `Result` channel internally, so every opcode handler can unwind with
//! `?` without a separate control path.

use thiserror::Error;

/// A fatal machine fault or snapshot data error.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("illegal instruction pointer: {ip:#010x}")]
    BadInstructionPointer { ip: u32 },

    #[error("illegal opcode: {opcode:#06x} at {ip:#010x}")]
    IllegalOpcode { opcode: u16, ip: u32 },

    #[error("out of bounds heap index: {slot}")]
    HeapOutOfBounds { slot: i32 },

    #[error("double free of slot {slot}")]
    DoubleFree { slot: i32 },

    #[error("invalid page index: {slot}")]
    InvalidPageIndex { slot: i32 },

    #[error("out of bounds page index: {slot}/{index}")]
    PageIndexOutOfBounds { slot: i32, index: i32 },

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("call stack overflow")]
    CallStackOverflow,

    #[error("invalid function index: {function}")]
    InvalidFunction { function: i32 },

    #[error("invalid scenario function: {name}")]
    InvalidScenarioFunction { name: String },

    #[error("invalid delegate index: {index}")]
    InvalidDelegate { index: i32 },

    #[error("unimplemented library function: {library}.{function}")]
    UnimplementedLibraryFunction { library: String, function: String },

    #[error("unimplemented syscall: {code:#x}")]
    UnimplementedSyscall { code: i32 },

    #[error("assertion failed at {file}:{line}: {expr}")]
    AssertionFailed { file: String, line: i32, expr: String },

    #[error("{0}")]
    Fatal(String),

    #[error("save data key mismatch")]
    SaveKeyMismatch,

    #[error("invalid save data: {0}")]
    SaveData(String),

    #[error("save file i/o: {0}")]
    SaveIo(#[from] std::io::Error),
}

/// Internal unwind signal: a fault, or a deliberate control transfer.
#[derive(Debug)]
pub(crate) enum Signal {
    /// `system.Exit(n)` or a failed assertion: terminate with a status.
    Exit(i32),
    /// `system.Reset()`: tear everything down and restart from the top.
    Reset,
    /// A fatal fault.
    Fault(VmError),
}

impl From<VmError> for Signal {
    fn from(e: VmError) -> Self {
        Self::Fault(e)
    }
}

/// Result type used throughout the dispatcher.
pub(crate) type Exec<T> = Result<T, Signal>;
