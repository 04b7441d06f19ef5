// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Image assembly.
//!
//! Hosts and tests build images directly rather than decoding the on-disk
//! container. [`CodeBuilder`] emits instructions into a byte buffer with
//! forward-jump patching; [`ImageBuilder`] collects the tables and entry
//! points around the finished code.

#[cfg(test)]
mod builder_test;

use crate::image::{
    Function, FunctionType, Global, Image, InitValue, Library, StructDef, Switch, Variable,
};
use crate::instructions::Opcode;
use crate::types::Type;

/// Emits bytecode: little-endian 16-bit opcodes with 32-bit operands.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    buf: Vec<u8>,
}

impl CodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current emission address.
    #[must_use]
    pub fn here(&self) -> u32 {
        self.buf.len() as u32
    }

    /// Emit one instruction and return its address.
    ///
    /// # Panics
    ///
    /// Panics if the operand count does not match the instruction table;
    /// that is a bug in the caller, not a runtime condition.
    pub fn emit(&mut self, op: Opcode, args: &[i32]) -> u32 {
        assert_eq!(args.len(), op.nr_args(), "operand count for {}", op.name());
        let addr = self.here();
        self.buf.extend_from_slice(&u16::from(op).to_le_bytes());
        for &arg in args {
            self.buf.extend_from_slice(&arg.to_le_bytes());
        }
        addr
    }

    /// Emit an instruction whose operand is a float immediate.
    pub fn emit_f(&mut self, op: Opcode, arg: f32) -> u32 {
        self.emit(op, &[arg.to_bits() as i32])
    }

    /// Patch operand `n` of the instruction at `addr` (backfilling a
    /// forward jump target, usually).
    pub fn patch(&mut self, addr: u32, n: usize, value: i32) {
        let at = addr as usize + 2 + n * 4;
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Finish and take the code buffer.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Collects image tables around an assembled code buffer.
#[derive(Debug)]
pub struct ImageBuilder {
    image: Image,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            image: Image {
                main: -1,
                alloc: -1,
                msgf: -1,
                ..Image::default()
            },
        }
    }

    /// Intern a string literal, returning its index.
    pub fn add_string(&mut self, s: &str) -> i32 {
        if let Some(i) = self.image.strings.iter().position(|x| x == s) {
            return i as i32;
        }
        self.image.strings.push(s.to_owned());
        self.image.strings.len() as i32 - 1
    }

    /// Add a message, returning its index.
    pub fn add_message(&mut self, s: &str) -> i32 {
        self.image.messages.push(s.to_owned());
        self.image.messages.len() as i32 - 1
    }

    /// Declare a global, returning its index.
    pub fn add_global(&mut self, name: &str, ty: Type) -> i32 {
        self.add_grouped_global(name, ty, -1)
    }

    /// Declare a global in a save group, returning its index.
    pub fn add_grouped_global(&mut self, name: &str, ty: Type, group: i32) -> i32 {
        self.image.globals.push(Global { name: name.to_owned(), ty, group });
        self.image.globals.len() as i32 - 1
    }

    /// Record an initial value for a global.
    pub fn add_initval(&mut self, value: InitValue) {
        self.image.initvals.push(value);
    }

    /// Register a save-group name, returning its index.
    pub fn add_global_group(&mut self, name: &str) -> i32 {
        self.image.global_groups.push(name.to_owned());
        self.image.global_groups.len() as i32 - 1
    }

    /// Declare a function, returning its index.
    pub fn add_function(
        &mut self,
        name: &str,
        address: u32,
        return_type: Type,
        nr_args: usize,
        vars: Vec<Variable>,
    ) -> i32 {
        assert!(nr_args <= vars.len(), "nr_args exceeds variable count");
        self.image.functions.push(Function {
            address,
            name: name.to_owned(),
            return_type,
            nr_args,
            vars,
        });
        self.image.functions.len() as i32 - 1
    }

    /// Declare a structure, returning its index.
    pub fn add_struct(
        &mut self,
        name: &str,
        constructor: i32,
        destructor: i32,
        members: Vec<Variable>,
    ) -> i32 {
        self.image.structures.push(StructDef {
            name: name.to_owned(),
            constructor,
            destructor,
            members,
        });
        self.image.structures.len() as i32 - 1
    }

    /// Add a switch table, returning its index.
    pub fn add_switch(&mut self, switch: Switch) -> i32 {
        self.image.switches.push(switch);
        self.image.switches.len() as i32 - 1
    }

    /// Declare a native library, returning its index.
    pub fn add_library(&mut self, library: Library) -> i32 {
        self.image.libraries.push(library);
        self.image.libraries.len() as i32 - 1
    }

    /// Declare a delegate signature, returning its index.
    pub fn add_delegate(&mut self, delegate: FunctionType) -> i32 {
        self.image.delegates.push(delegate);
        self.image.delegates.len() as i32 - 1
    }

    /// Declare a function-type signature, returning its index.
    pub fn add_function_type(&mut self, fty: FunctionType) -> i32 {
        self.image.function_types.push(fty);
        self.image.function_types.len() as i32 - 1
    }

    /// Set the `main` entry point.
    pub fn set_main(&mut self, function: i32) {
        self.image.main = function;
    }

    /// Set the global-array builder entry point.
    pub fn set_alloc(&mut self, function: i32) {
        self.image.alloc = function;
    }

    /// Set the message-display function.
    pub fn set_msgf(&mut self, function: i32) {
        self.image.msgf = function;
    }

    /// Attach the code buffer and finish.
    #[must_use]
    pub fn finish(mut self, code: Vec<u8>) -> Image {
        self.image.code = code;
        self.image
    }
}
