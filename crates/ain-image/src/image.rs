// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! The loaded program image.
//!
//! Everything here is immutable once constructed. The code buffer is
//! byte-addressed and little-endian: a 16-bit opcode word followed by
//! 32-bit operands.

#[cfg(test)]
mod image_test;

use crate::types::Type;

/// A declared variable: function local, argument, or struct member.
///
/// Reference-to-scalar variables occupy two consecutive slots; the second
/// carries type `Void` and holds the variable index half of the pair.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
}

impl Variable {
    #[must_use]
    pub fn new(name: &str, ty: Type) -> Self {
        Self { name: name.to_owned(), ty }
    }
}

/// A bytecode function.
#[derive(Debug, Clone)]
pub struct Function {
    /// Entry address into the code buffer.
    pub address: u32,
    pub name: String,
    pub return_type: Type,
    /// How many leading `vars` are arguments, popped by the call opcodes.
    pub nr_args: usize,
    /// All variables of the local page, arguments first.
    pub vars: Vec<Variable>,
}

impl Function {
    /// Size of the function's local page.
    #[must_use]
    pub fn nr_vars(&self) -> usize {
        self.vars.len()
    }
}

/// A global variable declaration.
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    /// Save-group index, or -1 when ungrouped.
    pub group: i32,
}

/// An initial value for a global, applied before `main` runs.
#[derive(Debug, Clone)]
pub enum InitValue {
    Int { global: usize, value: i32 },
    Float { global: usize, value: f32 },
    String { global: usize, value: String },
}

/// A structure definition.
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    /// Constructor function index, or -1.
    pub constructor: i32,
    /// Destructor function index, or -1.
    pub destructor: i32,
    pub members: Vec<Variable>,
}

/// A native library function declaration.
#[derive(Debug, Clone)]
pub struct LibraryFunction {
    pub name: String,
    pub return_type: Type,
    pub arguments: Vec<Variable>,
}

/// A native library declaration. Resolution against host implementations
/// happens in the runtime crate.
#[derive(Debug, Clone)]
pub struct Library {
    pub name: String,
    pub functions: Vec<LibraryFunction>,
}

/// One case of a switch table.
#[derive(Debug, Clone, Copy)]
pub struct SwitchCase {
    /// Case value; for string switches, an index into the string table.
    pub value: i32,
    pub address: u32,
}

/// A switch table. Lookup is a linear scan, first match wins.
#[derive(Debug, Clone)]
pub struct Switch {
    pub default_address: Option<u32>,
    pub cases: Vec<SwitchCase>,
}

/// A function-type or delegate signature.
#[derive(Debug, Clone)]
pub struct FunctionType {
    pub name: String,
    pub return_type: Type,
    pub nr_args: usize,
    pub variables: Vec<Variable>,
}

/// A loaded program image.
#[derive(Debug, Clone, Default)]
pub struct Image {
    pub code: Vec<u8>,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub initvals: Vec<InitValue>,
    pub structures: Vec<StructDef>,
    pub messages: Vec<String>,
    pub strings: Vec<String>,
    pub libraries: Vec<Library>,
    pub switches: Vec<Switch>,
    pub function_types: Vec<FunctionType>,
    pub delegates: Vec<FunctionType>,
    pub global_groups: Vec<String>,
    /// Function index of `main`.
    pub main: i32,
    /// Function index of the global-array builder, or -1.
    pub alloc: i32,
    /// Function index of the message-display function, or -1.
    pub msgf: i32,
}

impl Image {
    /// Read the opcode word at `addr`.
    ///
    /// Returns `None` when `addr` does not leave room for an opcode.
    #[must_use]
    pub fn read_opcode(&self, addr: u32) -> Option<u16> {
        let i = addr as usize;
        let bytes = self.code.get(i..i + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read operand `n` of the instruction at `addr`.
    #[must_use]
    pub fn read_arg(&self, addr: u32, n: usize) -> Option<i32> {
        let i = addr as usize + 2 + n * 4;
        let bytes = self.code.get(i..i + 4)?;
        Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Look up a function index by name.
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    /// Look up a global index by name.
    #[must_use]
    pub fn global_by_name(&self, name: &str) -> Option<usize> {
        self.globals.iter().position(|g| g.name == name)
    }

    /// Look up a save-group index by name.
    #[must_use]
    pub fn group_by_name(&self, name: &str) -> Option<usize> {
        self.global_groups.iter().position(|g| g == name)
    }
}
