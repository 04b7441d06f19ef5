// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! # ain-image
//!
//! Data model for loaded AIN program images.
//!
//! An image is the read-only half of the interpreter: a linear bytecode
//! buffer plus the tables that describe it (globals, functions, structure
//! definitions, native libraries, switch tables, messages and string
//! literals, function types and delegate signatures). The runtime in the
//! `ain-vm` crate mutates only its own heap and stacks; everything in this
//! crate stays immutable for the lifetime of the program.
//!
//! Decoding and decrypting the on-disk container is out of scope; hosts
//! (and tests) assemble images through [`builder::ImageBuilder`] and
//! [`builder::CodeBuilder`].

pub mod builder;
pub mod image;
pub mod instructions;
pub mod types;

pub use builder::{CodeBuilder, ImageBuilder};
pub use image::{
    Function, FunctionType, Global, Image, InitValue, Library, LibraryFunction, StructDef, Switch,
    SwitchCase, Variable,
};
pub use instructions::Opcode;
pub use types::{DataType, Type};
