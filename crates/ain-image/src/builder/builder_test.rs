// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Tests for image assembly.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{CodeBuilder, ImageBuilder};
use crate::instructions::Opcode;

#[test]
fn emit_advances_by_instruction_width() {
    let mut code = CodeBuilder::new();
    let a = code.emit(Opcode::PUSH, &[7]);
    let b = code.emit(Opcode::POP, &[]);
    let c = code.emit(Opcode::RETURN, &[]);
    assert_eq!(a, 0);
    assert_eq!(b, Opcode::PUSH.width());
    assert_eq!(c, Opcode::PUSH.width() + Opcode::POP.width());
}

#[test]
fn patch_backfills_forward_jumps() {
    let mut code = CodeBuilder::new();
    let jump = code.emit(Opcode::JUMP, &[0]);
    code.emit(Opcode::PUSH, &[1]);
    let target = code.here();
    code.emit(Opcode::RETURN, &[]);
    code.patch(jump, 0, target as i32);

    let image = ImageBuilder::new().finish(code.finish());
    assert_eq!(image.read_arg(jump, 0), Some(target as i32));
}

#[test]
fn float_operands_are_bit_exact() {
    let mut code = CodeBuilder::new();
    code.emit_f(Opcode::F_PUSH, 1.5);
    let image = ImageBuilder::new().finish(code.finish());
    let raw = image.read_arg(0, 0).unwrap();
    assert_eq!(f32::from_bits(raw as u32), 1.5);
}

#[test]
fn strings_are_interned() {
    let mut b = ImageBuilder::new();
    let a = b.add_string("hello");
    let same = b.add_string("hello");
    let other = b.add_string("world");
    assert_eq!(a, same);
    assert_ne!(a, other);
}

#[test]
fn entry_points_default_to_absent() {
    let image = ImageBuilder::new().finish(vec![]);
    assert_eq!(image.main, -1);
    assert_eq!(image.alloc, -1);
    assert_eq!(image.msgf, -1);
}
