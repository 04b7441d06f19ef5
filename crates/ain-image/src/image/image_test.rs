// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Tests for the image model.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::Image;
use crate::builder::{CodeBuilder, ImageBuilder};
use crate::instructions::Opcode;
use crate::types::{DataType, Type};

#[test]
fn code_readers_are_little_endian() {
    let mut code = CodeBuilder::new();
    code.emit(Opcode::PUSH, &[0x1234_5678]);
    let image = ImageBuilder::new().finish(code.finish());

    assert_eq!(image.read_opcode(0), Some(u16::from(Opcode::PUSH)));
    assert_eq!(image.read_arg(0, 0), Some(0x1234_5678));
    assert_eq!(image.code[2], 0x78); // least significant byte first
}

#[test]
fn code_readers_check_bounds() {
    let image = Image { code: vec![0x00, 0x00, 0x01], ..Image::default() };
    assert_eq!(image.read_opcode(0), Some(0));
    assert_eq!(image.read_opcode(2), None);
    assert_eq!(image.read_arg(0, 0), None);
}

#[test]
fn lookups_by_name() {
    let mut b = ImageBuilder::new();
    b.add_global("counter", Type::new(DataType::Int));
    b.add_global("title", Type::new(DataType::String));
    b.add_function("main", 0, Type::new(DataType::Int), 0, vec![]);
    b.add_global_group("System");
    let image = b.finish(vec![]);

    assert_eq!(image.global_by_name("title"), Some(1));
    assert_eq!(image.global_by_name("missing"), None);
    assert_eq!(image.function_by_name("main"), Some(0));
    assert_eq!(image.function_by_name("missing"), None);
    assert_eq!(image.group_by_name("System"), Some(0));
}
