// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Tests for pages and page copying.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use ain_image::{DataType, Image, ImageBuilder, Type, Variable};

use super::{Page, PageKind, alloc_struct, copy_page_slot, variable_initval, vm_copy};
use crate::heap::Heap;
use crate::value::Value;

/// Image with one struct type `point { int x; string label; }` and a
/// global of that type plus an int-array global.
fn fixture() -> Image {
    let mut b = ImageBuilder::new();
    b.add_struct(
        "point",
        -1,
        -1,
        vec![
            Variable::new("x", Type::new(DataType::Int)),
            Variable::new("label", Type::new(DataType::String)),
        ],
    );
    b.add_global("origin", Type::struct_of(DataType::Struct, 0));
    b.add_global("values", Type::array(DataType::ArrayInt, 1));
    b.finish(vec![])
}

#[test]
fn initval_per_type() {
    let mut heap = Heap::new();

    assert_eq!(variable_initval(&mut heap, DataType::Int).as_int(), 0);
    assert_eq!(variable_initval(&mut heap, DataType::Float).as_int(), 0);
    assert_eq!(variable_initval(&mut heap, DataType::Struct).as_int(), -1);
    assert_eq!(variable_initval(&mut heap, DataType::RefInt).as_int(), -1);
    assert_eq!(variable_initval(&mut heap, DataType::RefString).as_int(), -1);

    let s = variable_initval(&mut heap, DataType::String).as_int();
    assert_eq!(heap.string(s).unwrap(), "");

    let a = variable_initval(&mut heap, DataType::ArrayInt).as_int();
    assert!(heap.page(a).unwrap().is_none());

    let d = variable_initval(&mut heap, DataType::Delegate).as_int();
    assert!(heap.page(d).unwrap().is_none());
}

#[test]
fn variable_type_resolution() {
    let image = fixture();
    let global_page = Page::new(PageKind::Global, image.globals.len());
    assert_eq!(global_page.variable_type(&image, 0).data, DataType::Struct);
    assert_eq!(global_page.variable_type(&image, 0).struc, 0);
    assert_eq!(global_page.variable_type(&image, 1).data, DataType::ArrayInt);

    let struct_page = Page::new(PageKind::Struct { struct_type: 0 }, 2);
    assert_eq!(struct_page.variable_type(&image, 0).data, DataType::Int);
    assert_eq!(struct_page.variable_type(&image, 1).data, DataType::String);
}

#[test]
fn array_page_types_by_rank() {
    let image = fixture();
    let outer = Page::new(
        PageKind::Array { data_type: DataType::ArrayInt, struct_type: -1, rank: 2 },
        3,
    );
    // above rank 1 the elements are sub-arrays
    let t = outer.variable_type(&image, 0);
    assert_eq!(t.data, DataType::ArrayInt);
    assert_eq!(t.rank, 1);

    let leaf = Page::new(
        PageKind::Array { data_type: DataType::ArrayInt, struct_type: -1, rank: 1 },
        3,
    );
    assert_eq!(leaf.variable_type(&image, 0).data, DataType::Int);
}

#[test]
fn delegate_pages_are_not_reference_counted() {
    let image = fixture();
    let page = Page::new(PageKind::Delegate, 0);
    assert_eq!(page.variable_type(&image, 0).data, DataType::Void);
}

#[test]
fn delegate_triples() {
    let mut page = Page::new(PageKind::Delegate, 0);
    page.delegate_push(4, 7, 1);
    page.delegate_push(5, 8, 2);
    assert_eq!(page.delegate_len(), 2);
    assert_eq!(page.delegate_entry(1), (5, 8, 2));
    page.delegate_remove(0);
    assert_eq!(page.delegate_len(), 1);
    assert_eq!(page.delegate_entry(0), (5, 8, 2));
}

#[test]
fn alloc_struct_initializes_members() {
    let image = fixture();
    let mut heap = Heap::new();
    let slot = alloc_struct(&image, &mut heap, 0).unwrap();
    let page = heap.expect_page(slot).unwrap();
    assert_eq!(page.nr_vars(), 2);
    assert_eq!(page.get(0).as_int(), 0);
    let label = page.get(1).as_int();
    assert_eq!(heap.string(label).unwrap(), "");
}

#[test]
fn vm_copy_strings_are_independent() {
    let image = fixture();
    let mut heap = Heap::new();
    let original = heap.alloc_string_slot("x".to_owned());
    let copied = vm_copy(&image, &mut heap, Value::int(original), DataType::String)
        .unwrap()
        .as_int();
    assert_ne!(copied, original);
    heap.string_assign(copied, "y").unwrap();
    assert_eq!(heap.string(original).unwrap(), "x");
    assert_eq!(heap.string(copied).unwrap(), "y");
}

#[test]
fn vm_copy_references_share_and_count() {
    let image = fixture();
    let mut heap = Heap::new();
    let slot = heap.alloc_page_slot(None);
    let copied = vm_copy(&image, &mut heap, Value::int(slot), DataType::RefArrayInt).unwrap();
    assert_eq!(copied.as_int(), slot);
    assert_eq!(heap.ref_count(slot), 2);
}

#[test]
fn copy_page_is_a_deep_copy() {
    let image = fixture();
    let mut heap = Heap::new();
    let original = alloc_struct(&image, &mut heap, 0).unwrap();
    heap.add_ref(original); // keep alive independently of the copy

    let copy = copy_page_slot(&image, &mut heap, original).unwrap();
    assert_ne!(copy, original);

    let copy_label = heap.expect_page(copy).unwrap().get(1).as_int();
    let orig_label = heap.expect_page(original).unwrap().get(1).as_int();
    assert_ne!(copy_label, orig_label);

    // mutating the copy never changes the original
    heap.string_assign(copy_label, "changed").unwrap();
    assert_eq!(heap.string(orig_label).unwrap(), "");
}

#[test]
fn copy_of_an_empty_page_slot_stays_empty() {
    let image = fixture();
    let mut heap = Heap::new();
    let slot = heap.alloc_page_slot(None);
    let copy = copy_page_slot(&image, &mut heap, slot).unwrap();
    assert!(heap.page(copy).unwrap().is_none());
}
