// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Delegates: binding sets, generational invalidation, the call protocol.

use ain_image::{CodeBuilder, DataType, FunctionType, ImageBuilder, Opcode, Type};

use super::{int_var, vm_for};
use crate::vm::Vm;

/// VM with struct `Obj { int id }`, method `Obj::hit(x)` that records
/// `id * 100 + x` into global `log` (appended decimal digits), and a
/// delegate signature `void cb(int x)`.
///
/// Functions: 0 = NULL, 1 = Obj::hit, 2 = Obj::twice.
fn fixture() -> Vm {
    let mut b = ImageBuilder::new();
    b.add_global("log", Type::new(DataType::Int));

    let mut code = CodeBuilder::new();
    let null_addr = code.here();
    code.emit(Opcode::RETURN, &[]);
    // Obj::hit(x): log = log * 1000 + this.id * 100 + x
    let hit_addr = code.here();
    code.emit(Opcode::PUSHGLOBALPAGE, &[]);
    code.emit(Opcode::PUSH, &[0]);
    code.emit(Opcode::SH_GLOBALREF, &[0]);
    code.emit(Opcode::PUSH, &[1000]);
    code.emit(Opcode::MUL, &[]);
    code.emit(Opcode::SH_STRUCTREF, &[0]);
    code.emit(Opcode::PUSH, &[100]);
    code.emit(Opcode::MUL, &[]);
    code.emit(Opcode::ADD, &[]);
    code.emit(Opcode::SH_LOCALREF, &[0]);
    code.emit(Opcode::ADD, &[]);
    code.emit(Opcode::ASSIGN, &[]);
    code.emit(Opcode::POP, &[]);
    code.emit(Opcode::RETURN, &[]);
    // Obj::twice(x): return x * 2   (an int-returning delegate target)
    let twice_addr = code.here();
    code.emit(Opcode::SH_LOCALREF, &[0]);
    code.emit(Opcode::PUSH, &[2]);
    code.emit(Opcode::MUL, &[]);
    code.emit(Opcode::RETURN, &[]);
    let main_addr = code.here();
    code.emit(Opcode::PUSH, &[0]);
    code.emit(Opcode::RETURN, &[]);

    b.add_function("NULL", null_addr, Type::new(DataType::Void), 0, vec![]);
    b.add_function("Obj::hit", hit_addr, Type::new(DataType::Void), 1, vec![int_var("x")]);
    b.add_function("Obj::twice", twice_addr, Type::new(DataType::Int), 1, vec![int_var("x")]);
    b.add_struct("Obj", -1, -1, vec![int_var("id")]);
    b.add_delegate(FunctionType {
        name: "cb".to_owned(),
        return_type: Type::new(DataType::Void),
        nr_args: 1,
        variables: vec![int_var("x")],
    });
    b.add_delegate(FunctionType {
        name: "cb_int".to_owned(),
        return_type: Type::new(DataType::Int),
        nr_args: 1,
        variables: vec![int_var("x")],
    });
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);
    vm_for(b.finish(code.finish()))
}

fn new_obj(vm: &mut Vm, id: i32) -> i32 {
    use crate::page::{Page, PageKind};
    let mut p = Page::new(PageKind::Struct { struct_type: 0 }, 1);
    p.set(0, crate::value::Value::int(id));
    vm.heap.alloc_page_slot(Some(p))
}

#[test]
fn lifecycle_with_generational_invalidation() {
    let mut vm = fixture();
    let obj = new_obj(&mut vm, 1);
    let dg = vm.heap.alloc_page_slot(None);

    vm.delegate_append_slot(dg, obj, 1).unwrap();
    assert_eq!(vm.delegate_numof(dg).unwrap(), 1);

    // destroying the object makes the entry stale; numof compacts it
    vm.unref(obj).unwrap();
    assert_eq!(vm.delegate_numof(dg).unwrap(), 0);
}

#[test]
fn slot_reuse_does_not_resurrect_bindings() {
    let mut vm = fixture();
    let obj = new_obj(&mut vm, 1);
    let dg = vm.heap.alloc_page_slot(None);
    vm.delegate_append_slot(dg, obj, 1).unwrap();

    vm.unref(obj).unwrap();
    // the freed slot comes back with a fresh generation
    let reborn = new_obj(&mut vm, 2);
    assert_eq!(reborn, obj);
    assert_eq!(vm.delegate_numof(dg).unwrap(), 0);
}

#[test]
fn append_is_set_insertion() {
    let mut vm = fixture();
    let obj = new_obj(&mut vm, 1);
    let dg = vm.heap.alloc_page_slot(None);
    vm.delegate_append_slot(dg, obj, 1).unwrap();
    vm.delegate_append_slot(dg, obj, 1).unwrap();
    assert_eq!(vm.delegate_numof(dg).unwrap(), 1);
    // a different method of the same object is a distinct member
    vm.delegate_append_slot(dg, obj, 2).unwrap();
    assert_eq!(vm.delegate_numof(dg).unwrap(), 2);
}

#[test]
fn union_difference_and_clear() {
    let mut vm = fixture();
    let a = new_obj(&mut vm, 1);
    let b = new_obj(&mut vm, 2);
    let dg1 = vm.heap.alloc_page_slot(None);
    let dg2 = vm.heap.alloc_page_slot(None);
    vm.delegate_append_slot(dg1, a, 1).unwrap();
    vm.delegate_append_slot(dg2, a, 1).unwrap();
    vm.delegate_append_slot(dg2, b, 1).unwrap();

    // union: dg1 += dg2 (the shared entry stays unique)
    vm.delegate_plusa(dg1, dg2).unwrap();
    assert_eq!(vm.delegate_numof(dg1).unwrap(), 2);

    // difference: dg1 -= dg2 leaves nothing
    vm.delegate_minusa(dg1, dg2).unwrap();
    assert_eq!(vm.delegate_numof(dg1).unwrap(), 0);

    // clear
    if let Some(p) = vm.heap.page_mut(dg2).unwrap() {
        p.values_mut().clear();
    }
    assert_eq!(vm.delegate_numof(dg2).unwrap(), 0);
}

#[test]
fn contains_respects_liveness() {
    let mut vm = fixture();
    let obj = new_obj(&mut vm, 1);
    let dg = vm.heap.alloc_page_slot(None);
    vm.delegate_append_slot(dg, obj, 1).unwrap();

    let page = vm.heap.take_page(dg).unwrap();
    assert!(vm.delegate_contains(page.as_ref(), obj, 1));
    assert!(!vm.delegate_contains(page.as_ref(), obj, 2));
    vm.heap.put_page(dg, page);

    vm.unref(obj).unwrap();
    let page = vm.heap.take_page(dg).unwrap();
    assert!(!vm.delegate_contains(page.as_ref(), obj, 1));
    vm.heap.put_page(dg, page);
}

/// Run the full two-opcode iteration over a delegate built in a global.
///
/// Layout: global 0 = log (int), global 1 = dg (delegate), globals 2-3 =
/// object slots kept alive for the duration.
fn protocol_image(emit_tail: impl FnOnce(&mut CodeBuilder)) -> Vm {
    let mut b = ImageBuilder::new();
    b.add_global("log", Type::new(DataType::Int));
    b.add_global("dg", Type::new(DataType::Delegate));
    b.add_global("o1", Type::new(DataType::Int));
    b.add_global("o2", Type::new(DataType::Int));

    let mut code = CodeBuilder::new();
    let null_addr = code.here();
    code.emit(Opcode::RETURN, &[]);
    let hit_addr = code.here();
    code.emit(Opcode::PUSHGLOBALPAGE, &[]);
    code.emit(Opcode::PUSH, &[0]);
    code.emit(Opcode::SH_GLOBALREF, &[0]);
    code.emit(Opcode::PUSH, &[1000]);
    code.emit(Opcode::MUL, &[]);
    code.emit(Opcode::SH_STRUCTREF, &[0]);
    code.emit(Opcode::PUSH, &[100]);
    code.emit(Opcode::MUL, &[]);
    code.emit(Opcode::ADD, &[]);
    code.emit(Opcode::SH_LOCALREF, &[0]);
    code.emit(Opcode::ADD, &[]);
    code.emit(Opcode::ASSIGN, &[]);
    code.emit(Opcode::POP, &[]);
    code.emit(Opcode::RETURN, &[]);
    let twice_addr = code.here();
    code.emit(Opcode::SH_LOCALREF, &[0]);
    code.emit(Opcode::PUSH, &[2]);
    code.emit(Opcode::MUL, &[]);
    code.emit(Opcode::RETURN, &[]);
    let main_addr = code.here();
    // o1 = new Obj(id=1); o2 = new Obj(id=2)  -- ids set via member assign
    for (g, id) in [(2, 1), (3, 2)] {
        code.emit(Opcode::PUSHGLOBALPAGE, &[]);
        code.emit(Opcode::PUSH, &[g]);
        code.emit(Opcode::PUSH, &[0]);
        code.emit(Opcode::NEW, &[]);
        code.emit(Opcode::ASSIGN, &[]);
        code.emit(Opcode::POP, &[]);
        code.emit(Opcode::SH_GLOBALREF, &[g]);
        code.emit(Opcode::PUSH, &[0]);
        code.emit(Opcode::PUSH, &[id]);
        code.emit(Opcode::ASSIGN, &[]);
        code.emit(Opcode::POP, &[]);
    }
    emit_tail(&mut code);

    b.add_function("NULL", null_addr, Type::new(DataType::Void), 0, vec![]);
    b.add_function("Obj::hit", hit_addr, Type::new(DataType::Void), 1, vec![int_var("x")]);
    b.add_function("Obj::twice", twice_addr, Type::new(DataType::Int), 1, vec![int_var("x")]);
    b.add_struct("Obj", -1, -1, vec![int_var("id")]);
    b.add_delegate(FunctionType {
        name: "cb".to_owned(),
        return_type: Type::new(DataType::Void),
        nr_args: 1,
        variables: vec![int_var("x")],
    });
    b.add_delegate(FunctionType {
        name: "cb_int".to_owned(),
        return_type: Type::new(DataType::Int),
        nr_args: 1,
        variables: vec![int_var("x")],
    });
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);
    vm_for(b.finish(code.finish()))
}

#[test]
fn call_protocol_visits_every_live_entry_in_order() {
    let mut vm = protocol_image(|code| {
        // dg += o1.hit; dg += o2.hit
        for g in [2, 3] {
            code.emit(Opcode::SH_GLOBALREF, &[1]);
            code.emit(Opcode::SH_GLOBALREF, &[g]);
            code.emit(Opcode::PUSH, &[1]); // Obj::hit
            code.emit(Opcode::DG_SET, &[]);
        }
        // dg(7)
        code.emit(Opcode::SH_GLOBALREF, &[1]);
        code.emit(Opcode::PUSH, &[7]);
        code.emit(Opcode::DG_CALLBEGIN, &[0]);
        let call = code.emit(Opcode::DG_CALL, &[0, 0]);
        let after = code.here();
        code.patch(call, 1, after as i32);
        code.emit(Opcode::SH_GLOBALREF, &[0]);
        code.emit(Opcode::RETURN, &[]);
    });
    // o1 then o2, each with arg 7: log = (0*1000 + 107)*1000 + 207
    assert_eq!(vm.run().unwrap(), 107_207);
}

#[test]
fn call_protocol_keeps_the_last_return_value() {
    let mut vm = protocol_image(|code| {
        for g in [2, 3] {
            code.emit(Opcode::SH_GLOBALREF, &[1]);
            code.emit(Opcode::SH_GLOBALREF, &[g]);
            code.emit(Opcode::PUSH, &[2]); // Obj::twice
            code.emit(Opcode::DG_SET, &[]);
        }
        code.emit(Opcode::SH_GLOBALREF, &[1]);
        code.emit(Opcode::PUSH, &[21]);
        code.emit(Opcode::DG_CALLBEGIN, &[1]);
        let call = code.emit(Opcode::DG_CALL, &[1, 0]);
        let after = code.here();
        code.patch(call, 1, after as i32);
        // the surviving value is the last call's result
        code.emit(Opcode::RETURN, &[]);
    });
    assert_eq!(vm.run().unwrap(), 42);
}

#[test]
fn call_protocol_over_an_empty_delegate_is_a_no_op() {
    let mut vm = protocol_image(|code| {
        code.emit(Opcode::SH_GLOBALREF, &[1]);
        code.emit(Opcode::PUSH, &[7]);
        code.emit(Opcode::DG_CALLBEGIN, &[0]);
        let call = code.emit(Opcode::DG_CALL, &[0, 0]);
        let after = code.here();
        code.patch(call, 1, after as i32);
        code.emit(Opcode::SH_GLOBALREF, &[0]);
        code.emit(Opcode::RETURN, &[]);
    });
    assert_eq!(vm.run().unwrap(), 0);
}

#[test]
fn dg_opcodes_add_erase_exist() {
    let mut vm = protocol_image(|code| {
        // dg += o1.hit; exists? then erase and ask again: 10*a + b
        code.emit(Opcode::SH_GLOBALREF, &[1]);
        code.emit(Opcode::SH_GLOBALREF, &[2]);
        code.emit(Opcode::PUSH, &[1]);
        code.emit(Opcode::DG_SET, &[]);
        code.emit(Opcode::SH_GLOBALREF, &[1]);
        code.emit(Opcode::SH_GLOBALREF, &[2]);
        code.emit(Opcode::PUSH, &[1]);
        code.emit(Opcode::DG_EXIST, &[]);
        code.emit(Opcode::PUSH, &[10]);
        code.emit(Opcode::MUL, &[]);
        code.emit(Opcode::SH_GLOBALREF, &[1]);
        code.emit(Opcode::SH_GLOBALREF, &[2]);
        code.emit(Opcode::PUSH, &[1]);
        code.emit(Opcode::DG_ERASE, &[]);
        code.emit(Opcode::SH_GLOBALREF, &[1]);
        code.emit(Opcode::SH_GLOBALREF, &[2]);
        code.emit(Opcode::PUSH, &[1]);
        code.emit(Opcode::DG_EXIST, &[]);
        code.emit(Opcode::ADD, &[]);
        code.emit(Opcode::RETURN, &[]);
    });
    assert_eq!(vm.run().unwrap(), 10);
}

#[test]
fn dg_assign_copies_and_clear_empties() {
    let mut vm = protocol_image(|code| {
        // dg += o1.hit; assign into a fresh delegate; clear the original;
        // the copy still holds one entry
        code.emit(Opcode::SH_GLOBALREF, &[1]);
        code.emit(Opcode::SH_GLOBALREF, &[2]);
        code.emit(Opcode::PUSH, &[1]);
        code.emit(Opcode::DG_SET, &[]);
        // copy = DG_COPY(dg); count it via DG_NUMOF
        code.emit(Opcode::SH_GLOBALREF, &[1]);
        code.emit(Opcode::DG_COPY, &[]);
        code.emit(Opcode::DG_NUMOF, &[]);
        // clear the original and count it
        code.emit(Opcode::SH_GLOBALREF, &[1]);
        code.emit(Opcode::DG_CLEAR, &[]);
        code.emit(Opcode::SH_GLOBALREF, &[1]);
        code.emit(Opcode::DG_NUMOF, &[]);
        // result: copy_count * 10 + original_count
        code.emit(Opcode::SWAP, &[]);
        code.emit(Opcode::PUSH, &[10]);
        code.emit(Opcode::MUL, &[]);
        code.emit(Opcode::ADD, &[]);
        code.emit(Opcode::RETURN, &[]);
    });
    assert_eq!(vm.run().unwrap(), 10);
}
