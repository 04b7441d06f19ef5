// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Control flow: jumps, switches, calls, scenario transitions.

use ain_image::{
    CodeBuilder, DataType, ImageBuilder, Opcode, Switch, SwitchCase, Type, Variable,
};

use super::{int_var, run_main, vm_for};
use crate::error::VmError;

#[test]
fn jump_skips_code() {
    let result = run_main(vec![], |code| {
        let jump = code.emit(Opcode::JUMP, &[0]);
        code.emit(Opcode::PUSH, &[1]);
        code.emit(Opcode::RETURN, &[]);
        let target = code.here();
        code.emit(Opcode::PUSH, &[2]);
        code.emit(Opcode::RETURN, &[]);
        code.patch(jump, 0, target as i32);
    });
    assert_eq!(result, 2);
}

#[test]
fn ifnz_branches_on_nonzero() {
    let result = run_main(vec![], |code| {
        code.emit(Opcode::PUSH, &[7]);
        let br = code.emit(Opcode::IFNZ, &[0]);
        code.emit(Opcode::PUSH, &[1]);
        code.emit(Opcode::RETURN, &[]);
        let target = code.here();
        code.emit(Opcode::PUSH, &[2]);
        code.emit(Opcode::RETURN, &[]);
        code.patch(br, 0, target as i32);
    });
    assert_eq!(result, 2);
}

fn switch_program(selector: i32, default: bool) -> i32 {
    let mut code = CodeBuilder::new();
    let main_addr = code.here();
    code.emit(Opcode::PUSH, &[selector]);
    let sw = code.emit(Opcode::SWITCH, &[0]);
    // fall-through lane (no case matched, no default)
    code.emit(Opcode::PUSH, &[-1]);
    code.emit(Opcode::RETURN, &[]);
    let case_a = code.here();
    code.emit(Opcode::PUSH, &[100]);
    code.emit(Opcode::RETURN, &[]);
    let case_b = code.here();
    code.emit(Opcode::PUSH, &[200]);
    code.emit(Opcode::RETURN, &[]);
    let default_addr = code.here();
    code.emit(Opcode::PUSH, &[999]);
    code.emit(Opcode::RETURN, &[]);
    let _ = sw;

    let mut b = ImageBuilder::new();
    b.add_switch(Switch {
        default_address: default.then_some(default_addr),
        cases: vec![
            SwitchCase { value: 1, address: case_a },
            SwitchCase { value: 2, address: case_b },
            // a duplicate case: the first match must win
            SwitchCase { value: 1, address: case_b },
        ],
    });
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);
    vm_for(b.finish(code.finish())).run().expect("vm run")
}

#[test]
fn switch_first_match_wins() {
    assert_eq!(switch_program(1, true), 100);
    assert_eq!(switch_program(2, true), 200);
}

#[test]
fn switch_falls_back_to_default() {
    assert_eq!(switch_program(9, true), 999);
}

#[test]
fn switch_without_default_falls_through() {
    assert_eq!(switch_program(9, false), -1);
}

#[test]
fn strswitch_matches_string_table_entries() {
    let mut b = ImageBuilder::new();
    let lit_apple = b.add_string("apple");
    let lit_pear = b.add_string("pear");

    let mut code = CodeBuilder::new();
    let main_addr = code.here();
    code.emit(Opcode::S_PUSH, &[lit_pear]);
    code.emit(Opcode::STRSWITCH, &[0]);
    code.emit(Opcode::PUSH, &[-1]);
    code.emit(Opcode::RETURN, &[]);
    let case_apple = code.here();
    code.emit(Opcode::PUSH, &[1]);
    code.emit(Opcode::RETURN, &[]);
    let case_pear = code.here();
    code.emit(Opcode::PUSH, &[2]);
    code.emit(Opcode::RETURN, &[]);

    b.add_switch(Switch {
        default_address: None,
        cases: vec![
            SwitchCase { value: lit_apple, address: case_apple },
            SwitchCase { value: lit_pear, address: case_pear },
        ],
    });
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);

    assert_eq!(vm_for(b.finish(code.finish())).run().unwrap(), 2);
}

#[test]
fn call_and_return_with_arguments() {
    // add(a, b) { return a + b; }  main { return add(19, 23); }
    let mut code = CodeBuilder::new();
    let add_addr = code.here();
    code.emit(Opcode::SH_LOCALREF, &[0]);
    code.emit(Opcode::SH_LOCALREF, &[1]);
    code.emit(Opcode::ADD, &[]);
    code.emit(Opcode::RETURN, &[]);
    let main_addr = code.here();
    code.emit(Opcode::PUSH, &[19]);
    code.emit(Opcode::PUSH, &[23]);
    code.emit(Opcode::CALLFUNC, &[0]);
    code.emit(Opcode::RETURN, &[]);

    let mut b = ImageBuilder::new();
    b.add_function(
        "add",
        add_addr,
        Type::new(DataType::Int),
        2,
        vec![int_var("a"), int_var("b")],
    );
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);

    assert_eq!(vm_for(b.finish(code.finish())).run().unwrap(), 42);
}

#[test]
fn indirect_call_through_a_function_value() {
    // CALLFUNC2 pops the function-type index and the function index
    let mut code = CodeBuilder::new();
    let f_addr = code.here();
    code.emit(Opcode::PUSH, &[77]);
    code.emit(Opcode::RETURN, &[]);
    let main_addr = code.here();
    code.emit(Opcode::PUSH, &[0]); // function index of "f"
    code.emit(Opcode::PUSH, &[0]); // function-type index (unused at runtime)
    code.emit(Opcode::CALLFUNC2, &[]);
    code.emit(Opcode::RETURN, &[]);

    let mut b = ImageBuilder::new();
    b.add_function("f", f_addr, Type::new(DataType::Int), 0, vec![]);
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);

    assert_eq!(vm_for(b.finish(code.finish())).run().unwrap(), 77);
}

#[test]
fn method_call_binds_the_struct_page() {
    // struct C { int v; }  C::get() { return this.v; }
    let mut code = CodeBuilder::new();
    let get_addr = code.here();
    code.emit(Opcode::SH_STRUCTREF, &[0]);
    code.emit(Opcode::RETURN, &[]);
    let main_addr = code.here();
    // local c; c = new C; c.v = 31; return c.get();
    code.emit(Opcode::PUSHLOCALPAGE, &[]);
    code.emit(Opcode::PUSH, &[0]);
    code.emit(Opcode::PUSH, &[0]); // struct type number
    code.emit(Opcode::NEW, &[]);
    code.emit(Opcode::ASSIGN, &[]);
    code.emit(Opcode::POP, &[]);
    // c.v = 31
    code.emit(Opcode::SH_LOCALREF, &[0]);
    code.emit(Opcode::PAGE_REF, &[0]); // read old value to prove the page exists
    code.emit(Opcode::POP, &[]);
    code.emit(Opcode::SH_LOCALREF, &[0]);
    code.emit(Opcode::PUSH, &[0]);
    code.emit(Opcode::PUSH, &[31]);
    code.emit(Opcode::ASSIGN, &[]);
    code.emit(Opcode::POP, &[]);
    // receiver, then the method call
    code.emit(Opcode::SH_LOCALREF, &[0]);
    code.emit(Opcode::CALLMETHOD, &[0]);
    code.emit(Opcode::RETURN, &[]);

    let mut b = ImageBuilder::new();
    b.add_struct("C", -1, -1, vec![int_var("v")]);
    b.add_function("C::get", get_addr, Type::new(DataType::Int), 0, vec![]);
    let main = b.add_function(
        "main",
        main_addr,
        Type::new(DataType::Int),
        0,
        vec![Variable::new("c", Type::struct_of(DataType::Struct, 0))],
    );
    b.set_main(main);

    assert_eq!(vm_for(b.finish(code.finish())).run().unwrap(), 31);
}

#[test]
fn scenario_jump_flushes_the_call_stack() {
    // main calls helper; helper CALLONJUMPs into "scene" and SJUMPs.
    // scene's return ends execution directly: nothing beneath survives.
    let mut b = ImageBuilder::new();
    let scene_name = b.add_string("scene");

    let mut code = CodeBuilder::new();
    let scene_addr = code.here();
    code.emit(Opcode::PUSH, &[42]);
    code.emit(Opcode::RETURN, &[]);
    let helper_addr = code.here();
    code.emit(Opcode::S_PUSH, &[scene_name]);
    code.emit(Opcode::CALLONJUMP, &[]);
    code.emit(Opcode::SJUMP, &[]);
    let main_addr = code.here();
    code.emit(Opcode::CALLFUNC, &[1]);
    // never reached: the scenario transition discards this frame
    code.emit(Opcode::PUSH, &[-1]);
    code.emit(Opcode::RETURN, &[]);

    b.add_function("scene", scene_addr, Type::new(DataType::Int), 0, vec![]);
    b.add_function("helper", helper_addr, Type::new(DataType::Void), 0, vec![]);
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);

    assert_eq!(vm_for(b.finish(code.finish())).run().unwrap(), 42);
}

#[test]
fn unknown_scenario_function_is_fatal_when_called() {
    let mut b = ImageBuilder::new();
    let name = b.add_string("no-such-scene");
    let mut code = CodeBuilder::new();
    let main_addr = code.here();
    code.emit(Opcode::S_PUSH, &[name]);
    code.emit(Opcode::CALLONJUMP, &[]);
    code.emit(Opcode::SJUMP, &[]);
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);

    let err = vm_for(b.finish(code.finish())).run().unwrap_err();
    assert!(matches!(err, VmError::InvalidScenarioFunction { .. }));
}

#[test]
fn message_opcode_invokes_the_message_function() {
    // msgf(no, count, text) { g = no * 1000 + count * 10 + len(text); }
    let mut b = ImageBuilder::new();
    b.add_global("g", Type::new(DataType::Int));
    b.add_message("hi");
    b.add_message("bye");

    let mut code = CodeBuilder::new();
    let msgf_addr = code.here();
    // g = no * 1000 + count * 10 + len(text)
    code.emit(Opcode::PUSHGLOBALPAGE, &[]);
    code.emit(Opcode::PUSH, &[0]);
    code.emit(Opcode::SH_LOCALREF, &[0]);
    code.emit(Opcode::PUSH, &[1000]);
    code.emit(Opcode::MUL, &[]);
    code.emit(Opcode::SH_LOCALREF, &[1]);
    code.emit(Opcode::PUSH, &[10]);
    code.emit(Opcode::MUL, &[]);
    code.emit(Opcode::ADD, &[]);
    code.emit(Opcode::SH_LOCAL_S_REF, &[2]);
    code.emit(Opcode::S_LENGTH2, &[]);
    code.emit(Opcode::ADD, &[]);
    code.emit(Opcode::ASSIGN, &[]);
    code.emit(Opcode::POP, &[]);
    code.emit(Opcode::RETURN, &[]);
    let main_addr = code.here();
    code.emit(Opcode::MSG, &[1]); // "bye"
    code.emit(Opcode::SH_GLOBALREF, &[0]);
    code.emit(Opcode::RETURN, &[]);

    let msgf = b.add_function(
        "msgf",
        msgf_addr,
        Type::new(DataType::Void),
        3,
        vec![int_var("no"), int_var("count"), super::string_var("text")],
    );
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_msgf(msgf);
    b.set_main(main);

    // no=1, count=2, len("bye")=3
    assert_eq!(vm_for(b.finish(code.finish())).run().unwrap(), 1023);
}

#[test]
fn message_opcode_without_msgf_is_a_no_op() {
    let mut b = ImageBuilder::new();
    b.add_message("hello");
    let mut code = CodeBuilder::new();
    let main_addr = code.here();
    code.emit(Opcode::MSG, &[0]);
    code.emit(Opcode::PUSH, &[5]);
    code.emit(Opcode::RETURN, &[]);
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);

    assert_eq!(vm_for(b.finish(code.finish())).run().unwrap(), 5);
}

#[test]
fn runaway_recursion_overflows_the_call_stack() {
    let mut code = CodeBuilder::new();
    let f_addr = code.here();
    code.emit(Opcode::CALLFUNC, &[0]);
    code.emit(Opcode::RETURN, &[]);
    let main_addr = code.here();
    code.emit(Opcode::CALLFUNC, &[0]);
    code.emit(Opcode::RETURN, &[]);

    let mut b = ImageBuilder::new();
    b.add_function("f", f_addr, Type::new(DataType::Void), 0, vec![]);
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);

    let err = vm_for(b.finish(code.finish())).run().unwrap_err();
    assert!(matches!(err, VmError::CallStackOverflow));
}

#[test]
fn failed_assertion_exits_with_status_one() {
    let mut b = ImageBuilder::new();
    let expr = b.add_string("x == y");
    let file = b.add_string("game.jaf");
    let mut code = CodeBuilder::new();
    let main_addr = code.here();
    code.emit(Opcode::PUSH, &[0]); // the asserted expression value
    code.emit(Opcode::S_PUSH, &[expr]);
    code.emit(Opcode::S_PUSH, &[file]);
    code.emit(Opcode::PUSH, &[12]); // line
    code.emit(Opcode::ASSERT, &[]);
    code.emit(Opcode::PUSH, &[0]);
    code.emit(Opcode::RETURN, &[]);
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);

    let (mut vm, host) = super::vm_with_shared_host(b.finish(code.finish()));
    assert_eq!(vm.run().unwrap(), 1);
    assert!(host.inner().outputs[0].contains("game.jaf:12"));
}

#[test]
fn passing_assertion_continues() {
    let mut b = ImageBuilder::new();
    let expr = b.add_string("ok");
    let file = b.add_string("game.jaf");
    let mut code = CodeBuilder::new();
    let main_addr = code.here();
    code.emit(Opcode::PUSH, &[1]);
    code.emit(Opcode::S_PUSH, &[expr]);
    code.emit(Opcode::S_PUSH, &[file]);
    code.emit(Opcode::PUSH, &[12]);
    code.emit(Opcode::ASSERT, &[]);
    code.emit(Opcode::PUSH, &[3]);
    code.emit(Opcode::RETURN, &[]);
    let main = b.add_function("main", main_addr, Type::new(DataType::Int), 0, vec![]);
    b.set_main(main);

    assert_eq!(vm_for(b.finish(code.finish())).run().unwrap(), 3);
}
