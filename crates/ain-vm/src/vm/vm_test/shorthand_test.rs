// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Shorthand opcodes against their long-form expansions.
//!
//! Each fused instruction must leave the same observable state as the
//! sequence it replaces; every test here runs both renditions and
//! compares the results.

use ain_image::{CodeBuilder, DataType, ImageBuilder, Opcode, Type, Variable};

use super::{int_var, run_main, string_var, vm_for};

#[test]
fn local_assign() {
    let fused = run_main(vec![int_var("n")], |code| {
        code.emit(Opcode::SH_LOCALASSIGN, &[0, 37]);
        code.emit(Opcode::SH_LOCALREF, &[0]);
        code.emit(Opcode::RETURN, &[]);
    });
    let long = run_main(vec![int_var("n")], |code| {
        code.emit(Opcode::PUSHLOCALPAGE, &[]);
        code.emit(Opcode::PUSH, &[0]);
        code.emit(Opcode::PUSH, &[37]);
        code.emit(Opcode::ASSIGN, &[]);
        code.emit(Opcode::POP, &[]);
        code.emit(Opcode::PUSHLOCALPAGE, &[]);
        code.emit(Opcode::PUSH, &[0]);
        code.emit(Opcode::REF, &[]);
        code.emit(Opcode::RETURN, &[]);
    });
    assert_eq!(fused, long);
    assert_eq!(fused, 37);
}

#[test]
fn local_inc_dec() {
    let fused = run_main(vec![int_var("n")], |code| {
        code.emit(Opcode::SH_LOCALASSIGN, &[0, 5]);
        code.emit(Opcode::SH_LOCALINC, &[0]);
        code.emit(Opcode::SH_LOCALINC, &[0]);
        code.emit(Opcode::SH_LOCALDEC, &[0]);
        code.emit(Opcode::SH_LOCALREF, &[0]);
        code.emit(Opcode::RETURN, &[]);
    });
    let long = run_main(vec![int_var("n")], |code| {
        code.emit(Opcode::SH_LOCALASSIGN, &[0, 5]);
        for op in [Opcode::INC, Opcode::INC, Opcode::DEC] {
            code.emit(Opcode::PUSHLOCALPAGE, &[]);
            code.emit(Opcode::PUSH, &[0]);
            code.emit(op, &[]);
        }
        code.emit(Opcode::SH_LOCALREF, &[0]);
        code.emit(Opcode::RETURN, &[]);
    });
    assert_eq!(fused, long);
    assert_eq!(fused, 6);
}

#[test]
fn local_assign_sub_imm() {
    let fused = run_main(vec![int_var("n")], |code| {
        code.emit(Opcode::SH_LOCALASSIGN, &[0, 50]);
        code.emit(Opcode::SH_LOCALASSIGN_SUB_IMM, &[0, 8]);
        code.emit(Opcode::SH_LOCALREF, &[0]);
        code.emit(Opcode::RETURN, &[]);
    });
    let long = run_main(vec![int_var("n")], |code| {
        code.emit(Opcode::SH_LOCALASSIGN, &[0, 50]);
        code.emit(Opcode::PUSHLOCALPAGE, &[]);
        code.emit(Opcode::PUSH, &[0]);
        code.emit(Opcode::PUSH, &[8]);
        code.emit(Opcode::MINUSA, &[]);
        code.emit(Opcode::POP, &[]);
        code.emit(Opcode::SH_LOCALREF, &[0]);
        code.emit(Opcode::RETURN, &[]);
    });
    assert_eq!(fused, long);
    assert_eq!(fused, 42);
}

fn branch_pair(fused_op: Opcode, long_cmp: Opcode, local: i32, imm: i32) -> (i32, i32) {
    let fused = run_main(vec![int_var("n")], |code| {
        code.emit(Opcode::SH_LOCALASSIGN, &[0, local]);
        let br = code.emit(fused_op, &[0, imm, 0]);
        code.emit(Opcode::PUSH, &[1]);
        code.emit(Opcode::RETURN, &[]);
        let taken = code.here();
        code.emit(Opcode::PUSH, &[2]);
        code.emit(Opcode::RETURN, &[]);
        code.patch(br, 2, taken as i32);
    });
    let long = run_main(vec![int_var("n")], |code| {
        code.emit(Opcode::SH_LOCALASSIGN, &[0, local]);
        code.emit(Opcode::SH_LOCALREF, &[0]);
        code.emit(Opcode::PUSH, &[imm]);
        code.emit(long_cmp, &[]);
        let br = code.emit(Opcode::IFNZ, &[0]);
        code.emit(Opcode::PUSH, &[1]);
        code.emit(Opcode::RETURN, &[]);
        let taken = code.here();
        code.emit(Opcode::PUSH, &[2]);
        code.emit(Opcode::RETURN, &[]);
        code.patch(br, 0, taken as i32);
    });
    (fused, long)
}

#[test]
fn fused_conditional_branches() {
    for (fused_op, long_cmp) in [
        (Opcode::SH_IF_LOC_LT_IMM, Opcode::LT),
        (Opcode::SH_IF_LOC_GE_IMM, Opcode::GTE),
        (Opcode::SH_IF_LOC_GT_IMM, Opcode::GT),
        (Opcode::SH_IF_LOC_NE_IMM, Opcode::NOTE),
    ] {
        for (local, imm) in [(1, 5), (5, 5), (9, 5)] {
            let (fused, long) = branch_pair(fused_op, long_cmp, local, imm);
            assert_eq!(fused, long, "{fused_op:?} with {local} vs {imm}");
        }
    }
}

#[test]
fn global_assign_local() {
    let build = |fused: bool| {
        let mut b = ImageBuilder::new();
        b.add_global("g", Type::new(DataType::Int));
        let mut code = CodeBuilder::new();
        code.emit(Opcode::SH_LOCALASSIGN, &[0, 64]);
        if fused {
            code.emit(Opcode::SH_GLOBAL_ASSIGN_LOCAL, &[0, 0]);
        } else {
            code.emit(Opcode::PUSHGLOBALPAGE, &[]);
            code.emit(Opcode::PUSH, &[0]);
            code.emit(Opcode::SH_LOCALREF, &[0]);
            code.emit(Opcode::ASSIGN, &[]);
            code.emit(Opcode::POP, &[]);
        }
        code.emit(Opcode::SH_GLOBALREF, &[0]);
        code.emit(Opcode::RETURN, &[]);
        let main = b.add_function("main", 0, Type::new(DataType::Int), 0, vec![int_var("n")]);
        b.set_main(main);
        vm_for(b.finish(code.finish())).run().expect("vm run")
    };
    assert_eq!(build(true), build(false));
    assert_eq!(build(true), 64);
}

#[test]
fn local_refref_matches_refref() {
    // local 0-1 hold a reference pair to local 2
    let run = |fused: bool| {
        run_main(
            vec![int_var("refpage"), int_var("refindex"), int_var("target")],
            |code| {
                code.emit(Opcode::SH_LOCALASSIGN, &[2, 55]);
                // build the pair: local0 = &localpage, local1 = 2
                code.emit(Opcode::PUSHLOCALPAGE, &[]);
                code.emit(Opcode::PUSH, &[0]);
                code.emit(Opcode::PUSHLOCALPAGE, &[]);
                code.emit(Opcode::PUSH, &[2]);
                code.emit(Opcode::R_ASSIGN, &[]);
                code.emit(Opcode::POP, &[]);
                code.emit(Opcode::POP, &[]);
                if fused {
                    code.emit(Opcode::SH_LOCALREFREF, &[0]);
                } else {
                    code.emit(Opcode::PUSHLOCALPAGE, &[]);
                    code.emit(Opcode::PUSH, &[0]);
                    code.emit(Opcode::REFREF, &[]);
                }
                code.emit(Opcode::REF, &[]);
                code.emit(Opcode::RETURN, &[]);
            },
        )
    };
    assert_eq!(run(true), run(false));
    assert_eq!(run(true), 55);
}

#[test]
fn struct_member_shorthand() {
    // struct C { int v; array@int xs; }; C::probe() mixes the fused forms
    let build = |fused: bool| {
        let mut b = ImageBuilder::new();
        b.add_struct(
            "C",
            -1,
            -1,
            vec![
                int_var("v"),
                Variable::new("xs", Type::array(DataType::ArrayInt, 1)),
            ],
        );
        let mut code = CodeBuilder::new();
        let probe_addr = code.here();
        if fused {
            code.emit(Opcode::SH_MEM_ASSIGN_IMM, &[0, 6]);
            code.emit(Opcode::SH_STRUCTREF, &[0]);
        } else {
            code.emit(Opcode::PUSHSTRUCTPAGE, &[]);
            code.emit(Opcode::PUSH, &[0]);
            code.emit(Opcode::PUSH, &[6]);
            code.emit(Opcode::ASSIGN, &[]);
            code.emit(Opcode::POP, &[]);
            code.emit(Opcode::PUSHSTRUCTPAGE, &[]);
            code.emit(Opcode::PUSH, &[0]);
            code.emit(Opcode::REF, &[]);
        }
        // member array size via the fused form in both variants
        code.emit(Opcode::A_NUMOF_STRUCT_1, &[1]);
        code.emit(Opcode::ADD, &[]);
        code.emit(Opcode::RETURN, &[]);
        let main_addr = code.here();
        // c = new C; allocate c.xs[3]; return c.probe()
        code.emit(Opcode::PUSHLOCALPAGE, &[]);
        code.emit(Opcode::PUSH, &[0]);
        code.emit(Opcode::PUSH, &[0]);
        code.emit(Opcode::NEW, &[]);
        code.emit(Opcode::ASSIGN, &[]);
        code.emit(Opcode::POP, &[]);
        code.emit(Opcode::SH_LOCALREF, &[0]);
        code.emit(Opcode::PUSH, &[1]);
        code.emit(Opcode::PUSH, &[3]);
        code.emit(Opcode::PUSH, &[1]);
        code.emit(Opcode::A_ALLOC, &[]);
        code.emit(Opcode::SH_LOCALREF, &[0]);
        code.emit(Opcode::CALLMETHOD, &[0]);
        code.emit(Opcode::RETURN, &[]);

        b.add_function("C::probe", probe_addr, Type::new(DataType::Int), 0, vec![]);
        let main = b.add_function(
            "main",
            main_addr,
            Type::new(DataType::Int),
            0,
            vec![Variable::new("c", Type::struct_of(DataType::Struct, 0))],
        );
        b.set_main(main);
        vm_for(b.finish(code.finish())).run().expect("vm run")
    };
    assert_eq!(build(true), build(false));
    assert_eq!(build(true), 9);
}

#[test]
fn string_shorthand_comparisons() {
    let build = |fused: bool| {
        let mut b = ImageBuilder::new();
        let abc = b.add_string("abc");
        let mut code = CodeBuilder::new();
        code.emit(Opcode::SH_LOCALREF, &[0]);
        code.emit(Opcode::SH_S_ASSIGN_STR0, &[abc]);
        if fused {
            code.emit(Opcode::SH_LOCALSREF_EQ_STR0, &[0, abc]);
        } else {
            code.emit(Opcode::SH_LOCAL_S_REF, &[0]);
            code.emit(Opcode::S_PUSH, &[abc]);
            code.emit(Opcode::S_EQUALE, &[]);
        }
        code.emit(Opcode::RETURN, &[]);
        let main = b.add_function(
            "main",
            0,
            Type::new(DataType::Int),
            0,
            vec![string_var("s")],
        );
        b.set_main(main);
        vm_for(b.finish(code.finish())).run().expect("vm run")
    };
    assert_eq!(build(true), build(false));
    assert_eq!(build(true), 1);
}

#[test]
fn range_check_shorthand() {
    // SH_LOC_LT_IMM_OR_LOC_GE_IMM answers (n < lo || n >= hi)
    let run_fused = |n: i32| {
        run_main(vec![int_var("n")], |code| {
            code.emit(Opcode::SH_LOCALASSIGN, &[0, n]);
            code.emit(Opcode::SH_LOC_LT_IMM_OR_LOC_GE_IMM, &[0, 10, 20]);
            code.emit(Opcode::RETURN, &[]);
        })
    };
    assert_eq!(run_fused(5), 1);
    assert_eq!(run_fused(10), 0);
    assert_eq!(run_fused(15), 0);
    assert_eq!(run_fused(20), 1);
}

#[test]
fn local_delete_releases_and_unbinds() {
    // SH_LOCALDELETE on a struct local: slot released, variable reset
    let mut b = ImageBuilder::new();
    b.add_struct("C", -1, -1, vec![int_var("v")]);
    let mut code = CodeBuilder::new();
    code.emit(Opcode::SH_LOCALCREATE, &[0, 0]);
    code.emit(Opcode::SH_LOCALDELETE, &[0]);
    code.emit(Opcode::SH_LOCALREF, &[0]);
    code.emit(Opcode::RETURN, &[]);
    let main = b.add_function(
        "main",
        0,
        Type::new(DataType::Int),
        0,
        vec![Variable::new("c", Type::struct_of(DataType::Struct, 0))],
    );
    b.set_main(main);
    assert_eq!(vm_for(b.finish(code.finish())).run().unwrap(), -1);
}
