// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! The instruction table.
//!
//! Opcodes are 16-bit little-endian words followed by zero or more 32-bit
//! operands; an instruction's width is therefore fixed by its operand
//! count. The numbering follows the original table's family ordering:
//! core stack and arithmetic forms first, then floats, strings, structs,
//! arrays, control flow, delegates, and finally the fused shorthand
//! family.
//!
//! The top byte of the opcode word can carry the breakpoint flag; the
//! dispatcher strips it after notifying the host. Implementations are
//! encouraged to keep breakpoints in an out-of-line table instead and
//! leave the code buffer untouched.


use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Bits of the opcode word reserved for instruction flavors.
pub const OPTYPE_MASK: u16 = 0xff00;

/// Breakpoint flavor: the host is notified, then the base opcode runs.
pub const BREAKPOINT: u16 = 0x4000;

/// True when the raw opcode word carries the breakpoint flag.
#[inline]
#[must_use]
pub const fn is_breakpoint(raw: u16) -> bool {
    raw & OPTYPE_MASK == BREAKPOINT
}

/// Strip instruction flavor bits, leaving the base opcode.
#[inline]
#[must_use]
pub const fn strip_flags(raw: u16) -> u16 {
    raw & !OPTYPE_MASK
}

macro_rules! instruction_table {
    ( $( $name:ident = $value:literal / $args:literal; )* ) => {
        /// A base opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
        #[repr(u16)]
        #[allow(non_camel_case_types)]
        pub enum Opcode {
            $( $name = $value, )*
        }

        impl Opcode {
            /// Number of 32-bit operands following the opcode word.
            #[must_use]
            pub const fn nr_args(self) -> usize {
                match self {
                    $( Self::$name => $args, )*
                }
            }

            /// Mnemonic, as it appears in disassembly and stack traces.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name), )*
                }
            }
        }
    };
}

instruction_table! {
    // stack management
    PUSH = 0x00 / 1;
    POP = 0x01 / 0;
    REF = 0x02 / 0;
    REFREF = 0x03 / 0;
    PUSHGLOBALPAGE = 0x04 / 0;
    PUSHLOCALPAGE = 0x05 / 0;
    // integer arithmetic
    INV = 0x06 / 0;
    NOT = 0x07 / 0;
    COMPL = 0x08 / 0;
    ADD = 0x09 / 0;
    SUB = 0x0a / 0;
    MUL = 0x0b / 0;
    DIV = 0x0c / 0;
    MOD = 0x0d / 0;
    AND = 0x0e / 0;
    OR = 0x0f / 0;
    XOR = 0x10 / 0;
    LSHIFT = 0x11 / 0;
    RSHIFT = 0x12 / 0;
    // integer comparison
    LT = 0x13 / 0;
    GT = 0x14 / 0;
    LTE = 0x15 / 0;
    GTE = 0x16 / 0;
    NOTE = 0x17 / 0;
    EQUALE = 0x18 / 0;
    // assignment
    ASSIGN = 0x19 / 0;
    PLUSA = 0x1a / 0;
    MINUSA = 0x1b / 0;
    MULA = 0x1c / 0;
    DIVA = 0x1d / 0;
    MODA = 0x1e / 0;
    ANDA = 0x1f / 0;
    ORA = 0x20 / 0;
    XORA = 0x21 / 0;
    LSHIFTA = 0x22 / 0;
    RSHIFTA = 0x23 / 0;
    F_ASSIGN = 0x24 / 0;
    F_PLUSA = 0x25 / 0;
    F_MINUSA = 0x26 / 0;
    F_MULA = 0x27 / 0;
    F_DIVA = 0x28 / 0;
    DUP2 = 0x29 / 0;
    DUP_X2 = 0x2a / 0;
    // control flow
    JUMP = 0x2c / 1;
    IFZ = 0x2d / 1;
    IFNZ = 0x2e / 1;
    RETURN = 0x2f / 0;
    CALLFUNC = 0x30 / 1;
    INC = 0x31 / 0;
    DEC = 0x32 / 0;
    // float arithmetic
    FTOI = 0x33 / 0;
    ITOF = 0x34 / 0;
    F_INV = 0x35 / 0;
    F_ADD = 0x36 / 0;
    F_SUB = 0x37 / 0;
    F_MUL = 0x38 / 0;
    F_DIV = 0x39 / 0;
    F_LT = 0x3a / 0;
    F_GT = 0x3b / 0;
    F_LTE = 0x3c / 0;
    F_GTE = 0x3d / 0;
    F_NOTE = 0x3e / 0;
    F_EQUALE = 0x3f / 0;
    F_PUSH = 0x40 / 1;
    // strings
    S_PUSH = 0x41 / 1;
    S_POP = 0x42 / 0;
    S_ADD = 0x43 / 0;
    S_ASSIGN = 0x44 / 0;
    S_LT = 0x45 / 0;
    S_GT = 0x46 / 0;
    S_LTE = 0x47 / 0;
    S_GTE = 0x48 / 0;
    S_NOTE = 0x49 / 0;
    S_EQUALE = 0x4a / 0;
    S_LENGTH = 0x4b / 0;
    S_LENGTHBYTE = 0x4c / 0;
    S_EMPTY = 0x4d / 0;
    S_FIND = 0x4e / 0;
    S_GETPART = 0x4f / 0;
    A_REF = 0x51 / 0;
    A_NUMOF = 0x52 / 0;
    A_ALLOC = 0x53 / 0;
    A_REALLOC = 0x54 / 0;
    A_FREE = 0x55 / 0;
    A_COPY = 0x57 / 0;
    A_FILL = 0x58 / 0;
    C_REF = 0x59 / 0;
    C_ASSIGN = 0x5a / 0;
    MSG = 0x5b / 1;
    CALLHLL = 0x5c / 2;
    PUSHSTRUCTPAGE = 0x5d / 0;
    CALLMETHOD = 0x5e / 1;
    SH_GLOBALREF = 0x5f / 1;
    SH_LOCALREF = 0x60 / 1;
    SWITCH = 0x61 / 1;
    STRSWITCH = 0x62 / 1;
    FUNC = 0x63 / 1;
    CALLSYS = 0x65 / 1;
    SJUMP = 0x66 / 0;
    CALLONJUMP = 0x67 / 0;
    SWAP = 0x68 / 0;
    SH_STRUCTREF = 0x69 / 1;
    S_LENGTH2 = 0x6a / 0;
    NEW = 0x6c / 0;
    DELETE = 0x6d / 0;
    A_FIND = 0x6f / 0;
    CALLFUNC2 = 0x70 / 0;
    DUP2_X1 = 0x71 / 0;
    R_ASSIGN = 0x72 / 0;
    FT_ASSIGNS = 0x73 / 0;
    ASSERT = 0x74 / 0;
    S_MOD = 0x77 / 1;
    S_PLUSA2 = 0x78 / 0;
    OBJSWAP = 0x7b / 0;
    S_ERASE2 = 0x7c / 0;
    SR_REF = 0x80 / 1;
    SR_POP = 0x82 / 0;
    SR_ASSIGN = 0x83 / 0;
    A_EMPTY = 0x89 / 0;
    A_POPBACK = 0x8a / 0;
    A_PUSHBACK = 0x8b / 0;
    A_ERASE = 0x8c / 0;
    A_INSERT = 0x8d / 0;
    A_SORT = 0x8e / 0;
    SH_SR_ASSIGN = 0x92 / 0;
    DUP = 0xa0 / 0;
    DUP_U2 = 0xa1 / 0;
    SP_INC = 0xa2 / 0;
    R_EQUALE = 0xa6 / 0;
    I_STRING = 0xa9 / 0;
    STOI = 0xaa / 0;
    ITOB = 0xac / 0;
    FTOS = 0xae / 0;
    S_REF = 0xb2 / 0;
    S_REF2 = 0xb3 / 1;
    PAGE_REF = 0xbb / 1;
    SR_REF2 = 0xc1 / 0;
    A_REVERSE = 0xc8 / 0;
    A_SORT_MEM = 0xc9 / 0;
    // long integers
    ITOLI = 0xd0 / 0;
    LI_ADD = 0xd1 / 0;
    LI_SUB = 0xd2 / 0;
    LI_MUL = 0xd3 / 0;
    LI_DIV = 0xd4 / 0;
    LI_MOD = 0xd5 / 0;
    LI_ASSIGN = 0xd6 / 0;
    LI_PLUSA = 0xd7 / 0;
    LI_MINUSA = 0xd8 / 0;
    LI_MULA = 0xd9 / 0;
    LI_DIVA = 0xda / 0;
    LI_MODA = 0xdb / 0;
    LI_ANDA = 0xdc / 0;
    LI_ORA = 0xdd / 0;
    LI_XORA = 0xde / 0;
    LI_LSHIFTA = 0xdf / 0;
    LI_RSHIFTA = 0xe0 / 0;
    LI_INC = 0xe1 / 0;
    LI_DEC = 0xe2 / 0;
    // strings (later additions)
    S_PUSHBACK2 = 0xe5 / 0;
    S_POPBACK2 = 0xe7 / 0;
    // delegates
    DG_ADD = 0xf0 / 0;
    DG_SET = 0xf1 / 0;
    DG_CALL = 0xf2 / 2;
    DG_NUMOF = 0xf3 / 0;
    DG_EXIST = 0xf4 / 0;
    DG_ERASE = 0xf5 / 0;
    DG_CLEAR = 0xf6 / 0;
    DG_COPY = 0xf7 / 0;
    DG_ASSIGN = 0xf8 / 0;
    DG_PLUSA = 0xf9 / 0;
    DG_MINUSA = 0xfa / 0;
    DG_POP = 0xfb / 0;
    DG_NEW_FROM_METHOD = 0xfc / 0;
    DG_CALLBEGIN = 0xfd / 1;
    // fused shorthand family (added in later compilers)
    SH_LOCALASSIGN = 0x100 / 2;
    SH_LOCALINC = 0x101 / 1;
    SH_LOCALDEC = 0x102 / 1;
    SH_LOCALDELETE = 0x103 / 1;
    SH_LOCALCREATE = 0x104 / 2;
    SH_MEM_ASSIGN_LOCAL = 0x105 / 2;
    SH_MEM_ASSIGN_IMM = 0x106 / 2;
    SH_LOCALREFREF = 0x107 / 1;
    SH_LOCALASSIGN_SUB_IMM = 0x108 / 2;
    SH_IF_LOC_LT_IMM = 0x109 / 3;
    SH_IF_LOC_GE_IMM = 0x10a / 3;
    SH_IF_LOC_GT_IMM = 0x10b / 3;
    SH_IF_LOC_NE_IMM = 0x10c / 3;
    SH_LOCREF_ASSIGN_MEM = 0x10d / 2;
    SH_GLOBAL_ASSIGN_LOCAL = 0x10e / 2;
    SH_GLOBAL_ASSIGN_IMM = 0x10f / 2;
    SH_LOCAL_ASSIGN_STRUCTREF = 0x110 / 2;
    SH_STRUCTREF_GT_IMM = 0x111 / 2;
    SH_STRUCT_ASSIGN_LOCALREF_ITOB = 0x112 / 2;
    SH_IF_STRUCTREF_NE_LOCALREF = 0x113 / 3;
    SH_IF_STRUCTREF_GT_IMM = 0x114 / 3;
    SH_IF_STRUCTREF_NE_IMM = 0x115 / 3;
    SH_IF_STRUCTREF_EQ_IMM = 0x116 / 3;
    SH_IF_STRUCTREF_Z = 0x117 / 2;
    SH_IF_STRUCT_A_NOT_EMPTY = 0x118 / 2;
    SH_STRUCTREF_CALLMETHOD_NO_PARAM = 0x119 / 2;
    SH_STRUCTREF2 = 0x11a / 2;
    SH_REF_STRUCTREF2 = 0x11b / 2;
    SH_STRUCTREF3 = 0x11c / 3;
    SH_STRUCTREF2_CALLMETHOD_NO_PARAM = 0x11d / 3;
    THISCALLMETHOD_NOPARAM = 0x11e / 1;
    SH_LOCALSTRUCT_ASSIGN_IMM = 0x11f / 3;
    A_NUMOF_GLOB_1 = 0x120 / 1;
    A_NUMOF_STRUCT_1 = 0x121 / 1;
    SH_STRUCT_A_PUSHBACK_LOCAL_STRUCT = 0x122 / 2;
    SH_GLOBAL_A_PUSHBACK_LOCAL_STRUCT = 0x123 / 2;
    SH_LOCAL_A_PUSHBACK_LOCAL_STRUCT = 0x124 / 2;
    SH_IF_SREF_NE_STR0 = 0x125 / 2;
    SH_S_ASSIGN_REF = 0x126 / 0;
    SH_A_FIND_SREF = 0x127 / 0;
    SH_SREF_EMPTY = 0x128 / 0;
    SH_STRUCTSREF_EQ_LOCALSREF = 0x129 / 2;
    SH_LOCALSREF_EQ_STR0 = 0x12a / 2;
    SH_STRUCTSREF_NE_LOCALSREF = 0x12b / 2;
    SH_LOCALSREF_NE_STR0 = 0x12c / 2;
    SH_STRUCT_SR_REF = 0x12d / 2;
    SH_STRUCT_S_REF = 0x12e / 1;
    SH_REF_LOCAL_ASSIGN_STRUCTREF2 = 0x12f / 3;
    SH_GLOBAL_S_REF = 0x130 / 1;
    SH_LOCAL_S_REF = 0x131 / 1;
    SH_LOCALREF_SASSIGN_LOCALSREF = 0x132 / 2;
    SH_LOCAL_APUSHBACK_LOCALSREF = 0x133 / 2;
    SH_S_ASSIGN_CALLSYS19 = 0x134 / 0;
    SH_S_ASSIGN_STR0 = 0x135 / 1;
    SH_SASSIGN_LOCALSREF = 0x136 / 1;
    SH_STRUCTREF_SASSIGN_LOCALSREF = 0x137 / 2;
    SH_LOCALSREF_EMPTY = 0x138 / 1;
    SH_GLOBAL_APUSHBACK_LOCALSREF = 0x139 / 2;
    SH_STRUCT_APUSHBACK_LOCALSREF = 0x13a / 2;
    SH_STRUCTSREF_EMPTY = 0x13b / 1;
    SH_GLOBALSREF_EMPTY = 0x13c / 1;
    SH_SASSIGN_STRUCTSREF = 0x13d / 1;
    SH_SASSIGN_GLOBALSREF = 0x13e / 1;
    SH_STRUCTSREF_NE_STR0 = 0x13f / 2;
    SH_GLOBALSREF_NE_STR0 = 0x140 / 2;
    SH_LOC_LT_IMM_OR_LOC_GE_IMM = 0x141 / 3;
}

impl Opcode {
    /// Total encoded width in bytes: the opcode word plus its operands.
    #[inline]
    #[must_use]
    pub const fn width(self) -> u32 {
        2 + 4 * self.nr_args() as u32
    }
}
