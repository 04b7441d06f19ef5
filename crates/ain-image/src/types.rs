// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! AIN data-type tags.
//!
//! The numbering reproduces the values found in shipped images; gaps are
//! intentional (the compiler that produced them reserved ranges per type
//! family).


use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Declared type of a variable, argument, member or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum DataType {
    Void = 0,
    Int = 10,
    Float = 11,
    String = 12,
    Struct = 13,
    ArrayInt = 14,
    ArrayFloat = 15,
    ArrayString = 16,
    ArrayStruct = 17,
    RefInt = 18,
    RefFloat = 19,
    RefString = 20,
    RefStruct = 21,
    RefArrayInt = 22,
    RefArrayFloat = 23,
    RefArrayString = 24,
    RefArrayStruct = 25,
    ImainSystem = 26,
    FuncType = 27,
    ArrayFuncType = 30,
    RefFuncType = 31,
    RefArrayFuncType = 32,
    Bool = 47,
    ArrayBool = 50,
    RefBool = 51,
    RefArrayBool = 52,
    LongInt = 55,
    ArrayLongInt = 58,
    RefLongInt = 59,
    RefArrayLongInt = 60,
    Delegate = 63,
    ArrayDelegate = 66,
    RefArrayDelegate = 69,
}

impl DataType {
    /// True for the owned array types (`array@...`).
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(
            self,
            Self::ArrayInt
                | Self::ArrayFloat
                | Self::ArrayString
                | Self::ArrayStruct
                | Self::ArrayFuncType
                | Self::ArrayBool
                | Self::ArrayLongInt
                | Self::ArrayDelegate
        )
    }

    /// True for every `ref ...` type, scalar or aggregate.
    #[must_use]
    pub const fn is_ref(self) -> bool {
        matches!(
            self,
            Self::RefInt
                | Self::RefFloat
                | Self::RefString
                | Self::RefStruct
                | Self::RefArrayInt
                | Self::RefArrayFloat
                | Self::RefArrayString
                | Self::RefArrayStruct
                | Self::RefFuncType
                | Self::RefArrayFuncType
                | Self::RefBool
                | Self::RefArrayBool
                | Self::RefLongInt
                | Self::RefArrayLongInt
                | Self::RefArrayDelegate
        )
    }

    /// True for references to value scalars (`ref int` and friends).
    ///
    /// These occupy a (page, index) pair rather than a single slot index.
    #[must_use]
    pub const fn is_ref_scalar(self) -> bool {
        matches!(
            self,
            Self::RefInt | Self::RefFloat | Self::RefBool | Self::RefLongInt
        )
    }

    /// Element type of an array type.
    ///
    /// Falls through unchanged for non-array input, like the original
    /// engine does.
    #[must_use]
    pub const fn element_type(self) -> Self {
        match self {
            Self::ArrayInt | Self::RefArrayInt => Self::Int,
            Self::ArrayFloat | Self::RefArrayFloat => Self::Float,
            Self::ArrayString | Self::RefArrayString => Self::String,
            Self::ArrayStruct | Self::RefArrayStruct => Self::Struct,
            Self::ArrayFuncType | Self::RefArrayFuncType => Self::FuncType,
            Self::ArrayBool | Self::RefArrayBool => Self::Bool,
            Self::ArrayLongInt | Self::RefArrayLongInt => Self::LongInt,
            Self::ArrayDelegate | Self::RefArrayDelegate => Self::Delegate,
            other => other,
        }
    }

    /// Strip one level of `ref` from an array type.
    #[must_use]
    pub const fn strip_array_ref(self) -> Self {
        match self {
            Self::RefArrayInt => Self::ArrayInt,
            Self::RefArrayFloat => Self::ArrayFloat,
            Self::RefArrayString => Self::ArrayString,
            Self::RefArrayStruct => Self::ArrayStruct,
            Self::RefArrayFuncType => Self::ArrayFuncType,
            Self::RefArrayBool => Self::ArrayBool,
            Self::RefArrayLongInt => Self::ArrayLongInt,
            Self::RefArrayDelegate => Self::ArrayDelegate,
            other => other,
        }
    }

    /// True when a variable of this type holds a heap slot that must be
    /// released when the variable dies.
    #[must_use]
    pub const fn is_heap_backed(self) -> bool {
        matches!(self, Self::String | Self::Struct | Self::Delegate) || self.is_array() || self.is_ref()
    }

    /// Human-readable name for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Struct => "struct",
            Self::ArrayInt => "array@int",
            Self::ArrayFloat => "array@float",
            Self::ArrayString => "array@string",
            Self::ArrayStruct => "array@struct",
            Self::RefInt => "ref int",
            Self::RefFloat => "ref float",
            Self::RefString => "ref string",
            Self::RefStruct => "ref struct",
            Self::RefArrayInt => "ref array@int",
            Self::RefArrayFloat => "ref array@float",
            Self::RefArrayString => "ref array@string",
            Self::RefArrayStruct => "ref array@struct",
            Self::ImainSystem => "imain_system",
            Self::FuncType => "functype",
            Self::ArrayFuncType => "array@functype",
            Self::RefFuncType => "ref functype",
            Self::RefArrayFuncType => "ref array@functype",
            Self::Bool => "bool",
            Self::ArrayBool => "array@bool",
            Self::RefBool => "ref bool",
            Self::RefArrayBool => "ref array@bool",
            Self::LongInt => "lint",
            Self::ArrayLongInt => "array@lint",
            Self::RefLongInt => "ref lint",
            Self::RefArrayLongInt => "ref array@lint",
            Self::Delegate => "delegate",
            Self::ArrayDelegate => "array@delegate",
            Self::RefArrayDelegate => "ref array@delegate",
        }
    }
}

/// Full declared type: data tag plus structure index and array rank.
///
/// `struc` is meaningful for struct-bearing types, `rank` for array types;
/// both default to the "not applicable" values shipped images use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Type {
    pub data: DataType,
    pub struc: i32,
    pub rank: i32,
}

impl Type {
    /// A plain (non-struct, non-array) type.
    #[must_use]
    pub const fn new(data: DataType) -> Self {
        Self { data, struc: -1, rank: 0 }
    }

    /// A struct or ref-struct type.
    #[must_use]
    pub const fn struct_of(data: DataType, struct_type: i32) -> Self {
        Self { data, struc: struct_type, rank: 0 }
    }

    /// An array type of the given rank.
    #[must_use]
    pub const fn array(data: DataType, rank: i32) -> Self {
        Self { data, struc: -1, rank }
    }

    /// An array-of-struct type.
    #[must_use]
    pub const fn struct_array(data: DataType, struct_type: i32, rank: i32) -> Self {
        Self { data, struc: struct_type, rank }
    }
}
