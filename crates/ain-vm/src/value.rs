// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! The 32-bit value cell.
//!
//! One storage word backs every stack cell and page variable. The word is
//! untyped: the interpreter knows from context (declared types, page
//! kinds, opcode family) whether it holds a signed integer, a float's
//! bits, a boolean, or a heap slot index. Equality is raw-bit equality.


use core::fmt;
use serde::{Deserialize, Serialize};

/// A raw 32-bit cell.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value {
    raw: i32,
}

impl Value {
    /// An integer cell.
    #[inline]
    #[must_use]
    pub const fn int(v: i32) -> Self {
        Self { raw: v }
    }

    /// A boolean cell (0 or 1).
    #[inline]
    #[must_use]
    pub const fn bool_(b: bool) -> Self {
        Self { raw: b as i32 }
    }

    /// A float cell, storing the IEEE-754 bits.
    #[inline]
    #[must_use]
    pub fn float(v: f32) -> Self {
        Self { raw: v.to_bits() as i32 }
    }

    /// The cell as a signed integer (also: heap slot or variable index).
    #[inline]
    #[must_use]
    pub const fn as_int(self) -> i32 {
        self.raw
    }

    /// The cell's bits as a float.
    #[inline]
    #[must_use]
    pub fn as_float(self) -> f32 {
        f32::from_bits(self.raw as u32)
    }

    /// The cell as a boolean: any nonzero word is true.
    #[inline]
    #[must_use]
    pub const fn as_bool(self) -> bool {
        self.raw != 0
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::bool_(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::float(v)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self.raw)
    }
}
