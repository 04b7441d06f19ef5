// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! `S_MOD` formatting: splice a single value into a `%` slot.
//!
//! One format operation consumes exactly one specifier. Flags follow the
//! C family: `0` selects zero padding, digits select the field width,
//! `.N` the precision. The capitalized conversions (`%D`, `%F`) render
//! with full-width digit glyphs. A mismatched or malformed specifier is a
//! warning, and the format string passes through unmodified.


use num_enum::TryFromPrimitive;
use tracing::warn;

use crate::heap::Heap;
use crate::strings;
use crate::value::Value;

/// Declared type of the value being spliced, as encoded in bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(i32)]
pub enum FormatType {
    Int = 2,
    Float = 3,
    String = 4,
    Bool = 48,
    LongInt = 56,
}

impl FormatType {
    const fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::Bool | Self::LongInt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FmtKind {
    Int,
    Float,
    String,
    Char,
    Bool,
}

#[derive(Debug)]
struct FmtSpec {
    kind: FmtKind,
    precision: usize,
    padding: usize,
    zero_pad: bool,
    fullwidth: bool,
}

fn read_number(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> usize {
    let mut n = 0;
    while let Some(&(_, c)) = chars.peek() {
        let Some(d) = c.to_digit(10) else { break };
        n = n * 10 + d as usize;
        chars.next();
    }
    n
}

/// Parse the specifier starting at the `%` at byte offset `at`.
///
/// Returns the spec and the byte offset one past the conversion character
/// when the specifier is well-formed and matches the declared type.
fn parse_spec(fmt: &str, at: usize, target: FormatType) -> Option<(FmtSpec, usize)> {
    let mut spec = FmtSpec {
        kind: FmtKind::Int,
        precision: 6,
        padding: 0,
        zero_pad: false,
        fullwidth: false,
    };
    let mut chars = fmt[at + 1..].char_indices().peekable();
    loop {
        let Some(&(i, c)) = chars.peek() else {
            warn!(spec = &fmt[at..], "invalid format specifier");
            return None;
        };
        let matched = match c {
            'd' => {
                spec.kind = FmtKind::Int;
                target.is_integer()
            }
            'D' => {
                spec.kind = FmtKind::Int;
                spec.fullwidth = true;
                target.is_integer()
            }
            'f' => {
                spec.kind = FmtKind::Float;
                target == FormatType::Float
            }
            'F' => {
                spec.kind = FmtKind::Float;
                spec.fullwidth = true;
                target == FormatType::Float
            }
            's' => {
                spec.kind = FmtKind::String;
                target == FormatType::String
            }
            'c' => {
                spec.kind = FmtKind::Char;
                target.is_integer()
            }
            'b' => {
                spec.kind = FmtKind::Bool;
                target.is_integer()
            }
            '0' => {
                spec.zero_pad = true;
                chars.next();
                continue;
            }
            '1'..='9' => {
                spec.padding = read_number(&mut chars);
                continue;
            }
            '.' => {
                chars.next();
                spec.precision = read_number(&mut chars);
                continue;
            }
            _ => {
                warn!(spec = &fmt[at..], "invalid format specifier");
                return None;
            }
        };
        if !matched {
            warn!(spec = &fmt[at..], ?target, "format specifier does not match operand type");
            return None;
        }
        return Some((spec, at + 1 + i + c.len_utf8()));
    }
}

fn render(spec: &FmtSpec, arg: Value, heap: &Heap) -> Result<(String, bool), crate::error::VmError> {
    match spec.kind {
        FmtKind::Int => Ok((
            strings::int_to_string(arg.as_int(), spec.padding, spec.zero_pad, spec.fullwidth),
            false,
        )),
        FmtKind::Float => Ok((
            strings::float_to_string(
                arg.as_float(),
                spec.padding,
                spec.zero_pad,
                spec.precision,
                spec.fullwidth,
            ),
            false,
        )),
        FmtKind::String => {
            let s = heap.string(arg.as_int())?;
            let pad = spec.padding.saturating_sub(s.chars().count());
            Ok((format!("{}{}", " ".repeat(pad), s), true))
        }
        FmtKind::Char => {
            let mut out = String::new();
            strings::push_back_char(&mut out, arg.as_int());
            Ok((out, false))
        }
        FmtKind::Bool => Ok(((if arg.as_bool() { "true" } else { "false" }).to_owned(), false)),
    }
}

/// Splice `arg` into the first matching `%` slot of `fmt`.
///
/// Returns the formatted string and whether a string operand was
/// consumed (the caller releases its slot). A format string without a
/// usable specifier is returned unchanged.
pub fn string_format(
    heap: &Heap,
    fmt: &str,
    arg: Value,
    ty: FormatType,
) -> Result<(String, bool), crate::error::VmError> {
    let mut search = 0;
    while let Some(off) = fmt[search..].find('%') {
        let at = search + off;
        if let Some((spec, rest)) = parse_spec(fmt, at, ty) {
            let (rendered, consumed) = render(&spec, arg, heap)?;
            return Ok((format!("{}{}{}", &fmt[..at], rendered, &fmt[rest..]), consumed));
        }
        search = at + 1;
    }
    Ok((fmt.to_owned(), false))
}
