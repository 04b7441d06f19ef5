// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! The external-call bridge.
//!
//! Images declare native libraries by name; hosts register
//! implementations in a [`HostLibrary`] registry. At VM construction
//! every declared function is resolved against the registry and its
//! argument-marshalling descriptor is derived from the declared types.
//! Unresolved libraries and functions are logged; they become fatal only
//! if bytecode actually calls them.


use ain_image::{DataType, Image};
use tracing::warn;

use crate::error::VmError;
use crate::heap::Heap;
use crate::page::Page;
use crate::platform::Host;
use crate::value::Value;

/// A marshalled argument, popped off the operand stack.
///
/// Slot-carrying variants are resolved through the [`HostContext`];
/// the callee never owns the referenced storage.
#[derive(Debug, Clone, Copy)]
pub enum HostArg {
    /// Value types: the raw 32-bit word.
    Word(Value),
    /// `string`: slot whose buffer the callee may read.
    String(i32),
    /// `struct` / `array`: slot whose page the callee may read.
    Page(i32),
    /// `ref int/bool/long/float`: a writable cell inside a page.
    RefScalar { page: i32, index: i32 },
    /// `ref string`: slot whose buffer the callee may replace.
    RefString(i32),
    /// `ref struct` / `ref array`: slot whose page the callee may replace.
    RefPage(i32),
}

/// A native function's return value.
#[derive(Debug)]
pub enum HostValue {
    Void,
    /// Pushed verbatim.
    Word(Value),
    /// Wrapped in a freshly allocated string slot and pushed.
    String(String),
}

/// What a native function sees of the machine.
pub struct HostContext<'a> {
    pub image: &'a Image,
    pub heap: &'a mut Heap,
    pub host: &'a mut dyn Host,
}

impl HostContext<'_> {
    /// Resolve a `String` or `RefString` argument to its buffer.
    pub fn string(&self, arg: HostArg) -> Result<&str, VmError> {
        match arg {
            HostArg::String(slot) | HostArg::RefString(slot) => self.heap.string(slot),
            _ => Err(VmError::Fatal("argument is not a string".to_owned())),
        }
    }

    /// Replace the buffer behind a `RefString` argument.
    pub fn string_assign(&mut self, arg: HostArg, contents: &str) -> Result<(), VmError> {
        match arg {
            HostArg::RefString(slot) => self.heap.string_assign(slot, contents),
            _ => Err(VmError::Fatal("argument is not a ref string".to_owned())),
        }
    }

    /// Resolve a `Page` or `RefPage` argument.
    pub fn page(&self, arg: HostArg) -> Result<Option<&Page>, VmError> {
        match arg {
            HostArg::Page(slot) | HostArg::RefPage(slot) => self.heap.page(slot),
            _ => Err(VmError::Fatal("argument is not a page".to_owned())),
        }
    }

    /// Read through a `RefScalar` argument.
    pub fn deref(&self, arg: HostArg) -> Result<Value, VmError> {
        match arg {
            HostArg::RefScalar { page, index } => {
                Ok(self.heap.expect_page(page)?.get(index as usize))
            }
            _ => Err(VmError::Fatal("argument is not a ref scalar".to_owned())),
        }
    }

    /// Write through a `RefScalar` argument.
    pub fn assign(&mut self, arg: HostArg, v: Value) -> Result<(), VmError> {
        match arg {
            HostArg::RefScalar { page, index } => {
                match self.heap.page_mut(page)? {
                    Some(p) if p.index_ok(index) => {
                        p.set(index as usize, v);
                        Ok(())
                    }
                    _ => Err(VmError::PageIndexOutOfBounds { slot: page, index }),
                }
            }
            _ => Err(VmError::Fatal("argument is not a ref scalar".to_owned())),
        }
    }
}

/// A native function implementation.
pub type NativeFn = fn(&mut HostContext<'_>, &[HostArg]) -> HostValue;

/// A host-side library: a name and its named functions.
#[derive(Debug, Clone, Copy)]
pub struct HostLibrary {
    pub name: &'static str,
    pub functions: &'static [(&'static str, NativeFn)],
}

/// How one declared argument marshals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgClass {
    Word,
    Str,
    Page,
    RefScalar,
    RefStr,
    RefPage,
}

impl ArgClass {
    pub(crate) fn of(ty: DataType) -> Self {
        match ty {
            DataType::RefInt | DataType::RefLongInt | DataType::RefBool | DataType::RefFloat => {
                Self::RefScalar
            }
            DataType::String => Self::Str,
            DataType::RefString => Self::RefStr,
            DataType::Struct => Self::Page,
            DataType::RefStruct => Self::RefPage,
            ty if ty.is_array() => Self::Page,
            ty if ty.is_ref() => Self::RefPage,
            _ => Self::Word,
        }
    }

    /// Reference-typed arguments did not gain a reference count on entry,
    /// so they are not finalized after the call.
    pub(crate) const fn finalized(self) -> bool {
        matches!(self, Self::Word | Self::Str | Self::Page)
    }
}

/// One resolved library function.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedFunction {
    pub fun: NativeFn,
    /// Marshalling class and declared type per argument, in order.
    pub args: Vec<(ArgClass, DataType)>,
    pub returns_string: bool,
    pub returns_void: bool,
}

/// Resolution results for every library in the image.
#[derive(Debug, Default)]
pub(crate) struct Bridge {
    libraries: Vec<Option<Vec<Option<ResolvedFunction>>>>,
}

impl Bridge {
    /// Resolve every declared library function against the registry.
    pub fn link(image: &Image, registry: &[HostLibrary]) -> Self {
        let mut libraries = Vec::with_capacity(image.libraries.len());
        for lib in &image.libraries {
            let Some(host_lib) = registry.iter().find(|l| l.name == lib.name) else {
                warn!(library = %lib.name, "unimplemented library");
                libraries.push(None);
                continue;
            };
            let mut functions = Vec::with_capacity(lib.functions.len());
            for f in &lib.functions {
                let resolved = host_lib
                    .functions
                    .iter()
                    .find(|(name, _)| *name == f.name)
                    .map(|&(_, fun)| ResolvedFunction {
                        fun,
                        args: f
                            .arguments
                            .iter()
                            .map(|a| (ArgClass::of(a.ty.data), a.ty.data))
                            .collect(),
                        returns_string: f.return_type.data == DataType::String,
                        returns_void: f.return_type.data == DataType::Void,
                    });
                functions.push(resolved);
            }
            libraries.push(Some(functions));
        }
        Self { libraries }
    }

    /// The resolved function, if the library and function both linked.
    pub fn get(&self, libno: i32, fno: i32) -> Option<&ResolvedFunction> {
        self.libraries
            .get(usize::try_from(libno).ok()?)?
            .as_ref()?
            .get(usize::try_from(fno).ok()?)?
            .as_ref()
    }

    /// True when the library resolved at all.
    pub fn library_exists(&self, libno: i32) -> bool {
        usize::try_from(libno)
            .ok()
            .and_then(|i| self.libraries.get(i))
            .is_some_and(Option::is_some)
    }
}
