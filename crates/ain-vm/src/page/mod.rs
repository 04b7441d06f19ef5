// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Pages: ordered collections of value cells.
//!
//! Pages implement global and local variables, structures, arrays and
//! delegates:
//!
//! - Global variables all live in a single global page (heap slot 0).
//! - Each function invocation is backed by a page storing its locals.
//! - Each struct object is backed by a page storing its members.
//! - Each array object is backed by a page storing its elements.
//!   Multi-dimensional arrays are a tree of pages (the array is NOT
//!   contiguous); a rank-r page stores slot indices of rank-(r-1) pages.
//! - Each delegate object is backed by a page storing (object, function,
//!   seq) triples.

#[cfg(test)]
mod page_test;

use ain_image::{DataType, Image, Type};

use crate::error::VmError;
use crate::heap::Heap;
use crate::value::Value;

/// What a page implements, with the metadata each kind carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Global,
    Local {
        /// Function index of the call this page backs.
        function: i32,
        /// Struct page of the enclosing method call, or -1.
        struct_ptr: i32,
    },
    Struct {
        struct_type: i32,
    },
    Array {
        /// Declared array type (e.g. `array@string`), not the element type.
        data_type: DataType,
        /// Element struct type for struct arrays, or -1.
        struct_type: i32,
        rank: i32,
    },
    Delegate,
}

impl PageKind {
    /// Kind name for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Global => "GLOBAL_PAGE",
            Self::Local { .. } => "LOCAL_PAGE",
            Self::Struct { .. } => "STRUCT_PAGE",
            Self::Array { .. } => "ARRAY_PAGE",
            Self::Delegate => "DELEGATE_PAGE",
        }
    }
}

/// An ordered collection of value cells plus its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub kind: PageKind,
    values: Vec<Value>,
}

impl Page {
    /// A zero-initialized page with `nr_vars` cells.
    #[must_use]
    pub fn new(kind: PageKind, nr_vars: usize) -> Self {
        Self { kind, values: vec![Value::default(); nr_vars] }
    }

    /// A page over existing cells (snapshot restore).
    #[must_use]
    pub fn from_values(kind: PageKind, values: Vec<Value>) -> Self {
        Self { kind, values }
    }

    #[inline]
    #[must_use]
    pub fn nr_vars(&self) -> usize {
        self.values.len()
    }

    /// True when `i` indexes a cell of this page.
    #[inline]
    #[must_use]
    pub fn index_ok(&self, i: i32) -> bool {
        i >= 0 && (i as usize) < self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, i: usize) -> Value {
        self.values[i]
    }

    #[inline]
    pub fn set(&mut self, i: usize, v: Value) {
        self.values[i] = v;
    }

    #[inline]
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut Vec<Value> {
        &mut self.values
    }

    /// Declared type of variable `varno`, resolved against the image.
    ///
    /// Array pages resolve to the element type at rank 1 and to the same
    /// array type with one rank stripped above that. Delegate entries are
    /// not reference counted, so delegate pages answer `Void`.
    #[must_use]
    pub fn variable_type(&self, image: &Image, varno: usize) -> Type {
        match self.kind {
            PageKind::Global => image.globals[varno].ty,
            PageKind::Local { function, .. } => image.functions[function as usize].vars[varno].ty,
            PageKind::Struct { struct_type } => {
                image.structures[struct_type as usize].members[varno].ty
            }
            PageKind::Array { data_type, struct_type, rank } => {
                if rank > 1 {
                    Type { data: data_type, struc: struct_type, rank: rank - 1 }
                } else {
                    Type { data: data_type.element_type(), struc: struct_type, rank: 0 }
                }
            }
            PageKind::Delegate => Type::new(DataType::Void),
        }
    }

    /// Array rank, or 0 for non-array pages.
    #[must_use]
    pub const fn array_rank(&self) -> i32 {
        match self.kind {
            PageKind::Array { rank, .. } => rank,
            _ => 0,
        }
    }

    // --- delegate triples ---

    /// Number of (object, function, seq) triples.
    #[must_use]
    pub fn delegate_len(&self) -> usize {
        self.values.len() / 3
    }

    /// Triple `i` as (object, function, seq).
    #[must_use]
    pub fn delegate_entry(&self, i: usize) -> (i32, i32, i32) {
        (
            self.values[i * 3].as_int(),
            self.values[i * 3 + 1].as_int(),
            self.values[i * 3 + 2].as_int(),
        )
    }

    /// Append a triple.
    pub fn delegate_push(&mut self, obj: i32, fun: i32, seq: i32) {
        self.values.push(Value::int(obj));
        self.values.push(Value::int(fun));
        self.values.push(Value::int(seq));
    }

    /// Remove triple `i`, shifting later triples down.
    pub fn delegate_remove(&mut self, i: usize) {
        self.values.drain(i * 3..i * 3 + 3);
    }
}

/// Initial value for a fresh variable of the given type.
///
/// Strings get a fresh empty-string slot; owned arrays and delegates get
/// a page slot with no page attached yet; structs and references start
/// unbound (-1); everything else is zero.
pub fn variable_initval(heap: &mut Heap, ty: DataType) -> Value {
    match ty {
        DataType::String => Value::int(heap.alloc_string_slot(String::new())),
        DataType::Struct => Value::int(-1),
        ty if ty.is_ref() => Value::int(-1),
        DataType::Delegate => Value::int(heap.alloc_page_slot(None)),
        ty if ty.is_array() => Value::int(heap.alloc_page_slot(None)),
        _ => Value::int(0),
    }
}

/// Copy one value cell per the language's copy semantics: strings,
/// structs, delegates and arrays copy deeply into fresh slots; references
/// gain a reference count; scalars copy bits.
pub fn vm_copy(image: &Image, heap: &mut Heap, v: Value, ty: DataType) -> Result<Value, VmError> {
    match ty {
        DataType::String => {
            let s = heap.string(v.as_int())?.to_owned();
            Ok(Value::int(heap.alloc_string_slot(s)))
        }
        DataType::Struct | DataType::Delegate => Ok(Value::int(copy_page_slot(image, heap, v.as_int())?)),
        ty if ty.is_array() => Ok(Value::int(copy_page_slot(image, heap, v.as_int())?)),
        ty if ty.is_ref() => {
            heap.add_ref(v.as_int());
            Ok(v)
        }
        _ => Ok(v),
    }
}

/// Recursively deep-copy a page.
pub fn copy_page(image: &Image, heap: &mut Heap, src: &Page) -> Result<Page, VmError> {
    let mut dst = Page::new(src.kind, src.nr_vars());
    for i in 0..src.nr_vars() {
        let ty = src.variable_type(image, i).data;
        let copied = vm_copy(image, heap, src.get(i), ty)?;
        dst.set(i, copied);
    }
    Ok(dst)
}

/// Deep-copy the page held by `slot` into a fresh slot.
pub fn copy_page_slot(image: &Image, heap: &mut Heap, slot: i32) -> Result<i32, VmError> {
    let page = heap.take_page(slot)?;
    let copy = match &page {
        Some(p) => copy_page(image, heap, p).map(Some),
        None => Ok(None),
    };
    heap.put_page(slot, page);
    Ok(heap.alloc_page_slot(copy?))
}

/// Allocate storage for a struct object, recursively allocating struct
/// members. Constructors are NOT run here; see the runtime's
/// `init_struct`.
pub fn alloc_struct(image: &Image, heap: &mut Heap, struct_no: i32) -> Result<i32, VmError> {
    let slot = heap.alloc_page_slot(None);
    let def = &image.structures[struct_no as usize];
    let mut page = Page::new(PageKind::Struct { struct_type: struct_no }, def.members.len());
    for i in 0..def.members.len() {
        let member = &image.structures[struct_no as usize].members[i];
        let v = if member.ty.data == DataType::Struct {
            Value::int(alloc_struct(image, heap, member.ty.struc)?)
        } else {
            variable_initval(heap, member.ty.data)
        };
        page.set(i, v);
    }
    heap.put_page(slot, Some(page));
    Ok(slot)
}
