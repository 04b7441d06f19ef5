// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Array operations.
//!
//! A rank-1 array page stores elements directly; higher ranks store slot
//! indices of sub-array pages. Operations that restructure a page detach
//! it from its slot, work on it, and re-attach it; element finalization
//! is deferred until the page is back in place so destructors re-entering
//! the dispatcher see a consistent heap.

use ain_image::DataType;

use crate::error::{Exec, VmError};
use crate::heap::Heap;
use crate::page::{self, Page, PageKind};
use crate::value::Value;
use crate::vm::Vm;

/// Size of the `rank`-th dimension, following the page tree down.
pub(crate) fn array_numof(heap: &Heap, page: Option<&Page>, rank: i32) -> i32 {
    let Some(page) = page else { return 0 };
    if rank < 1 || rank > page.array_rank() {
        return 0;
    }
    if rank == 1 {
        return page.nr_vars() as i32;
    }
    let child = page.get(0).as_int();
    match heap.page(child) {
        Ok(sub) => array_numof(heap, sub, rank - 1),
        Err(_) => 0,
    }
}

impl Vm {
    /// Build an array page tree. `data_type` is the declared array type;
    /// `init_structs` runs element constructors for struct arrays.
    pub(crate) fn alloc_array(
        &mut self,
        rank: i32,
        dims: &[i32],
        data_type: DataType,
        struct_type: i32,
        init_structs: bool,
    ) -> Exec<Option<Page>> {
        if rank < 1 {
            return Ok(None);
        }
        let data_type = data_type.strip_array_ref();
        if !data_type.is_array() {
            return Err(VmError::Fatal("attempt to array-allocate non-array type".to_owned()).into());
        }
        let elem = data_type.element_type();
        let len = dims.first().copied().unwrap_or(0).max(0) as usize;
        let inner = dims.get(1..).unwrap_or(&[]);
        let mut page = Page::new(PageKind::Array { data_type, struct_type, rank }, len);
        for i in 0..len {
            let v = if rank == 1 {
                if elem == DataType::Struct && init_structs {
                    Value::int(self.create_struct(struct_type)?)
                } else {
                    page::variable_initval(&mut self.heap, elem)
                }
            } else {
                let child = self.alloc_array(rank - 1, inner, data_type, struct_type, init_structs)?;
                Value::int(self.heap.alloc_page_slot(child))
            };
            page.set(i, v);
        }
        Ok(Some(page))
    }

    /// Grow or shrink an array in place: new slots are initialized per
    /// type, dropped slots are finalized, and a zero total releases the
    /// page entirely.
    pub(crate) fn realloc_array(
        &mut self,
        src: Option<Page>,
        rank: i32,
        dims: &[i32],
        data_type: DataType,
        struct_type: i32,
        init_structs: bool,
    ) -> Exec<Option<Page>> {
        if rank < 1 {
            return Err(VmError::Fatal("tried to allocate 0-rank array".to_owned()).into());
        }
        let Some(mut page) = src else {
            if dims.first().copied().unwrap_or(0) == 0 {
                return Ok(None);
            }
            return self.alloc_array(rank, dims, data_type, struct_type, init_structs);
        };
        let PageKind::Array { rank: src_rank, .. } = page.kind else {
            return Err(VmError::Fatal("not an array".to_owned()).into());
        };
        if src_rank != rank {
            return Err(
                VmError::Fatal("attempt to reallocate array with different rank".to_owned()).into()
            );
        }

        let new_len = dims.first().copied().unwrap_or(0).max(0) as usize;
        let old_len = page.nr_vars();
        let data_type = data_type.strip_array_ref();
        let elem = data_type.element_type();
        // type of the cells being added or dropped
        let cell_type = if rank > 1 { data_type } else { elem };

        if new_len == 0 {
            for i in 0..old_len {
                self.variable_fini(page.get(i), cell_type, true)?;
            }
            return Ok(None);
        }

        if new_len < old_len {
            let dropped: Vec<Value> = page.values()[new_len..].to_vec();
            page.values_mut().truncate(new_len);
            for v in dropped {
                self.variable_fini(v, cell_type, true)?;
            }
        } else if new_len > old_len {
            page.values_mut().resize(new_len, Value::default());
            for i in old_len..new_len {
                let v = if rank == 1 {
                    if elem == DataType::Struct && init_structs {
                        Value::int(self.create_struct(struct_type)?)
                    } else {
                        page::variable_initval(&mut self.heap, elem)
                    }
                } else {
                    let inner = dims.get(1..).unwrap_or(&[]);
                    let child =
                        self.alloc_array(rank - 1, inner, data_type, struct_type, init_structs)?;
                    Value::int(self.heap.alloc_page_slot(child))
                };
                page.set(i, v);
            }
        }
        Ok(Some(page))
    }

    /// The `A_ALLOC` / `A_REALLOC` stack protocol: the rank on top, the
    /// dimensions beneath it, then the (page, varno) pair naming the
    /// array variable.
    pub(crate) fn op_array_alloc(&mut self, realloc: bool) -> Exec<()> {
        let rank = self.pop()?.as_int();
        if rank < 1 {
            return Err(VmError::Fatal(format!("invalid array rank: {rank}")).into());
        }
        let mut dims = Vec::with_capacity(rank as usize);
        for k in 0..rank as usize {
            dims.push(self.peek(rank as usize - 1 - k)?.as_int());
        }
        let varno = self.peek(rank as usize)?.as_int();
        let pageno = self.peek(rank as usize + 1)?.as_int();
        let (array, ty) = self.array_var(pageno, varno)?;

        let old = if realloc {
            self.heap.take_page(array)?
        } else {
            self.delete_page_storage(array)?;
            None
        };
        let new = self.realloc_array(old, rank, &dims, ty.data, ty.struc, true)?;
        self.heap.put_page(array, new);

        for _ in 0..rank + 2 {
            self.pop()?;
        }
        Ok(())
    }

    /// Element-type copy between rank-1 arrays; each element goes through
    /// the language's copy semantics.
    pub(crate) fn array_copy(
        &mut self,
        dst: i32,
        dst_i: i32,
        src: i32,
        src_i: i32,
        n: i32,
    ) -> Exec<()> {
        if n <= 0 {
            return Ok(());
        }
        let (src_vals, elem) = {
            let (Some(dst_page), Some(src_page)) = (self.heap.page(dst)?, self.heap.page(src)?)
            else {
                return Err(VmError::Fatal("array is NULL".to_owned()).into());
            };
            let (PageKind::Array { data_type: dt, rank: dr, .. }, PageKind::Array { data_type: st, rank: sr, .. }) =
                (dst_page.kind, src_page.kind)
            else {
                return Err(VmError::Fatal("not an array".to_owned()).into());
            };
            if dr != 1 || sr != 1 {
                return Err(
                    VmError::Fatal("tried to copy to/from a multi-dimensional array".to_owned())
                        .into(),
                );
            }
            if dt != st {
                return Err(VmError::Fatal("array types do not match".to_owned()).into());
            }
            let last = n - 1;
            if !dst_page.index_ok(dst_i)
                || !src_page.index_ok(src_i)
                || !dst_page.index_ok(dst_i + last)
                || !src_page.index_ok(src_i + last)
            {
                return Err(VmError::Fatal("out of bounds array access".to_owned()).into());
            }
            let vals: Vec<Value> =
                src_page.values()[src_i as usize..(src_i + n) as usize].to_vec();
            (vals, dt.element_type())
        };
        for (k, v) in src_vals.into_iter().enumerate() {
            let copied = page::vm_copy(&self.image, &mut self.heap, v, elem)?;
            self.variable_set_in(dst, dst_i as usize + k, elem, copied)?;
        }
        Ok(())
    }

    /// Fill `[i, i+n)` with copies of `v`, clamped to the array. The fill
    /// value itself is finalized afterwards. Returns the count written.
    pub(crate) fn array_fill(&mut self, array: i32, i: i32, n: i32, v: Value) -> Exec<i32> {
        let (start, count, elem) = {
            let Some(page) = self.heap.page(array)? else { return Ok(0) };
            let PageKind::Array { data_type, .. } = page.kind else {
                return Err(VmError::Fatal("not an array".to_owned()).into());
            };
            let mut start = i;
            let mut n = n;
            if start < 0 {
                n += start;
                start = 0;
            }
            if start >= page.nr_vars() as i32 {
                (0, 0, data_type.element_type())
            } else {
                if start + n >= page.nr_vars() as i32 {
                    n = page.nr_vars() as i32 - start;
                }
                (start, n.max(0), data_type.element_type())
            }
        };
        for k in 0..count {
            let copied = page::vm_copy(&self.image, &mut self.heap, v, elem)?;
            self.variable_set_in(array, (start + k) as usize, elem, copied)?;
        }
        self.variable_fini(v, elem, true)?;
        Ok(count)
    }

    /// Append one element; the value is moved in, not copied.
    pub(crate) fn array_pushback(
        &mut self,
        array: i32,
        v: Value,
        data_type: DataType,
        struct_type: i32,
    ) -> Exec<()> {
        let page = self.heap.take_page(array)?;
        let elem = data_type.strip_array_ref().element_type();
        match page {
            Some(p) => {
                let PageKind::Array { data_type: dt, struct_type: st, rank } = p.kind else {
                    return Err(VmError::Fatal("not an array".to_owned()).into());
                };
                if rank != 1 {
                    return Err(
                        VmError::Fatal("tried pushing to a multi-dimensional array".to_owned())
                            .into(),
                    );
                }
                let index = p.nr_vars();
                let dims = [index as i32 + 1];
                let grown = self.realloc_array(Some(p), 1, &dims, dt, st, false)?;
                self.heap.put_page(array, grown);
                self.variable_set_in(array, index, elem, v)?;
            }
            None => {
                let fresh = self.alloc_array(1, &[1], data_type, struct_type, false)?;
                self.heap.put_page(array, fresh);
                self.variable_set_in(array, 0, elem, v)?;
            }
        }
        Ok(())
    }

    /// Drop the last element.
    pub(crate) fn array_popback(&mut self, array: i32) -> Exec<()> {
        let Some(p) = self.heap.take_page(array)? else {
            return Ok(());
        };
        let PageKind::Array { data_type, struct_type, rank } = p.kind else {
            return Err(VmError::Fatal("not an array".to_owned()).into());
        };
        if rank != 1 {
            return Err(
                VmError::Fatal("tried popping from a multi-dimensional array".to_owned()).into()
            );
        }
        let dims = [p.nr_vars() as i32 - 1];
        let shrunk = self.realloc_array(Some(p), 1, &dims, data_type, struct_type, false)?;
        self.heap.put_page(array, shrunk);
        Ok(())
    }

    /// Erase element `i`. Erasing the last element releases the page and
    /// still reports success; out-of-range indices report failure.
    pub(crate) fn array_erase(&mut self, array: i32, i: i32) -> Exec<bool> {
        let Some(mut p) = self.heap.take_page(array)? else {
            return Ok(false);
        };
        let PageKind::Array { data_type, rank, .. } = p.kind else {
            return Err(VmError::Fatal("not an array".to_owned()).into());
        };
        if rank != 1 {
            return Err(
                VmError::Fatal("tried erasing from a multi-dimensional array".to_owned()).into()
            );
        }
        if !p.index_ok(i) {
            self.heap.put_page(array, Some(p));
            return Ok(false);
        }
        let elem = data_type.element_type();
        let erased = p.get(i as usize);
        if p.nr_vars() == 1 {
            // page becomes empty: release the storage entirely
            self.heap.put_page(array, None);
        } else {
            p.values_mut().remove(i as usize);
            self.heap.put_page(array, Some(p));
        }
        self.variable_fini(erased, elem, true)?;
        Ok(true)
    }

    /// Insert `v` at `i`, clamped into `[0, nr_vars - 1]`. Inserting at
    /// the end is unrepresentable here; that is what pushback is for.
    pub(crate) fn array_insert(
        &mut self,
        array: i32,
        i: i32,
        v: Value,
        data_type: DataType,
        struct_type: i32,
    ) -> Exec<()> {
        let Some(mut p) = self.heap.take_page(array)? else {
            self.heap.put_page(array, None);
            return self.array_pushback(array, v, data_type, struct_type);
        };
        let PageKind::Array { rank, .. } = p.kind else {
            return Err(VmError::Fatal("not an array".to_owned()).into());
        };
        if rank != 1 {
            return Err(
                VmError::Fatal("tried inserting into a multi-dimensional array".to_owned()).into()
            );
        }
        let at = i.clamp(0, p.nr_vars() as i32 - 1) as usize;
        p.values_mut().insert(at, v);
        self.heap.put_page(array, Some(p));
        Ok(())
    }

    /// Stable sort. Without a comparator, natural order for int, long,
    /// float and string elements; with one, the bytecode function decides
    /// and equal elements keep their original order.
    pub(crate) fn array_sort(&mut self, array: i32, compare_fno: i32) -> Exec<()> {
        let Some(mut p) = self.heap.take_page(array)? else {
            return Ok(());
        };
        if compare_fno != 0 {
            let mut keyed: Vec<(Value, usize)> =
                p.values().iter().copied().zip(0..).collect();
            let sorted = self.sort_by_bytecode(&mut keyed, compare_fno);
            if sorted.is_ok() {
                for (i, (v, _)) in keyed.into_iter().enumerate() {
                    p.set(i, v);
                }
            }
            self.heap.put_page(array, Some(p));
            return sorted;
        }
        let PageKind::Array { data_type, .. } = p.kind else {
            self.heap.put_page(array, Some(p));
            return Err(VmError::Fatal("not an array".to_owned()).into());
        };
        match data_type {
            DataType::ArrayInt | DataType::ArrayLongInt => {
                p.values_mut().sort_by_key(|v| Value::as_int(*v));
            }
            DataType::ArrayFloat => {
                p.values_mut().sort_by(|a, b| {
                    a.as_float().partial_cmp(&b.as_float()).unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            DataType::ArrayString => {
                let heap = &self.heap;
                p.values_mut().sort_by(|a, b| {
                    let a = heap.string(a.as_int()).unwrap_or_default();
                    let b = heap.string(b.as_int()).unwrap_or_default();
                    a.cmp(b)
                });
            }
            other => {
                self.heap.put_page(array, Some(p));
                return Err(
                    VmError::Fatal(format!("A_SORT without comparator on {}", other.name())).into()
                );
            }
        }
        self.heap.put_page(array, Some(p));
        Ok(())
    }

    /// Merge sort driven by a bytecode comparator; ties break on the
    /// original index so the sort stays stable regardless of what the
    /// comparator answers.
    fn sort_by_bytecode(&mut self, items: &mut [(Value, usize)], fno: i32) -> Exec<()> {
        let len = items.len();
        if len <= 1 {
            return Ok(());
        }
        let mid = len / 2;
        {
            let (lo, hi) = items.split_at_mut(mid);
            self.sort_by_bytecode(lo, fno)?;
            self.sort_by_bytecode(hi, fno)?;
        }
        let mut merged = Vec::with_capacity(len);
        let (mut i, mut j) = (0, mid);
        while i < mid && j < len {
            let take_left = {
                let d = self.compare_by_bytecode(items[i].0, items[j].0, fno)?;
                if d != 0 { d < 0 } else { items[i].1 <= items[j].1 }
            };
            if take_left {
                merged.push(items[i]);
                i += 1;
            } else {
                merged.push(items[j]);
                j += 1;
            }
        }
        merged.extend_from_slice(&items[i..mid]);
        merged.extend_from_slice(&items[j..len]);
        items.copy_from_slice(&merged);
        Ok(())
    }

    /// Invoke the comparator with two elements; its integer result is a
    /// three-way compare.
    fn compare_by_bytecode(&mut self, a: Value, b: Value, fno: i32) -> Exec<i32> {
        self.push(a);
        self.push(b);
        self.call_function(fno, -1)?;
        self.pop().map(Value::as_int)
    }

    /// Stable sort of an array of structs by one member (int or string).
    pub(crate) fn array_sort_mem(&mut self, array: i32, member_no: i32) -> Exec<()> {
        let Some(p) = self.heap.take_page(array)? else {
            return Ok(());
        };
        let PageKind::Array { data_type, struct_type, .. } = p.kind else {
            self.heap.put_page(array, Some(p));
            return Err(VmError::Fatal("A_SORT_MEM on a non-array".to_owned()).into());
        };
        if data_type.element_type() != DataType::Struct {
            self.heap.put_page(array, Some(p));
            return Err(
                VmError::Fatal("A_SORT_MEM on something other than an array of structs".to_owned())
                    .into(),
            );
        }
        let members = &self.image.structures[struct_type as usize].members;
        let Some(member) = members.get(member_no as usize) else {
            self.heap.put_page(array, Some(p));
            return Err(VmError::Fatal("A_SORT_MEM with invalid member index".to_owned()).into());
        };
        let by_string = member.ty.data == DataType::String;

        let mut p = p;
        let heap = &self.heap;
        if by_string {
            p.values_mut().sort_by(|a, b| {
                let key = |v: &Value| {
                    heap.expect_page(v.as_int())
                        .ok()
                        .map(|page| page.get(member_no as usize).as_int())
                        .and_then(|slot| heap.string(slot).ok())
                        .unwrap_or_default()
                };
                key(a).cmp(key(b))
            });
        } else {
            p.values_mut().sort_by_key(|v| {
                heap.expect_page(v.as_int())
                    .map(|page| page.get(member_no as usize).as_int())
                    .unwrap_or(0)
            });
        }
        self.heap.put_page(array, Some(p));
        Ok(())
    }

    /// Linear scan over `[start, end)`. Without a comparator, strings
    /// compare by contents and everything else by raw value; with one,
    /// `fn(value, element)` nonzero is a match. Returns the index or -1.
    pub(crate) fn array_find(
        &mut self,
        array: i32,
        start: i32,
        end: i32,
        v: Value,
        compare_fno: i32,
    ) -> Exec<i32> {
        let Some(p) = self.heap.page(array)? else {
            return Ok(-1);
        };
        let start = start.max(0);
        let end = end.min(p.nr_vars() as i32);

        if compare_fno == 0 {
            let is_string = matches!(
                p.kind,
                PageKind::Array { data_type, .. } if data_type.element_type() == DataType::String
            );
            if is_string {
                let needle = self.heap.string(v.as_int())?;
                for i in start..end {
                    let slot = p.get(i as usize).as_int();
                    if self.heap.string(slot)? == needle {
                        return Ok(i);
                    }
                }
            } else {
                for i in start..end {
                    if p.get(i as usize) == v {
                        return Ok(i);
                    }
                }
            }
            return Ok(-1);
        }

        let elems: Vec<Value> =
            p.values().iter().copied().skip(start.max(0) as usize).take((end - start).max(0) as usize).collect();
        for (k, elem) in elems.into_iter().enumerate() {
            self.push(v);
            self.push(elem);
            self.call_function(compare_fno, -1)?;
            if self.pop()?.as_int() != 0 {
                return Ok(start + k as i32);
            }
        }
        Ok(-1)
    }
}
