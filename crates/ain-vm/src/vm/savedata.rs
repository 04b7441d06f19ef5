// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Globals snapshots.
//!
//! A snapshot carries a version tag, the user's key, an optional group
//! name, and one entry per exported global (name, declared type, value).
//! Strings, struct records, keyvals and arrays are deduplicated into
//! index tables; a value field holds either a raw scalar or an index
//! into the table its type selects. Loads resolve globals by name,
//! type-check them, and replace values without running destructors for
//! the objects they displace. Malformed data is a warning plus a failure
//! indicator, never a machine fault.

use std::fs;

use ain_image::DataType;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Exec, VmError};
use crate::page::{self, Page};
use crate::value::Value;
use crate::vm::Vm;

/// Snapshot format version.
const GLOBALS_SAVE_VERSION: i32 = 7;

#[derive(Debug, Default, Serialize, Deserialize)]
struct GlobalsSave {
    version: i32,
    key: String,
    #[serde(default)]
    group: String,
    globals: Vec<GlobalRecord>,
    strings: Vec<String>,
    records: Vec<RecordEntry>,
    keyvals: Vec<KeyVal>,
    arrays: Vec<ArrayEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GlobalRecord {
    name: String,
    #[serde(rename = "type")]
    data_type: i32,
    value: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordEntry {
    #[serde(rename = "struct")]
    struct_name: String,
    /// Indices into the keyval table, one per member.
    members: Vec<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyVal {
    name: String,
    #[serde(rename = "type")]
    data_type: i32,
    value: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArrayEntry {
    /// -1 marks an unallocated array.
    rank: i32,
    /// Outermost dimension first.
    dimensions: Vec<i32>,
    /// Rank-1 leaf pages in traversal order.
    flat: Vec<FlatArray>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FlatArray {
    #[serde(rename = "type")]
    data_type: i32,
    values: Vec<i32>,
}

impl GlobalsSave {
    fn add_string(&mut self, s: &str) -> i32 {
        if let Some(i) = self.strings.iter().position(|x| x == s) {
            return i as i32;
        }
        self.strings.push(s.to_owned());
        self.strings.len() as i32 - 1
    }
}

impl Vm {
    fn add_value_to_save(
        &self,
        ty: DataType,
        struct_type: i32,
        v: Value,
        save: &mut GlobalsSave,
    ) -> Result<i32, VmError> {
        match ty {
            DataType::String => Ok(save.add_string(self.heap.string(v.as_int())?)),
            DataType::Struct => {
                let slot = v.as_int();
                let p = self.heap.expect_page(slot)?;
                let st = &self.image.structures[struct_type as usize];
                let mut members = Vec::with_capacity(st.members.len());
                for i in 0..p.nr_vars() {
                    let member = &self.image.structures[struct_type as usize].members[i];
                    let value =
                        self.add_value_to_save(member.ty.data, member.ty.struc, p.get(i), save)?;
                    save.keyvals.push(KeyVal {
                        name: member.name.clone(),
                        data_type: member.ty.data.into(),
                        value,
                    });
                    members.push(save.keyvals.len() as i32 - 1);
                }
                save.records.push(RecordEntry {
                    struct_name: self.image.structures[struct_type as usize].name.clone(),
                    members,
                });
                Ok(save.records.len() as i32 - 1)
            }
            ty if ty.is_array() => {
                let slot = v.as_int();
                let Some(p) = self.heap.page(slot)? else {
                    save.arrays.push(ArrayEntry { rank: -1, dimensions: Vec::new(), flat: Vec::new() });
                    return Ok(save.arrays.len() as i32 - 1);
                };
                let rank = p.array_rank();
                let mut dimensions = Vec::with_capacity(rank as usize);
                let mut walk = p;
                loop {
                    dimensions.push(walk.nr_vars() as i32);
                    if walk.array_rank() <= 1 {
                        break;
                    }
                    walk = self.heap.expect_page(walk.get(0).as_int())?;
                }
                let mut flat = Vec::new();
                self.collect_flat_arrays(p, struct_type, &mut flat, save)?;
                save.arrays.push(ArrayEntry { rank, dimensions, flat });
                Ok(save.arrays.len() as i32 - 1)
            }
            ty if ty.is_ref() => Ok(-1),
            _ => Ok(v.as_int()),
        }
    }

    fn collect_flat_arrays(
        &self,
        page: &Page,
        struct_type: i32,
        flat: &mut Vec<FlatArray>,
        save: &mut GlobalsSave,
    ) -> Result<(), VmError> {
        if page.array_rank() > 1 {
            for i in 0..page.nr_vars() {
                let child = self.heap.expect_page(page.get(i).as_int())?;
                self.collect_flat_arrays(child, struct_type, flat, save)?;
            }
            return Ok(());
        }
        let elem = page.variable_type(&self.image, 0).data;
        let mut values = Vec::with_capacity(page.nr_vars());
        for i in 0..page.nr_vars() {
            values.push(self.add_value_to_save(elem, struct_type, page.get(i), save)?);
        }
        flat.push(FlatArray { data_type: elem.into(), values });
        Ok(())
    }

    /// Write a globals snapshot, optionally filtered to one save group.
    /// Returns (success, number of globals written).
    pub(crate) fn save_globals(
        &mut self,
        key: &str,
        filename: &str,
        group: Option<&str>,
    ) -> Exec<(i32, i32)> {
        let group_index = match group {
            Some(name) => match self.image.group_by_name(name) {
                Some(i) => Some(i as i32),
                None => {
                    warn!(group = name, "unregistered global group");
                    return Ok((0, 0));
                }
            },
            None => None,
        };

        let mut save = GlobalsSave {
            version: GLOBALS_SAVE_VERSION,
            key: key.to_owned(),
            group: group.unwrap_or("").to_owned(),
            ..GlobalsSave::default()
        };

        let mut count = 0;
        for i in 0..self.image.globals.len() {
            let g = &self.image.globals[i];
            if group_index.is_some_and(|gi| g.group != gi) {
                continue;
            }
            let (name, ty) = (g.name.clone(), g.ty);
            let value = self.global_get(i)?;
            let value = self.add_value_to_save(ty.data, ty.struc, value, &mut save)?;
            save.globals.push(GlobalRecord { name, data_type: ty.data.into(), value });
            count += 1;
        }

        let json = serde_json::to_string_pretty(&save)
            .map_err(|e| VmError::SaveData(e.to_string()))?;
        let path = self.config.save_dir.join(filename);
        match fs::write(&path, json) {
            Ok(()) => Ok((1, count)),
            Err(e) => {
                warn!(path = %path.display(), "failed to write save file: {e}");
                Ok((0, 0))
            }
        }
    }

    fn save_to_value(
        &mut self,
        save: &GlobalsSave,
        ty: DataType,
        struct_type: i32,
        rank: i32,
        value: i32,
    ) -> Exec<Value> {
        match ty {
            DataType::String => {
                let s = save
                    .strings
                    .get(value as usize)
                    .ok_or_else(|| VmError::SaveData("bad string index".to_owned()))?
                    .clone();
                Ok(Value::int(self.heap.alloc_string_slot(s)))
            }
            DataType::Struct => {
                let record = save
                    .records
                    .get(value as usize)
                    .ok_or_else(|| VmError::SaveData("bad record index".to_owned()))?;
                let st = &self.image.structures[struct_type as usize];
                if record.struct_name != st.name {
                    return Err(VmError::SaveData("structure name mismatch".to_owned()).into());
                }
                let member_indices = record.members.clone();
                let slot = page::alloc_struct(&self.image, &mut self.heap, struct_type)?;
                for kv_index in member_indices {
                    let kv = save
                        .keyvals
                        .get(kv_index as usize)
                        .ok_or_else(|| VmError::SaveData("bad keyval index".to_owned()))?;
                    let Some(member_no) = self.image.structures[struct_type as usize]
                        .members
                        .iter()
                        .position(|m| m.name == kv.name)
                    else {
                        warn!(member = %kv.name, "structure has no such member");
                        continue;
                    };
                    let mty = self.image.structures[struct_type as usize].members[member_no].ty;
                    if i32::from(mty.data) != kv.data_type {
                        return Err(
                            VmError::SaveData("structure member type mismatch".to_owned()).into()
                        );
                    }
                    let kv_value = kv.value;
                    let v = self.save_to_value(save, mty.data, mty.struc, mty.rank, kv_value)?;
                    if let Some(p) = self.heap.page_mut(slot)? {
                        p.set(member_no, v);
                    }
                }
                Ok(Value::int(slot))
            }
            ty if ty.is_array() => {
                let entry = save
                    .arrays
                    .get(value as usize)
                    .ok_or_else(|| VmError::SaveData("bad array index".to_owned()))?;
                if entry.rank == -1 {
                    return Ok(Value::int(self.heap.alloc_page_slot(None)));
                }
                if entry.rank != rank {
                    return Err(VmError::SaveData("array rank mismatch".to_owned()).into());
                }
                let dims = entry.dimensions.clone();
                let built = self.alloc_array(rank, &dims, ty, struct_type, false)?;
                let slot = self.heap.alloc_page_slot(built);
                let mut cursor = 0;
                self.fill_flat_arrays(save, slot, struct_type, value, &mut cursor)?;
                Ok(Value::int(slot))
            }
            ty if ty.is_ref() => Ok(Value::int(-1)),
            _ => Ok(Value::int(value)),
        }
    }

    fn fill_flat_arrays(
        &mut self,
        save: &GlobalsSave,
        slot: i32,
        struct_type: i32,
        array_index: i32,
        cursor: &mut usize,
    ) -> Exec<()> {
        let Some(p) = self.heap.page(slot)? else { return Ok(()) };
        if p.array_rank() > 1 {
            let children: Vec<i32> = p.values().iter().map(|v| Value::as_int(*v)).collect();
            for child in children {
                self.fill_flat_arrays(save, child, struct_type, array_index, cursor)?;
            }
            return Ok(());
        }
        let elem = p.variable_type(&self.image, 0).data;
        let nr_vars = p.nr_vars();
        let flat = save.arrays[array_index as usize]
            .flat
            .get(*cursor)
            .ok_or_else(|| VmError::SaveData("missing flat array".to_owned()))?;
        if flat.values.len() != nr_vars {
            return Err(VmError::SaveData("unexpected number of array elements".to_owned()).into());
        }
        if flat.data_type != i32::from(elem) {
            return Err(VmError::SaveData("unexpected array element type".to_owned()).into());
        }
        let values = flat.values.clone();
        *cursor += 1;
        for (i, raw) in values.into_iter().enumerate() {
            let old = self.heap.expect_page(slot)?.get(i);
            let v = self.save_to_value(save, elem, struct_type, 0, raw)?;
            if let Some(p) = self.heap.page_mut(slot)? {
                p.set(i, v);
            }
            // the freshly initialized element is displaced without
            // running destructors
            self.variable_fini(old, elem, false)?;
        }
        Ok(())
    }

    /// Load a globals snapshot. Malformed data or a key/group mismatch
    /// is reported and the failure indicator returned; the machine state
    /// survives partial loads. Returns (success, number loaded).
    pub(crate) fn load_globals(
        &mut self,
        key: &str,
        filename: &str,
        group: Option<&str>,
    ) -> Exec<(i32, i32)> {
        match self.try_load_globals(key, filename, group) {
            Ok(n) => Ok((1, n)),
            Err(crate::error::Signal::Fault(VmError::SaveData(msg))) => {
                warn!(filename, "invalid save data: {msg}");
                Ok((0, 0))
            }
            Err(crate::error::Signal::Fault(VmError::SaveIo(e))) => {
                warn!(filename, "failed to read save file: {e}");
                Ok((0, 0))
            }
            Err(crate::error::Signal::Fault(VmError::SaveKeyMismatch)) => {
                warn!(filename, "save data key mismatch");
                Ok((0, 0))
            }
            Err(other) => Err(other),
        }
    }

    fn try_load_globals(
        &mut self,
        key: &str,
        filename: &str,
        group: Option<&str>,
    ) -> Exec<i32> {
        let path = self.config.save_dir.join(filename);
        let text = fs::read_to_string(&path).map_err(VmError::SaveIo)?;
        let save: GlobalsSave =
            serde_json::from_str(&text).map_err(|e| VmError::SaveData(e.to_string()))?;

        if save.key != key {
            return Err(VmError::SaveKeyMismatch.into());
        }
        if save.group != group.unwrap_or("") {
            return Err(VmError::SaveData("wrong group name".to_owned()).into());
        }

        let mut n = 0;
        for i in 0..save.globals.len() {
            let (name, data_type, value) = {
                let g = &save.globals[i];
                (g.name.clone(), g.data_type, g.value)
            };
            let Some(global_index) = self.image.global_by_name(&name) else {
                warn!(global = %name, "invalid global name");
                return Err(VmError::SaveData(format!("unknown global: {name}")).into());
            };
            let ty = self.image.globals[global_index].ty;
            if i32::from(ty.data) != data_type {
                return Err(VmError::SaveData(format!("{name}: type mismatch")).into());
            }
            let v = self.save_to_value(&save, ty.data, ty.struc, ty.rank, value)?;
            // destructors for displaced objects are not called
            self.global_set(global_index, v, false)?;
            n += 1;
        }
        Ok(n)
    }
}
