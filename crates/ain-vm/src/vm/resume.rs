// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Resume snapshots: the full live machine state as JSON.
//!
//! A snapshot carries the heap (per slot: ref count, generation tag and
//! contents), the call stack, the operand stack and the instruction
//! pointer, under a user-chosen key. The key must match on load;
//! a mismatch is fatal. Generation tags are restored so delegate
//! liveness survives the round trip.

use std::fs;
use std::path::PathBuf;

use ain_image::DataType;
use serde::{Deserialize, Serialize};

use crate::error::{Exec, VmError};
use crate::heap::HeapObject;
use crate::page::{Page, PageKind};
use crate::value::Value;
use crate::vm::{Frame, Vm};

#[derive(Debug, Serialize, Deserialize)]
struct ResumeImage {
    key: String,
    #[serde(default)]
    comments: Vec<String>,
    heap: Vec<HeapEntry>,
    #[serde(rename = "call-stack")]
    call_stack: Vec<FrameRecord>,
    stack: Vec<Value>,
    ip: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct HeapEntry {
    slot: i32,
    #[serde(rename = "ref")]
    ref_count: i32,
    seq: u32,
    #[serde(flatten)]
    object: ObjectRecord,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
enum ObjectRecord {
    String(String),
    Page(PageRecord),
    /// A live page slot with no page attached (empty array or delegate).
    EmptyPage,
}

#[derive(Debug, Serialize, Deserialize)]
struct PageRecord {
    #[serde(rename = "type")]
    page_type: String,
    /// Function index, struct type, or raw array data type per kind.
    subtype: i32,
    #[serde(rename = "struct-type", default)]
    struct_type: i32,
    #[serde(default)]
    rank: i32,
    #[serde(rename = "struct-ptr", default)]
    struct_ptr: i32,
    values: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FrameRecord {
    function: i32,
    #[serde(rename = "return-address")]
    return_address: u32,
    #[serde(rename = "local-page")]
    local_page: i32,
    #[serde(rename = "struct-page")]
    struct_page: i32,
}

fn page_to_record(page: &Page) -> PageRecord {
    let (page_type, subtype, struct_type, rank, struct_ptr) = match page.kind {
        PageKind::Global => ("globals", 0, -1, 0, -1),
        PageKind::Local { function, struct_ptr } => ("locals", function, -1, 0, struct_ptr),
        PageKind::Struct { struct_type } => ("struct", struct_type, -1, 0, -1),
        PageKind::Array { data_type, struct_type, rank } => {
            ("array", i32::from(data_type), struct_type, rank, -1)
        }
        PageKind::Delegate => ("delegate", 0, -1, 0, -1),
    };
    PageRecord {
        page_type: page_type.to_owned(),
        subtype,
        struct_type,
        rank,
        struct_ptr,
        values: page.values().to_vec(),
    }
}

fn record_to_page(record: PageRecord) -> Result<Page, VmError> {
    let kind = match record.page_type.as_str() {
        "globals" => PageKind::Global,
        "locals" => PageKind::Local { function: record.subtype, struct_ptr: record.struct_ptr },
        "struct" => PageKind::Struct { struct_type: record.subtype },
        "array" => PageKind::Array {
            data_type: DataType::try_from(record.subtype)
                .map_err(|_| VmError::SaveData(format!("bad array type: {}", record.subtype)))?,
            struct_type: record.struct_type,
            rank: record.rank,
        },
        "delegate" => PageKind::Delegate,
        other => return Err(VmError::SaveData(format!("invalid page type: {other}"))),
    };
    Ok(Page::from_values(kind, record.values))
}

impl Vm {
    fn save_path(&self, filename: &str) -> PathBuf {
        self.config.save_dir.join(filename)
    }

    fn snapshot(&self, key: &str, comments: Vec<String>) -> ResumeImage {
        let heap = self
            .heap
            .entries()
            .map(|(slot, ref_count, seq, obj)| HeapEntry {
                slot,
                ref_count,
                seq,
                object: match obj {
                    HeapObject::String(s) => ObjectRecord::String(s.clone()),
                    HeapObject::Page(Some(p)) => ObjectRecord::Page(page_to_record(p)),
                    HeapObject::Page(None) => ObjectRecord::EmptyPage,
                },
            })
            .collect();
        let call_stack = self
            .call_stack
            .iter()
            .map(|f| FrameRecord {
                function: f.function,
                return_address: f.return_address,
                local_page: f.page_slot,
                struct_page: f.struct_page,
            })
            .collect();
        ResumeImage {
            key: key.to_owned(),
            comments,
            heap,
            call_stack,
            stack: self.stack.clone(),
            ip: self.ip,
        }
    }

    /// Write a resume snapshot of the complete machine state.
    pub fn save_resume(&self, key: &str, filename: &str) -> Result<(), VmError> {
        let image = self.snapshot(key, Vec::new());
        let json = serde_json::to_string_pretty(&image)
            .map_err(|e| VmError::SaveData(e.to_string()))?;
        fs::write(self.save_path(filename), json)?;
        Ok(())
    }

    fn read_snapshot(&self, key: &str, filename: &str) -> Result<ResumeImage, VmError> {
        let text = fs::read_to_string(self.save_path(filename))?;
        let image: ResumeImage =
            serde_json::from_str(&text).map_err(|e| VmError::SaveData(e.to_string()))?;
        if image.key != key {
            return Err(VmError::SaveKeyMismatch);
        }
        Ok(image)
    }

    /// Load a resume snapshot, replacing the heap, both stacks and the
    /// instruction pointer. A key mismatch is fatal.
    pub(crate) fn load_resume(&mut self, key: &str, filename: &str) -> Exec<()> {
        let image = self.read_snapshot(key, filename)?;

        let mut entries = Vec::with_capacity(image.heap.len());
        for e in image.heap {
            let obj = match e.object {
                ObjectRecord::String(s) => HeapObject::String(s),
                ObjectRecord::Page(record) => HeapObject::Page(Some(record_to_page(record)?)),
                ObjectRecord::EmptyPage => HeapObject::Page(None),
            };
            entries.push((e.slot, e.ref_count, e.seq, obj));
        }
        self.heap.restore(entries);

        self.call_stack = image
            .call_stack
            .into_iter()
            .map(|f| Frame {
                function: f.function,
                call_address: 0,
                return_address: f.return_address,
                page_slot: f.local_page,
                struct_page: f.struct_page,
            })
            .collect();
        self.stack = image.stack;
        self.ip = image.ip;
        Ok(())
    }

    /// Read the comment strings stored alongside a snapshot.
    pub(crate) fn load_resume_comments(
        &self,
        key: &str,
        filename: &str,
    ) -> Result<Vec<String>, VmError> {
        Ok(self.read_snapshot(key, filename)?.comments)
    }

    /// Rewrite the comment strings of an existing snapshot.
    pub(crate) fn save_resume_comments(
        &self,
        key: &str,
        filename: &str,
        comments: Vec<String>,
    ) -> Result<(), VmError> {
        let mut image = self.read_snapshot(key, filename)?;
        image.comments = comments;
        let json = serde_json::to_string_pretty(&image)
            .map_err(|e| VmError::SaveData(e.to_string()))?;
        fs::write(self.save_path(filename), json)?;
        Ok(())
    }
}
