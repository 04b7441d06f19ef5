// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! The `CALLSYS` primitives.
//!
//! Quirks preserved from the original engine:
//! - `Output`, `MsgBox` and `Error` do NOT pop their string argument;
//!   the calling bytecode is expected to `S_POP` it.
//! - `ResumeSave` pushes 1 on the saving path. When the image is later
//!   loaded, execution resumes just past the saved `ResumeSave` call
//!   with 0 on the stack instead, so the same call site observes which
//!   path it is on.

use num_enum::TryFromPrimitive;
use tracing::warn;

use crate::error::{Exec, Signal, VmError};
use crate::page::{Page, PageKind};
use crate::vm::Vm;
use ain_image::DataType;

/// System call tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(i32)]
pub enum SysCall {
    Exit = 0x00,
    GlobalSave = 0x01,
    GlobalLoad = 0x02,
    LockPeek = 0x03,
    UnlockPeek = 0x04,
    Reset = 0x05,
    Output = 0x06,
    MsgBox = 0x07,
    ResumeSave = 0x08,
    ResumeLoad = 0x09,
    ExistsFile = 0x0a,
    OpenWeb = 0x0b,
    GetSaveFolderName = 0x0c,
    GetTime = 0x0d,
    GetGameName = 0x0e,
    Error = 0x0f,
    ExistsSaveFile = 0x10,
    IsDebugMode = 0x11,
    MsgBoxOkCancel = 0x12,
    GetFuncStackName = 0x13,
    Peek = 0x14,
    Sleep = 0x15,
    ResumeReadComment = 0x16,
    ResumeWriteComment = 0x17,
    GroupSave = 0x18,
    GroupLoad = 0x19,
    DeleteSaveFile = 0x1a,
    ExistFunc = 0x1b,
    CopySaveFile = 0x1c,
    GetDate = 0x1d,
    RestrainScreensaver = 0x1e,
}

impl Vm {
    /// Dispatch one `CALLSYS`. Returns whether the instruction pointer
    /// advances normally (it always does, except through `Exit`/`Reset`).
    pub(crate) fn system_call(&mut self, code: i32) -> Exec<bool> {
        let call =
            SysCall::try_from(code).map_err(|_| VmError::UnimplementedSyscall { code })?;
        match call {
            SysCall::Exit => {
                let status = self.pop()?.as_int();
                return Err(Signal::Exit(status));
            }
            SysCall::GlobalSave => {
                let filename = self.pop()?.as_int();
                let keyname = self.pop()?.as_int();
                let key = self.heap.string(keyname)?.to_owned();
                let file = self.heap.string(filename)?.to_owned();
                let (ok, _) = self.save_globals(&key, &file, None)?;
                self.push(ok);
                self.unref(filename)?;
                self.unref(keyname)?;
            }
            SysCall::GlobalLoad => {
                let filename = self.pop()?.as_int();
                let keyname = self.pop()?.as_int();
                let key = self.heap.string(keyname)?.to_owned();
                let file = self.heap.string(filename)?.to_owned();
                let (ok, _) = self.load_globals(&key, &file, None)?;
                self.push(ok);
                self.unref(filename)?;
                self.unref(keyname)?;
            }
            SysCall::GroupSave => {
                let n_ref = self.pop_var()?;
                let groupname = self.pop()?.as_int();
                let filename = self.pop()?.as_int();
                let keyname = self.pop()?.as_int();
                let key = self.heap.string(keyname)?.to_owned();
                let file = self.heap.string(filename)?.to_owned();
                let group = self.heap.string(groupname)?.to_owned();
                let (ok, n) = self.save_globals(&key, &file, Some(&group))?;
                self.var_set(n_ref, crate::value::Value::int(n))?;
                self.push(ok);
                self.unref(groupname)?;
                self.unref(filename)?;
                self.unref(keyname)?;
            }
            SysCall::GroupLoad => {
                let n_ref = self.pop_var()?;
                let groupname = self.pop()?.as_int();
                let filename = self.pop()?.as_int();
                let keyname = self.pop()?.as_int();
                let key = self.heap.string(keyname)?.to_owned();
                let file = self.heap.string(filename)?.to_owned();
                let group = self.heap.string(groupname)?.to_owned();
                let (ok, n) = self.load_globals(&key, &file, Some(&group))?;
                self.var_set(n_ref, crate::value::Value::int(n))?;
                self.push(ok);
                self.unref(groupname)?;
                self.unref(filename)?;
                self.unref(keyname)?;
            }
            SysCall::LockPeek | SysCall::UnlockPeek => self.push(1),
            SysCall::Reset => return Err(Signal::Reset),
            SysCall::Output => {
                // the caller S_POPs
                let text = self.string_at(0)?;
                self.host.output(&text);
            }
            SysCall::MsgBox => {
                // the caller S_POPs
                let text = self.string_at(0)?;
                self.host.message_box(&text);
            }
            SysCall::MsgBoxOkCancel => {
                let text = self.string_at(0)?;
                let result = self.host.message_box_ok_cancel(&text);
                let slot = self.pop()?.as_int();
                self.unref(slot)?;
                self.push(result);
            }
            SysCall::Error => {
                // the caller S_POPs
                let text = self.string_at(0)?;
                self.host.game_error(&text);
            }
            SysCall::ResumeSave => {
                let success = self.pop_var()?;
                let file = self.string_at(0)?;
                let key = self.string_at(1)?;
                let ok = match self.save_resume(&key, &file) {
                    Ok(()) => 1,
                    Err(e) => {
                        warn!("ResumeSave failed: {e}");
                        0
                    }
                };
                self.var_set(success, crate::value::Value::int(ok))?;
                let a = self.pop()?.as_int();
                let b = self.pop()?.as_int();
                self.unref(a)?;
                self.unref(b)?;
                self.push(1);
            }
            SysCall::ResumeLoad => {
                let filename = self.pop()?.as_int();
                let keyname = self.pop()?.as_int();
                let key = self.heap.string(keyname)?.to_owned();
                let file = self.heap.string(filename)?.to_owned();
                self.load_resume(&key, &file)?;
                // the restored stack still carries the strings the save
                // left behind; drop them and report the load path
                self.pop()?;
                self.pop()?;
                self.push(0);
            }
            SysCall::ExistsFile => {
                let slot = self.pop()?.as_int();
                let path = self.config.game_dir.join(self.heap.string(slot)?);
                self.push(path.exists());
                self.unref(slot)?;
            }
            SysCall::ExistsSaveFile => {
                let slot = self.pop()?.as_int();
                let path = self.config.save_dir.join(self.heap.string(slot)?);
                self.push(path.exists());
                self.unref(slot)?;
            }
            SysCall::DeleteSaveFile => {
                let slot = self.pop()?.as_int();
                let path = self.config.save_dir.join(self.heap.string(slot)?);
                let ok = if path.exists() {
                    match std::fs::remove_file(&path) {
                        Ok(()) => 1,
                        Err(e) => {
                            warn!(path = %path.display(), "remove failed: {e}");
                            0
                        }
                    }
                } else {
                    0
                };
                self.push(ok);
                self.unref(slot)?;
            }
            SysCall::CopySaveFile => {
                let src = self.pop()?.as_int();
                let dst = self.pop()?.as_int();
                let from = self.config.save_dir.join(self.heap.string(src)?);
                let to = self.config.save_dir.join(self.heap.string(dst)?);
                let ok = match std::fs::copy(&from, &to) {
                    Ok(_) => 1,
                    Err(e) => {
                        warn!(from = %from.display(), "copy failed: {e}");
                        0
                    }
                };
                self.push(ok);
                self.unref(src)?;
                self.unref(dst)?;
            }
            SysCall::OpenWeb => {
                let url = self.string_at(0)?;
                if !self.host.open_url(&url) {
                    warn!(url, "OpenWeb failed");
                }
                let slot = self.pop()?.as_int();
                self.unref(slot)?;
            }
            SysCall::GetSaveFolderName => {
                let name = self.config.save_folder_name.clone();
                self.push_string(name);
            }
            SysCall::GetTime => {
                let t = self.host.time_ms();
                self.push(t);
            }
            SysCall::GetDate => {
                let d = self.host.date_stamp();
                self.push(d);
            }
            SysCall::GetGameName => {
                let name = self.config.game_name.clone();
                self.push_string(name);
            }
            SysCall::IsDebugMode => self.push(0),
            SysCall::GetFuncStackName => {
                let index = self.pop()?.as_int();
                let name = self.get_func_stack_name(index);
                self.push_string(name);
            }
            SysCall::Peek | SysCall::RestrainScreensaver => {}
            SysCall::Sleep => {
                let ms = self.pop()?.as_int();
                self.host.sleep_ms(ms);
            }
            SysCall::ResumeReadComment => {
                let comment = self.pop()?.as_int();
                let filename = self.pop()?.as_int();
                let keyname = self.pop()?.as_int();
                let key = self.heap.string(keyname)?.to_owned();
                let file = self.heap.string(filename)?.to_owned();
                let ok = match self.load_resume_comments(&key, &file) {
                    Ok(comments) => {
                        let mut page = Page::new(
                            PageKind::Array {
                                data_type: DataType::ArrayString,
                                struct_type: -1,
                                rank: 1,
                            },
                            comments.len(),
                        );
                        for (i, c) in comments.into_iter().enumerate() {
                            let slot = self.heap.alloc_string_slot(c);
                            page.set(i, crate::value::Value::int(slot));
                        }
                        self.heap.put_page(comment, Some(page));
                        1
                    }
                    Err(e) => {
                        warn!("ResumeReadComment failed: {e}");
                        0
                    }
                };
                self.unref(filename)?;
                self.unref(keyname)?;
                self.push(ok);
            }
            SysCall::ResumeWriteComment => {
                let comment = self.pop()?.as_int();
                let filename = self.pop()?.as_int();
                let keyname = self.pop()?.as_int();
                let key = self.heap.string(keyname)?.to_owned();
                let file = self.heap.string(filename)?.to_owned();
                let comments = match self.heap.page(comment)? {
                    Some(p) => {
                        let mut out = Vec::with_capacity(p.nr_vars());
                        for i in 0..p.nr_vars() {
                            out.push(self.heap.string(p.get(i).as_int())?.to_owned());
                        }
                        out
                    }
                    None => Vec::new(),
                };
                let ok = match self.save_resume_comments(&key, &file, comments) {
                    Ok(()) => 1,
                    Err(e) => {
                        warn!("ResumeWriteComment failed: {e}");
                        0
                    }
                };
                self.unref(filename)?;
                self.unref(keyname)?;
                self.push(ok);
            }
            SysCall::ExistFunc => {
                let slot = self.pop()?.as_int();
                let name = self.heap.string(slot)?.to_owned();
                let exists = self.image.function_by_name(&name).is_some_and(|i| i > 0);
                self.push(exists);
                self.unref(slot)?;
            }
        }
        Ok(true)
    }
}
