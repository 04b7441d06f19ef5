// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Host abstraction.
//!
//! Everything the interpreter needs from its surroundings — user-visible
//! notifications, clocks, cooperative sleep, URL launch, breakpoint
//! callbacks — goes through the [`Host`] trait, so the VM can be driven
//! headless in tests with [`MockHost`].


mod mock;
mod system;

pub use mock::MockHost;
pub use system::SystemHost;

use std::path::PathBuf;

/// Host-provided primitives.
///
/// Strings crossing this boundary are owned by the caller; implementations
/// must copy what they keep.
pub trait Host {
    /// `system.Output`: plain user-visible text.
    fn output(&mut self, text: &str);

    /// `system.MsgBox`: modal notification.
    fn message_box(&mut self, text: &str);

    /// `system.MsgBoxOkCancel`: modal question; true for OK.
    fn message_box_ok_cancel(&mut self, text: &str) -> bool;

    /// `system.Error`: game-reported error text.
    fn game_error(&mut self, text: &str);

    /// `system.GetTime`: monotonic milliseconds.
    fn time_ms(&mut self) -> i32;

    /// `system.GetDate`: calendar stamp, host-defined encoding.
    fn date_stamp(&mut self) -> i32;

    /// `system.Sleep`: cooperative sleep; no VM progress while blocked.
    fn sleep_ms(&mut self, ms: i32);

    /// `system.OpenWeb`: launch an external URL; true on success.
    fn open_url(&mut self, url: &str) -> bool;

    /// A breakpoint was hit at `addr`; the opcode executes afterwards.
    fn breakpoint_hit(&mut self, addr: u32) {
        let _ = addr;
    }
}

/// Host configuration surface. Not a CLI; embedders fill this in.
#[derive(Debug, Clone)]
pub struct Config {
    /// Game data directory (resolves `system.ExistsFile`).
    pub game_dir: PathBuf,
    /// Save directory (resolves save files and snapshots).
    pub save_dir: PathBuf,
    /// User home directory.
    pub home_dir: PathBuf,
    pub view_width: i32,
    pub view_height: i32,
    /// Echo displayed messages through the log.
    pub echo: bool,
    pub game_name: String,
    /// Name reported by `system.GetSaveFolderName`.
    pub save_folder_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game_dir: PathBuf::from("."),
            save_dir: PathBuf::from("."),
            home_dir: PathBuf::from("."),
            view_width: 800,
            view_height: 600,
            echo: false,
            game_name: String::new(),
            save_folder_name: String::new(),
        }
    }
}
