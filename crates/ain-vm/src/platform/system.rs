// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Default host backed by the operating system.

use std::io::Write;
use std::time::Instant;

use super::Host;

/// Host using stdout, the process clock and `std::thread::sleep`.
///
/// Message boxes degrade to console output with an assumed OK answer;
/// graphical embedders supply their own [`Host`].
#[derive(Debug)]
pub struct SystemHost {
    start: Instant,
}

impl SystemHost {
    #[must_use]
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SystemHost {
    fn output(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{text}");
    }

    fn message_box(&mut self, text: &str) {
        self.output(text);
    }

    fn message_box_ok_cancel(&mut self, text: &str) -> bool {
        self.output(text);
        true
    }

    fn game_error(&mut self, text: &str) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "*GAME ERROR*: {text}");
    }

    fn time_ms(&mut self) -> i32 {
        self.start.elapsed().as_millis() as i32
    }

    fn date_stamp(&mut self) -> i32 {
        // days since the Unix epoch
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| (d.as_secs() / 86_400) as i32)
    }

    fn sleep_ms(&mut self, ms: i32) {
        if ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(ms as u64));
        }
    }

    fn open_url(&mut self, url: &str) -> bool {
        tracing::info!(url, "OpenWeb requested");
        false
    }
}
