// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Recording host for tests.

use super::Host;

/// Host that records every interaction and advances a fake clock.
#[derive(Debug, Default)]
pub struct MockHost {
    pub outputs: Vec<String>,
    pub message_boxes: Vec<String>,
    pub errors: Vec<String>,
    pub opened_urls: Vec<String>,
    pub breakpoints: Vec<u32>,
    /// Answers for `MsgBoxOkCancel`, consumed front to back; defaults to OK.
    pub msgbox_answers: Vec<bool>,
    /// Fake monotonic clock, advanced by `sleep_ms`.
    pub now_ms: i32,
    pub date: i32,
}

impl MockHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Host for MockHost {
    fn output(&mut self, text: &str) {
        self.outputs.push(text.to_owned());
    }

    fn message_box(&mut self, text: &str) {
        self.message_boxes.push(text.to_owned());
    }

    fn message_box_ok_cancel(&mut self, text: &str) -> bool {
        self.message_boxes.push(text.to_owned());
        if self.msgbox_answers.is_empty() {
            true
        } else {
            self.msgbox_answers.remove(0)
        }
    }

    fn game_error(&mut self, text: &str) {
        self.errors.push(text.to_owned());
    }

    fn time_ms(&mut self) -> i32 {
        self.now_ms
    }

    fn date_stamp(&mut self) -> i32 {
        self.date
    }

    fn sleep_ms(&mut self, ms: i32) {
        self.now_ms = self.now_ms.saturating_add(ms.max(0));
    }

    fn open_url(&mut self, url: &str) -> bool {
        self.opened_urls.push(url.to_owned());
        true
    }

    fn breakpoint_hit(&mut self, addr: u32) {
        self.breakpoints.push(addr);
    }
}
