//! Host clock adapter.
//!
//! Implements [`Clock`] on top of the operating system:
//!
//! - monotonic milliseconds from `std::time::Instant`, truncated to a
//!   wrapping `u32` the way embedded `millis()` counters behave;
//! - local wall-clock time from `chrono::Local`;
//! - blocking delays with `std::thread::sleep`.

use std::time::{Duration, Instant};

use chrono::{Datelike, Local, Timelike};

use crate::app::ports::Clock;
use crate::schedule::LocalTime;

/// First year treated as a synced wall clock.
const SYNCED_SINCE_YEAR: i32 = 2020;

/// System clock adapter.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
    sync_requested: bool,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            sync_requested: false,
        }
    }

    /// `false` while the wall clock still reports a pre-sync date.
    pub fn is_synced(&self) -> bool {
        Local::now().year() >= SYNCED_SINCE_YEAR
    }

    /// A re-sync was requested and not yet taken; clears the request.
    pub fn take_sync_request(&mut self) -> bool {
        core::mem::take(&mut self.sync_requested)
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    fn local_time(&self) -> LocalTime {
        let now = Local::now();
        LocalTime {
            year: now.year(),
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }

    fn request_time_sync(&mut self) {
        self.sync_requested = true;
    }
}
