//! Daily scheduling windows.
//!
//! A window is a `[start, end)` span of minutes after midnight. When
//! `start > end` the window wraps past midnight; `start == end` means the
//! whole day. Windows are kept in local time and converted to UTC only when
//! they cross the wire, so peers in different zones compare like with like.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MINUTES_PER_DAY: u16 = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchedWindow {
    pub start: u16,
    pub end: u16,
}

impl Default for SchedWindow {
    fn default() -> Self {
        Self::ALWAYS
    }
}

impl SchedWindow {
    pub const ALWAYS: SchedWindow = SchedWindow { start: 0, end: 0 };

    /// Build from minutes after midnight; values are reduced modulo one day.
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start: start % MINUTES_PER_DAY,
            end: end % MINUTES_PER_DAY,
        }
    }

    pub fn from_hm(start_h: u16, start_m: u16, end_h: u16, end_m: u16) -> Self {
        Self::new(start_h * 60 + start_m, end_h * 60 + end_m)
    }

    pub fn is_full_day(&self) -> bool {
        self.start == self.end
    }

    pub fn wraps(&self) -> bool {
        self.start > self.end
    }

    /// Length in minutes.
    pub fn minutes(&self) -> u16 {
        if self.is_full_day() {
            MINUTES_PER_DAY
        } else if self.wraps() {
            MINUTES_PER_DAY - self.start + self.end
        } else {
            self.end - self.start
        }
    }

    pub fn contains(&self, minute: u16) -> bool {
        let minute = minute % MINUTES_PER_DAY;
        self.segments()
            .iter()
            .flatten()
            .any(|&(lo, hi)| minute >= lo && minute < hi)
    }

    /// Up to two non-wrapping `[lo, hi)` pieces covering the window.
    fn segments(&self) -> [Option<(u16, u16)>; 2] {
        if self.is_full_day() {
            [Some((0, MINUTES_PER_DAY)), None]
        } else if self.wraps() {
            [Some((self.start, MINUTES_PER_DAY)), Some((0, self.end))]
        } else {
            [Some((self.start, self.end)), None]
        }
    }

    /// Minutes both windows have in common.
    pub fn overlap(&self, other: &SchedWindow) -> u16 {
        let mut total = 0;
        for (a_lo, a_hi) in self.segments().into_iter().flatten() {
            for (b_lo, b_hi) in other.segments().into_iter().flatten() {
                let lo = a_lo.max(b_lo);
                let hi = a_hi.min(b_hi);
                if hi > lo {
                    total += hi - lo;
                }
            }
        }
        total
    }

    /// Shift by `offset_minutes` (may be negative), wrapping around midnight.
    pub fn shifted(&self, offset_minutes: i32) -> Self {
        if self.is_full_day() {
            return *self;
        }
        let day = MINUTES_PER_DAY as i32;
        let shift = |m: u16| ((m as i32 + offset_minutes).rem_euclid(day)) as u16;
        Self {
            start: shift(self.start),
            end: shift(self.end),
        }
    }

    /// Local window -> UTC, given the local zone's offset east of UTC in minutes.
    pub fn to_utc(&self, local_offset_minutes: i32) -> Self {
        self.shifted(-local_offset_minutes)
    }

    /// UTC window -> local, given the local zone's offset east of UTC in minutes.
    pub fn from_utc(&self, local_offset_minutes: i32) -> Self {
        self.shifted(local_offset_minutes)
    }
}

/// This host's current offset east of UTC, in minutes.
pub fn local_offset_minutes() -> i32 {
    use chrono::Offset;
    chrono::Local::now().offset().fix().local_minus_utc() / 60
}

/// Current local time as minutes after midnight.
pub fn local_minute_of_day() -> u16 {
    use chrono::Timelike;
    let now = chrono::Local::now();
    (now.hour() * 60 + now.minute()) as u16
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid scheduling window '{0}', expected HH:MM-HH:MM")]
pub struct WindowParseError(pub String);

fn parse_hm(s: &str) -> Option<u16> {
    let (h, m) = s.trim().split_once(':')?;
    let h: u16 = h.parse().ok()?;
    let m: u16 = m.parse().ok()?;
    // 24:00 is accepted as an alias for midnight at the end of a window.
    if (h < 24 && m < 60) || (h == 24 && m == 0) {
        Some((h * 60 + m) % MINUTES_PER_DAY)
    } else {
        None
    }
}

impl FromStr for SchedWindow {
    type Err = WindowParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("always") {
            return Ok(Self::ALWAYS);
        }
        let err = || WindowParseError(s.to_string());
        let (a, b) = trimmed.split_once('-').ok_or_else(err)?;
        let start = parse_hm(a).ok_or_else(err)?;
        let end = parse_hm(b).ok_or_else(err)?;
        Ok(Self { start, end })
    }
}

impl fmt::Display for SchedWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}
