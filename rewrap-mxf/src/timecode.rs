//! User timecode and its SMPTE 12M binary form.
//!
//! Timecodes here are derived from a frame count and a rounded timecode base
//! (25 or 30). Drop-frame counting only applies to the 30 base.

use crate::error::{MxfError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Frame numbers dropped at the start of each minute in drop-frame mode.
const DROPPED_PER_MINUTE: i64 = 2;

/// Timecode as carried in the system item user date/time stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub drop_frame: bool,
}

impl Timecode {
    pub fn new(hours: u8, minutes: u8, seconds: u8, frames: u8, drop_frame: bool) -> Self {
        Timecode {
            hours,
            minutes,
            seconds,
            frames,
            drop_frame,
        }
    }

    /// Convert a frame count to a timecode.
    ///
    /// With `drop_frame` set, the first two frame numbers of every minute
    /// except minutes 0, 10, 20, 30, 40 and 50 are skipped. Hours are not
    /// wrapped at 24.
    pub fn from_count(count: i64, base: u16, drop_frame: bool) -> Self {
        let base = base.max(1) as i64;
        let mut count = count.max(0);

        if drop_frame {
            let mut prev_skipped = -1;
            let mut skipped = 0;
            while prev_skipped != skipped {
                prev_skipped = skipped;

                let hour = (count + skipped) / (3600 * base);
                let min = ((count + skipped) % (3600 * base)) / (60 * base);

                skipped = (60 - 6) * DROPPED_PER_MINUTE * hour;
                skipped += (min / 10) * 9 * DROPPED_PER_MINUTE;
                skipped += (min % 10) * DROPPED_PER_MINUTE;
            }
            count += skipped;
        }

        let in_hour = count % (3600 * base);
        Timecode {
            hours: (count / (3600 * base)) as u8,
            minutes: (in_hour / (60 * base)) as u8,
            seconds: ((in_hour % (60 * base)) / base) as u8,
            frames: (in_hour % base) as u8,
            drop_frame,
        }
    }

    /// Frame count for this timecode at `base`.
    pub fn to_count(&self, base: u16) -> i64 {
        let base = base as i64;
        let hours = self.hours as i64;
        let minutes = self.minutes as i64;

        let mut count = ((hours * 60 + minutes) * 60 + self.seconds as i64) * base
            + self.frames as i64;
        if self.drop_frame {
            count -= (60 - 6) * DROPPED_PER_MINUTE * hours;
            count -= (minutes / 10) * 9 * DROPPED_PER_MINUTE;
            count -= (minutes % 10) * DROPPED_PER_MINUTE;
        }
        count
    }

    /// SMPTE 12M time bits: BCD frames, seconds, minutes and hours with the
    /// drop-frame flag in bit 6 of the first byte.
    pub fn to_smpte_12m(&self) -> [u8; 4] {
        let bcd = |value: u8, tens_mask: u8| (value % 10) | (((value / 10) & tens_mask) << 4);

        let mut bytes = [
            bcd(self.frames, 0x03),
            bcd(self.seconds, 0x07),
            bcd(self.minutes, 0x07),
            bcd(self.hours, 0x03),
        ];
        if self.drop_frame {
            bytes[0] |= 0x40;
        }
        bytes
    }

    pub fn separator(&self) -> char {
        if self.drop_frame {
            ';'
        } else {
            ':'
        }
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours,
            self.minutes,
            self.seconds,
            self.separator(),
            self.frames
        )
    }
}

impl FromStr for Timecode {
    type Err = MxfError;

    /// Parse `hh:mm:ss:ff`. Any separator other than ':' before the frames
    /// marks a drop-frame timecode.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || MxfError::InvalidTimecode {
            message: format!("expected hh:mm:ss:ff, got '{}'", s),
        };

        let mut fields = s.splitn(3, ':');
        let hours = fields.next().ok_or_else(invalid)?;
        let minutes = fields.next().ok_or_else(invalid)?;
        let rest = fields.next().ok_or_else(invalid)?;

        let split = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let seconds = &rest[..split];
        let separator = rest[split..].chars().next().ok_or_else(invalid)?;
        let frames = &rest[split + separator.len_utf8()..];

        let parse = |field: &str| field.parse::<u8>().map_err(|_| invalid());
        Ok(Timecode {
            hours: parse(hours)?,
            minutes: parse(minutes)?,
            seconds: parse(seconds)?,
            frames: parse(frames)?,
            drop_frame: separator != ':',
        })
    }
}
