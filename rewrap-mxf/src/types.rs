//! MXF type definitions

use chrono::{Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rational number for edit rates and aspect ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub numerator: i32,
    pub denominator: i32,
}

impl Rational {
    pub const fn new(numerator: i32, denominator: i32) -> Self {
        Rational {
            numerator,
            denominator,
        }
    }

    pub fn to_f64(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }

    /// Big-endian numerator then denominator
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.numerator.to_be_bytes());
        bytes[4..].copy_from_slice(&self.denominator.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 8 {
            return None;
        }
        Some(Rational {
            numerator: i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            denominator: i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::new(1, 1)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// UMID (Unique Material Identifier) - 32 bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Umid(pub [u8; 32]);

/// Basic UMID label: SMPTE 330M, material type not identified, UUID/UL
/// material number generation, no instance method.
const UMID_PREFIX: [u8; 16] = [
    0x06, 0x0A, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x05, 0x01, 0x01, 0x0F, 0x20, 0x13, 0x00, 0x00,
    0x00,
];

impl Umid {
    pub fn new(bytes: [u8; 32]) -> Self {
        Umid(bytes)
    }

    pub fn zero() -> Self {
        Umid([0; 32])
    }

    /// Generate a UMID with a random UUID material number
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(&UMID_PREFIX);
        bytes[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
        Umid(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Material number (bytes 16-31)
    pub fn material_number(&self) -> &[u8] {
        &self.0[16..32]
    }
}

impl fmt::Debug for Umid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UMID(")?;
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 && i % 4 == 0 {
                write!(f, "-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl Default for Umid {
    fn default() -> Self {
        Umid::zero()
    }
}

/// MXF timestamp, with the fraction in units of 4 milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxfTimestamp {
    pub year: i16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub qmsec: u8,
}

impl MxfTimestamp {
    /// Current UTC time
    pub fn now() -> Self {
        let now = Utc::now();
        MxfTimestamp {
            year: now.year() as i16,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
            qmsec: ((now.timestamp_subsec_millis() as f64 / 4.0 + 0.5) as u32).min(249) as u8,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 8 {
            return None;
        }

        Some(MxfTimestamp {
            year: i16::from_be_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day: bytes[3],
            hour: bytes[4],
            minute: bytes[5],
            second: bytes[6],
            qmsec: bytes[7],
        })
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let year = self.year.to_be_bytes();
        [
            year[0],
            year[1],
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.qmsec,
        ]
    }
}

impl fmt::Display for MxfTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.qmsec as u32 * 4
        )
    }
}

/// Source of instance UIDs, UMIDs and timestamps for one file.
///
/// In deterministic mode identifiers are zero apart from a big-endian
/// counter in their last four bytes and timestamps are all zero, so two
/// runs over the same input produce identical files.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    deterministic: bool,
    uuid_count: u32,
    umid_count: u32,
}

impl IdGenerator {
    pub fn new(deterministic: bool) -> Self {
        IdGenerator {
            deterministic,
            uuid_count: 0,
            umid_count: 0,
        }
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    pub fn uuid(&mut self) -> [u8; 16] {
        if self.deterministic {
            self.uuid_count += 1;
            let mut bytes = [0u8; 16];
            bytes[12..].copy_from_slice(&self.uuid_count.to_be_bytes());
            bytes
        } else {
            *uuid::Uuid::new_v4().as_bytes()
        }
    }

    pub fn umid(&mut self) -> Umid {
        if self.deterministic {
            self.umid_count += 1;
            let mut bytes = [0u8; 32];
            bytes[28..].copy_from_slice(&self.umid_count.to_be_bytes());
            Umid(bytes)
        } else {
            Umid::generate()
        }
    }

    pub fn timestamp(&self) -> MxfTimestamp {
        if self.deterministic {
            MxfTimestamp::default()
        } else {
            MxfTimestamp::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_bytes() {
        let r = Rational::new(30000, 1001);
        assert!((r.to_f64() - 29.97).abs() < 0.01);
        assert_eq!(Rational::from_bytes(&r.to_bytes()), Some(r));
        assert_eq!(&r.to_bytes()[4..], &[0x00, 0x00, 0x03, 0xE9]);
    }

    #[test]
    fn test_umid() {
        let umid = Umid::generate();
        assert!(!umid.is_zero());
        assert_eq!(&umid.0[..4], &[0x06, 0x0A, 0x2B, 0x34]);
        assert_eq!(umid.0[12], 0x13);
        assert!(Umid::zero().is_zero());
    }

    #[test]
    fn test_timestamp_bytes() {
        let ts = MxfTimestamp {
            year: 2024,
            month: 6,
            day: 15,
            hour: 14,
            minute: 30,
            second: 45,
            qmsec: 50,
        };
        assert_eq!(MxfTimestamp::from_bytes(&ts.to_bytes()), Some(ts));
        assert_eq!(ts.to_string(), "2024-06-15 14:30:45.200");
    }

    #[test]
    fn test_deterministic_ids() {
        let mut ids = IdGenerator::new(true);
        let first = ids.uuid();
        let second = ids.uuid();
        assert_eq!(&first[12..], &[0, 0, 0, 1]);
        assert_eq!(&second[12..], &[0, 0, 0, 2]);
        assert_eq!(&ids.umid().0[28..], &[0, 0, 0, 1]);
        assert_eq!(ids.timestamp(), MxfTimestamp::default());
    }

    #[test]
    fn test_random_ids_differ() {
        let mut ids = IdGenerator::new(false);
        assert_ne!(ids.uuid(), ids.uuid());
        assert_ne!(ids.umid(), ids.umid());
    }
}
