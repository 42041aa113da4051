// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Source log sequence numbers.
//!
//! An [`Lsn`] is the opaque, totally ordered log position the source store
//! attaches to every decoded event. The canonical textual form is the hex
//! pair `X/X` (e.g. `0/16B3748`); that form is what the checkpoint store
//! persists. Inside the sink pipeline the LSN travels as a plain decimal
//! column so that the merge statement can compare it numerically.
//!
//! # Example
//!
//! ```
//! use cdc_bridge::Lsn;
//!
//! let lsn: Lsn = "0/16B3748".parse().unwrap();
//! assert_eq!(lsn.to_string(), "0/16B3748");
//! assert_eq!(lsn.wire(), "23803720");
//! assert!(lsn > Lsn::ZERO);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EngineError;

/// A 64-bit log sequence number from the source store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lsn(u64);

impl Lsn {
    /// The zero position, ordered before every real LSN.
    pub const ZERO: Lsn = Lsn(0);

    /// Build from a raw 64-bit position.
    #[must_use]
    pub const fn from_u64(raw: u64) -> Self {
        Lsn(raw)
    }

    /// Build from the two 32-bit halves of the canonical form.
    #[must_use]
    pub const fn from_parts(hi: u32, lo: u32) -> Self {
        Lsn(((hi as u64) << 32) | lo as u64)
    }

    /// The raw 64-bit position.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Decimal form written into the sink's LSN column.
    #[must_use]
    pub fn wire(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl FromStr for Lsn {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = s
            .split_once('/')
            .ok_or_else(|| EngineError::InvalidLsn(s.to_string()))?;
        let hi = u32::from_str_radix(hi, 16).map_err(|_| EngineError::InvalidLsn(s.to_string()))?;
        let lo = u32::from_str_radix(lo, 16).map_err(|_| EngineError::InvalidLsn(s.to_string()))?;
        Ok(Lsn::from_parts(hi, lo))
    }
}

impl Serialize for Lsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Lsn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
