//! Contributor share percentages.
//!
//! Shares are held as basis points of a percent so that the two-decimal
//! percentages contributors agree on (e.g. 33.33%) are exact integers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, TypesError, BPS_DENOMINATOR};

/// A contributor share in basis points: 1 = 0.01%, 10_000 = 100%.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ShareBps(u32);

impl ShareBps {
    /// Create a share, rejecting zero and anything above 100%.
    pub fn new(bps: u32) -> Result<Self> {
        if bps == 0 || bps > BPS_DENOMINATOR {
            return Err(TypesError::ShareOutOfRange(bps));
        }
        Ok(Self(bps))
    }

    /// Convert a percentage such as `33.33` to basis points.
    ///
    /// Rounds to the nearest 0.01%.
    pub fn from_percent(percent: f64) -> Result<Self> {
        if !percent.is_finite() || percent <= 0.0 {
            return Err(TypesError::ShareOutOfRange(0));
        }
        let bps = (percent * 100.0).round();
        if bps > f64::from(BPS_DENOMINATOR) {
            return Err(TypesError::ShareOutOfRange(bps as u32));
        }
        Self::new(bps as u32)
    }

    /// Raw basis points.
    pub fn bps(&self) -> u32 {
        self.0
    }

    /// The share as a percentage, for display.
    pub fn as_percent(&self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl TryFrom<u32> for ShareBps {
    type Error = TypesError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ShareBps> for u32 {
    fn from(value: ShareBps) -> Self {
        value.0
    }
}

impl fmt::Display for ShareBps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}
