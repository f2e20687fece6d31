use std::fmt;

use serde::{Deserialize, Serialize};

/// Width the target form expects for lot numbers (`048363817`).
pub const DEFAULT_ID_WIDTH: usize = 9;

/// A lot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(u64);

impl Identifier {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Zero-padded token as typed into the form. Values wider than `width`
    /// are rendered in full rather than truncated.
    pub fn token(self, width: usize) -> String {
        format!("{:0width$}", self.0, width = width)
    }
}

impl From<u64> for Identifier {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("range start {start} is after range end {end}")]
    Inverted { start: u64, end: u64 },
}

/// Closed, ascending identifier range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    start: Identifier,
    end: Identifier,
}

impl IdRange {
    pub fn new(start: u64, end: u64) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self {
            start: Identifier(start),
            end: Identifier(end),
        })
    }

    pub fn start(&self) -> Identifier {
        self.start
    }

    pub fn end(&self) -> Identifier {
        self.end
    }

    /// Number of identifiers in the range. Saturates for `[0, u64::MAX]`.
    pub fn len(&self) -> u64 {
        (self.end.0 - self.start.0).saturating_add(1)
    }

    pub fn contains(&self, id: Identifier) -> bool {
        self.start <= id && id <= self.end
    }

    /// The identifier after `id`, or `None` once the range is exhausted.
    pub fn next_after(&self, id: Identifier) -> Option<Identifier> {
        if id >= self.end {
            return None;
        }
        id.0.checked_add(1).map(Identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = Identifier> {
        (self.start.0..=self.end.0).map(Identifier)
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
