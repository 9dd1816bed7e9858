//! Identifier types for simulation entities.
//!
//! Towers carry a short hex identifier because it is substituted into the
//! name of the tower's event stream topic. Callers use UUID v7 (time-ordered)
//! identifiers so CDRs sort naturally by creation time downstream.

use core::fmt;
use core::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of hex characters in a [`TowerId`].
pub const TOWER_ID_LEN: usize = 8;

/// Error returned when a string is not a valid [`TowerId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid tower id {value:?}: expected 8 lowercase hex characters")]
pub struct ParseTowerIdError {
    /// The rejected input.
    pub value: String,
}

/// Identifier of a tower: exactly 8 lowercase hexadecimal characters.
///
/// Derived once from a uniformly random 32-bit value and fixed for the
/// tower's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TowerId(String);

impl TowerId {
    /// Draw a fresh identifier from `rng`.
    pub fn generate(rng: &mut impl Rng) -> Self {
        Self::from_u32(rng.random::<u32>())
    }

    /// Format a 32-bit value as a zero-padded tower identifier.
    pub fn from_u32(value: u32) -> Self {
        Self(format!("{value:08x}"))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TowerId {
    type Err = ParseTowerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == TOWER_ID_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(s.to_owned()))
        } else {
            Err(ParseTowerIdError {
                value: s.to_owned(),
            })
        }
    }
}

impl TryFrom<String> for TowerId {
    type Error = ParseTowerIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TowerId> for String {
    fn from(id: TowerId) -> Self {
        id.0
    }
}

/// Identifier of a caller (mobile handset) in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallerId(pub Uuid);

impl CallerId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for CallerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CallerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}
