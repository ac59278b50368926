//! Cascade policy: which collaborators an operation may touch.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Sub};
use std::str::FromStr;

/// A set over `{Local, Rest, Live}`.
///
/// Every operation carries one. Before writing to the local store, calling
/// the remote service, or broadcasting on the live channel, the operation
/// tests the matching member.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cascade(u8);

impl Cascade {
    /// Touch nothing.
    pub const NONE: Cascade = Cascade(0);
    /// The local persistent store.
    pub const LOCAL: Cascade = Cascade(1);
    /// The remote (REST) service.
    pub const REST: Cascade = Cascade(2);
    /// The live broadcast channel.
    pub const LIVE: Cascade = Cascade(4);
    /// Remote service and live channel.
    pub const REMOTE: Cascade = Cascade(2 | 4);
    /// Everything except the live channel.
    pub const NO_LIVE: Cascade = Cascade(1 | 2);
    /// Everything except the remote service.
    pub const NO_REST: Cascade = Cascade(1 | 4);
    /// Every collaborator.
    pub const ALL: Cascade = Cascade(1 | 2 | 4);

    /// Build a cascade from raw bits, dropping unknown ones.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Cascade(bits & Self::ALL.0)
    }

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True when this policy shares at least one member with `other`.
    pub const fn can_cascade(self, other: Cascade) -> bool {
        self.0 & other.0 != 0
    }

    /// Negation of [`Cascade::can_cascade`].
    pub const fn not_cascade(self, other: Cascade) -> bool {
        !self.can_cascade(other)
    }

    /// True when every member of `other` is in this policy.
    pub const fn contains(self, other: Cascade) -> bool {
        self.0 & other.0 == other.0
    }

    /// This policy without the members of `other`.
    pub const fn without(self, other: Cascade) -> Self {
        Cascade(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for Cascade {
    fn default() -> Self {
        Cascade::ALL
    }
}

impl BitOr for Cascade {
    type Output = Cascade;

    fn bitor(self, rhs: Cascade) -> Cascade {
        Cascade(self.0 | rhs.0)
    }
}

impl BitAnd for Cascade {
    type Output = Cascade;

    fn bitand(self, rhs: Cascade) -> Cascade {
        Cascade(self.0 & rhs.0)
    }
}

impl Sub for Cascade {
    type Output = Cascade;

    fn sub(self, rhs: Cascade) -> Cascade {
        self.without(rhs)
    }
}

impl fmt::Display for Cascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names = [
            (Cascade::LOCAL, "local"),
            (Cascade::REST, "rest"),
            (Cascade::LIVE, "live"),
        ];
        let mut first = true;
        for (member, name) in names {
            if self.contains(member) {
                if !first {
                    write!(f, ",")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Cascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cascade({self})")
    }
}

impl FromStr for Cascade {
    type Err = ConfigError;

    /// Parses `all`, `none`, `remote`, or a comma separated list of
    /// `local`, `rest` and `live`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "all" => return Ok(Cascade::ALL),
            "none" | "" => return Ok(Cascade::NONE),
            _ => {}
        }

        let mut cascade = Cascade::NONE;
        for part in trimmed.split(',') {
            cascade = cascade
                | match part.trim().to_ascii_lowercase().as_str() {
                    "local" => Cascade::LOCAL,
                    "rest" => Cascade::REST,
                    "live" => Cascade::LIVE,
                    "remote" => Cascade::REMOTE,
                    _ => return Err(ConfigError::InvalidCascade(s.to_string())),
                };
        }
        Ok(cascade)
    }
}
