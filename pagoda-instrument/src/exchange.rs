use crate::error::InstrumentError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Unique identifier for a mainland listing venue.
///
/// ### Notes
/// Security identifiers carry the venue as a suffix (eg/ `000001.XSHE`). The Beijing
/// exchange is reachable via two equivalent suffixes, `BJ` and `BSE`, which both map to
/// [`Exchange::Beijing`].
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    /// Shenzhen Stock Exchange (`XSHE`).
    Shenzhen,
    /// Shanghai Stock Exchange (`XSHG`).
    Shanghai,
    /// Beijing Stock Exchange (`BJ` / `BSE`).
    Beijing,
}

impl Exchange {
    /// Return the canonical &str suffix of this [`Exchange`].
    pub const fn as_str(&self) -> &'static str {
        match self {
            Exchange::Shenzhen => "XSHE",
            Exchange::Shanghai => "XSHG",
            Exchange::Beijing => "BJ",
        }
    }
}

impl FromStr for Exchange {
    type Err = InstrumentError;

    fn from_str(suffix: &str) -> Result<Self, Self::Err> {
        match suffix {
            "XSHE" => Ok(Exchange::Shenzhen),
            "XSHG" => Ok(Exchange::Shanghai),
            "BJ" | "BSE" => Ok(Exchange::Beijing),
            other => Err(InstrumentError::InvalidSecurity(format!(
                "unknown exchange suffix: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
