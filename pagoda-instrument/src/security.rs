use crate::{error::InstrumentError, exchange::Exchange};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::str::FromStr;

/// Validated security identifier of the form `<code>.<exchange>`.
///
/// eg/ `000001.XSHE`, `688001.XSHG`, `430047.BJ`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Security {
    code: SmolStr,
    exchange: Exchange,
}

impl Security {
    /// Parse a `<code>.<exchange>` identifier, normalising the `BSE` suffix alias.
    pub fn parse(id: &str) -> Result<Self, InstrumentError> {
        let Some((code, suffix)) = id.split_once('.') else {
            return Err(InstrumentError::InvalidSecurity(format!(
                "missing exchange suffix: {id}"
            )));
        };

        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(InstrumentError::InvalidSecurity(format!(
                "non-numeric security code: {id}"
            )));
        }

        Ok(Self {
            code: SmolStr::new(code),
            exchange: suffix.parse()?,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// Classify this security by its code prefix and venue.
    pub fn kind(&self) -> SecurityKind {
        let code = self.code.as_str();
        match self.exchange {
            Exchange::Beijing => SecurityKind::Stock,
            Exchange::Shanghai => {
                if code.starts_with("688") || code.starts_with("689") {
                    SecurityKind::Star
                } else if code.starts_with("11") {
                    SecurityKind::ConvertibleBond
                } else if code.starts_with('5') {
                    SecurityKind::Fund
                } else {
                    SecurityKind::Stock
                }
            }
            Exchange::Shenzhen => {
                if code.starts_with("12") {
                    SecurityKind::ConvertibleBond
                } else if code.starts_with("15") || code.starts_with("16") || code.starts_with("18")
                {
                    SecurityKind::Fund
                } else {
                    SecurityKind::Stock
                }
            }
        }
    }

    /// Funds and ETFs are exempt from stamp tax and dividend withholding.
    pub fn is_fund(&self) -> bool {
        matches!(self.kind(), SecurityKind::Fund)
    }
}

impl FromStr for Security {
    type Err = InstrumentError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        Security::parse(id)
    }
}

impl std::fmt::Display for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.code, self.exchange.as_str())
    }
}

impl Serialize for Security {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Security {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = SmolStr::deserialize(deserializer)?;
        Security::parse(&id).map_err(serde::de::Error::custom)
    }
}

/// Instrument class of a [`Security`], used to select lot rules, tick brackets and
/// fee treatment.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityKind {
    /// Main-board share.
    Stock,
    /// STAR-market share (codes `688*`).
    Star,
    /// Convertible bond (codes `11*` Shanghai / `12*` Shenzhen).
    ConvertibleBond,
    /// Exchange-traded or listed open-ended fund.
    Fund,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_parse_and_display() {
        let security = Security::parse("000001.XSHE").unwrap();
        assert_eq!(security.code(), "000001");
        assert_eq!(security.exchange(), Exchange::Shenzhen);
        assert_eq!(security.to_string(), "000001.XSHE");

        // BSE alias normalises to the canonical BJ suffix
        let bse = Security::parse("430047.BSE").unwrap();
        assert_eq!(bse.exchange(), Exchange::Beijing);
        assert_eq!(bse.to_string(), "430047.BJ");

        assert!(Security::parse("000001").is_err());
        assert!(Security::parse("ABC.XSHE").is_err());
        assert!(Security::parse("000001.NASDAQ").is_err());
    }

    #[test]
    fn test_security_serde_as_plain_string() {
        let security = Security::parse("430047.BSE").unwrap();
        let serialised = serde_json::to_string(&security).unwrap();
        assert_eq!(serialised, "\"430047.BJ\"");

        let deserialised: Security = serde_json::from_str("\"688001.XSHG\"").unwrap();
        assert_eq!(deserialised.kind(), SecurityKind::Star);
        assert!(serde_json::from_str::<Security>("\"garbage\"").is_err());
    }

    #[test]
    fn test_security_kind_classification() {
        let cases = [
            ("600000.XSHG", SecurityKind::Stock),
            ("000001.XSHE", SecurityKind::Stock),
            ("688001.XSHG", SecurityKind::Star),
            ("113000.XSHG", SecurityKind::ConvertibleBond),
            ("123456.XSHE", SecurityKind::ConvertibleBond),
            ("510050.XSHG", SecurityKind::Fund),
            ("511880.XSHG", SecurityKind::Fund),
            ("159915.XSHE", SecurityKind::Fund),
            ("430047.BJ", SecurityKind::Stock),
        ];

        for (id, expected) in cases {
            let security = Security::parse(id).unwrap();
            assert_eq!(security.kind(), expected, "kind mismatch for {id}");
        }
    }
}
