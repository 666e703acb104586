use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address must be 40 hex digits (optionally 0x-prefixed), got {0} characters")]
    InvalidLength(usize),
    #[error("address contains non-hex characters: {0}")]
    InvalidHex(String),
}

/// EIP-55 checksummed account address. Equality is over the canonical form,
/// so any input casing of the same account compares equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountAddress(String);

impl AccountAddress {
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if hex.len() != 40 {
            return Err(AddressError::InvalidLength(hex.len()));
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidHex(trimmed.to_string()));
        }
        Ok(Self(to_checksum(&hex.to_ascii_lowercase())))
    }

    /// Checksummed form, e.g. `0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase `0x…` form, used when comparing against upstream payloads.
    pub fn to_lowercase_hex(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Case-insensitive comparison against a raw upstream address string.
    pub fn matches(&self, raw: &str) -> bool {
        raw.eq_ignore_ascii_case(&self.0)
    }
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// `lower_hex` is 40 lowercase hex chars without prefix.
fn to_checksum(lower_hex: &str) -> String {
    let hash = keccak256(lower_hex.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower_hex.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for AccountAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AccountAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// The six behavioral dimensions, in scoring-table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    DistinctContractCount,
    DexPlatformDiversity,
    AvgTokenHoldingPeriod,
    TransactionFrequency,
    DexVolumeUsd,
    NftCollectionsDiversity,
}

impl Metric {
    pub const ALL: [Self; 6] = [
        Self::DistinctContractCount,
        Self::DexPlatformDiversity,
        Self::AvgTokenHoldingPeriod,
        Self::TransactionFrequency,
        Self::DexVolumeUsd,
        Self::NftCollectionsDiversity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DistinctContractCount => "distinct_contract_count",
            Self::DexPlatformDiversity => "dex_platform_diversity",
            Self::AvgTokenHoldingPeriod => "avg_token_holding_period",
            Self::TransactionFrequency => "transaction_frequency",
            Self::DexVolumeUsd => "dex_volume_usd",
            Self::NftCollectionsDiversity => "nft_collections_diversity",
        }
    }

    pub fn percentile_column(&self) -> &'static str {
        match self {
            Self::DistinctContractCount => "distinct_contract_count_percentile",
            Self::DexPlatformDiversity => "dex_platform_diversity_percentile",
            Self::AvgTokenHoldingPeriod => "avg_token_holding_period_percentile",
            Self::TransactionFrequency => "transaction_frequency_percentile",
            Self::DexVolumeUsd => "dex_volume_usd_percentile",
            Self::NftCollectionsDiversity => "nft_collections_diversity_percentile",
        }
    }
}

/// Six-dimensional behavior vector. All fields are finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricVector {
    #[serde(default)]
    pub distinct_contract_count: u32,
    #[serde(default)]
    pub dex_platform_diversity: u32,
    #[serde(default)]
    pub avg_token_holding_period: f64,
    #[serde(default)]
    pub transaction_frequency: f64,
    #[serde(default)]
    pub dex_volume_usd: f64,
    #[serde(default)]
    pub nft_collections_diversity: u32,
}

impl MetricVector {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::DistinctContractCount => f64::from(self.distinct_contract_count),
            Metric::DexPlatformDiversity => f64::from(self.dex_platform_diversity),
            Metric::AvgTokenHoldingPeriod => self.avg_token_holding_period,
            Metric::TransactionFrequency => self.transaction_frequency,
            Metric::DexVolumeUsd => self.dex_volume_usd,
            Metric::NftCollectionsDiversity => f64::from(self.nft_collections_diversity),
        }
    }

    /// Replace non-finite or negative reals with 0.
    pub fn sanitized(mut self) -> Self {
        for v in [
            &mut self.avg_token_holding_period,
            &mut self.transaction_frequency,
            &mut self.dex_volume_usd,
        ] {
            if !v.is_finite() || *v < 0.0 {
                *v = 0.0;
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Archetype {
    Explorer,
    Diamond,
    Whale,
    Degen,
}

impl Archetype {
    pub const ALL: [Self; 4] = [Self::Explorer, Self::Diamond, Self::Whale, Self::Degen];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explorer => "Explorer",
            Self::Diamond => "Diamond",
            Self::Whale => "Whale",
            Self::Degen => "Degen",
        }
    }
}

impl FromStr for Archetype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown archetype: {s}"))
    }
}

/// Top-two archetype label, rendered as `First_Second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub primary: Archetype,
    pub secondary: Archetype,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.primary.as_str(), self.secondary.as_str())
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('_')
            .ok_or_else(|| format!("invalid persona label: {s} (expected First_Second)"))?;
        let primary: Archetype = a.parse()?;
        let secondary: Archetype = b.parse()?;
        if primary == secondary {
            return Err(format!("invalid persona label: {s} (archetypes must differ)"));
        }
        Ok(Self { primary, secondary })
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
