use serde::{Deserialize, Serialize};

/// Logical category of requested data.
///
/// Keys the provider table and scopes circuit breakers: each data type
/// is an independent failure domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Fund,
    Stock,
    Bond,
    Commodity,
    Crypto,
    News,
    Sector,
    Index,
    Forex,
}

impl DataType {
    /// All data types, in declaration order.
    pub const ALL: [DataType; 9] = [
        DataType::Fund,
        DataType::Stock,
        DataType::Bond,
        DataType::Commodity,
        DataType::Crypto,
        DataType::News,
        DataType::Sector,
        DataType::Index,
        DataType::Forex,
    ];

    /// Returns the string representation used for breaker keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Fund => "fund",
            DataType::Stock => "stock",
            DataType::Bond => "bond",
            DataType::Commodity => "commodity",
            DataType::Crypto => "crypto",
            DataType::News => "news",
            DataType::Sector => "sector",
            DataType::Index => "index",
            DataType::Forex => "forex",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown data type '{}'", s))
    }
}

/// Caller-declared urgency of a request.
///
/// Ordered from lowest to highest. `High` and above may be served by
/// hot-backup racing when the gateway enables it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}
