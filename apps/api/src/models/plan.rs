use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Subscription tier. Variant order is the access order: free is lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Basic,
    Premium,
    Vip,
}

impl Plan {
    pub const fn rank(self) -> u8 {
        match self {
            Self::Free => 0,
            Self::Basic => 1,
            Self::Premium => 2,
            Self::Vip => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Premium => "premium",
            Self::Vip => "vip",
        }
    }

    /// Plans that the manual upgrade endpoint may grant.
    pub const fn is_manually_upgradable(self) -> bool {
        matches!(self, Self::Premium | Self::Vip)
    }

    /// Plans a template may require. Templates are never gated on `basic`.
    pub const fn is_template_tier(self) -> bool {
        matches!(self, Self::Free | Self::Premium | Self::Vip)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Plan {
    type Err = PlanParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            "vip" => Ok(Self::Vip),
            _ => Err(PlanParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("unrecognized plan '{0}'")]
pub struct PlanParseError(pub String);
