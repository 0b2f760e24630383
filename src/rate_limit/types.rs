use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Length of a counting window. Counters expire this long after their first increment.
pub const COUNTER_WINDOW: Duration = Duration::from_secs(1);

/// Namespace for token-derived keys
pub const TOKEN_KEY_PREFIX: &str = "token:";

/// Namespace for ban markers
pub const BAN_KEY_PREFIX: &str = "ban:";

/// Identity class - which limit and key namespace a request falls into
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IdentityClass {
    /// Identified by originating network address
    Address,
    /// Identified by a presented access token
    Token,
}

impl IdentityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityClass::Address => "address",
            IdentityClass::Token => "token",
        }
    }
}

/// Who is making the request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// The class tag
    pub class: IdentityClass,
    /// The raw value (IP string or token string)
    pub value: String,
}

impl Identity {
    pub fn address(value: impl Into<String>) -> Self {
        Self {
            class: IdentityClass::Address,
            value: value.into(),
        }
    }

    pub fn token(value: impl Into<String>) -> Self {
        Self {
            class: IdentityClass::Token,
            value: value.into(),
        }
    }

    /// Derive the store key for this identity
    pub fn rate_key(&self) -> RateKey {
        match self.class {
            IdentityClass::Address => RateKey(self.value.clone()),
            IdentityClass::Token => RateKey(format!("{}{}", TOKEN_KEY_PREFIX, self.value)),
        }
    }
}

/// Store key derived from an [`Identity`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey(String);

impl RateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the ban marker that shadows this counter key
    pub fn ban_key(&self) -> String {
        format!("{}{}", BAN_KEY_PREFIX, self.0)
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-class ceilings, in requests per counting window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLimits {
    /// Ceiling for address-identified clients
    pub address: u32,
    /// Ceiling for token-identified clients
    pub token: u32,
}

impl ClassLimits {
    pub fn limit_for(&self, class: IdentityClass) -> u32 {
        match class {
            IdentityClass::Address => self.address,
            IdentityClass::Token => self.token,
        }
    }
}

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A live ban marker exists for the key
    Banned,
    /// The counter reached its ceiling on this call
    LimitExceeded,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Banned => "banned",
            RejectReason::LimitExceeded => "limit_exceeded",
        }
    }
}

/// Outcome of a rate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Rejected(RejectReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Allowed => "allowed",
            Decision::Rejected(reason) => reason.as_str(),
        }
    }
}
