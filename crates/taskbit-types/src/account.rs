use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity handle assigned by the user registry.
///
/// The ledger never inspects the handle beyond equality and hashing. The
/// `@`-prefixed sentinels below are reserved by the platform and cannot
/// collide with registry-assigned handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The unauthenticated caller. Sensitive operations reject it.
    pub fn anonymous() -> Self {
        Self("@anonymous".to_string())
    }

    /// The outside world: sender of deposits, receiver of withdrawals.
    pub fn external() -> Self {
        Self("@external".to_string())
    }

    /// Label for funds held in escrow. Never holds a balance.
    pub fn escrow_pool() -> Self {
        Self("@escrow".to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == "@anonymous"
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_distinct() {
        assert_ne!(AccountId::anonymous(), AccountId::external());
        assert_ne!(AccountId::external(), AccountId::escrow_pool());
        assert!(AccountId::anonymous().is_anonymous());
        assert!(!AccountId::from("alice").is_anonymous());
    }

    #[test]
    fn test_equality_and_display() {
        let a = AccountId::from("alice");
        let b = AccountId::new("alice".to_string());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "alice");
    }
}
