use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

pub use strum::IntoEnumIterator;

/// Approval state of a badge definition with respect to its redeem-code inventory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(
    feature = "db",
    sqlx(type_name = "gitpoap_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
pub enum GitPoapStatus {
    Unapproved,
    RedeemRequestPending,
    Approved,
    Deprecated,
}

impl GitPoapStatus {
    /// Only these states can be waiting on codes from the badge platform.
    pub fn is_awaiting_codes(&self) -> bool {
        matches!(
            self,
            GitPoapStatus::Unapproved | GitPoapStatus::RedeemRequestPending
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == GitPoapStatus::Deprecated
    }

    pub fn can_transition_to(&self, next: GitPoapStatus) -> bool {
        use GitPoapStatus::*;

        if *self == next {
            return true;
        }
        match (self, next) {
            (Deprecated, _) => false,
            (_, Deprecated) => true,
            (Unapproved, Approved | RedeemRequestPending) => true,
            (RedeemRequestPending, Approved | Unapproved) => true,
            (Approved, RedeemRequestPending) => true,
            _ => false,
        }
    }
}

/// Lifecycle of a single earned badge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(
    feature = "db",
    sqlx(type_name = "claim_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
pub enum ClaimStatus {
    Unclaimed,
    Pending,
    Minting,
    Claimed,
}

impl ClaimStatus {
    /// Claims in these states are attributed to an owning address.
    pub fn is_owned(&self) -> bool {
        matches!(self, ClaimStatus::Minting | ClaimStatus::Claimed)
    }
}
