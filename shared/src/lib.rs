use serde::{Deserialize, Serialize};

mod status;
mod year;

pub mod poap;

#[cfg(feature = "github")]
pub mod github;

#[cfg(feature = "client")]
pub mod telegram;

pub use status::*;
pub use year::*;

pub type GithubHandle = String;

/// Ethereum addresses are compared and stored lowercased.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// A single badge tier as seen by the claim ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitPoapTier {
    pub id: i32,
    pub year: i32,
    pub threshold: i32,
    pub is_pr_based: bool,
}

/// What earned a claim. Set once when the claim row is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EarnedBy {
    PullRequest(i32),
    Mention(i32),
}

impl EarnedBy {
    pub fn pull_request_id(&self) -> Option<i32> {
        match self {
            EarnedBy::PullRequest(id) => Some(*id),
            EarnedBy::Mention(_) => None,
        }
    }

    pub fn mention_id(&self) -> Option<i32> {
        match self {
            EarnedBy::Mention(id) => Some(*id),
            EarnedBy::PullRequest(_) => None,
        }
    }
}
