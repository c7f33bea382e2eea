use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{ClaimStatus, EarnedBy, GitPoapStatus, GitPoapTier};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub github_id: i64,
    pub github_handle: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repo {
    pub id: i32,
    pub name: String,
    pub organization: String,
    pub project_id: i32,
    pub last_pr_updated_at: DateTime<Utc>,
}

impl Repo {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.organization, self.name)
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitPoap {
    pub id: i32,
    pub project_id: i32,
    pub name: String,
    pub year: i32,
    pub threshold: i32,
    pub is_pr_based: bool,
    pub is_ongoing: bool,
    pub status: GitPoapStatus,
    pub poap_event_id: i64,
    pub poap_secret: String,
}

/// A repo tracked by the ongoing issuance scheduler together with its live tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OngoingRepo {
    pub repo: Repo,
    pub tiers: Vec<GitPoapTier>,
}

impl OngoingRepo {
    /// Latest award year among the ongoing tiers.
    pub fn tracked_year(&self) -> Option<i32> {
        self.tiers.iter().map(|tier| tier.year).max()
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullRequest {
    pub id: i32,
    pub repo_id: i32,
    pub number: i32,
    pub title: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub repo_id: i32,
    pub number: i32,
    pub title: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub id: i32,
    pub repo_id: i32,
    pub number: i32,
    pub title: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub repo_id: i32,
    pub number: i32,
    pub title: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mention {
    pub id: i32,
    pub repo_id: i32,
    pub user_id: i32,
    pub pull_request_id: Option<i32>,
    pub issue_id: Option<i32>,
    pub mentioned_at: DateTime<Utc>,
}

/// The PR or issue a mention points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionTarget {
    PullRequest(i32),
    Issue(i32),
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    pub id: i32,
    pub gitpoap_id: i32,
    pub user_id: i32,
    pub status: ClaimStatus,
    pub address: Option<String>,
    pub poap_token_id: Option<String>,
    pub pull_request_earned_id: Option<i32>,
    pub mention_earned_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Claim {
    pub fn earned_by(&self) -> Option<EarnedBy> {
        self.pull_request_earned_id
            .map(EarnedBy::PullRequest)
            .or(self.mention_earned_id.map(EarnedBy::Mention))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimWithGitPoap {
    pub claim: Claim,
    pub gitpoap: GitPoap,
}

/// Result of an insert-if-absent: the stored row and whether this call created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inserted<T> {
    pub record: T,
    pub created: bool,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedeemCode {
    pub id: i32,
    pub gitpoap_id: i32,
    pub code: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: i32,
    pub address: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeaturedItem {
    pub id: i32,
    pub profile_id: i32,
    pub poap_token_id: String,
}
