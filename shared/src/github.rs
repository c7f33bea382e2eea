use chrono::{DateTime, Utc};

const BOT_ACCOUNT_TYPE: &str = "Bot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: i64,
    pub login: String,
    pub account_type: String,
}

impl Author {
    pub fn new(id: i64, login: impl Into<String>, account_type: impl Into<String>) -> Self {
        Self {
            id,
            login: login.into(),
            account_type: account_type.into(),
        }
    }

    // Bots never earn badges
    pub fn is_bot(&self) -> bool {
        self.account_type == BOT_ACCOUNT_TYPE
    }
}

impl From<octocrab::models::Author> for Author {
    fn from(author: octocrab::models::Author) -> Self {
        Self {
            id: author.id.0 as i64,
            login: author.login,
            account_type: author.r#type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl From<SortDirection> for octocrab::params::Direction {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Ascending => octocrab::params::Direction::Ascending,
            SortDirection::Descending => octocrab::params::Direction::Descending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PullRequestData {
    pub number: u64,
    pub title: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
    pub head_ref: String,
    /// Name of the base repository as currently reported upstream.
    pub repo_name: Option<String>,
}

impl PullRequestData {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }

    /// The merge commit is only meaningful once the PR has been merged.
    pub fn merge_commit(&self) -> Option<&str> {
        self.merged_at?;
        self.merge_commit_sha.as_deref()
    }
}

impl TryFrom<octocrab::models::pulls::PullRequest> for PullRequestData {
    type Error = anyhow::Error;

    fn try_from(pr: octocrab::models::pulls::PullRequest) -> anyhow::Result<Self> {
        let repo_name = pr.base.repo.as_ref().map(|repo| repo.name.clone());

        if let (Some(user), Some(created_at), Some(updated_at)) =
            (pr.user, pr.created_at, pr.updated_at)
        {
            Ok(Self {
                number: pr.number,
                title: pr.title.unwrap_or_default(),
                author: (*user).into(),
                created_at,
                updated_at,
                merged_at: pr.merged_at,
                merge_commit_sha: pr.merge_commit_sha,
                head_ref: pr.head.ref_field,
                repo_name,
            })
        } else {
            Err(anyhow::anyhow!(
                "Pull request #{} is missing required fields",
                pr.number
            ))
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssueData {
    pub number: u64,
    pub title: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<octocrab::models::issues::Issue> for IssueData {
    fn from(issue: octocrab::models::issues::Issue) -> Self {
        Self {
            number: issue.number,
            title: issue.title,
            author: issue.user.into(),
            created_at: issue.created_at,
            closed_at: issue.closed_at,
        }
    }
}
