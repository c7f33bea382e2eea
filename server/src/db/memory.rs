use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{ClaimStatus, EarnedBy, GitPoapStatus, GitPoapTier, YearWindow};
use tokio::sync::Mutex;

use super::types::{
    Claim, ClaimWithGitPoap, FeaturedItem, GitPoap, Inserted, Issue, Mention, MentionTarget,
    NewIssue, NewPullRequest, OngoingRepo, Profile, PullRequest, RedeemCode, Repo, User,
};
use super::Storage;

fn gitpoap_tier(gitpoap: &GitPoap) -> GitPoapTier {
    GitPoapTier {
        id: gitpoap.id,
        year: gitpoap.year,
        threshold: gitpoap.threshold,
        is_pr_based: gitpoap.is_pr_based,
    }
}

#[derive(Default)]
struct State {
    next_id: i32,
    projects: Vec<i32>,
    users: Vec<User>,
    repos: Vec<Repo>,
    gitpoaps: Vec<GitPoap>,
    pull_requests: Vec<PullRequest>,
    issues: Vec<Issue>,
    mentions: Vec<Mention>,
    claims: Vec<Claim>,
    redeem_codes: Vec<RedeemCode>,
    batch_timings: Vec<(String, DateTime<Utc>)>,
    profiles: Vec<Profile>,
    featured_items: Vec<FeaturedItem>,
    failing_repo_lookups: bool,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn gitpoap(&self, id: i32) -> Option<&GitPoap> {
        self.gitpoaps.iter().find(|g| g.id == id)
    }

    fn with_gitpoap(&self, claim: &Claim) -> Option<ClaimWithGitPoap> {
        self.gitpoap(claim.gitpoap_id).map(|gitpoap| ClaimWithGitPoap {
            claim: claim.clone(),
            gitpoap: gitpoap.clone(),
        })
    }

    fn contribution_created_at(&self, mention: &Mention) -> Option<DateTime<Utc>> {
        if let Some(pr_id) = mention.pull_request_id {
            return self
                .pull_requests
                .iter()
                .find(|pr| pr.id == pr_id)
                .map(|pr| pr.created_at);
        }
        let issue_id = mention.issue_id?;
        self.issues
            .iter()
            .find(|issue| issue.id == issue_id)
            .map(|issue| issue.created_at)
    }
}

/// Postgres stand-in for tests. A single lock guards all tables so every
/// insert-if-absent is atomic, matching the unique-key semantics of the schema.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_project(&self) -> i32 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.projects.push(id);
        id
    }

    pub async fn add_repo(
        &self,
        project_id: i32,
        organization: &str,
        name: &str,
        last_pr_updated_at: DateTime<Utc>,
    ) -> Repo {
        let mut state = self.state.lock().await;
        let repo = Repo {
            id: state.next_id(),
            name: name.to_string(),
            organization: organization.to_string(),
            project_id,
            last_pr_updated_at,
        };
        state.repos.push(repo.clone());
        repo
    }

    /// Inserts a badge; `id` and `poap_event_id` of the argument are ignored
    /// when zero and assigned from the shared sequence.
    pub async fn add_gitpoap(&self, mut gitpoap: GitPoap) -> GitPoap {
        let mut state = self.state.lock().await;
        gitpoap.id = state.next_id();
        if gitpoap.poap_event_id == 0 {
            gitpoap.poap_event_id = 1000 + gitpoap.id as i64;
        }
        state.gitpoaps.push(gitpoap.clone());
        gitpoap
    }

    pub async fn add_user(&self, github_id: i64, github_handle: &str) -> User {
        self.upsert_user(github_id, github_handle)
            .await
            .expect("memory storage never fails")
    }

    pub async fn add_claim(&self, mut claim: Claim) -> Claim {
        let mut state = self.state.lock().await;
        claim.id = state.next_id();
        state.claims.push(claim.clone());
        claim
    }

    pub async fn add_featured_item(&self, address: &str, token_id: &str) -> FeaturedItem {
        let profile = self
            .upsert_profile(address)
            .await
            .expect("memory storage never fails");
        let mut state = self.state.lock().await;
        let item = FeaturedItem {
            id: state.next_id(),
            profile_id: profile.id,
            poap_token_id: token_id.to_string(),
        };
        state.featured_items.push(item.clone());
        item
    }

    pub async fn add_redeem_codes(&self, gitpoap_id: i32, count: usize) {
        for i in 0..count {
            let code = format!("code-{gitpoap_id}-{i}");
            self.insert_redeem_code_if_absent(gitpoap_id, &code)
                .await
                .expect("memory storage never fails");
        }
    }

    /// Makes `project_repo_ids` fail until switched back.
    pub async fn set_failing_repo_lookups(&self, failing: bool) {
        self.state.lock().await.failing_repo_lookups = failing;
    }

    pub async fn users(&self) -> Vec<User> {
        self.state.lock().await.users.clone()
    }

    pub async fn pull_requests(&self) -> Vec<PullRequest> {
        self.state.lock().await.pull_requests.clone()
    }

    pub async fn mentions(&self) -> Vec<Mention> {
        self.state.lock().await.mentions.clone()
    }

    pub async fn claims(&self) -> Vec<Claim> {
        self.state.lock().await.claims.clone()
    }

    pub async fn all_featured_items(&self) -> Vec<FeaturedItem> {
        self.state.lock().await.featured_items.clone()
    }

    pub async fn repo(&self, repo_id: i32) -> Option<Repo> {
        self.state
            .lock()
            .await
            .repos
            .iter()
            .find(|r| r.id == repo_id)
            .cloned()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upsert_user(&self, github_id: i64, github_handle: &str) -> anyhow::Result<User> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.iter_mut().find(|u| u.github_id == github_id) {
            user.github_handle = github_handle.to_string();
            return Ok(user.clone());
        }
        let user = User {
            id: state.next_id(),
            github_id,
            github_handle: github_handle.to_string(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn ongoing_issuance_repos(&self) -> anyhow::Result<Vec<OngoingRepo>> {
        let state = self.state.lock().await;
        let mut repos: Vec<OngoingRepo> = state
            .repos
            .iter()
            .map(|repo| OngoingRepo {
                repo: repo.clone(),
                tiers: state
                    .gitpoaps
                    .iter()
                    .filter(|g| {
                        g.project_id == repo.project_id
                            && g.is_ongoing
                            && g.is_pr_based
                            && g.status != GitPoapStatus::Deprecated
                    })
                    .map(gitpoap_tier)
                    .collect(),
            })
            .filter(|repo| !repo.tiers.is_empty())
            .collect();
        repos.sort_by_key(|r| r.repo.id);
        for repo in repos.iter_mut() {
            repo.tiers.sort_by_key(|t| (t.year, t.threshold));
        }
        Ok(repos)
    }

    async fn get_repo(&self, repo_id: i32) -> anyhow::Result<Option<Repo>> {
        Ok(self.repo(repo_id).await)
    }

    async fn get_repo_by_name(
        &self,
        organization: &str,
        name: &str,
    ) -> anyhow::Result<Option<Repo>> {
        let state = self.state.lock().await;
        Ok(state
            .repos
            .iter()
            .find(|r| {
                r.organization.eq_ignore_ascii_case(organization)
                    && r.name.eq_ignore_ascii_case(name)
            })
            .cloned())
    }

    async fn project_repo_ids(&self, project_id: i32) -> anyhow::Result<Vec<i32>> {
        let state = self.state.lock().await;
        if state.failing_repo_lookups {
            anyhow::bail!("connection reset while listing repos of project ID {project_id}");
        }
        Ok(state
            .repos
            .iter()
            .filter(|r| r.project_id == project_id)
            .map(|r| r.id)
            .collect())
    }

    async fn project_tiers(&self, project_id: i32) -> anyhow::Result<Vec<GitPoapTier>> {
        let state = self.state.lock().await;
        let mut tiers: Vec<GitPoapTier> = state
            .gitpoaps
            .iter()
            .filter(|g| g.project_id == project_id && g.status != GitPoapStatus::Deprecated)
            .map(gitpoap_tier)
            .collect();
        tiers.sort_by_key(|t| (t.year, t.threshold));
        Ok(tiers)
    }

    async fn update_repo_after_scan(
        &self,
        repo_id: i32,
        last_pr_updated_at: DateTime<Utc>,
        name: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if let Some(repo) = state.repos.iter_mut().find(|r| r.id == repo_id) {
            repo.last_pr_updated_at = repo.last_pr_updated_at.max(last_pr_updated_at);
            if let Some(name) = name {
                repo.name = name.to_string();
            }
        }
        Ok(())
    }

    async fn upsert_pull_request(&self, pr: &NewPullRequest) -> anyhow::Result<PullRequest> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .pull_requests
            .iter_mut()
            .find(|p| p.repo_id == pr.repo_id && p.number == pr.number)
        {
            existing.title = pr.title.clone();
            if pr.merged_at.is_some() {
                existing.merged_at = pr.merged_at;
            }
            if pr.merge_commit_sha.is_some() {
                existing.merge_commit_sha = pr.merge_commit_sha.clone();
            }
            return Ok(existing.clone());
        }
        let record = PullRequest {
            id: state.next_id(),
            repo_id: pr.repo_id,
            number: pr.number,
            title: pr.title.clone(),
            user_id: pr.user_id,
            created_at: pr.created_at,
            merged_at: pr.merged_at,
            merge_commit_sha: pr.merge_commit_sha.clone(),
        };
        state.pull_requests.push(record.clone());
        Ok(record)
    }

    async fn get_pull_request(&self, id: i32) -> anyhow::Result<Option<PullRequest>> {
        let state = self.state.lock().await;
        Ok(state.pull_requests.iter().find(|p| p.id == id).cloned())
    }

    async fn upsert_issue(&self, issue: &NewIssue) -> anyhow::Result<Issue> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .issues
            .iter_mut()
            .find(|i| i.repo_id == issue.repo_id && i.number == issue.number)
        {
            existing.title = issue.title.clone();
            if issue.closed_at.is_some() {
                existing.closed_at = issue.closed_at;
            }
            return Ok(existing.clone());
        }
        let record = Issue {
            id: state.next_id(),
            repo_id: issue.repo_id,
            number: issue.number,
            title: issue.title.clone(),
            user_id: issue.user_id,
            created_at: issue.created_at,
            closed_at: issue.closed_at,
        };
        state.issues.push(record.clone());
        Ok(record)
    }

    async fn upsert_mention(
        &self,
        repo_id: i32,
        user_id: i32,
        target: MentionTarget,
    ) -> anyhow::Result<Mention> {
        let (pull_request_id, issue_id) = match target {
            MentionTarget::PullRequest(id) => (Some(id), None),
            MentionTarget::Issue(id) => (None, Some(id)),
        };
        let mut state = self.state.lock().await;
        if let Some(existing) = state.mentions.iter().find(|m| {
            m.repo_id == repo_id
                && m.user_id == user_id
                && m.pull_request_id == pull_request_id
                && m.issue_id == issue_id
        }) {
            return Ok(existing.clone());
        }
        let mention = Mention {
            id: state.next_id(),
            repo_id,
            user_id,
            pull_request_id,
            issue_id,
            mentioned_at: Utc::now(),
        };
        state.mentions.push(mention.clone());
        Ok(mention)
    }

    async fn count_merged_pull_requests(
        &self,
        user_id: i32,
        repo_ids: &[i32],
        window: &YearWindow,
    ) -> anyhow::Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .pull_requests
            .iter()
            .filter(|pr| {
                pr.user_id == user_id
                    && repo_ids.contains(&pr.repo_id)
                    && pr.merged_at.map_or(false, |at| window.contains(&at))
            })
            .count() as i64)
    }

    async fn count_mentions(
        &self,
        user_id: i32,
        repo_ids: &[i32],
        window: &YearWindow,
    ) -> anyhow::Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .mentions
            .iter()
            .filter(|m| m.user_id == user_id && repo_ids.contains(&m.repo_id))
            .filter(|m| {
                state
                    .contribution_created_at(m)
                    .map_or(false, |at| window.contains(&at))
            })
            .count() as i64)
    }

    async fn insert_claim_if_absent(
        &self,
        gitpoap_id: i32,
        user_id: i32,
        earned_by: Option<EarnedBy>,
    ) -> anyhow::Result<Inserted<Claim>> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .claims
            .iter()
            .find(|c| c.gitpoap_id == gitpoap_id && c.user_id == user_id)
        {
            return Ok(Inserted {
                record: existing.clone(),
                created: false,
            });
        }
        let claim = Claim {
            id: state.next_id(),
            gitpoap_id,
            user_id,
            status: ClaimStatus::Unclaimed,
            address: None,
            poap_token_id: None,
            pull_request_earned_id: earned_by.and_then(|e| e.pull_request_id()),
            mention_earned_id: earned_by.and_then(|e| e.mention_id()),
            created_at: Utc::now(),
        };
        state.claims.push(claim.clone());
        Ok(Inserted {
            record: claim,
            created: true,
        })
    }

    async fn backfill_claim_pull_request(
        &self,
        gitpoap_id: i32,
        user_id: i32,
        pull_request_id: i32,
    ) -> anyhow::Result<bool> {
        let mut state = self.state.lock().await;
        match state.claims.iter_mut().find(|c| {
            c.gitpoap_id == gitpoap_id
                && c.user_id == user_id
                && c.pull_request_earned_id.is_none()
                && c.mention_earned_id.is_none()
        }) {
            Some(claim) => {
                claim.pull_request_earned_id = Some(pull_request_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_claim(&self, claim_id: i32) -> anyhow::Result<Option<Claim>> {
        let state = self.state.lock().await;
        Ok(state.claims.iter().find(|c| c.id == claim_id).cloned())
    }

    async fn owned_claims(&self, address: &str) -> anyhow::Result<Vec<ClaimWithGitPoap>> {
        let state = self.state.lock().await;
        Ok(state
            .claims
            .iter()
            .filter(|c| c.address.as_deref() == Some(address) && c.status.is_owned())
            .filter_map(|c| state.with_gitpoap(c))
            .collect())
    }

    async fn find_claim_by_token(
        &self,
        token_id: &str,
    ) -> anyhow::Result<Option<ClaimWithGitPoap>> {
        let state = self.state.lock().await;
        Ok(state
            .claims
            .iter()
            .find(|c| c.poap_token_id.as_deref() == Some(token_id))
            .and_then(|c| state.with_gitpoap(c)))
    }

    async fn update_claim_address(&self, claim_id: i32, address: &str) -> anyhow::Result<Claim> {
        let mut state = self.state.lock().await;
        let claim = state
            .claims
            .iter_mut()
            .find(|c| c.id == claim_id)
            .ok_or_else(|| anyhow::anyhow!("Claim ID {claim_id} not found"))?;
        claim.address = Some(address.to_string());
        Ok(claim.clone())
    }

    async fn claims_created_by_pull_request(
        &self,
        pull_request: &PullRequest,
        project_id: i32,
        year: i32,
    ) -> anyhow::Result<Vec<Claim>> {
        let state = self.state.lock().await;
        Ok(state
            .claims
            .iter()
            .filter(|c| {
                let Some(gitpoap) = state.gitpoap(c.gitpoap_id) else {
                    return false;
                };
                if gitpoap.status == GitPoapStatus::Deprecated {
                    return false;
                }
                c.pull_request_earned_id == Some(pull_request.id)
                    || (gitpoap.project_id == project_id
                        && gitpoap.year == year
                        && c.user_id == pull_request.user_id
                        && c.status == ClaimStatus::Unclaimed)
            })
            .cloned()
            .collect())
    }

    async fn get_gitpoap(&self, id: i32) -> anyhow::Result<Option<GitPoap>> {
        Ok(self.state.lock().await.gitpoap(id).cloned())
    }

    async fn gitpoaps_awaiting_codes(&self) -> anyhow::Result<Vec<GitPoap>> {
        let state = self.state.lock().await;
        Ok(state
            .gitpoaps
            .iter()
            .filter(|g| g.status.is_awaiting_codes())
            .cloned()
            .collect())
    }

    async fn set_gitpoap_status(&self, id: i32, status: GitPoapStatus) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if let Some(gitpoap) = state
            .gitpoaps
            .iter_mut()
            .find(|g| g.id == id && g.status != GitPoapStatus::Deprecated)
        {
            gitpoap.status = status;
        }
        Ok(())
    }

    async fn deprecate_gitpoap(&self, id: i32) -> anyhow::Result<u64> {
        let mut state = self.state.lock().await;
        if let Some(gitpoap) = state.gitpoaps.iter_mut().find(|g| g.id == id) {
            gitpoap.status = GitPoapStatus::Deprecated;
        }
        let before = state.claims.len();
        state
            .claims
            .retain(|c| !(c.gitpoap_id == id && c.status == ClaimStatus::Unclaimed));
        Ok((before - state.claims.len()) as u64)
    }

    async fn known_event_ids(&self) -> anyhow::Result<HashSet<i64>> {
        let state = self.state.lock().await;
        Ok(state.gitpoaps.iter().map(|g| g.poap_event_id).collect())
    }

    async fn count_redeem_codes(&self, gitpoap_id: i32) -> anyhow::Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .redeem_codes
            .iter()
            .filter(|c| c.gitpoap_id == gitpoap_id)
            .count() as i64)
    }

    async fn insert_redeem_code_if_absent(
        &self,
        gitpoap_id: i32,
        code: &str,
    ) -> anyhow::Result<bool> {
        let mut state = self.state.lock().await;
        if state
            .redeem_codes
            .iter()
            .any(|c| c.gitpoap_id == gitpoap_id && c.code == code)
        {
            return Ok(false);
        }
        let id = state.next_id();
        state.redeem_codes.push(RedeemCode {
            id,
            gitpoap_id,
            code: code.to_string(),
        });
        Ok(true)
    }

    async fn first_redeem_code(&self, gitpoap_id: i32) -> anyhow::Result<Option<RedeemCode>> {
        let state = self.state.lock().await;
        Ok(state
            .redeem_codes
            .iter()
            .find(|c| c.gitpoap_id == gitpoap_id)
            .cloned())
    }

    async fn delete_redeem_code(&self, id: i32) -> anyhow::Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.redeem_codes.len();
        state.redeem_codes.retain(|c| c.id != id);
        Ok(state.redeem_codes.len() < before)
    }

    async fn last_run(&self, name: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        let state = self.state.lock().await;
        Ok(state
            .batch_timings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, at)| *at))
    }

    async fn set_last_run(&self, name: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        match state.batch_timings.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = at,
            None => state.batch_timings.push((name.to_string(), at)),
        }
        Ok(())
    }

    async fn upsert_profile(&self, address: &str) -> anyhow::Result<Profile> {
        let mut state = self.state.lock().await;
        if let Some(profile) = state.profiles.iter().find(|p| p.address == address) {
            return Ok(profile.clone());
        }
        let profile = Profile {
            id: state.next_id(),
            address: address.to_string(),
        };
        state.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn featured_items(&self, address: &str) -> anyhow::Result<Vec<FeaturedItem>> {
        let state = self.state.lock().await;
        let Some(profile) = state.profiles.iter().find(|p| p.address == address) else {
            return Ok(vec![]);
        };
        Ok(state
            .featured_items
            .iter()
            .filter(|f| f.profile_id == profile.id)
            .cloned()
            .collect())
    }

    async fn delete_featured_item(&self, id: i32) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.featured_items.retain(|f| f.id != id);
        Ok(())
    }

    async fn delete_featured_for_token(
        &self,
        address: &str,
        token_id: &str,
    ) -> anyhow::Result<u64> {
        let mut state = self.state.lock().await;
        let Some(profile_id) = state
            .profiles
            .iter()
            .find(|p| p.address == address)
            .map(|p| p.id)
        else {
            return Ok(0);
        };
        let before = state.featured_items.len();
        state
            .featured_items
            .retain(|f| !(f.profile_id == profile_id && f.poap_token_id == token_id));
        Ok((before - state.featured_items.len()) as u64)
    }
}
