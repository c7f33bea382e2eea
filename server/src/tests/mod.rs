//! Scenario tests over in-memory storage and scripted platform fakes.


use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use shared::github::{Author, IssueData, PullRequestData, SortDirection};
use shared::poap::{PoapEvent, PoapToken, QrClaimInfo, RedeemedPoap};
use shared::{ClaimStatus, GitPoapStatus};

use crate::api::{BadgePlatform, Notifier, PullRequestPage, SourceHost};
use crate::clock::MockClock;
use crate::config::ScheduleConfig;
use crate::context::Context;
use crate::db::memory::MemoryStorage;
use crate::db::types::{Claim, GitPoap};
use crate::metrics::Metrics;
use crate::tasks::TaskQueue;

pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn user(id: i64, login: &str) -> Author {
    Author::new(id, login, "User")
}

pub fn bot(id: i64, login: &str) -> Author {
    Author::new(id, login, "Bot")
}

pub fn merged_pr(
    number: u64,
    author: &Author,
    merged_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> PullRequestData {
    PullRequestData {
        number,
        title: format!("PR #{number}"),
        author: author.clone(),
        created_at: merged_at - chrono::Duration::days(1),
        updated_at,
        merged_at: Some(merged_at),
        merge_commit_sha: Some(format!("sha{number}")),
        head_ref: format!("branch-{number}"),
        repo_name: None,
    }
}

pub fn closed_pr(number: u64, author: &Author, updated_at: DateTime<Utc>) -> PullRequestData {
    PullRequestData {
        merged_at: None,
        merge_commit_sha: None,
        ..merged_pr(number, author, updated_at, updated_at)
    }
}

pub fn gitpoap(project_id: i32, year: i32, threshold: i32) -> GitPoap {
    GitPoap {
        id: 0,
        project_id,
        name: format!("GitPOAP: {year} Contributor"),
        year,
        threshold,
        is_pr_based: true,
        is_ongoing: true,
        status: GitPoapStatus::Approved,
        poap_event_id: 0,
        poap_secret: "secret".to_string(),
    }
}

pub fn claim(gitpoap_id: i32, user_id: i32, status: ClaimStatus) -> Claim {
    Claim {
        id: 0,
        gitpoap_id,
        user_id,
        status,
        address: None,
        poap_token_id: None,
        pull_request_earned_id: None,
        mention_earned_id: None,
        created_at: date(2022, 1, 1),
    }
}

pub fn event(id: i64) -> PoapEvent {
    PoapEvent {
        id,
        fancy_id: format!("event-{id}"),
        name: format!("Event {id}"),
        event_url: String::new(),
        image_url: String::new(),
        description: String::new(),
        year: 2022,
        start_date: String::new(),
        end_date: String::new(),
        expiry_date: String::new(),
        supply: None,
    }
}

pub fn token(token_id: &str, owner: &str, event_id: i64) -> PoapToken {
    PoapToken {
        token_id: token_id.to_string(),
        owner: owner.to_string(),
        chain: "xdai".to_string(),
        created: String::new(),
        event: event(event_id),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCall {
    pub repo: String,
    pub page: u32,
    pub direction: SortDirection,
}

/// Source host serving pull requests from an in-memory list.
#[derive(Default)]
pub struct FakeSourceHost {
    pulls: Mutex<HashMap<String, Vec<PullRequestData>>>,
    issues: Mutex<HashMap<(String, u64), IssueData>>,
    users: Mutex<HashMap<i64, Author>>,
    admins: Mutex<HashMap<String, Vec<Author>>>,
    unreadable: Mutex<HashSet<(String, u64)>>,
    failing: Mutex<bool>,
    calls: Mutex<Vec<ListCall>>,
}

impl FakeSourceHost {
    pub fn add_pull(&self, org: &str, repo: &str, pr: PullRequestData) {
        self.users
            .lock()
            .unwrap()
            .insert(pr.author.id, pr.author.clone());
        self.pulls
            .lock()
            .unwrap()
            .entry(format!("{org}/{repo}"))
            .or_default()
            .push(pr);
    }

    pub fn add_issue(&self, org: &str, repo: &str, issue: IssueData) {
        self.users
            .lock()
            .unwrap()
            .insert(issue.author.id, issue.author.clone());
        self.issues
            .lock()
            .unwrap()
            .insert((format!("{org}/{repo}"), issue.number), issue);
    }

    pub fn add_admin(&self, org: &str, admin: Author) {
        self.admins
            .lock()
            .unwrap()
            .entry(org.to_string())
            .or_default()
            .push(admin);
    }

    /// Keeps the PR on its page but drops it from the converted listing, like
    /// a record with a missing author.
    pub fn mark_unreadable(&self, org: &str, repo: &str, number: u64) {
        self.unreadable
            .lock()
            .unwrap()
            .insert((format!("{org}/{repo}"), number));
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn calls(&self) -> Vec<ListCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl SourceHost for FakeSourceHost {
    async fn list_closed_pull_requests(
        &self,
        org: &str,
        repo: &str,
        page_size: u8,
        page: u32,
        direction: SortDirection,
    ) -> anyhow::Result<PullRequestPage> {
        let key = format!("{org}/{repo}");
        self.calls.lock().unwrap().push(ListCall {
            repo: key.clone(),
            page,
            direction,
        });
        if *self.failing.lock().unwrap() {
            anyhow::bail!("API rate limit exceeded");
        }

        let mut pulls = self
            .pulls
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default();
        pulls.sort_by_key(|pr| pr.updated_at);
        if direction == SortDirection::Descending {
            pulls.reverse();
        }
        let page_size = page_size as usize;
        let items: Vec<PullRequestData> = pulls
            .into_iter()
            .skip((page as usize - 1) * page_size)
            .take(page_size)
            .collect();

        let unreadable = self.unreadable.lock().unwrap();
        let fetched = items.len();
        let pulls = items
            .into_iter()
            .filter(|pr| !unreadable.contains(&(key.clone(), pr.number)))
            .collect();
        Ok(PullRequestPage { pulls, fetched })
    }

    async fn get_pull_request(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<Option<PullRequestData>> {
        Ok(self
            .pulls
            .lock()
            .unwrap()
            .get(&format!("{org}/{repo}"))
            .and_then(|pulls| pulls.iter().find(|pr| pr.number == number).cloned()))
    }

    async fn get_issue(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<Option<IssueData>> {
        Ok(self
            .issues
            .lock()
            .unwrap()
            .get(&(format!("{org}/{repo}"), number))
            .cloned())
    }

    async fn get_user_by_id(&self, github_id: i64) -> anyhow::Result<Option<Author>> {
        Ok(self.users.lock().unwrap().get(&github_id).cloned())
    }

    async fn list_org_admins(&self, org: &str) -> anyhow::Result<Vec<Author>> {
        Ok(self
            .admins
            .lock()
            .unwrap()
            .get(org)
            .cloned()
            .unwrap_or_default())
    }
}

/// Badge platform with scripted inventories and token owners.
#[derive(Default)]
pub struct FakeBadgePlatform {
    unused_codes: Mutex<HashMap<i64, Vec<String>>>,
    claimed_codes: Mutex<HashSet<String>>,
    holder_tokens: Mutex<HashMap<String, Vec<PoapToken>>>,
    tokens: Mutex<HashMap<String, PoapToken>>,
    events: Mutex<HashMap<i64, PoapEvent>>,
    unreachable: Mutex<bool>,
    reject_code_requests: Mutex<bool>,
    code_requests: Mutex<Vec<(i64, u32)>>,
    cleared_tokens: Mutex<Vec<String>>,
}

impl FakeBadgePlatform {
    pub fn set_unused_codes(&self, event_id: i64, codes: &[&str]) {
        self.unused_codes
            .lock()
            .unwrap()
            .insert(event_id, codes.iter().map(ToString::to_string).collect());
    }

    pub fn mark_claimed(&self, code: &str) {
        self.claimed_codes.lock().unwrap().insert(code.to_string());
    }

    pub fn set_holder_tokens(&self, address: &str, tokens: Vec<PoapToken>) {
        for token in &tokens {
            self.set_token(token.clone());
        }
        self.holder_tokens
            .lock()
            .unwrap()
            .insert(address.to_string(), tokens);
    }

    pub fn set_token(&self, token: PoapToken) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.token_id.clone(), token);
    }

    pub fn add_event(&self, event: PoapEvent) {
        self.events.lock().unwrap().insert(event.id, event);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    pub fn reject_code_requests(&self) {
        *self.reject_code_requests.lock().unwrap() = true;
    }

    pub fn code_requests(&self) -> Vec<(i64, u32)> {
        self.code_requests.lock().unwrap().clone()
    }

    pub fn cleared_tokens(&self) -> Vec<String> {
        self.cleared_tokens.lock().unwrap().clone()
    }

    fn reachable(&self) -> bool {
        !*self.unreachable.lock().unwrap()
    }
}

#[async_trait]
impl BadgePlatform for FakeBadgePlatform {
    async fn unused_codes(&self, event_id: i64, _secret: &str) -> Option<Vec<String>> {
        if !self.reachable() {
            return None;
        }
        Some(
            self.unused_codes
                .lock()
                .unwrap()
                .get(&event_id)
                .cloned()
                .unwrap_or_default(),
        )
    }

    async fn holder_tokens(&self, address: &str) -> Option<Vec<PoapToken>> {
        if !self.reachable() {
            return None;
        }
        Some(
            self.holder_tokens
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .unwrap_or_default(),
        )
    }

    async fn event_info(&self, event_id: i64) -> Option<PoapEvent> {
        self.events.lock().unwrap().get(&event_id).cloned()
    }

    async fn token_info(&self, token_id: &str) -> Option<PoapToken> {
        self.tokens.lock().unwrap().get(token_id).cloned()
    }

    async fn clear_token_cache(&self, token_id: &str) {
        self.cleared_tokens
            .lock()
            .unwrap()
            .push(token_id.to_string());
    }

    async fn claim_info(&self, qr_hash: &str) -> Option<QrClaimInfo> {
        let claimed = self.claimed_codes.lock().unwrap().contains(qr_hash);
        let unused = self
            .unused_codes
            .lock()
            .unwrap()
            .values()
            .any(|codes| codes.iter().any(|code| code == qr_hash));
        if !claimed && !unused {
            return None;
        }
        Some(QrClaimInfo {
            id: None,
            qr_hash: qr_hash.to_string(),
            claimed,
            secret: "minting-secret".to_string(),
            tx_status: None,
            result: None,
        })
    }

    async fn redeem(&self, _address: &str, qr_hash: &str) -> Option<RedeemedPoap> {
        self.mark_claimed(qr_hash);
        Some(RedeemedPoap {
            qr_hash: qr_hash.to_string(),
            token_id: None,
        })
    }

    async fn request_codes(&self, event_id: i64, _secret: &str, count: u32) -> bool {
        self.code_requests.lock().unwrap().push((event_id, count));
        !*self.reject_code_requests.lock().unwrap()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    approved: Mutex<Vec<i32>>,
}

impl RecordingNotifier {
    pub fn approved(&self) -> Vec<i32> {
        self.approved.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn gitpoap_approved(&self, gitpoap: &GitPoap) -> anyhow::Result<()> {
        self.approved.lock().unwrap().push(gitpoap.id);
        Ok(())
    }
}

pub struct Harness {
    pub ctx: Context,
    pub storage: Arc<MemoryStorage>,
    pub github: Arc<FakeSourceHost>,
    pub poap: Arc<FakeBadgePlatform>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<MockClock>,
}

impl Harness {
    pub fn new() -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let github = Arc::new(FakeSourceHost::default());
        let poap = Arc::new(FakeBadgePlatform::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(MockClock::new(date(2022, 7, 1)));

        let ctx = Context {
            storage: storage.clone(),
            github: github.clone(),
            poap: poap.clone(),
            notifier: notifier.clone(),
            clock: clock.clone(),
            tasks: TaskQueue::new(),
            metrics: Arc::new(Metrics::default()),
            schedule: ScheduleConfig {
                repo_cooldown: Duration::ZERO,
                ..ScheduleConfig::default()
            },
        };

        Self {
            ctx,
            storage,
            github,
            poap,
            notifier,
            clock,
        }
    }

    pub async fn settle(&self) {
        self.ctx.tasks.wait_idle().await;
    }
}
