use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocket::{
    fairing::{self, AdHoc},
    Build, Rocket,
};
use rocket_db_pools::Database;
use shared::{ClaimStatus, EarnedBy, GitPoapStatus, GitPoapTier, IntoEnumIterator, YearWindow};
use sqlx::PgPool;

#[cfg(test)]
pub mod memory;
pub mod types;

use self::types::{
    Claim, ClaimWithGitPoap, FeaturedItem, GitPoap, Inserted, Issue, Mention, MentionTarget,
    NewIssue, NewPullRequest, OngoingRepo, Profile, PullRequest, RedeemCode, Repo, User,
};

/// Persistence seam for the reconciliation engine.
///
/// Every idempotent write is an atomic insert-if-absent (or insert-or-update)
/// backed by a unique key. Implementations must never emulate these with a
/// separate read followed by a write.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn upsert_user(&self, github_id: i64, github_handle: &str) -> anyhow::Result<User>;

    /// Repos whose project has at least one ongoing, PR-based, non-deprecated tier.
    async fn ongoing_issuance_repos(&self) -> anyhow::Result<Vec<OngoingRepo>>;
    async fn get_repo(&self, repo_id: i32) -> anyhow::Result<Option<Repo>>;
    async fn get_repo_by_name(&self, organization: &str, name: &str)
        -> anyhow::Result<Option<Repo>>;
    async fn project_repo_ids(&self, project_id: i32) -> anyhow::Result<Vec<i32>>;
    /// Non-deprecated tiers of a project.
    async fn project_tiers(&self, project_id: i32) -> anyhow::Result<Vec<GitPoapTier>>;
    /// Advances the watermark (never backwards) and optionally renames the repo.
    async fn update_repo_after_scan(
        &self,
        repo_id: i32,
        last_pr_updated_at: DateTime<Utc>,
        name: Option<&str>,
    ) -> anyhow::Result<()>;

    async fn upsert_pull_request(&self, pr: &NewPullRequest) -> anyhow::Result<PullRequest>;
    async fn get_pull_request(&self, id: i32) -> anyhow::Result<Option<PullRequest>>;
    async fn upsert_issue(&self, issue: &NewIssue) -> anyhow::Result<Issue>;
    async fn upsert_mention(
        &self,
        repo_id: i32,
        user_id: i32,
        target: MentionTarget,
    ) -> anyhow::Result<Mention>;
    async fn count_merged_pull_requests(
        &self,
        user_id: i32,
        repo_ids: &[i32],
        window: &YearWindow,
    ) -> anyhow::Result<i64>;
    /// Mentions whose referenced PR or issue was created inside `window`.
    async fn count_mentions(
        &self,
        user_id: i32,
        repo_ids: &[i32],
        window: &YearWindow,
    ) -> anyhow::Result<i64>;

    async fn insert_claim_if_absent(
        &self,
        gitpoap_id: i32,
        user_id: i32,
        earned_by: Option<EarnedBy>,
    ) -> anyhow::Result<Inserted<Claim>>;
    /// Sets the earning PR on a claim that has no earned-by reference yet.
    async fn backfill_claim_pull_request(
        &self,
        gitpoap_id: i32,
        user_id: i32,
        pull_request_id: i32,
    ) -> anyhow::Result<bool>;
    async fn get_claim(&self, claim_id: i32) -> anyhow::Result<Option<Claim>>;
    /// CLAIMED and MINTING claims attributed to `address`.
    async fn owned_claims(&self, address: &str) -> anyhow::Result<Vec<ClaimWithGitPoap>>;
    async fn find_claim_by_token(&self, token_id: &str)
        -> anyhow::Result<Option<ClaimWithGitPoap>>;
    async fn update_claim_address(&self, claim_id: i32, address: &str) -> anyhow::Result<Claim>;
    async fn claims_created_by_pull_request(
        &self,
        pull_request: &PullRequest,
        project_id: i32,
        year: i32,
    ) -> anyhow::Result<Vec<Claim>>;

    async fn get_gitpoap(&self, id: i32) -> anyhow::Result<Option<GitPoap>>;
    async fn gitpoaps_awaiting_codes(&self) -> anyhow::Result<Vec<GitPoap>>;
    async fn set_gitpoap_status(&self, id: i32, status: GitPoapStatus) -> anyhow::Result<()>;
    /// Marks a badge DEPRECATED and deletes its UNCLAIMED claims.
    async fn deprecate_gitpoap(&self, id: i32) -> anyhow::Result<u64>;
    async fn known_event_ids(&self) -> anyhow::Result<HashSet<i64>>;

    async fn count_redeem_codes(&self, gitpoap_id: i32) -> anyhow::Result<i64>;
    async fn insert_redeem_code_if_absent(&self, gitpoap_id: i32, code: &str)
        -> anyhow::Result<bool>;
    async fn first_redeem_code(&self, gitpoap_id: i32) -> anyhow::Result<Option<RedeemCode>>;
    async fn delete_redeem_code(&self, id: i32) -> anyhow::Result<bool>;

    async fn last_run(&self, name: &str) -> anyhow::Result<Option<DateTime<Utc>>>;
    async fn set_last_run(&self, name: &str, at: DateTime<Utc>) -> anyhow::Result<()>;

    async fn upsert_profile(&self, address: &str) -> anyhow::Result<Profile>;
    async fn featured_items(&self, address: &str) -> anyhow::Result<Vec<FeaturedItem>>;
    async fn delete_featured_item(&self, id: i32) -> anyhow::Result<()>;
    async fn delete_featured_for_token(&self, address: &str, token_id: &str)
        -> anyhow::Result<u64>;
}

#[derive(Database, Clone, Debug)]
#[database("gitpoap")]
pub struct DB(PgPool);

#[derive(sqlx::FromRow)]
struct TierRow {
    project_id: i32,
    id: i32,
    year: i32,
    threshold: i32,
    is_pr_based: bool,
}

impl From<TierRow> for GitPoapTier {
    fn from(row: TierRow) -> Self {
        GitPoapTier {
            id: row.id,
            year: row.year,
            threshold: row.threshold,
            is_pr_based: row.is_pr_based,
        }
    }
}

impl DB {
    async fn attach_gitpoaps(&self, claims: Vec<Claim>) -> anyhow::Result<Vec<ClaimWithGitPoap>> {
        let ids: Vec<i32> = claims.iter().map(|c| c.gitpoap_id).collect();
        let gitpoaps: HashMap<i32, GitPoap> =
            sqlx::query_as::<_, GitPoap>("SELECT * FROM gitpoaps WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.0)
                .await?
                .into_iter()
                .map(|g| (g.id, g))
                .collect();

        let mut result = Vec::with_capacity(claims.len());
        for claim in claims {
            match gitpoaps.get(&claim.gitpoap_id) {
                Some(gitpoap) => result.push(ClaimWithGitPoap {
                    gitpoap: gitpoap.clone(),
                    claim,
                }),
                None => tracing::error!(
                    "Claim ID {} references missing GitPOAP ID {}",
                    claim.id,
                    claim.gitpoap_id
                ),
            }
        }
        Ok(result)
    }
}

const REPO_COLUMNS: &str = "id, name, organization, project_id, last_pr_updated_at";

#[async_trait]
impl Storage for DB {
    async fn upsert_user(&self, github_id: i64, github_handle: &str) -> anyhow::Result<User> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (github_id, github_handle)
            VALUES ($1, $2)
            ON CONFLICT (github_id) DO UPDATE SET github_handle = EXCLUDED.github_handle
            RETURNING id, github_id, github_handle
            "#,
        )
        .bind(github_id)
        .bind(github_handle)
        .fetch_one(&self.0)
        .await?)
    }

    async fn ongoing_issuance_repos(&self) -> anyhow::Result<Vec<OngoingRepo>> {
        let repos = sqlx::query_as::<_, Repo>(&format!(
            r#"
            SELECT {REPO_COLUMNS}
            FROM repos r
            WHERE EXISTS (
                SELECT 1 FROM gitpoaps g
                WHERE g.project_id = r.project_id
                  AND g.is_ongoing AND g.is_pr_based
                  AND g.status <> 'DEPRECATED'
            )
            ORDER BY r.id
            "#
        ))
        .fetch_all(&self.0)
        .await?;

        let project_ids: Vec<i32> = repos.iter().map(|r| r.project_id).collect();
        let tiers = sqlx::query_as::<_, TierRow>(
            r#"
            SELECT project_id, id, year, threshold, is_pr_based
            FROM gitpoaps
            WHERE project_id = ANY($1)
              AND is_ongoing AND is_pr_based
              AND status <> 'DEPRECATED'
            ORDER BY year, threshold
            "#,
        )
        .bind(project_ids)
        .fetch_all(&self.0)
        .await?;

        let mut by_project: HashMap<i32, Vec<GitPoapTier>> = HashMap::new();
        for row in tiers {
            by_project.entry(row.project_id).or_default().push(row.into());
        }

        Ok(repos
            .into_iter()
            .map(|repo| OngoingRepo {
                tiers: by_project.get(&repo.project_id).cloned().unwrap_or_default(),
                repo,
            })
            .collect())
    }

    async fn get_repo(&self, repo_id: i32) -> anyhow::Result<Option<Repo>> {
        Ok(
            sqlx::query_as::<_, Repo>(&format!("SELECT {REPO_COLUMNS} FROM repos WHERE id = $1"))
                .bind(repo_id)
                .fetch_optional(&self.0)
                .await?,
        )
    }

    async fn get_repo_by_name(
        &self,
        organization: &str,
        name: &str,
    ) -> anyhow::Result<Option<Repo>> {
        Ok(sqlx::query_as::<_, Repo>(&format!(
            "SELECT {REPO_COLUMNS} FROM repos WHERE lower(organization) = lower($1) AND lower(name) = lower($2)"
        ))
        .bind(organization)
        .bind(name)
        .fetch_optional(&self.0)
        .await?)
    }

    async fn project_repo_ids(&self, project_id: i32) -> anyhow::Result<Vec<i32>> {
        Ok(
            sqlx::query_scalar::<_, i32>("SELECT id FROM repos WHERE project_id = $1 ORDER BY id")
                .bind(project_id)
                .fetch_all(&self.0)
                .await?,
        )
    }

    async fn project_tiers(&self, project_id: i32) -> anyhow::Result<Vec<GitPoapTier>> {
        let rows = sqlx::query_as::<_, TierRow>(
            r#"
            SELECT project_id, id, year, threshold, is_pr_based
            FROM gitpoaps
            WHERE project_id = $1 AND status <> 'DEPRECATED'
            ORDER BY year, threshold
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_repo_after_scan(
        &self,
        repo_id: i32,
        last_pr_updated_at: DateTime<Utc>,
        name: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE repos
            SET last_pr_updated_at = GREATEST(last_pr_updated_at, $2),
                name = COALESCE($3, name)
            WHERE id = $1
            "#,
        )
        .bind(repo_id)
        .bind(last_pr_updated_at)
        .bind(name)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    async fn upsert_pull_request(&self, pr: &NewPullRequest) -> anyhow::Result<PullRequest> {
        Ok(sqlx::query_as::<_, PullRequest>(
            r#"
            INSERT INTO pull_requests (repo_id, number, title, user_id, created_at, merged_at, merge_commit_sha)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (repo_id, number) DO UPDATE
            SET title = EXCLUDED.title,
                merged_at = COALESCE(EXCLUDED.merged_at, pull_requests.merged_at),
                merge_commit_sha = COALESCE(EXCLUDED.merge_commit_sha, pull_requests.merge_commit_sha)
            RETURNING *
            "#,
        )
        .bind(pr.repo_id)
        .bind(pr.number)
        .bind(&pr.title)
        .bind(pr.user_id)
        .bind(pr.created_at)
        .bind(pr.merged_at)
        .bind(&pr.merge_commit_sha)
        .fetch_one(&self.0)
        .await?)
    }

    async fn get_pull_request(&self, id: i32) -> anyhow::Result<Option<PullRequest>> {
        Ok(
            sqlx::query_as::<_, PullRequest>("SELECT * FROM pull_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.0)
                .await?,
        )
    }

    async fn upsert_issue(&self, issue: &NewIssue) -> anyhow::Result<Issue> {
        Ok(sqlx::query_as::<_, Issue>(
            r#"
            INSERT INTO issues (repo_id, number, title, user_id, created_at, closed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (repo_id, number) DO UPDATE
            SET title = EXCLUDED.title,
                closed_at = COALESCE(EXCLUDED.closed_at, issues.closed_at)
            RETURNING *
            "#,
        )
        .bind(issue.repo_id)
        .bind(issue.number)
        .bind(&issue.title)
        .bind(issue.user_id)
        .bind(issue.created_at)
        .bind(issue.closed_at)
        .fetch_one(&self.0)
        .await?)
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

        let inserted = sqlx::query_as::<_, Mention>(
            r#"
            INSERT INTO mentions (repo_id, user_id, pull_request_id, issue_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(repo_id)
        .bind(user_id)
        .bind(pull_request_id)
        .bind(issue_id)
        .fetch_optional(&self.0)
        .await?;

        if let Some(mention) = inserted {
            return Ok(mention);
        }

        Ok(sqlx::query_as::<_, Mention>(
            r#"
            SELECT * FROM mentions
            WHERE repo_id = $1 AND user_id = $2
              AND pull_request_id IS NOT DISTINCT FROM $3
              AND issue_id IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(repo_id)
        .bind(user_id)
        .bind(pull_request_id)
        .bind(issue_id)
        .fetch_one(&self.0)
        .await?)
    }

    async fn count_merged_pull_requests(
        &self,
        user_id: i32,
        repo_ids: &[i32],
        window: &YearWindow,
    ) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM pull_requests
            WHERE user_id = $1 AND repo_id = ANY($2)
              AND merged_at >= $3 AND merged_at < $4
            "#,
        )
        .bind(user_id)
        .bind(repo_ids.to_vec())
        .bind(window.start)
        .bind(window.end)
        .fetch_one(&self.0)
        .await?)
    }

    async fn count_mentions(
        &self,
        user_id: i32,
        repo_ids: &[i32],
        window: &YearWindow,
    ) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM mentions m
            LEFT JOIN pull_requests p ON p.id = m.pull_request_id
            LEFT JOIN issues i ON i.id = m.issue_id
            WHERE m.user_id = $1 AND m.repo_id = ANY($2)
              AND COALESCE(p.created_at, i.created_at) >= $3
              AND COALESCE(p.created_at, i.created_at) < $4
            "#,
        )
        .bind(user_id)
        .bind(repo_ids.to_vec())
        .bind(window.start)
        .bind(window.end)
        .fetch_one(&self.0)
        .await?)
    }

    async fn insert_claim_if_absent(
        &self,
        gitpoap_id: i32,
        user_id: i32,
        earned_by: Option<EarnedBy>,
    ) -> anyhow::Result<Inserted<Claim>> {
        let inserted = sqlx::query_as::<_, Claim>(
            r#"
            INSERT INTO claims (gitpoap_id, user_id, pull_request_earned_id, mention_earned_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (gitpoap_id, user_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(gitpoap_id)
        .bind(user_id)
        .bind(earned_by.and_then(|e| e.pull_request_id()))
        .bind(earned_by.and_then(|e| e.mention_id()))
        .fetch_optional(&self.0)
        .await?;

        if let Some(record) = inserted {
            return Ok(Inserted {
                record,
                created: true,
            });
        }

        let record = sqlx::query_as::<_, Claim>(
            "SELECT * FROM claims WHERE gitpoap_id = $1 AND user_id = $2",
        )
        .bind(gitpoap_id)
        .bind(user_id)
        .fetch_one(&self.0)
        .await?;

        Ok(Inserted {
            record,
            created: false,
        })
    }

    async fn backfill_claim_pull_request(
        &self,
        gitpoap_id: i32,
        user_id: i32,
        pull_request_id: i32,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE claims
            SET pull_request_earned_id = $3
            WHERE gitpoap_id = $1 AND user_id = $2
              AND pull_request_earned_id IS NULL
              AND mention_earned_id IS NULL
            "#,
        )
        .bind(gitpoap_id)
        .bind(user_id)
        .bind(pull_request_id)
        .execute(&self.0)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_claim(&self, claim_id: i32) -> anyhow::Result<Option<Claim>> {
        Ok(sqlx::query_as::<_, Claim>("SELECT * FROM claims WHERE id = $1")
            .bind(claim_id)
            .fetch_optional(&self.0)
            .await?)
    }

    async fn owned_claims(&self, address: &str) -> anyhow::Result<Vec<ClaimWithGitPoap>> {
        let owned: Vec<String> = ClaimStatus::iter()
            .filter(ClaimStatus::is_owned)
            .map(|status| status.to_string())
            .collect();
        let claims = sqlx::query_as::<_, Claim>(
            r#"
            SELECT * FROM claims
            WHERE address = $1 AND status::text = ANY($2)
            ORDER BY id
            "#,
        )
        .bind(address)
        .bind(&owned)
        .fetch_all(&self.0)
        .await?;
        self.attach_gitpoaps(claims).await
    }

    async fn find_claim_by_token(
        &self,
        token_id: &str,
    ) -> anyhow::Result<Option<ClaimWithGitPoap>> {
        let claim = sqlx::query_as::<_, Claim>("SELECT * FROM claims WHERE poap_token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.0)
            .await?;
        match claim {
            Some(claim) => Ok(self.attach_gitpoaps(vec![claim]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_claim_address(&self, claim_id: i32, address: &str) -> anyhow::Result<Claim> {
        Ok(sqlx::query_as::<_, Claim>(
            "UPDATE claims SET address = $2 WHERE id = $1 RETURNING *",
        )
        .bind(claim_id)
        .bind(address)
        .fetch_one(&self.0)
        .await?)
    }

    async fn claims_created_by_pull_request(
        &self,
        pull_request: &PullRequest,
        project_id: i32,
        year: i32,
    ) -> anyhow::Result<Vec<Claim>> {
        Ok(sqlx::query_as::<_, Claim>(
            r#"
            SELECT c.* FROM claims c
            JOIN gitpoaps g ON g.id = c.gitpoap_id
            WHERE g.status <> 'DEPRECATED'
              AND (
                c.pull_request_earned_id = $1
                OR (g.project_id = $2 AND g.year = $3 AND c.user_id = $4 AND c.status = 'UNCLAIMED')
              )
            ORDER BY c.id
            "#,
        )
        .bind(pull_request.id)
        .bind(project_id)
        .bind(year)
        .bind(pull_request.user_id)
        .fetch_all(&self.0)
        .await?)
    }

    async fn get_gitpoap(&self, id: i32) -> anyhow::Result<Option<GitPoap>> {
        Ok(sqlx::query_as::<_, GitPoap>("SELECT * FROM gitpoaps WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.0)
            .await?)
    }

    async fn gitpoaps_awaiting_codes(&self) -> anyhow::Result<Vec<GitPoap>> {
        Ok(sqlx::query_as::<_, GitPoap>(
            r#"
            SELECT * FROM gitpoaps
            WHERE status IN ('UNAPPROVED', 'REDEEM_REQUEST_PENDING')
            ORDER BY id
            "#,
        )
        .fetch_all(&self.0)
        .await?)
    }

    async fn set_gitpoap_status(&self, id: i32, status: GitPoapStatus) -> anyhow::Result<()> {
        sqlx::query("UPDATE gitpoaps SET status = $2 WHERE id = $1 AND status <> 'DEPRECATED'")
            .bind(id)
            .bind(status)
            .execute(&self.0)
            .await?;
        Ok(())
    }

    async fn deprecate_gitpoap(&self, id: i32) -> anyhow::Result<u64> {
        let mut tx = self.0.begin().await?;

        sqlx::query("UPDATE gitpoaps SET status = 'DEPRECATED' WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted =
            sqlx::query("DELETE FROM claims WHERE gitpoap_id = $1 AND status = 'UNCLAIMED'")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }

    async fn known_event_ids(&self) -> anyhow::Result<HashSet<i64>> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT poap_event_id FROM gitpoaps")
                .fetch_all(&self.0)
                .await?
                .into_iter()
                .collect(),
        )
    }

    async fn count_redeem_codes(&self, gitpoap_id: i32) -> anyhow::Result<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM redeem_codes WHERE gitpoap_id = $1")
                .bind(gitpoap_id)
                .fetch_one(&self.0)
                .await?,
        )
    }

    async fn insert_redeem_code_if_absent(
        &self,
        gitpoap_id: i32,
        code: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO redeem_codes (gitpoap_id, code)
            VALUES ($1, $2)
            ON CONFLICT (gitpoap_id, code) DO NOTHING
            "#,
        )
        .bind(gitpoap_id)
        .bind(code)
        .execute(&self.0)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn first_redeem_code(&self, gitpoap_id: i32) -> anyhow::Result<Option<RedeemCode>> {
        Ok(sqlx::query_as::<_, RedeemCode>(
            "SELECT * FROM redeem_codes WHERE gitpoap_id = $1 ORDER BY id LIMIT 1",
        )
        .bind(gitpoap_id)
        .fetch_optional(&self.0)
        .await?)
    }

    async fn delete_redeem_code(&self, id: i32) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM redeem_codes WHERE id = $1")
            .bind(id)
            .execute(&self.0)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn last_run(&self, name: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        Ok(sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT last_run FROM batch_timings WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.0)
        .await?)
    }

    async fn set_last_run(&self, name: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batch_timings (name, last_run)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET last_run = EXCLUDED.last_run
            "#,
        )
        .bind(name)
        .bind(at)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    async fn upsert_profile(&self, address: &str) -> anyhow::Result<Profile> {
        Ok(sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (address)
            VALUES ($1)
            ON CONFLICT (address) DO UPDATE SET address = EXCLUDED.address
            RETURNING *
            "#,
        )
        .bind(address)
        .fetch_one(&self.0)
        .await?)
    }

    async fn featured_items(&self, address: &str) -> anyhow::Result<Vec<FeaturedItem>> {
        Ok(sqlx::query_as::<_, FeaturedItem>(
            r#"
            SELECT f.* FROM featured_items f
            JOIN profiles p ON p.id = f.profile_id
            WHERE p.address = $1
            ORDER BY f.id
            "#,
        )
        .bind(address)
        .fetch_all(&self.0)
        .await?)
    }

    async fn delete_featured_item(&self, id: i32) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM featured_items WHERE id = $1")
            .bind(id)
            .execute(&self.0)
            .await?;
        Ok(())
    }

    async fn delete_featured_for_token(
        &self,
        address: &str,
        token_id: &str,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM featured_items f
            USING profiles p
            WHERE f.profile_id = p.id AND p.address = $1 AND f.poap_token_id = $2
            "#,
        )
        .bind(address)
        .bind(token_id)
        .execute(&self.0)
        .await?;
        Ok(result.rows_affected())
    }
}

async fn run_migrations(rocket: Rocket<Build>) -> fairing::Result {
    match DB::fetch(&rocket) {
        Some(db) => match sqlx::migrate!("./migrations").run(&**db).await {
            Ok(_) => Ok(rocket),
            Err(e) => {
                rocket::error!("Failed to initialize SQLx database: {}", e);
                Err(rocket)
            }
        },
        None => Err(rocket),
    }
}

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("SQLx Stage", |rocket| async {
        rocket
            .attach(DB::init())
            .attach(AdHoc::try_on_ignite("SQLx Migrations", run_migrations))
    })
}
