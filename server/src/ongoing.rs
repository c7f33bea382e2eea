use std::cmp::Ordering;
use std::time::Instant;

use chrono::{DateTime, Utc};
use shared::github::{PullRequestData, SortDirection};
use shared::{year_of, EarnedBy};
use tracing::instrument;

use crate::batch::{BatchOutcome, BatchTimingGuard, ONGOING_ISSUANCE_BATCH};
use crate::claims::{create_for_contribution, group_by_year};
use crate::config::ScheduleConfig;
use crate::context::Context;
use crate::db::types::{NewPullRequest, OngoingRepo, PullRequest, Repo, User};

/// Page size for pull request listings (the source host's maximum).
pub const PULL_STEP_SIZE: u8 = 100;

/// Upserts the author and the pull request of a merged, non-bot PR.
pub(crate) async fn upsert_merged_pull_request(
    ctx: &Context,
    repo: &Repo,
    pr: &PullRequestData,
) -> anyhow::Result<Option<(User, PullRequest, DateTime<Utc>)>> {
    let Some(merged_at) = pr.merged_at else {
        return Ok(None);
    };
    if pr.author.is_bot() {
        tracing::debug!("Skipping PR #{} by bot {}", pr.number, pr.author.login);
        return Ok(None);
    }

    let user = ctx
        .storage
        .upsert_user(pr.author.id, &pr.author.login)
        .await?;
    let pull_request = ctx
        .storage
        .upsert_pull_request(&NewPullRequest {
            repo_id: repo.id,
            number: i32::try_from(pr.number)?,
            title: pr.title.clone(),
            user_id: user.id,
            created_at: pr.created_at,
            merged_at: Some(merged_at),
            merge_commit_sha: pr.merge_commit().map(ToString::to_string),
        })
        .await?;

    Ok(Some((user, pull_request, merged_at)))
}

/// Walks the closed PRs of one repo newest-updated first, down to the
/// repo's watermark, and creates claims for the tracked year.
///
/// The watermark is the newest `updated_at` of the first page and is only
/// written once the walk is over. A failing API call aborts the walk without
/// moving it.
#[instrument(skip_all, fields(repo = %ongoing.repo.full_name()))]
pub async fn check_for_new_contributions(
    ctx: &Context,
    ongoing: &OngoingRepo,
) -> anyhow::Result<()> {
    let repo = &ongoing.repo;
    let Some(tracked_year) = ongoing.tracked_year() else {
        tracing::warn!("Repo ID {} has no ongoing GitPOAPs", repo.id);
        return Ok(());
    };
    tracing::info!("Checking for new contributions to {}", repo.full_name());

    let year_groups = group_by_year(
        ongoing
            .tiers
            .iter()
            .filter(|tier| tier.year == tracked_year)
            .cloned(),
    );
    let repo_ids = ctx.storage.project_repo_ids(repo.project_id).await?;

    let mut page = 1;
    let mut newest_updated_at = None;
    let mut renamed_to = None;
    loop {
        let listing = ctx
            .github
            .list_closed_pull_requests(
                &repo.organization,
                &repo.name,
                PULL_STEP_SIZE,
                page,
                SortDirection::Descending,
            )
            .await?;
        let pulls = &listing.pulls;
        tracing::debug!(
            "Retrieved {} of {} pulls on page {page}",
            pulls.len(),
            listing.fetched
        );

        if page == 1 {
            newest_updated_at = pulls.iter().map(|pr| pr.updated_at).max();
            renamed_to = pulls
                .iter()
                .find_map(|pr| pr.repo_name.clone())
                .filter(|name| *name != repo.name);
        }

        let mut reached_watermark = false;
        for pr in pulls {
            if !pr.is_merged() {
                continue;
            }
            if pr.updated_at < repo.last_pr_updated_at {
                reached_watermark = true;
                break;
            }

            let Some((user, pull_request, merged_at)) =
                upsert_merged_pull_request(ctx, repo, pr).await?
            else {
                continue;
            };

            let merged_year = year_of(&merged_at);
            match merged_year.cmp(&tracked_year) {
                Ordering::Equal => {
                    create_for_contribution(
                        ctx,
                        user.id,
                        &repo_ids,
                        &year_groups,
                        Some(EarnedBy::PullRequest(pull_request.id)),
                    )
                    .await?;
                }
                Ordering::Greater => {
                    tracing::error!(
                        "Found PR #{} of repo ID {} merged in {merged_year}, after the tracked year {tracked_year}",
                        pr.number,
                        repo.id
                    );
                }
                Ordering::Less => {}
            }
        }

        if reached_watermark || listing.is_last(PULL_STEP_SIZE) {
            break;
        }
        page += 1;
    }

    if let Some(newest) = newest_updated_at {
        if let Some(name) = &renamed_to {
            tracing::info!("Repo {} was renamed to {name}", repo.full_name());
        }
        ctx.storage
            .update_repo_after_scan(repo.id, newest, renamed_to.as_deref())
            .await?;
    }

    tracing::debug!("Finished checking for new contributions to {}", repo.full_name());
    Ok(())
}

/// Whether sleeping between repos alone outlasts the minimum interval between
/// runs, letting another instance start a run before this one finishes.
pub fn cooldown_overlaps(schedule: &ScheduleConfig, repo_count: usize) -> bool {
    u32::try_from(repo_count)
        .ok()
        .and_then(|count| schedule.repo_cooldown.checked_mul(count))
        .map_or(true, |total| total > schedule.ongoing_min_interval)
}

pub async fn run_ongoing_issuance(ctx: &Context) -> anyhow::Result<()> {
    tracing::info!("Running the ongoing issuance updater");
    let started = Instant::now();

    let repos = ctx.storage.ongoing_issuance_repos().await?;
    tracing::info!("Found {} repos with ongoing GitPOAPs", repos.len());

    if cooldown_overlaps(&ctx.schedule, repos.len()) {
        tracing::warn!(
            "Cooldown of {}s over {} repos exceeds the minimum interval of {}s between ongoing issuance runs; runs on other instances may overlap",
            ctx.schedule.repo_cooldown.as_secs(),
            repos.len(),
            ctx.schedule.ongoing_min_interval.as_secs()
        );
    }

    let mut failures = 0;
    for (i, ongoing) in repos.iter().enumerate() {
        if i > 0 && !ctx.schedule.repo_cooldown.is_zero() {
            tokio::time::sleep(ctx.schedule.repo_cooldown).await;
        }

        let repo_started = Instant::now();
        let result = check_for_new_contributions(ctx, ongoing).await;
        if let Err(e) = &result {
            failures += 1;
            tracing::error!(
                "Failed to run ongoing issuance for repo ID {}: {e:#}",
                ongoing.repo.id
            );
        }
        ctx.metrics
            .observe_project_issuance(ongoing.repo.project_id, result.is_ok(), repo_started);
    }

    ctx.metrics.observe_ongoing_issuance(failures == 0, started);
    tracing::debug!("Finished running the ongoing issuance updater");
    Ok(())
}

pub async fn try_run_ongoing_issuance(ctx: &Context) -> anyhow::Result<BatchOutcome> {
    BatchTimingGuard::new(ctx.storage.clone(), ctx.clock.clone())
        .try_run(
            ONGOING_ISSUANCE_BATCH,
            ctx.schedule.ongoing_min_interval,
            || run_ongoing_issuance(ctx),
        )
        .await
}
