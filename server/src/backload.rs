use shared::github::{PullRequestData, SortDirection};
use shared::{year_of, EarnedBy};
use tracing::instrument;

use crate::claims::{create_for_contribution, group_by_year, YearGroups};
use crate::context::Context;
use crate::db::types::Repo;
use crate::ongoing::{upsert_merged_pull_request, PULL_STEP_SIZE};

async fn backload_pull_request(
    ctx: &Context,
    repo: &Repo,
    repo_ids: &[i32],
    year_groups: &YearGroups,
    pr: &PullRequestData,
) -> anyhow::Result<()> {
    let Some((user, pull_request, merged_at)) = upsert_merged_pull_request(ctx, repo, pr).await?
    else {
        return Ok(());
    };

    let year = year_of(&merged_at);
    let Some(tiers) = year_groups.get(&year) else {
        tracing::debug!("There is no GitPOAP for {year} in repo ID {}", repo.id);
        return Ok(());
    };

    let year_group = YearGroups::from([(year, tiers.clone())]);
    create_for_contribution(
        ctx,
        user.id,
        repo_ids,
        &year_group,
        Some(EarnedBy::PullRequest(pull_request.id)),
    )
    .await?;

    // PRs arrive oldest first, so the first one seen is the earliest qualifying one
    for tier in tiers {
        ctx.storage
            .backfill_claim_pull_request(tier.id, user.id, pull_request.id)
            .await?;
    }
    Ok(())
}

/// Replays the full PR history of a repo, oldest first.
#[instrument(skip(ctx))]
pub async fn backload_repo(ctx: &Context, repo_id: i32) -> anyhow::Result<()> {
    let Some(repo) = ctx.storage.get_repo(repo_id).await? else {
        tracing::error!("Failed to look up repo ID {repo_id}");
        return Ok(());
    };
    tracing::info!("Backloading the PR history of {}", repo.full_name());

    let repo_ids = ctx.storage.project_repo_ids(repo.project_id).await?;
    let year_groups = group_by_year(ctx.storage.project_tiers(repo.project_id).await?);

    let mut page = 1;
    loop {
        let listing = ctx
            .github
            .list_closed_pull_requests(
                &repo.organization,
                &repo.name,
                PULL_STEP_SIZE,
                page,
                SortDirection::Ascending,
            )
            .await?;

        for pr in &listing.pulls {
            backload_pull_request(ctx, &repo, &repo_ids, &year_groups, pr).await?;
        }

        if listing.is_last(PULL_STEP_SIZE) {
            break;
        }
        page += 1;
    }

    tracing::info!("Finished backloading {}", repo.full_name());
    Ok(())
}

/// Queues one detached backload per repo.
pub fn submit_backloads(ctx: &Context, repo_ids: impl IntoIterator<Item = i32>) {
    for repo_id in repo_ids {
        let task_ctx = ctx.clone();
        ctx.tasks
            .submit(format!("backload repo {repo_id}"), async move {
                backload_repo(&task_ctx, repo_id).await
            });
    }
}
