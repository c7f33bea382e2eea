use itertools::Itertools;
use shared::GitPoapStatus;
use tracing::instrument;

use crate::backload::submit_backloads;
use crate::batch::{BatchOutcome, BatchTimingGuard, CHECK_FOR_CODES_BATCH};
use crate::context::Context;
use crate::gitpoaps::transition_status;
use crate::db::types::{GitPoap, RedeemCode};

/// Below this many local codes an ongoing badge asks for more.
pub const MINIMUM_REMAINING_REDEEM_CODES: i64 = 15;
pub const REDEEM_CODE_STEP_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodeCounts {
    starting: i64,
    ending: i64,
}

impl CodeCounts {
    fn increased(&self) -> bool {
        self.ending > self.starting
    }
}

/// Pulls unused codes for one badge into the local pool. `None` when the
/// platform could not be reached.
async fn pull_new_codes(ctx: &Context, gitpoap: &GitPoap) -> anyhow::Result<Option<CodeCounts>> {
    tracing::info!(
        "Checking GitPOAP ID {} with status {} for new codes",
        gitpoap.id,
        gitpoap.status
    );

    let starting = ctx.storage.count_redeem_codes(gitpoap.id).await?;

    let Some(codes) = ctx
        .poap
        .unused_codes(gitpoap.poap_event_id, &gitpoap.poap_secret)
        .await
    else {
        tracing::warn!(
            "Failed to retrieve unused codes from POAP API for GitPOAP ID {}",
            gitpoap.id
        );
        return Ok(None);
    };
    tracing::debug!("Received {} unused codes", codes.len());

    let mut added = 0;
    for code in &codes {
        if ctx
            .storage
            .insert_redeem_code_if_absent(gitpoap.id, code)
            .await?
        {
            added += 1;
        }
    }
    ctx.metrics.add_redeem_codes(added);

    Ok(Some(CodeCounts {
        starting,
        ending: ctx.storage.count_redeem_codes(gitpoap.id).await?,
    }))
}

/// Pulls new codes and moves the badge to APPROVED on any increase.
///
/// Returns the project's repos when an UNAPPROVED badge was just approved.
/// They are read before anything is written, so a failed lookup leaves the
/// badge untouched for the next pass.
#[instrument(skip_all, fields(gitpoap_id = gitpoap.id))]
async fn check_gitpoap_for_new_codes(
    ctx: &Context,
    gitpoap: &GitPoap,
) -> anyhow::Result<Option<Vec<i32>>> {
    let first_approval = gitpoap.status == GitPoapStatus::Unapproved;
    let repo_ids = if first_approval {
        ctx.storage.project_repo_ids(gitpoap.project_id).await?
    } else {
        vec![]
    };

    let Some(counts) = pull_new_codes(ctx, gitpoap).await? else {
        return Ok(None);
    };
    if !counts.increased() {
        tracing::info!("GitPOAP ID {} is still awaiting codes", gitpoap.id);
        return Ok(None);
    }
    tracing::info!(
        "Received {} new codes for GitPOAP ID {}",
        counts.ending - counts.starting,
        gitpoap.id
    );

    if !transition_status(ctx, gitpoap, GitPoapStatus::Approved).await? {
        return Ok(None);
    }
    // Pending requests were already backloaded when first approved
    if !first_approval {
        return Ok(None);
    }

    let notifier = ctx.notifier.clone();
    let approved = gitpoap.clone();
    ctx.tasks
        .submit(format!("approval notification {}", gitpoap.id), async move {
            notifier.gitpoap_approved(&approved).await
        });

    Ok(Some(repo_ids))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CodeCheckSummary {
    pub approved: Vec<i32>,
    pub backloaded_repos: Vec<i32>,
}

pub async fn check_for_new_codes(ctx: &Context) -> anyhow::Result<CodeCheckSummary> {
    let gitpoaps = ctx.storage.gitpoaps_awaiting_codes().await?;
    tracing::info!("Found {} GitPOAPs awaiting new codes", gitpoaps.len());

    let mut summary = CodeCheckSummary::default();
    for gitpoap in &gitpoaps {
        match check_gitpoap_for_new_codes(ctx, gitpoap).await {
            Ok(Some(repo_ids)) => {
                if repo_ids.is_empty() {
                    tracing::warn!("Approved GitPOAP ID {} has no repos to backload", gitpoap.id);
                }
                summary.approved.push(gitpoap.id);
                summary.backloaded_repos.extend(repo_ids);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Failed to check GitPOAP ID {} for new codes: {e:#}", gitpoap.id)
            }
        }
    }

    summary.backloaded_repos = summary.backloaded_repos.into_iter().unique().collect();
    submit_backloads(ctx, summary.backloaded_repos.iter().copied());
    tracing::debug!("Finished checking {} GitPOAPs for new codes", gitpoaps.len());
    Ok(summary)
}

pub async fn try_check_for_new_codes(ctx: &Context) -> anyhow::Result<BatchOutcome> {
    BatchTimingGuard::new(ctx.storage.clone(), ctx.clock.clone())
        .try_run(CHECK_FOR_CODES_BATCH, ctx.schedule.codes_min_interval, || async {
            check_for_new_codes(ctx).await.map(|_| ())
        })
        .await
}

async fn is_redeem_code_used(ctx: &Context, code: &RedeemCode) -> bool {
    match ctx.poap.claim_info(&code.code).await {
        Some(info) => info.claimed,
        None => {
            tracing::error!("RedeemCode ID {} was not found via POAP API", code.id);
            true
        }
    }
}

/// Picks a local code that the platform still considers unclaimed.
///
/// A used or unknown code is deleted. When the pool runs dry the platform is
/// asked once for new codes before giving up.
#[instrument(skip_all, fields(gitpoap_id = gitpoap.id))]
pub async fn choose_unused_redeem_code(
    ctx: &Context,
    gitpoap: &GitPoap,
) -> anyhow::Result<Option<RedeemCode>> {
    match ctx.storage.first_redeem_code(gitpoap.id).await? {
        None => tracing::error!("GitPOAP ID {} doesn't have any more codes", gitpoap.id),
        Some(code) => {
            if !is_redeem_code_used(ctx, &code).await {
                return Ok(Some(code));
            }
            tracing::error!(
                "GitPOAP ID {} has a used RedeemCode ID {}. Deleting it",
                gitpoap.id,
                code.id
            );
            if !ctx.storage.delete_redeem_code(code.id).await? {
                tracing::warn!("RedeemCode ID {} was already deleted", code.id);
            }
        }
    }

    match pull_new_codes(ctx, gitpoap).await? {
        Some(counts) if counts.increased() => {
            transition_status(ctx, gitpoap, GitPoapStatus::Approved).await?;
            ctx.storage.first_redeem_code(gitpoap.id).await
        }
        _ => {
            tracing::error!("Checking for new codes for GitPOAP ID {} found none", gitpoap.id);
            Ok(None)
        }
    }
}

/// Requests a fresh batch of codes when an ongoing badge is running low.
#[instrument(skip_all, fields(gitpoap_id = gitpoap.id))]
pub async fn ensure_redeem_code_threshold(ctx: &Context, gitpoap: &GitPoap) -> anyhow::Result<()> {
    if !gitpoap.is_ongoing || gitpoap.status == GitPoapStatus::Deprecated {
        return Ok(());
    }
    if gitpoap.status == GitPoapStatus::RedeemRequestPending {
        tracing::info!("Redeem request is already pending for GitPOAP ID {}", gitpoap.id);
        return Ok(());
    }

    let count = ctx.storage.count_redeem_codes(gitpoap.id).await?;
    tracing::debug!("GitPOAP ID {} has {count} remaining codes", gitpoap.id);
    if count >= MINIMUM_REMAINING_REDEEM_CODES {
        return Ok(());
    }

    if !transition_status(ctx, gitpoap, GitPoapStatus::RedeemRequestPending).await? {
        return Ok(());
    }
    tracing::info!("Requesting additional codes for GitPOAP ID {}", gitpoap.id);

    if !ctx
        .poap
        .request_codes(
            gitpoap.poap_event_id,
            &gitpoap.poap_secret,
            REDEEM_CODE_STEP_SIZE,
        )
        .await
    {
        // Back to the previous state so the next claim retries the request
        ctx.storage
            .set_gitpoap_status(gitpoap.id, gitpoap.status)
            .await?;
        tracing::error!(
            "Failed to request additional codes for GitPOAP ID {}",
            gitpoap.id
        );
    }
    Ok(())
}
