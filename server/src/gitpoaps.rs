use shared::GitPoapStatus;
use tracing::instrument;

use crate::context::Context;
use crate::db::types::GitPoap;

/// Moves a badge to `next` if its status allows it. Returns whether the
/// status is now `next`.
pub async fn transition_status(
    ctx: &Context,
    gitpoap: &GitPoap,
    next: GitPoapStatus,
) -> anyhow::Result<bool> {
    if gitpoap.status == next {
        return Ok(true);
    }
    if !gitpoap.status.can_transition_to(next) {
        tracing::warn!(
            "Refusing to move GitPOAP ID {} from {} to {next}",
            gitpoap.id,
            gitpoap.status
        );
        return Ok(false);
    }

    ctx.storage.set_gitpoap_status(gitpoap.id, next).await?;
    tracing::debug!(
        "GitPOAP ID {} moved from {} to {next}",
        gitpoap.id,
        gitpoap.status
    );
    Ok(true)
}

/// Retires a badge for good and drops the claims nobody minted yet.
/// Returns how many claims were deleted.
#[instrument(skip(ctx))]
pub async fn deprecate_gitpoap(ctx: &Context, gitpoap_id: i32) -> anyhow::Result<u64> {
    let Some(gitpoap) = ctx.storage.get_gitpoap(gitpoap_id).await? else {
        anyhow::bail!("GitPOAP ID {gitpoap_id} not found");
    };
    if gitpoap.status == GitPoapStatus::Deprecated {
        tracing::info!("GitPOAP ID {gitpoap_id} is already deprecated");
    }

    let deleted = ctx.storage.deprecate_gitpoap(gitpoap_id).await?;
    tracing::info!("Deprecated GitPOAP ID {gitpoap_id}, deleting {deleted} unclaimed claims");
    Ok(deleted)
}
