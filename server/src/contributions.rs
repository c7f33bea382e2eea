use shared::YearWindow;

use crate::db::Storage;

/// Number of qualifying contributions of a user to a set of repos in one award year.
///
/// Merged PRs count by merge time. Mentions count by the creation time of the
/// PR or issue they reference, whatever the state of the claim they earned.
/// Tiers that are not PR-based only look at mentions.
pub async fn count_contributions(
    storage: &dyn Storage,
    user_id: i32,
    repo_ids: &[i32],
    year: i32,
    is_pr_based: bool,
) -> anyhow::Result<i64> {
    let Some(window) = YearWindow::for_year(year) else {
        anyhow::bail!("Year {year} is out of range");
    };

    let mentions = storage.count_mentions(user_id, repo_ids, &window).await?;
    if !is_pr_based {
        return Ok(mentions);
    }

    let pull_requests = storage
        .count_merged_pull_requests(user_id, repo_ids, &window)
        .await?;
    Ok(pull_requests + mentions)
}
