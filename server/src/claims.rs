use std::collections::BTreeMap;

use shared::{year_of, EarnedBy, GitPoapTier};
use tracing::instrument;

use crate::context::Context;
use crate::contributions::count_contributions;
use crate::db::types::{
    Claim, Inserted, Issue, Mention, MentionTarget, NewIssue, NewPullRequest, PullRequest,
};
use crate::db::Storage;

/// Badge tiers of a project keyed by award year, lowest threshold first.
pub type YearGroups = BTreeMap<i32, Vec<GitPoapTier>>;

pub fn group_by_year(tiers: impl IntoIterator<Item = GitPoapTier>) -> YearGroups {
    let mut groups = YearGroups::new();
    for tier in tiers {
        groups.entry(tier.year).or_default().push(tier);
    }
    for tiers in groups.values_mut() {
        tiers.sort_by_key(|tier| (tier.threshold, tier.id));
    }
    groups
}

/// Creates the claim if it does not exist yet. An existing claim is returned
/// untouched, including its earned-by reference.
pub async fn upsert_claim(
    storage: &dyn Storage,
    user_id: i32,
    gitpoap_id: i32,
    earned_by: Option<EarnedBy>,
) -> anyhow::Result<Inserted<Claim>> {
    storage
        .insert_claim_if_absent(gitpoap_id, user_id, earned_by)
        .await
}

/// Upserts a claim for every tier the user qualifies for.
///
/// Contributions are counted once per year with the first tier's
/// `is_pr_based` so that all tiers of a year see the same count.
#[instrument(skip(ctx, repo_ids, year_groups))]
pub async fn create_for_contribution(
    ctx: &Context,
    user_id: i32,
    repo_ids: &[i32],
    year_groups: &YearGroups,
    earned_by: Option<EarnedBy>,
) -> anyhow::Result<Vec<Claim>> {
    let mut claims = vec![];
    let mut created = 0;

    for (year, tiers) in year_groups {
        let Some(first) = tiers.first() else {
            continue;
        };
        let count = count_contributions(
            ctx.storage.as_ref(),
            user_id,
            repo_ids,
            *year,
            first.is_pr_based,
        )
        .await?;
        tracing::debug!("User ID {user_id} has {count} contributions in {year}");

        if count == 0 {
            continue;
        }

        for tier in tiers {
            if count < tier.threshold as i64 {
                tracing::debug!(
                    "User ID {user_id} misses threshold of {} for GitPOAP ID {}",
                    tier.threshold,
                    tier.id
                );
                continue;
            }

            let claim = upsert_claim(ctx.storage.as_ref(), user_id, tier.id, earned_by).await?;
            if claim.created {
                tracing::info!("Created claim for user ID {user_id} for GitPOAP ID {}", tier.id);
                created += 1;
            }
            claims.push(claim.record);
        }
    }

    ctx.metrics.add_claims_created(created);
    Ok(claims)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contribution {
    PullRequest(PullRequest),
    Issue(Issue),
    Mention(Mention),
}

impl Contribution {
    pub fn user_id(&self) -> i32 {
        match self {
            Contribution::PullRequest(pr) => pr.user_id,
            Contribution::Issue(issue) => issue.user_id,
            Contribution::Mention(mention) => mention.user_id,
        }
    }

    fn mention_target(&self) -> Option<MentionTarget> {
        match self {
            Contribution::PullRequest(pr) => Some(MentionTarget::PullRequest(pr.id)),
            Contribution::Issue(issue) => Some(MentionTarget::Issue(issue.id)),
            Contribution::Mention(_) => None,
        }
    }

    fn earned_by(&self) -> Option<EarnedBy> {
        match self {
            Contribution::PullRequest(pr) => Some(EarnedBy::PullRequest(pr.id)),
            Contribution::Mention(mention) => Some(EarnedBy::Mention(mention.id)),
            Contribution::Issue(_) => None,
        }
    }
}

/// Result of recording a single contribution reported from outside the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContributionIntake {
    Recorded(Contribution),
    BotUser,
    RepoNotFound,
    GithubRecordNotFound,
}

enum IntakeKind {
    PullRequest,
    Issue,
}

#[instrument(skip(ctx))]
pub async fn create_claims_for_pr(
    ctx: &Context,
    organization: &str,
    repo: &str,
    number: u64,
    github_id: i64,
    was_mention: bool,
) -> anyhow::Result<ContributionIntake> {
    create_claims_for(
        ctx,
        IntakeKind::PullRequest,
        organization,
        repo,
        number,
        github_id,
        was_mention,
    )
    .await
}

#[instrument(skip(ctx))]
pub async fn create_claims_for_issue(
    ctx: &Context,
    organization: &str,
    repo: &str,
    number: u64,
    github_id: i64,
    was_mention: bool,
) -> anyhow::Result<ContributionIntake> {
    create_claims_for(
        ctx,
        IntakeKind::Issue,
        organization,
        repo,
        number,
        github_id,
        was_mention,
    )
    .await
}

async fn create_claims_for(
    ctx: &Context,
    kind: IntakeKind,
    organization: &str,
    repo_name: &str,
    number: u64,
    github_id: i64,
    was_mention: bool,
) -> anyhow::Result<ContributionIntake> {
    let Some(author) = ctx.github.get_user_by_id(github_id).await? else {
        // Unknown accounts are skipped like bots
        tracing::error!("Failed to look up GitHub user ID {github_id}");
        return Ok(ContributionIntake::BotUser);
    };
    if author.is_bot() {
        tracing::info!("Skipping claims for bot {}", author.login);
        return Ok(ContributionIntake::BotUser);
    }

    let Some(repo) = ctx.storage.get_repo_by_name(organization, repo_name).await? else {
        tracing::warn!("Failed to find repo {organization}/{repo_name}");
        return Ok(ContributionIntake::RepoNotFound);
    };

    let contribution = match kind {
        IntakeKind::PullRequest => {
            let Some(pr) = ctx
                .github
                .get_pull_request(organization, repo_name, number)
                .await?
            else {
                tracing::error!("Failed to fetch PR #{number} of {organization}/{repo_name}");
                return Ok(ContributionIntake::GithubRecordNotFound);
            };
            let user = ctx
                .storage
                .upsert_user(author.id, &author.login)
                .await?;
            let pr = ctx
                .storage
                .upsert_pull_request(&NewPullRequest {
                    repo_id: repo.id,
                    number: i32::try_from(pr.number)?,
                    title: pr.title.clone(),
                    user_id: user.id,
                    created_at: pr.created_at,
                    merged_at: pr.merged_at,
                    merge_commit_sha: pr.merge_commit().map(ToString::to_string),
                })
                .await?;
            Contribution::PullRequest(pr)
        }
        IntakeKind::Issue => {
            let Some(issue) = ctx.github.get_issue(organization, repo_name, number).await? else {
                tracing::error!("Failed to fetch issue #{number} of {organization}/{repo_name}");
                return Ok(ContributionIntake::GithubRecordNotFound);
            };
            let user = ctx
                .storage
                .upsert_user(author.id, &author.login)
                .await?;
            let issue = ctx
                .storage
                .upsert_issue(&NewIssue {
                    repo_id: repo.id,
                    number: i32::try_from(issue.number)?,
                    title: issue.title.clone(),
                    user_id: user.id,
                    created_at: issue.created_at,
                    closed_at: issue.closed_at,
                })
                .await?;
            Contribution::Issue(issue)
        }
    };

    let user_id = contribution.user_id();
    let contribution = match contribution.mention_target() {
        Some(target) if was_mention => {
            let mention = ctx.storage.upsert_mention(repo.id, user_id, target).await?;
            Contribution::Mention(mention)
        }
        _ => contribution,
    };

    let repo_ids = ctx.storage.project_repo_ids(repo.project_id).await?;
    let year_groups = group_by_year(ctx.storage.project_tiers(repo.project_id).await?);
    create_for_contribution(
        ctx,
        user_id,
        &repo_ids,
        &year_groups,
        contribution.earned_by(),
    )
    .await?;

    Ok(ContributionIntake::Recorded(contribution))
}

/// Claims earned by a merged PR, plus the author's UNCLAIMED claims in the
/// same project and merge year.
#[instrument(skip(ctx))]
pub async fn retrieve_claims_created_by_pr(
    ctx: &Context,
    pull_request_id: i32,
) -> anyhow::Result<Vec<Claim>> {
    let Some(pr) = ctx.storage.get_pull_request(pull_request_id).await? else {
        tracing::error!("Failed to look up pull request ID {pull_request_id}");
        return Ok(vec![]);
    };
    let Some(merged_at) = pr.merged_at else {
        tracing::error!("Pull request ID {pull_request_id} is not merged yet");
        return Ok(vec![]);
    };
    let Some(repo) = ctx.storage.get_repo(pr.repo_id).await? else {
        tracing::error!("Pull request ID {pull_request_id} references a missing repo");
        return Ok(vec![]);
    };

    ctx.storage
        .claims_created_by_pull_request(&pr, repo.project_id, year_of(&merged_at))
        .await
}
