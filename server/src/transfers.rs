use std::collections::{HashMap, HashSet};

use shared::poap::{PoapEvent, PoapToken};
use shared::{normalize_address, ClaimStatus};
use tracing::instrument;

use crate::context::Context;
use crate::db::types::{Claim, ClaimWithGitPoap};

/// A badge held by an address, with the platform event it was minted from.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldGitPoap {
    pub claim: ClaimWithGitPoap,
    pub event: PoapEvent,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HolderTokens {
    pub gitpoaps: Vec<HeldGitPoap>,
    /// Tokens of events this system did not issue.
    pub foreign: Vec<PoapToken>,
}

/// Moves a claim to the token's new owner and drops the feature the old
/// owner pinned for it.
async fn apply_transfer(
    ctx: &Context,
    claim: &Claim,
    token_id: &str,
    new_address: &str,
) -> anyhow::Result<Claim> {
    if let Some(old_address) = &claim.address {
        let removed = ctx
            .storage
            .delete_featured_for_token(old_address, token_id)
            .await?;
        if removed > 0 {
            tracing::debug!("Removed {removed} featured items of {old_address} for token {token_id}");
        }
    }
    ctx.storage.upsert_profile(new_address).await?;

    let updated = ctx
        .storage
        .update_claim_address(claim.id, new_address)
        .await?;
    ctx.metrics.add_transfer_repaired();
    tracing::info!(
        "Moved claim ID {} for token {token_id} to {new_address}",
        claim.id
    );
    Ok(updated)
}

/// Re-reads the owner of a claimed token, bypassing the cache, and repairs
/// the claim when the token has moved. Returns the current owner.
#[instrument(skip(ctx))]
pub async fn check_if_claim_transferred(
    ctx: &Context,
    claim_id: i32,
) -> anyhow::Result<Option<String>> {
    let Some(claim) = ctx.storage.get_claim(claim_id).await? else {
        tracing::warn!("Failed to find claim ID {claim_id}");
        return Ok(None);
    };
    if claim.status != ClaimStatus::Claimed {
        return Ok(None);
    }
    let Some(token_id) = claim.poap_token_id.clone() else {
        tracing::error!("Claim ID {claim_id} is CLAIMED without a token id");
        return Ok(None);
    };

    ctx.poap.clear_token_cache(&token_id).await;
    let Some(token) = ctx.poap.token_info(&token_id).await else {
        tracing::warn!("Failed to look up token {token_id} of claim ID {claim_id}");
        return Ok(None);
    };

    let owner = normalize_address(&token.owner);
    if claim.address.as_deref() != Some(owner.as_str()) {
        tracing::info!("Found transferred token {token_id} of claim ID {claim_id}");
        apply_transfer(ctx, &claim, &token_id, &owner).await?;
    }
    Ok(Some(owner))
}

/// Drops featured items of the profile whose tokens the address no longer holds.
async fn prune_featured_items(
    ctx: &Context,
    address: &str,
    held: &HashSet<String>,
) -> anyhow::Result<()> {
    for item in ctx.storage.featured_items(address).await? {
        if !held.contains(&item.poap_token_id) {
            tracing::info!(
                "Removing featured token {} no longer held by {address}",
                item.poap_token_id
            );
            ctx.storage.delete_featured_item(item.id).await?;
        }
    }
    Ok(())
}

/// Splits the tokens held by `address` into badges issued here and foreign
/// tokens, repairing ownership of badges transferred in along the way.
///
/// Transfers out and stale featured items are repaired by background tasks
/// after this returns. `None` when the platform could not be reached.
#[instrument(skip(ctx))]
pub async fn split_holder_tokens(
    ctx: &Context,
    address: &str,
) -> anyhow::Result<Option<HolderTokens>> {
    let address = normalize_address(address);

    let (tokens, claims) = futures::join!(
        ctx.poap.holder_tokens(&address),
        ctx.storage.owned_claims(&address)
    );
    let claims = claims?;

    let mut result = HolderTokens::default();
    let mut claims_by_token = HashMap::new();
    for claim in claims {
        match claim.claim.poap_token_id.clone() {
            Some(token_id) => {
                claims_by_token.insert(token_id, claim);
            }
            None if claim.claim.status == ClaimStatus::Minting => {
                // Still minting, so it cannot have moved yet
                let Some(event) = ctx.poap.event_info(claim.gitpoap.poap_event_id).await else {
                    tracing::error!(
                        "Failed to look up event ID {} of GitPOAP ID {}",
                        claim.gitpoap.poap_event_id,
                        claim.gitpoap.id
                    );
                    continue;
                };
                result.gitpoaps.push(HeldGitPoap { claim, event });
            }
            None => tracing::error!(
                "Claim ID {} has status {} but no token id",
                claim.claim.id,
                claim.claim.status
            ),
        }
    }

    let Some(tokens) = tokens else {
        tracing::error!("Failed to retrieve tokens held by {address}");
        return Ok(None);
    };

    let held: HashSet<String> = tokens.iter().map(|t| t.token_id.clone()).collect();
    let mut known_events = None;
    for token in tokens {
        if let Some(claim) = claims_by_token.remove(&token.token_id) {
            result.gitpoaps.push(HeldGitPoap {
                claim,
                event: token.event,
            });
            continue;
        }

        if known_events.is_none() {
            known_events = Some(ctx.storage.known_event_ids().await?);
        }
        let is_badge_event = known_events
            .as_ref()
            .is_some_and(|events| events.contains(&token.event.id));
        let transferred_in = if is_badge_event {
            ctx.storage.find_claim_by_token(&token.token_id).await?
        } else {
            None
        };

        match transferred_in {
            Some(found) => {
                let claim = apply_transfer(ctx, &found.claim, &token.token_id, &address).await?;
                result.gitpoaps.push(HeldGitPoap {
                    claim: ClaimWithGitPoap {
                        claim,
                        gitpoap: found.gitpoap,
                    },
                    event: token.event,
                });
            }
            None => result.foreign.push(token),
        }
    }

    // Whatever is left was not reported for this address
    for claim in claims_by_token.into_values() {
        let claim_id = claim.claim.id;
        let task_ctx = ctx.clone();
        ctx.tasks
            .submit(format!("transfer check for claim {claim_id}"), async move {
                check_if_claim_transferred(&task_ctx, claim_id)
                    .await
                    .map(|_| ())
            });
    }

    let task_ctx = ctx.clone();
    let profile_address = address.clone();
    ctx.tasks
        .submit(format!("featured pruning for {address}"), async move {
            prune_featured_items(&task_ctx, &profile_address, &held).await
        });

    Ok(Some(result))
}
