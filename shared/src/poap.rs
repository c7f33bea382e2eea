//! Payloads returned by the badge-minting platform.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoapEvent {
    pub id: i64,
    #[serde(default)]
    pub fancy_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub event_url: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub expiry_date: String,
    #[serde(default)]
    pub supply: Option<u64>,
}

/// A token held by an address, or the ownership record of a single token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoapToken {
    #[serde(rename = "tokenId")]
    pub token_id: String,
    pub owner: String,
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub created: String,
    pub event: PoapEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrCode {
    pub qr_hash: String,
    pub claimed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrClaimInfo {
    #[serde(default)]
    pub id: Option<i64>,
    pub qr_hash: String,
    pub claimed: bool,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub tx_status: Option<String>,
    #[serde(default)]
    pub result: Option<QrClaimResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrClaimResult {
    #[serde(default)]
    pub token: Option<u64>,
}

/// Response to a redeem request; the token id is only known once the mint settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedeemedPoap {
    pub qr_hash: String,
    #[serde(default)]
    pub token_id: Option<String>,
}
