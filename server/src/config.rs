use std::time::Duration;

use serde::Deserialize;

fn default_poap_api_url() -> String {
    "https://api.poap.tech".to_string()
}

fn default_poap_auth_url() -> String {
    "https://poap-auth.eu.auth0.com".to_string()
}

fn default_ongoing_frequency() -> u64 {
    60
}

fn default_ongoing_delay() -> u64 {
    12
}

fn default_repo_cooldown() -> u64 {
    60
}

fn default_codes_frequency() -> u64 {
    5
}

fn default_codes_delay() -> u64 {
    30
}

/// Process configuration, read from the environment (after `.env`) with `envy`.
#[derive(Debug, Clone, Deserialize)]
pub struct Env {
    pub github_token: String,
    #[serde(default = "default_poap_api_url")]
    pub poap_api_url: String,
    #[serde(default = "default_poap_auth_url")]
    pub poap_auth_url: String,
    pub poap_api_key: String,
    pub poap_client_id: String,
    pub poap_client_secret: String,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_ongoing_frequency")]
    pub ongoing_issuance_check_frequency_minutes: u64,
    #[serde(default = "default_ongoing_delay")]
    pub ongoing_issuance_delay_hours: u64,
    #[serde(default = "default_repo_cooldown")]
    pub ongoing_issuance_repo_cooldown_seconds: u64,
    #[serde(default = "default_codes_frequency")]
    pub check_for_codes_frequency_minutes: u64,
    #[serde(default = "default_codes_delay")]
    pub check_for_codes_delay_minutes: u64,
}

#[derive(Debug, Clone)]
pub struct PoapConfig {
    pub api_url: String,
    pub auth_url: String,
    pub api_key: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Timers and guard windows of the two periodic jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub ongoing_frequency: Duration,
    pub ongoing_min_interval: Duration,
    pub repo_cooldown: Duration,
    pub codes_frequency: Duration,
    pub codes_min_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ongoing_frequency: minutes(default_ongoing_frequency()),
            ongoing_min_interval: hours(default_ongoing_delay()),
            repo_cooldown: Duration::from_secs(default_repo_cooldown()),
            codes_frequency: minutes(default_codes_frequency()),
            codes_min_interval: minutes(default_codes_delay()),
        }
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value * 60)
}

fn hours(value: u64) -> Duration {
    minutes(value * 60)
}

impl Env {
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let env = envy::from_env::<Env>()?;
        if env.telegram_token.is_some() != env.telegram_chat_id.is_some() {
            anyhow::bail!("TELEGRAM_TOKEN and TELEGRAM_CHAT_ID must be set together");
        }
        Ok(env)
    }

    pub fn poap(&self) -> PoapConfig {
        PoapConfig {
            api_url: self.poap_api_url.trim_end_matches('/').to_string(),
            auth_url: self.poap_auth_url.trim_end_matches('/').to_string(),
            api_key: self.poap_api_key.clone(),
            client_id: self.poap_client_id.clone(),
            client_secret: self.poap_client_secret.clone(),
        }
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            ongoing_frequency: minutes(self.ongoing_issuance_check_frequency_minutes),
            ongoing_min_interval: hours(self.ongoing_issuance_delay_hours),
            repo_cooldown: Duration::from_secs(self.ongoing_issuance_repo_cooldown_seconds),
            codes_frequency: minutes(self.check_for_codes_frequency_minutes),
            codes_min_interval: minutes(self.check_for_codes_delay_minutes),
        }
    }

    pub fn telegram(&self) -> Option<(String, String)> {
        self.telegram_token.clone().zip(self.telegram_chat_id.clone())
    }
}
