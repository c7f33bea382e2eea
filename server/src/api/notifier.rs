use async_trait::async_trait;
use shared::telegram::TelegramSubscriber;
use tracing::Level;

use crate::db::types::GitPoap;

/// Outbound operator notifications. Delivery is best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn gitpoap_approved(&self, gitpoap: &GitPoap) -> anyhow::Result<()>;
}

fn approval_message(gitpoap: &GitPoap) -> String {
    format!(
        "GitPOAP {} (ID {}, {}) received its codes and is now live",
        gitpoap.name, gitpoap.id, gitpoap.year
    )
}

pub struct TelegramNotifier {
    telegram: TelegramSubscriber,
}

impl TelegramNotifier {
    pub fn new(telegram: TelegramSubscriber) -> Self {
        Self { telegram }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn gitpoap_approved(&self, gitpoap: &GitPoap) -> anyhow::Result<()> {
        self.telegram
            .send_to_telegram(&approval_message(gitpoap), &Level::INFO);
        Ok(())
    }
}

/// Used when no chat is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn gitpoap_approved(&self, gitpoap: &GitPoap) -> anyhow::Result<()> {
        tracing::info!("{}", approval_message(gitpoap));
        Ok(())
    }
}
