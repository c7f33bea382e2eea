pub mod github;
pub mod notifier;
pub mod poap;

pub use github::{GithubClient, PullRequestPage, SourceHost};
pub use notifier::{LogNotifier, Notifier, TelegramNotifier};
pub use poap::{BadgePlatform, PoapClient};
