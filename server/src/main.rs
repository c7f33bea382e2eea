#[macro_use]
extern crate rocket;

use std::sync::Arc;

use rocket::http::ContentType;
use rocket::response::content::RawHtml;
use rocket::State;
use shared::telegram::TelegramSubscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use gitpoap_server::api::{GithubClient, LogNotifier, Notifier, PoapClient, TelegramNotifier};
use gitpoap_server::config::Env;
use gitpoap_server::context::{self, Clients, Context};
use gitpoap_server::metrics::Metrics;
use gitpoap_server::{db, jobs};

#[get("/metrics")]
async fn metrics(ctx: &State<Context>) -> Option<(ContentType, RawHtml<String>)> {
    let body = match ctx.metrics.encode() {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to encode metrics: {e}");
            return None;
        }
    };
    Some((
        ContentType::new("application/openmetrics-text", " version=1.0.0; charset=utf-8"),
        RawHtml(body),
    ))
}

#[launch]
async fn rocket() -> _ {
    let env = Env::load().expect("Failed to load environment variables");

    let telegram = env
        .telegram()
        .map(|(token, chat_id)| TelegramSubscriber::new(token, chat_id));
    let subscriber = tracing_subscriber::registry()
        .with(telegram.clone())
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let prometheus: Arc<Metrics> = Default::default();
    let github = GithubClient::new(env.github_token.clone()).expect("Failed to create GitHub client");
    let poap = PoapClient::new(env.poap(), prometheus.clone());
    let notifier: Arc<dyn Notifier> = match telegram {
        Some(telegram) => Arc::new(TelegramNotifier::new(telegram)),
        None => Arc::new(LogNotifier),
    };

    let schedule = env.schedule();
    tracing::info!(
        "Ongoing issuance every {}s, code checks every {}s",
        schedule.ongoing_frequency.as_secs(),
        schedule.codes_frequency.as_secs()
    );

    rocket::build()
        .attach(db::stage())
        .attach(context::stage(Clients {
            github: Arc::new(github),
            poap: Arc::new(poap),
            notifier,
            metrics: prometheus,
            schedule,
        }))
        .attach(jobs::stage())
        .mount("/", routes![metrics])
}
