use std::future::Future;
use std::time::Duration;

use rocket::fairing::AdHoc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::batch::BatchOutcome;
use crate::codes::try_check_for_new_codes;
use crate::context::Context;
use crate::ongoing::try_run_ongoing_issuance;

/// Runs `job` right away and then once per `period` until `stop` flips to
/// true. A run still in progress delays the next tick instead of stacking.
pub fn spawn_ticker<F, Fut>(
    name: &'static str,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<BatchOutcome>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match job().await {
                        Ok(outcome) => tracing::debug!("Job {name} finished: {outcome:?}"),
                        Err(e) => tracing::error!("Job {name} failed: {e:#}"),
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        tracing::info!("Stopping job {name}");
                        break;
                    }
                }
            }
        }
    })
}

/// Attaches both periodic jobs once the server is up and stops them on shutdown.
pub fn stage() -> AdHoc {
    AdHoc::on_ignite("Periodic jobs", |rocket| async {
        let (stop_sender, stop) = watch::channel(false);

        rocket
            .attach(AdHoc::on_liftoff("Start periodic jobs", move |rocket| {
                Box::pin(async move {
                    let Some(ctx) = rocket.state::<Context>().cloned() else {
                        tracing::error!("No context is managed; periodic jobs are disabled");
                        return;
                    };

                    let ongoing_ctx = ctx.clone();
                    spawn_ticker(
                        "ongoing issuance",
                        ctx.schedule.ongoing_frequency,
                        stop.clone(),
                        move || {
                            let ctx = ongoing_ctx.clone();
                            async move { try_run_ongoing_issuance(&ctx).await }
                        },
                    );

                    let codes_ctx = ctx.clone();
                    spawn_ticker(
                        "check for codes",
                        ctx.schedule.codes_frequency,
                        stop,
                        move || {
                            let ctx = codes_ctx.clone();
                            async move { try_check_for_new_codes(&ctx).await }
                        },
                    );
                })
            }))
            .attach(AdHoc::on_shutdown("Stop periodic jobs", move |_| {
                Box::pin(async move {
                    let _ = stop_sender.send(true);
                })
            }))
    })
}
