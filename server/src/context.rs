use std::sync::Arc;

use rocket::fairing::AdHoc;
use rocket_db_pools::Database;

use crate::api::{BadgePlatform, Notifier, SourceHost};
use crate::clock::{Clock, SystemClock};
use crate::config::ScheduleConfig;
use crate::db::{Storage, DB};
use crate::metrics::Metrics;
use crate::tasks::TaskQueue;

/// Everything a reconciliation pass needs. Cheap to clone into background tasks.
#[derive(Clone)]
pub struct Context {
    pub storage: Arc<dyn Storage>,
    pub github: Arc<dyn SourceHost>,
    pub poap: Arc<dyn BadgePlatform>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub tasks: TaskQueue,
    pub metrics: Arc<Metrics>,
    pub schedule: ScheduleConfig,
}

/// External clients built at start-up, before the database pool exists.
pub struct Clients {
    pub github: Arc<dyn SourceHost>,
    pub poap: Arc<dyn BadgePlatform>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Arc<Metrics>,
    pub schedule: ScheduleConfig,
}

impl Context {
    pub fn new(storage: Arc<dyn Storage>, clients: Clients) -> Self {
        Self {
            storage,
            github: clients.github,
            poap: clients.poap,
            notifier: clients.notifier,
            clock: Arc::new(SystemClock),
            tasks: TaskQueue::new(),
            metrics: clients.metrics,
            schedule: clients.schedule,
        }
    }
}

/// Manages a [`Context`] backed by the database pool. Must be attached after
/// [`crate::db::stage`].
pub fn stage(clients: Clients) -> AdHoc {
    AdHoc::on_ignite("Context", move |rocket| async move {
        rocket.attach(AdHoc::try_on_ignite("Build context", move |rocket| async move {
            let Some(db) = DB::fetch(&rocket).cloned() else {
                rocket::error!("Database pool is not initialized");
                return Err(rocket);
            };
            let ctx = Context::new(Arc::new(db), clients);
            Ok(rocket.manage(ctx))
        }))
    })
}
