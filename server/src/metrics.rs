use std::time::Instant;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RunRecord {
    pub success: u32,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProjectRunRecord {
    pub project_id: u32,
    pub success: u32,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PoapRequestRecord {
    pub method: String,
    pub path: String,
    pub success: u32,
}

pub struct Metrics {
    registry: Registry,
    ongoing_issuance_duration: Family<RunRecord, Histogram>,
    ongoing_issuance_project_duration: Family<ProjectRunRecord, Histogram>,
    poap_request_duration: Family<PoapRequestRecord, Histogram>,
    claims_created: Counter,
    redeem_codes_added: Counter,
    transfers_repaired: Counter,
}

fn run_buckets() -> Histogram {
    Histogram::new(
        [
            1.,
            5.,
            15.,
            30.,
            60.,
            300.,
            600.,
            1800.,
            3600.,
            7200.,
            f64::INFINITY,
        ]
        .into_iter(),
    )
}

fn request_buckets() -> Histogram {
    Histogram::new([0.05, 0.1, 0.25, 0.5, 1., 2.5, 5., 10., f64::INFINITY].into_iter())
}

impl Default for Metrics {
    fn default() -> Self {
        let mut registry = Registry::default();
        let ongoing_issuance_duration: Family<RunRecord, Histogram> =
            Family::new_with_constructor(run_buckets);
        let ongoing_issuance_project_duration: Family<ProjectRunRecord, Histogram> =
            Family::new_with_constructor(run_buckets);
        let poap_request_duration: Family<PoapRequestRecord, Histogram> =
            Family::new_with_constructor(request_buckets);
        let claims_created = Counter::default();
        let redeem_codes_added = Counter::default();
        let transfers_repaired = Counter::default();

        registry.register(
            "ongoing_issuance_duration_seconds",
            "Duration of a full ongoing issuance pass",
            ongoing_issuance_duration.clone(),
        );
        registry.register(
            "ongoing_issuance_project_duration_seconds",
            "Duration of the ongoing issuance pass for a single repo, by project",
            ongoing_issuance_project_duration.clone(),
        );
        registry.register(
            "poap_request_duration_seconds",
            "Duration of requests to the POAP API",
            poap_request_duration.clone(),
        );
        registry.register(
            "claims_created",
            "Claims created from contributions",
            claims_created.clone(),
        );
        registry.register(
            "redeem_codes_added",
            "Redeem codes received from the POAP API",
            redeem_codes_added.clone(),
        );
        registry.register(
            "transfers_repaired",
            "Claims whose owning address was corrected after a token transfer",
            transfers_repaired.clone(),
        );

        Self {
            registry,
            ongoing_issuance_duration,
            ongoing_issuance_project_duration,
            poap_request_duration,
            claims_created,
            redeem_codes_added,
            transfers_repaired,
        }
    }
}

impl Metrics {
    pub fn observe_ongoing_issuance(&self, success: bool, started: Instant) {
        self.ongoing_issuance_duration
            .get_or_create(&RunRecord {
                success: success as u32,
            })
            .observe(started.elapsed().as_secs_f64());
    }

    pub fn observe_project_issuance(&self, project_id: i32, success: bool, started: Instant) {
        self.ongoing_issuance_project_duration
            .get_or_create(&ProjectRunRecord {
                project_id: project_id.max(0) as u32,
                success: success as u32,
            })
            .observe(started.elapsed().as_secs_f64());
    }

    pub fn observe_poap_request(&self, method: &str, path: &str, success: bool, started: Instant) {
        self.poap_request_duration
            .get_or_create(&PoapRequestRecord {
                method: method.to_string(),
                path: path.to_string(),
                success: success as u32,
            })
            .observe(started.elapsed().as_secs_f64());
    }

    pub fn add_claims_created(&self, count: u64) {
        self.claims_created.inc_by(count);
    }

    pub fn add_redeem_codes(&self, count: u64) {
        self.redeem_codes_added.inc_by(count);
    }

    pub fn add_transfer_repaired(&self) {
        self.transfers_repaired.inc();
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}
