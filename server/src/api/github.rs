use async_trait::async_trait;
use octocrab::params;
use shared::github::{Author, IssueData, PullRequestData, SortDirection};
use tracing::instrument;

/// One page of a pull request listing. `fetched` counts every item the host
/// returned, including ones that could not be converted, so paging stops only
/// on a genuinely short page.
#[derive(Debug, Default, Clone)]
pub struct PullRequestPage {
    pub pulls: Vec<PullRequestData>,
    pub fetched: usize,
}

impl PullRequestPage {
    pub fn is_last(&self, page_size: u8) -> bool {
        self.fetched < page_size as usize
    }
}

/// Read access to the source-hosting platform.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// One page (1-based) of closed pull requests sorted by last update.
    async fn list_closed_pull_requests(
        &self,
        org: &str,
        repo: &str,
        page_size: u8,
        page: u32,
        direction: SortDirection,
    ) -> anyhow::Result<PullRequestPage>;

    async fn get_pull_request(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<Option<PullRequestData>>;

    async fn get_issue(&self, org: &str, repo: &str, number: u64)
        -> anyhow::Result<Option<IssueData>>;

    async fn get_user_by_id(&self, github_id: i64) -> anyhow::Result<Option<Author>>;

    async fn list_org_admins(&self, org: &str) -> anyhow::Result<Vec<Author>>;
}

pub async fn is_org_admin(
    host: &dyn SourceHost,
    org: &str,
    github_id: i64,
) -> anyhow::Result<bool> {
    Ok(host
        .list_org_admins(org)
        .await?
        .iter()
        .any(|admin| admin.id == github_id))
}

#[derive(Clone)]
pub struct GithubClient {
    octocrab: octocrab::Octocrab,
}

impl GithubClient {
    pub fn new(github_token: String) -> anyhow::Result<Self> {
        let octocrab = octocrab::Octocrab::builder()
            .personal_token(github_token)
            .build()?;
        Ok(Self { octocrab })
    }
}

fn not_found<T>(result: octocrab::Result<T>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(octocrab::Error::GitHub { source, .. }) if source.status_code.as_u16() == 404 => {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl SourceHost for GithubClient {
    #[instrument(skip(self))]
    async fn list_closed_pull_requests(
        &self,
        org: &str,
        repo: &str,
        page_size: u8,
        page: u32,
        direction: SortDirection,
    ) -> anyhow::Result<PullRequestPage> {
        let page = self
            .octocrab
            .pulls(org, repo)
            .list()
            .state(params::State::Closed)
            .sort(params::pulls::Sort::Updated)
            .direction(direction)
            .per_page(page_size)
            .page(page)
            .send()
            .await?;

        let fetched = page.items.len();
        let pulls = page
            .items
            .into_iter()
            .filter_map(|pr| {
                let number = pr.number;
                PullRequestData::try_from(pr)
                    .map_err(|e| {
                        tracing::error!("Failed to convert PR #{number} of {org}/{repo}: {e}")
                    })
                    .ok()
            })
            .collect();
        Ok(PullRequestPage { pulls, fetched })
    }

    #[instrument(skip(self))]
    async fn get_pull_request(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<Option<PullRequestData>> {
        not_found(self.octocrab.pulls(org, repo).get(number).await)?
            .map(PullRequestData::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn get_issue(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<Option<IssueData>> {
        Ok(not_found(self.octocrab.issues(org, repo).get(number).await)?.map(IssueData::from))
    }

    #[instrument(skip(self))]
    async fn get_user_by_id(&self, github_id: i64) -> anyhow::Result<Option<Author>> {
        let user = not_found(
            self.octocrab
                .get::<octocrab::models::Author, _, ()>(format!("/user/{github_id}"), None)
                .await,
        )?;
        Ok(user.map(Author::from))
    }

    #[instrument(skip(self))]
    async fn list_org_admins(&self, org: &str) -> anyhow::Result<Vec<Author>> {
        let admins: Vec<octocrab::models::Author> = self
            .octocrab
            .get(
                format!("/orgs/{org}/members"),
                Some(&[("role", "admin"), ("per_page", "100")]),
            )
            .await?;
        Ok(admins.into_iter().map(Author::from).collect())
    }
}
