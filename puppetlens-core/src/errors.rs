use puppetlens_query::QueryError;
use thiserror::Error;

#[derive(Error, Debug)]
#[error(transparent)]
pub struct CoreError(Box<ErrorKind>);

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),
    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),
    #[error("Invalid sort column index: {0}")]
    InvalidSortColumn(usize),
    #[error("QueryError: {0}")]
    Query(#[from] QueryError),
    #[error("PuppetDB returned {status} for {url}: {body}")]
    RemoteStatus {
        status: u16,
        url: String,
        body: String,
    },
    #[error("HttpClientError: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Invalid PuppetDB base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("SerdeJsonError: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Unexpected PuppetDB response: {0}")]
    UnexpectedResponse(String),
}

impl<E> From<E> for CoreError
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        CoreError(Box::new(ErrorKind::from(err)))
    }
}

impl CoreError {
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// PuppetDB answered 404, e.g. a catalog for an unknown certname.
    pub fn is_remote_not_found(&self) -> bool {
        matches!(*self.0, ErrorKind::RemoteStatus { status: 404, .. })
    }
}
