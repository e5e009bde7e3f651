use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use puppetlens_core::errors::{CoreError, ErrorKind as CoreErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
#[error(transparent)]
pub struct AppError(Box<ErrorKind>);

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("TemplateError: {0}")]
    Template(#[from] askama::Error),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}

impl<E> From<E> for AppError
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        AppError(Box::new(ErrorKind::from(err)))
    }
}

impl AppError {
    fn get_codes(&self) -> (StatusCode, u16) {
        match &*self.0 {
            ErrorKind::Core(err) => match err.kind() {
                CoreErrorKind::InvalidSortColumn(_) => (StatusCode::BAD_REQUEST, 40001),
                CoreErrorKind::Query(_) => (StatusCode::BAD_REQUEST, 40002),
                CoreErrorKind::FeatureDisabled(_) => (StatusCode::FORBIDDEN, 40301),
                CoreErrorKind::UnknownEnvironment(_) => (StatusCode::NOT_FOUND, 40401),
                CoreErrorKind::RemoteStatus { status: 404, .. } => (StatusCode::NOT_FOUND, 40402),
                CoreErrorKind::RemoteStatus { .. } => (StatusCode::INTERNAL_SERVER_ERROR, 50001),
                CoreErrorKind::HttpClient(_) => (StatusCode::INTERNAL_SERVER_ERROR, 50002),
                CoreErrorKind::SerdeJson(_) | CoreErrorKind::UnexpectedResponse(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, 50003)
                }
                CoreErrorKind::InvalidBaseUrl(_) => (StatusCode::INTERNAL_SERVER_ERROR, 50004),
            },
            ErrorKind::Template(_) => (StatusCode::INTERNAL_SERVER_ERROR, 50005),
            ErrorKind::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, 50006),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ErrorCode {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, code) = self.get_codes();
        let message = self.to_string();
        if status_code.is_server_error() {
            error!("Request failed with {status_code}: {message}");
        }
        let body = Json(ErrorCode { code, message });
        (status_code, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
