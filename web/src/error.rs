use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use broker::{Error as BrokerError, ErrorKind as BrokerErrorKind};
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(BrokerError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.0)
    }
}

// The broker is the only collaborator these routes can fail on.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        match self.0.error_kind {
            BrokerErrorKind::Connection | BrokerErrorKind::Command => {
                (StatusCode::BAD_GATEWAY, "BAD GATEWAY").into_response()
            }
            BrokerErrorKind::Subscription
            | BrokerErrorKind::Config
            | BrokerErrorKind::Serialization => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

impl<E> From<E> for Error
where
    E: Into<BrokerError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
