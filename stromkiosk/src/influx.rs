//! InfluxDB 2.x query client
//!
//! This module submits Flux query bodies to the `/api/v2/query` endpoint and
//! parses the annotated-CSV response into [`FluxRecord`] rows. Only the two
//! fixed queries in [`crate::query`] are ever sent through it.

pub mod parser;

use std::time::Duration;

pub use parser::FluxRecord;

/// Errors produced by [`Client`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database could not be reached, or the transport failed mid-query.
    #[error("connection to InfluxDB failed: {0}")]
    Connection(#[from] reqwest::Error),
    /// The database refused the access token. Connection-class like
    /// [`Error::Connection`]: the instance answered but we never got a
    /// usable session.
    #[error("authentication to InfluxDB failed with status {status}: {message}")]
    Unauthenticated {
        /// HTTP status code of the refusal, 401 or 403
        status: u16,
        /// Response body, which carries Influx's error message
        message: String,
    },
    /// The database rejected the query.
    #[error("query rejected with status {status}: {message}")]
    Query {
        /// HTTP status code of the rejection
        status: u16,
        /// Response body, which carries Influx's error message
        message: String,
    },
}

/// Connection parameters for one query round-trip.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Base URL of the instance
    pub url: String,
    /// Organization identifier
    pub org: String,
    /// API access token
    pub token: String,
}

/// A short-lived query client. Fetchers construct one per fetch and drop it
/// when the fetch returns, releasing the connection on success and error
/// paths alike.
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    credentials: Credentials,
}

impl Client {
    /// Create a new [`Client`] instance
    ///
    /// # Errors
    ///
    /// Function will error if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(credentials: Credentials) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, credentials })
    }

    /// Submit a Flux query body and parse the response rows.
    ///
    /// Rows the response parser cannot make sense of are skipped, not
    /// errored; an expected field missing from the result is normal.
    ///
    /// # Errors
    ///
    /// Function will error if the database cannot be reached or rejects the
    /// query.
    pub async fn query(&self, flux: &str) -> Result<Vec<FluxRecord>, Error> {
        let url = format!(
            "{base}/api/v2/query",
            base = self.credentials.url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .query(&[("org", self.credentials.org.as_str())])
            .header(
                "Authorization",
                format!("Token {token}", token = self.credentials.token),
            )
            .header("Accept", "application/csv")
            .header("Content-Type", "application/vnd.flux")
            .body(flux.to_owned())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(rejection(status, message));
        }

        let body = response.text().await?;
        Ok(parser::parse_csv(&body))
    }
}

/// Classify a non-2xx response. Authentication refusals are
/// connection-class; everything else is a query rejection.
fn rejection(status: reqwest::StatusCode, message: String) -> Error {
    let status_code = status.as_u16();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        Error::Unauthenticated {
            status: status_code,
            message,
        }
    } else {
        Error::Query {
            status: status_code,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_refusals_are_connection_class() {
        for status in [
            reqwest::StatusCode::UNAUTHORIZED,
            reqwest::StatusCode::FORBIDDEN,
        ] {
            let err = rejection(status, "unauthorized access".to_string());
            assert!(
                matches!(err, Error::Unauthenticated { .. }),
                "status {status} should be an authentication failure"
            );
        }
    }

    #[test]
    fn other_rejections_are_query_errors() {
        let err = rejection(
            reqwest::StatusCode::BAD_REQUEST,
            "compilation failed".to_string(),
        );
        match err {
            Error::Query { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "compilation failed");
            }
            other => panic!("expected query rejection, got {other:?}"),
        }
    }
}
