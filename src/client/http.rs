//! HTTP implementation of the reporting API
//!
//! Maps transport failures and the server's machine-readable error codes onto
//! the closed [`ApiError`] kind set at this boundary, so the pipeline's retry
//! policy never depends on remote message wording. Report bodies stream to
//! disk chunk by chunk.

use super::{Credentials, ReportQuery, ReportSession, ReportingApi};
use crate::config::HttpConfig;
use crate::error::{ApiError, SourceError};
use crate::types::AccountId;
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Timeout for the account directory call; listings are small
const LISTING_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between bounded listing retries
const LISTING_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Fallback pause when a 429 response carries no Retry-After header
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Production [`ReportingApi`] backed by reqwest
///
/// Holds the credentials *path*, not the loaded credentials: sessions re-read
/// the file when they open, so a credential rotation mid-run is picked up by
/// later workers.
pub struct HttpReportingApi {
    credentials_path: PathBuf,
    config: HttpConfig,
}

impl HttpReportingApi {
    /// Create an API handle from a credentials file path and HTTP settings
    pub fn new(credentials_path: impl Into<PathBuf>, config: HttpConfig) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            config,
        }
    }

    fn endpoint(&self, credentials: &Credentials) -> String {
        credentials
            .endpoint
            .clone()
            .unwrap_or_else(|| self.config.endpoint.clone())
    }
}

/// JSON shape of the account directory response
#[derive(Debug, Deserialize)]
struct AccountListing {
    accounts: Vec<String>,
}

/// JSON shape of an API error response
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    #[serde(default)]
    message: String,
}

/// Map a reqwest transport failure onto an [`ApiError`] kind
fn transport_error(e: &reqwest::Error) -> ApiError {
    if e.is_timeout() || e.is_connect() {
        ApiError::Network(e.to_string())
    } else {
        ApiError::Unknown(e.to_string())
    }
}

/// Map an error response (status + optional machine-readable body) onto the
/// closed kind set
fn classify_response(status: reqwest::StatusCode, body: &[u8]) -> ApiError {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        let ErrorDetail { code, message } = parsed.error;
        return match code.as_str() {
            "INVALID_CUSTOMER_ID" => ApiError::InvalidCustomer,
            "CUSTOMER_NOT_FOUND" => ApiError::CustomerNotFound,
            "PERMISSION_DENIED" => ApiError::PermissionDenied,
            "MALFORMED_QUERY" | "QUERY_ERROR" => ApiError::MalformedQuery(message),
            "BACKEND_ERROR" => ApiError::Backend(message),
            _ if status.is_server_error() => ApiError::Backend(format!("{code}: {message}")),
            _ => ApiError::Unknown(format!("{code}: {message}")),
        };
    }
    // No machine-readable body; fall back to the status class
    if status.is_server_error() {
        ApiError::Backend(format!("HTTP {status}"))
    } else if status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
    {
        ApiError::PermissionDenied
    } else {
        ApiError::Unknown(format!("HTTP {status}"))
    }
}

/// Read the Retry-After header as whole seconds
fn retry_after(response: &reqwest::Response) -> Duration {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[async_trait::async_trait]
impl ReportingApi for HttpReportingApi {
    async fn list_account_ids(&self) -> Result<Vec<AccountId>, SourceError> {
        let credentials = Credentials::load(&self.credentials_path)
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        let endpoint = self.endpoint(&credentials);

        let client = reqwest::Client::builder()
            .timeout(LISTING_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let mut tries = 0;
        let mut last_error = String::new();
        while tries < self.config.listing_tries {
            let mut request = client
                .get(format!("{endpoint}/accounts"))
                .bearer_auth(&credentials.developer_token);
            if let Some(manager) = &credentials.manager_id {
                request = request.query(&[("manager_id", manager.as_str())]);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        return Err(SourceError::Authentication(format!("HTTP {status}")));
                    }
                    if status.is_success() {
                        let listing: AccountListing = response
                            .json()
                            .await
                            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
                        if listing.accounts.is_empty() {
                            return Err(SourceError::Empty);
                        }
                        return Ok(listing
                            .accounts
                            .into_iter()
                            .map(AccountId::from)
                            .collect());
                    }
                    last_error = format!("HTTP {status}");
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            tries += 1;
            tracing::warn!(
                tries = tries,
                max_tries = self.config.listing_tries,
                error = %last_error,
                "account listing attempt failed"
            );
            tokio::time::sleep(LISTING_RETRY_DELAY).await;
        }

        Err(SourceError::Unavailable(last_error))
    }

    async fn open_session(&self, worker: usize) -> Result<Arc<dyn ReportSession>, ApiError> {
        let raw = tokio::fs::read_to_string(&self.credentials_path)
            .await
            .map_err(|e| ApiError::Unknown(format!("credentials not readable: {e}")))?;
        let credentials: Credentials = serde_json::from_str(&raw)
            .map_err(|e| ApiError::Unknown(format!("credentials not parseable: {e}")))?;

        let endpoint = self.endpoint(&credentials);

        // The session timeout covers an entire report body; large reports
        // stream slowly, hence the generous default.
        let client = reqwest::Client::builder()
            .timeout(self.config.download_timeout)
            .build()
            .map_err(|e| ApiError::Unknown(e.to_string()))?;

        tracing::debug!(worker = worker, "report session opened");
        Ok(Arc::new(HttpReportSession {
            client,
            endpoint,
            token: credentials.developer_token,
        }))
    }
}

/// One authenticated reqwest session
struct HttpReportSession {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

#[async_trait::async_trait]
impl ReportSession for HttpReportSession {
    async fn download_report(
        &self,
        account: &AccountId,
        query: &ReportQuery,
        dest: &Path,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(format!("{}/reports", self.endpoint))
            .bearer_auth(&self.token)
            .header("x-customer-id", account.as_str())
            .json(&serde_json::json!({
                "query": query.as_str(),
                "format": "GZIPPED_CSV",
            }))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited {
                retry_after: retry_after(&response),
            });
        }
        if !status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| transport_error(&e))?;
            return Err(classify_response(status, &body));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ApiError::Unknown(format!("cannot create staged file: {e}")))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(&e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiError::Unknown(format!("cannot write staged file: {e}")))?;
        }
        file.flush()
            .await
            .map_err(|e| ApiError::Unknown(format!("cannot flush staged file: {e}")))?;

        Ok(())
    }
}
