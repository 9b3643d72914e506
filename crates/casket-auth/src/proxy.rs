//! Proxy callback handshake.
//!
//! Before a proxy-granting ticket becomes usable, the requesting service must prove it
//! controls the callback URL: the server calls
//! `callback?pgtId=<PGT id>&pgtIou=<IOU>` and expects a 2xx answer. The service later
//! presents the IOU to look up the PGT it received.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::ProxyConfig;
use crate::error::CasError;
use crate::ticket::TicketId;
use crate::CasResult;

/// Callback handshake failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyCallbackError {
    /// The callback URL is not acceptable.
    #[error("callback URL must use https")]
    InsecureUrl,

    /// The callback could not be reached.
    #[error("callback request failed: {0}")]
    Request(String),

    /// The callback answered with a non-success status.
    #[error("callback answered with status {0}")]
    Status(u16),
}

/// Proves that the caller controls a proxy callback URL.
#[async_trait]
pub trait ProxyCallbackVerifier: Send + Sync {
    /// Delivers the PGT id and IOU to `callback`.
    async fn verify(
        &self,
        callback: &Url,
        pgt_id: &TicketId,
        pgt_iou: &TicketId,
    ) -> Result<(), ProxyCallbackError>;
}

/// HTTP(S) GET handshake.
#[derive(Debug, Clone)]
pub struct HttpProxyCallbackVerifier {
    http_client: reqwest::Client,
    require_https: bool,
}

impl HttpProxyCallbackVerifier {
    /// Creates a verifier with the configured timeout and scheme policy.
    ///
    /// Redirects are not followed.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the HTTP client cannot be built.
    pub fn new(config: &ProxyConfig) -> CasResult<Self> {
        Self::with_timeout(config.callback_timeout, config.require_https)
    }

    fn with_timeout(timeout: Duration, require_https: bool) -> CasResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| CasError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            require_https,
        })
    }
}

#[async_trait]
impl ProxyCallbackVerifier for HttpProxyCallbackVerifier {
    async fn verify(
        &self,
        callback: &Url,
        pgt_id: &TicketId,
        pgt_iou: &TicketId,
    ) -> Result<(), ProxyCallbackError> {
        if self.require_https && callback.scheme() != "https" {
            return Err(ProxyCallbackError::InsecureUrl);
        }

        let mut url = callback.clone();
        url.query_pairs_mut()
            .append_pair("pgtId", pgt_id.as_str())
            .append_pair("pgtIou", pgt_iou.as_str());

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ProxyCallbackError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyCallbackError::Status(status.as_u16()));
        }
        Ok(())
    }
}
