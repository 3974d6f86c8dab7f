//! Download processor for the worker-pool stage.

use async_trait::async_trait;
use reqwest::header::{CONNECTION, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;

use crate::twcommon::error::{AppError, Result};
use crate::twcommon::models::Strategy;
use crate::twcommon::proxy::Proxy;
use crate::twcrawler::payload::Payload;
use crate::twcrawler::stage::{Flow, Processor};

/// Fetches one payload's URL and captures the body bytes untouched (the
/// sources answer in Big5; decoding is the extractor's job).
pub struct LinkFetcher {
    client: reqwest::Client,
    proxy: Option<Proxy>,
}

impl LinkFetcher {
    pub fn new(client: reqwest::Client, proxy: Option<Proxy>) -> Self {
        Self { client, proxy }
    }

    fn request_uri(&self, payload: &Payload) -> String {
        // 集中度頁面對重複抓取封鎖嚴格，走代理改寫
        if payload.strategy == Strategy::StakeConcentration {
            if let Some(proxy) = &self.proxy {
                return proxy.uri(&payload.url);
            }
        }

        payload.url.clone()
    }
}

#[async_trait]
impl Processor for LinkFetcher {
    async fn process(&self, cancel: &CancellationToken, payload: &mut Payload) -> Result<Flow> {
        let uri = self.request_uri(payload);

        // a retried attempt must not append onto the previous body
        payload.raw_content.clear();

        tracing::info!(url = %uri, strategy = %payload.strategy, "download started");

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            sent = self
                .client
                .get(&uri)
                .header(CONTENT_TYPE, "text/csv;charset=ms950")
                // keeping connections alive exhausts the fd budget across
                // thousands of downloads
                .header(CONNECTION, "close")
                .send() => sent?,
        };

        let status = response.status();

        // drain the body even on failure so the connection is not poisoned
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            bytes = response.bytes() => bytes?,
        };

        if !status.is_success() {
            return Err(AppError::FetchStatus(status.as_u16()));
        }

        payload.raw_content.extend_from_slice(&body);
        payload.retrieved_at = Some(chrono::Utc::now());

        tracing::info!(
            url = %uri,
            bytes = payload.raw_content.len(),
            "download completed"
        );

        Ok(Flow::Forward)
    }
}

/// Build the shared HTTP client used by every fetch worker.
///
/// Certificate verification is disabled on purpose: both exchanges serve
/// these endpoints with certificates that do not match the download hosts.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .danger_accept_invalid_certs(true)
        .build()?;

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twcommon::proxy::ProxyKind;

    #[test]
    fn test_request_uri_rewrites_concentration_only() {
        let client = build_http_client(5).unwrap();
        let fetcher = LinkFetcher::new(client, Some(Proxy::new(ProxyKind::WebScraping)));

        let mut payload = Payload::from_pool();
        payload.url.push_str("https://www.twse.com.tw/exchangeReport");
        payload.strategy = Strategy::TwseDailyClose;
        assert_eq!(fetcher.request_uri(&payload), payload.url);

        payload.strategy = Strategy::StakeConcentration;
        let uri = fetcher.request_uri(&payload);
        assert!(uri.starts_with("https://api.webscrapingapi.com/v1?api_key="));
        assert!(uri.contains("&url=https%3A%2F%2Fwww.twse.com.tw"));
        payload.mark_processed();
    }

    #[test]
    fn test_request_uri_without_proxy() {
        let client = build_http_client(5).unwrap();
        let fetcher = LinkFetcher::new(client, None);

        let mut payload = Payload::from_pool();
        payload
            .url
            .push_str("https://fubon-ebrokerdj.fbs.com.tw/z/zc/zco/zco_2330_6.djhtm");
        payload.strategy = Strategy::StakeConcentration;
        assert_eq!(fetcher.request_uri(&payload), payload.url);
        payload.mark_processed();
    }
}
