//! Parsing processor between the download pool and the broadcaster.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::twcommon::error::Result;
use crate::twcrawler::payload::Payload;
use crate::twcrawler::stage::{Flow, Processor};
use crate::twparser;

/// Runs the strategy-selected parser over the payload's Big5 body and
/// attaches the records. Holiday pages and block pages parse to nothing;
/// those payloads continue downstream with an empty batch rather than
/// failing the crawl.
#[derive(Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Processor for TextExtractor {
    async fn process(&self, _cancel: &CancellationToken, payload: &mut Payload) -> Result<Flow> {
        let parsed = twparser::parse(
            payload.strategy,
            &payload.date,
            &payload.raw_content,
            &payload.url,
        );

        match parsed {
            Ok(records) => {
                tracing::debug!(
                    url = %payload.url,
                    strategy = %payload.strategy,
                    records = records.len(),
                    "extracted records"
                );
                payload.parsed_content = Some(Arc::new(records));
            }
            Err(err) if err.is_benign() => {
                tracing::warn!(url = %payload.url, error = %err, "parse produced nothing, continuing");
                payload.parsed_content = Some(Arc::new(Vec::new()));
            }
            Err(err) => return Err(err.into()),
        }

        Ok(Flow::Forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twcommon::models::Strategy;

    #[tokio::test]
    async fn test_extracts_csv_records() {
        let cancel = CancellationToken::new();
        let extractor = TextExtractor::new();

        let mut payload = Payload::from_pool();
        payload.strategy = Strategy::TwseDailyClose;
        payload.date.push_str("20220525");
        let row = r#""2330","","1,000","1,000","1,000","100","101","1,005","98","-","12","","","","","","""#;
        let (encoded, _, _) = encoding_rs::BIG5.encode(row);
        payload.raw_content.extend_from_slice(&encoded);

        let flow = extractor.process(&cancel, &mut payload).await.unwrap();
        assert_eq!(flow, Flow::Forward);
        assert_eq!(payload.parsed_content.as_ref().unwrap().len(), 1);
        payload.mark_processed();
    }

    #[tokio::test]
    async fn test_empty_body_flows_through_with_empty_batch() {
        let cancel = CancellationToken::new();
        let extractor = TextExtractor::new();

        let mut payload = Payload::from_pool();
        payload.strategy = Strategy::TwseDailyClose;
        payload.date.push_str("20220525");
        payload.raw_content.extend_from_slice("查無資料".as_bytes());

        let flow = extractor.process(&cancel, &mut payload).await.unwrap();
        assert_eq!(flow, Flow::Forward);
        assert!(payload.parsed_content.as_ref().unwrap().is_empty());
        payload.mark_processed();
    }
}
