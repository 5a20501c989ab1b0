use std::future::Future;
use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::config::Compression;
use crate::endpoint::EndpointTarget;
use crate::record::{Batch, Record};

pub const CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Longest response body kept on a rejected delivery.
const MAX_ERROR_BODY: usize = 1024;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gzip compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("ingestion endpoint rejected batch: {status}, response: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Delivers one closed batch to the ingestion endpoint.
pub trait Exporter: Send + Sync + 'static {
    fn export(&self, batch: &Batch) -> impl Future<Output = Result<(), ExportError>> + Send;
}

#[derive(Serialize)]
struct Payload<'a> {
    lines: &'a [Record],
}

/// Encode a batch as `{"lines": [...]}`.
pub fn encode_batch(batch: &Batch) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&Payload {
        lines: batch.records(),
    })
}

pub struct HttpExporter {
    client: Client,
    endpoint: EndpointTarget,
    compression: Compression,
}

impl HttpExporter {
    pub fn new(
        endpoint: EndpointTarget,
        timeout: Duration,
        compression: Compression,
    ) -> Result<Self, ExportError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            compression,
        })
    }
}

impl Exporter for HttpExporter {
    async fn export(&self, batch: &Batch) -> Result<(), ExportError> {
        let body = encode_batch(batch)?;
        let body = match self.compression {
            Compression::Gzip => compress_gzip(&body)?,
            Compression::None => body,
        };

        let mut req = self
            .client
            .post(self.endpoint.url().clone())
            .header("content-type", CONTENT_TYPE);

        if self.compression == Compression::Gzip {
            req = req.header("content-encoding", "gzip");
        }

        let resp = req.body(body).send().await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(ExportError::Rejected {
            status,
            body: truncate(body, MAX_ERROR_BODY),
        })
    }
}

fn compress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}
