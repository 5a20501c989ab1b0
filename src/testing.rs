use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::exporter::{ExportError, Exporter};
use crate::record::{Batch, Record};

/// One export call as seen by [`RecordingExporter`].
#[derive(Debug, Clone)]
pub struct Delivered {
    pub at: Instant,
    pub records: Vec<Record>,
}

impl Delivered {
    pub fn lines(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.line.as_str()).collect()
    }
}

/// Records every batch it receives. Clones share state, so a test can keep
/// one clone and hand the other to the batcher.
#[derive(Clone, Default)]
pub struct RecordingExporter {
    delivered: Arc<Mutex<Vec<Delivered>>>,
    failures_left: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl RecordingExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the first `n` batches with a 500.
    pub fn failing_first(n: usize) -> Self {
        Self {
            failures_left: Arc::new(AtomicUsize::new(n)),
            ..Self::default()
        }
    }

    /// Sleep for `delay` before recording each batch.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn batch_lines(&self) -> Vec<Vec<String>> {
        self.delivered()
            .iter()
            .map(|d| d.lines().into_iter().map(str::to_owned).collect())
            .collect()
    }
}

impl Exporter for RecordingExporter {
    async fn export(&self, batch: &Batch) -> Result<(), ExportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.delivered.lock().unwrap().push(Delivered {
            at: Instant::now(),
            records: batch.records().to_vec(),
        });

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ExportError::Rejected {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: "ingest unavailable".into(),
            });
        }
        Ok(())
    }
}

pub fn record(line: &str) -> Record {
    Record::new(1_700_000_000, line, "test-container")
}
