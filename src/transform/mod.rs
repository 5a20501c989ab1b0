use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

use crate::batcher::BatcherHandle;
use crate::record::Record;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to parse host event: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to encode log line: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A log event as emitted by the container log router.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostEvent {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub container: ContainerInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub config: ContainerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// The JSON document carried in `Record::line`.
#[derive(Serialize)]
struct Message<'a> {
    message: &'a str,
    container: &'a ContainerInfo,
}

impl HostEvent {
    /// Parse one newline-delimited JSON event.
    pub fn from_json(raw: &str) -> Result<Self, TransformError> {
        serde_json::from_str(raw).map_err(TransformError::Parse)
    }

    /// Normalize into a record stamped with `timestamp` (unix seconds).
    ///
    /// The line is the message plus container metadata encoded as JSON; the
    /// origin is the container name.
    pub fn to_record(&self, timestamp: i64) -> Result<Record, TransformError> {
        let line = serde_json::to_string(&Message {
            message: &self.data,
            container: &self.container,
        })
        .map_err(TransformError::Encode)?;

        Ok(Record::new(timestamp, line, self.container.name.clone()))
    }
}

/// Current wall-clock time in unix seconds. Clocks set before the epoch
/// yield 0.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Read newline-delimited host events from `reader` and hand each one to the
/// batcher. Malformed lines are logged and skipped.
///
/// Returns the number of records forwarded. Stops early if the batcher has
/// shut down.
pub async fn forward_events<R>(reader: R, handle: &BatcherHandle) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut forwarded = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let raw = match std::str::from_utf8(&buf) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "skipping host event that is not valid UTF-8");
                continue;
            }
        };
        if raw.trim().is_empty() {
            continue;
        }

        let record = match HostEvent::from_json(raw).and_then(|e| e.to_record(unix_now())) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping host event");
                continue;
            }
        };

        if handle.send(record).await.is_err() {
            warn!("batcher stopped, discarding remaining input");
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}
