use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::Config;
use crate::exporter::{ExportError, Exporter};
use crate::record::{Batch, Record};

/// `Interval` panics on a zero period.
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("batcher has stopped accepting records")]
    Closed(Record),
}

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub max_records: usize,
    pub flush_interval: Duration,
    pub intake_capacity: usize,
    /// `None` leaves concurrent deliveries unbounded.
    pub max_in_flight: Option<usize>,
}

impl From<&Config> for BatcherConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_records: config.batch_max_records,
            flush_interval: config.flush_interval,
            intake_capacity: config.intake_capacity,
            max_in_flight: config.max_in_flight,
        }
    }
}

/// Cloneable intake side of a running batcher.
///
/// Dropping every handle stops the batcher the same way `shutdown` does.
#[derive(Debug, Clone)]
pub struct BatcherHandle {
    tx: mpsc::Sender<Record>,
}

impl BatcherHandle {
    /// Hand one record to the batcher. Waits only for channel capacity,
    /// never for delivery.
    pub async fn send(&self, record: Record) -> Result<(), IntakeError> {
        self.tx
            .send(record)
            .await
            .map_err(|e| IntakeError::Closed(e.0))
    }
}

/// Control side of a batcher task spawned with [`spawn`].
pub struct BatcherTask {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl BatcherTask {
    /// Stop intake, flush the partial batch and wait for every in-flight
    /// delivery to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.wait().await;
    }

    /// Wait for the batcher to stop on its own, which happens once every
    /// handle has been dropped.
    pub async fn wait(self) {
        if let Err(e) = self.join.await {
            error!(error = %e, "batcher task panicked");
        }
    }
}

/// Start a batcher on the current runtime.
pub fn spawn<E: Exporter>(exporter: E, config: &BatcherConfig) -> (BatcherHandle, BatcherTask) {
    let cancel = CancellationToken::new();
    let (batcher, handle) = Batcher::new(exporter, config, cancel.clone());
    let join = tokio::spawn(batcher.run());
    (handle, BatcherTask { cancel, join })
}

/// Sole owner of the batch being filled.
///
/// Waits on two event sources, an incoming record or the flush timer, and
/// handles one at a time. Every flush detaches the batch and spawns its
/// delivery so the loop never waits on the network.
pub struct Batcher<E: Exporter> {
    exporter: Arc<E>,
    batch: Batch,
    rx: mpsc::Receiver<Record>,
    timer: Interval,
    deliveries: JoinSet<()>,
    in_flight: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
}

impl<E: Exporter> Batcher<E> {
    pub fn new(
        exporter: E,
        config: &BatcherConfig,
        cancel: CancellationToken,
    ) -> (Self, BatcherHandle) {
        let (tx, rx) = mpsc::channel(config.intake_capacity.max(1));

        let period = config.flush_interval.max(MIN_FLUSH_INTERVAL);
        let mut timer = time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let batcher = Self {
            exporter: Arc::new(exporter),
            batch: Batch::new(config.max_records),
            rx,
            timer,
            deliveries: JoinSet::new(),
            in_flight: config.max_in_flight.map(|n| Arc::new(Semaphore::new(n.max(1)))),
            cancel,
        };
        (batcher, BatcherHandle { tx })
    }

    /// Run until cancelled or until every handle is dropped, then drain.
    pub async fn run(mut self) {
        while self.tick().await.is_continue() {}
        self.drain().await;
    }

    /// Handle exactly one event: a record arriving or the timer expiring.
    async fn tick(&mut self) -> ControlFlow<()> {
        tokio::select! {
            received = self.rx.recv() => {
                match received {
                    Some(record) => self.intake(record),
                    None => {
                        debug!("all intake handles dropped");
                        return ControlFlow::Break(());
                    }
                }
            }
            _ = self.timer.tick() => {
                self.reap_deliveries();
                if self.flush() {
                    debug!("flush timer expired with pending records");
                }
            }
            _ = self.cancel.cancelled() => {
                debug!("batcher shutdown requested");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn intake(&mut self, record: Record) {
        let mut pending = record;
        // A full batch is always flushed as soon as it fills, so this only
        // loops if that invariant was broken; the record is never dropped.
        while let Err(rejected) = self.batch.push(pending) {
            self.flush_on_size();
            pending = rejected;
        }

        if self.batch.is_full() {
            self.flush_on_size();
        }
    }

    fn flush_on_size(&mut self) {
        self.flush();
        self.timer.reset();
    }

    /// Detach the current batch and spawn its delivery. Returns `false` when
    /// there was nothing to send.
    fn flush(&mut self) -> bool {
        if self.batch.is_empty() {
            return false;
        }

        let batch = self.batch.take();
        let exporter = Arc::clone(&self.exporter);
        let in_flight = self.in_flight.clone();

        debug!(records = batch.len(), "flushing batch");
        self.deliveries.spawn(async move {
            let _permit = match in_flight {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };
            deliver(&*exporter, batch).await;
        });
        true
    }

    /// Collect finished deliveries so the set does not grow without bound.
    fn reap_deliveries(&mut self) {
        while let Some(result) = self.deliveries.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "delivery task panicked");
            }
        }
    }

    async fn drain(&mut self) {
        self.rx.close();
        while let Some(record) = self.rx.recv().await {
            self.intake(record);
        }
        self.flush();

        let pending = self.deliveries.len();
        if pending > 0 {
            debug!(pending, "waiting for in-flight deliveries");
        }
        while let Some(result) = self.deliveries.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "delivery task panicked");
            }
        }
    }
}

/// Send one batch and log the outcome. Failed batches are dropped.
async fn deliver<E: Exporter>(exporter: &E, batch: Batch) {
    let records = batch.len();
    match exporter.export(&batch).await {
        Ok(()) => debug!(records, "batch delivered"),
        Err(ExportError::Rejected { status, body }) => {
            error!(records, status = status.as_u16(), body, "batch rejected, dropping");
        }
        Err(e) => error!(records, error = %e, "batch delivery failed, dropping"),
    }
}
