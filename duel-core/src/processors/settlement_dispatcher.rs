//! SettlementDispatcher processor.
//!
//! The SettlementDispatcher is responsible for:
//! - Receiving `LedgerJob`s queued by the coordinator
//! - Running each job against the `LedgerGateway` in its own task, bounded
//!   by the configured timeout
//! - Reporting every result back as `CoordinatorEvent::LedgerFinished`
//!
//! Jobs are attempted exactly once. Shutdown dispatches whatever is still
//! queued and waits for in-flight calls before returning.

use crate::events::{CoordinatorEvent, CoordinatorEventSender, LedgerJob, LedgerJobReceiver};
use crate::processors::ledger::{LedgerError, LedgerGateway};
use duel_sdk::objects::LedgerAck;
use kanau::processor::Processor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct SettlementDispatcher {
    gateway: Arc<dyn LedgerGateway>,
    events: CoordinatorEventSender,
    timeout: Duration,
}

impl SettlementDispatcher {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        events: CoordinatorEventSender,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            events,
            timeout,
        }
    }

    /// Run until shutdown is signaled or the job channel closes. Jobs still
    /// queued at that point are dispatched and in-flight calls are awaited
    /// for up to one timeout before being abandoned.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut job_rx: LedgerJobReceiver) {
        info!("SettlementDispatcher started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("SettlementDispatcher received shutdown signal");
                        break;
                    }
                }

                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}

                job = job_rx.recv() => {
                    let Some(job) = job else {
                        info!("LedgerJob channel closed");
                        break;
                    };
                    in_flight.spawn(self.clone().deliver(job));
                }
            }
        }

        self.drain(&mut job_rx, &mut in_flight).await;
        info!("SettlementDispatcher shutdown complete");
    }

    async fn drain(&self, job_rx: &mut LedgerJobReceiver, in_flight: &mut JoinSet<()>) {
        job_rx.close();
        while let Ok(job) = job_rx.try_recv() {
            debug!(kind = job.kind(), "Dispatching queued ledger job at shutdown");
            in_flight.spawn(self.clone().deliver(job));
        }
        if in_flight.is_empty() {
            return;
        }

        info!(pending = in_flight.len(), "Waiting for in-flight ledger jobs");
        let grace = self.timeout + Duration::from_secs(1);
        let finished = tokio::time::timeout(grace, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if finished.is_err() {
            error!(
                abandoned = in_flight.len(),
                "Ledger jobs still running at shutdown, abandoning them"
            );
            in_flight.abort_all();
        }
    }

    /// Run `job` and report the result to the coordinator.
    async fn deliver(self, job: LedgerJob) {
        let kind = job.kind();
        debug!(kind, "Dispatching ledger job");
        let result = self.process(job.clone()).await;
        if self
            .events
            .send(CoordinatorEvent::LedgerFinished { job, result })
            .await
            .is_err()
        {
            warn!(kind, "Coordinator stopped, dropping ledger result");
        }
    }
}

impl Processor<LedgerJob> for SettlementDispatcher {
    type Output = LedgerAck;
    type Error = LedgerError;

    #[tracing::instrument(skip_all, err, name = "Ledger:Dispatch")]
    async fn process(&self, job: LedgerJob) -> Result<LedgerAck, LedgerError> {
        let call = async {
            match &job {
                LedgerJob::Settlement(request) => self.gateway.request_settlement(request).await,
                LedgerJob::Refund(request) => self.gateway.request_pre_stake_refund(request).await,
            }
        };
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| LedgerError::Timeout)?
    }
}
