//! Coordinates the two backend calls for one request and hands the pair of
//! outcomes to the comparator exactly once.
//!
//! The reference outcome arrives on a oneshot channel from whoever
//! dispatched that call (the batch driver, or `dispatch_reference` on this
//! orchestrator). The wait for it is bounded by the configured interval and
//! attempt count; on expiry a timeout outcome is recorded and the request
//! still produces a report entry instead of aborting the batch.

use crate::{
    compare::{ExemptionSet, LineComparator},
    config::BatchConfiguration,
    data::{BackendError, BackendOutcome, MirroredRequest, OutboundRequest, ReportEntry},
    error::Error,
    http_client::HttpClient,
    mirror::{self, RequestMirror},
    normalize,
    report::ReportAggregator,
    run_context::RunContext,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub type ReferenceReceiver = oneshot::Receiver<BackendOutcome>;

/// What happened to one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDisposition {
    /// Utility/setup entry, excluded from comparison entirely.
    Skipped,
    /// Mirroring failed; no call was issued to either backend and no entry
    /// was recorded.
    TransformFailed,
    /// A report entry was recorded under this serial number.
    Recorded(u32),
}

#[derive(Debug)]
pub struct Orchestrator {
    config: BatchConfiguration,
    mirror: RequestMirror,
    comparator: LineComparator,
    aggregator: ReportAggregator,
    client: Arc<dyn HttpClient + Send + Sync>,
}

impl Orchestrator {
    pub fn new(config: BatchConfiguration) -> Result<Self, Error> {
        let mirror = RequestMirror::from_config(&config)?;
        let comparator = LineComparator::new(ExemptionSet::new(
            config.exempted_fields().iter().cloned(),
        ));
        let aggregator = ReportAggregator::from_config(&config);
        let client = config.http_client();

        Ok(Self {
            config,
            mirror,
            comparator,
            aggregator,
            client,
        })
    }

    pub fn config(&self) -> &BatchConfiguration {
        &self.config
    }

    pub fn aggregator(&self) -> &ReportAggregator {
        &self.aggregator
    }

    /// Explicit teardown before a run: clears the store except the
    /// configured preserve-list.
    pub fn reset_run(&self, ctx: &mut RunContext) {
        ctx.reset(self.config.preserved_keys());
    }

    /// Processes one logical request end to end: mirror, call the candidate,
    /// await the reference outcome within the bound, compare, record exactly
    /// one entry. Requests within a batch must go through sequentially; the
    /// `&mut RunContext` makes that single-owner assumption explicit.
    pub async fn run_request(
        &self,
        ctx: &mut RunContext,
        request_name: &str,
        source: &OutboundRequest,
        reference: ReferenceReceiver,
    ) -> Result<RequestDisposition, Error> {
        if self.config.is_utility_request(request_name) {
            debug!(request = request_name, "skipping utility request");
            return Ok(RequestDisposition::Skipped);
        }

        let mirrored = match self.mirror.mirror(source) {
            Ok(mirrored) => mirrored,
            Err(e) => {
                warn!(request = request_name, error = %e, "transform failed, comparison aborted");
                return Ok(RequestDisposition::TransformFailed);
            }
        };

        // Serial is assigned at dispatch time, before either call resolves.
        let serial = ctx.next_serial();
        let replay = mirror::replay_command(&mirrored);

        info!(request = request_name, serial, "dispatching candidate call");
        let (candidate, reference) = futures::join!(
            self.call_candidate(&mirrored),
            self.await_reference(reference)
        );

        let entry = self.build_entry(serial, request_name, replay, &reference, &candidate);
        ctx.record(&entry)?;

        Ok(RequestDisposition::Recorded(serial))
    }

    /// Issues the reference-side call on the shared client and returns the
    /// receiver for its outcome, for drivers that let the orchestrator own
    /// both calls.
    pub fn dispatch_reference(&self, request: &OutboundRequest) -> ReferenceReceiver {
        let (sender, receiver) = oneshot::channel();
        let client = self.client.clone();
        let call = MirroredRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request
                .headers
                .iter()
                .filter(|(name, _)| !request.is_header_disabled(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            body: request.enabled_body(),
        };

        tokio::spawn(async move {
            let outcome = outcome_from(client.make_request(&call).await);
            let _ = sender.send(outcome);
        });

        receiver
    }

    /// Wraps an already-resolved reference outcome (for example one relayed
    /// through the run store) into the channel form `run_request` expects.
    pub fn resolved_reference(outcome: BackendOutcome) -> ReferenceReceiver {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(outcome);
        receiver
    }

    async fn call_candidate(&self, request: &MirroredRequest) -> BackendOutcome {
        outcome_from(self.client.make_request(request).await)
    }

    async fn await_reference(&self, receiver: ReferenceReceiver) -> BackendOutcome {
        match tokio::time::timeout(self.config.wait_bound(), receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                warn!("reference dispatcher dropped without an outcome");
                BackendOutcome::network_error("reference outcome channel closed")
            }
            Err(_) => {
                warn!(
                    bound_ms = self.config.wait_bound().as_millis() as u64,
                    "reference outcome not observed within the wait bound"
                );
                BackendOutcome::timeout()
            }
        }
    }

    fn build_entry(
        &self,
        serial: u32,
        request_name: &str,
        replay: String,
        reference: &BackendOutcome,
        candidate: &BackendOutcome,
    ) -> ReportEntry {
        if let Some(BackendError::Network(message)) = &reference.error {
            warn!(
                request = request_name,
                error = message.as_str(),
                "reference backend errored, recording zero-line failure"
            );
            return self
                .aggregator
                .error_entry(serial, request_name, replay, reference, candidate);
        }

        let reference_lines =
            normalize::normalize_lines(reference.body.as_deref().unwrap_or(""));
        let candidate_lines =
            normalize::normalize_lines(candidate.body.as_deref().unwrap_or(""));
        let comparison = self.comparator.compare(&reference_lines, &candidate_lines);

        self.aggregator
            .build_entry(serial, request_name, replay, reference, candidate, &comparison)
    }
}

fn outcome_from(result: Result<crate::http_client::HttpReply, Error>) -> BackendOutcome {
    match result {
        Ok(reply) => BackendOutcome::success(reply.status_code, reply.body),
        Err(Error::RequestTimeout) => BackendOutcome::timeout(),
        Err(e) => BackendOutcome::network_error(e.to_string()),
    }
}
