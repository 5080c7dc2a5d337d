//! Single-threaded event delivery with redelivery of deferred events.

use std::collections::VecDeque;

use anyhow::Result;
use log::{debug, error, info};

use crate::{
    coordinator::{Coordinator, Disposition},
    relation::CertificateCreationRequest,
};

/// Counts of what happened during one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub ignored: usize,
    pub deferred: usize,
    pub dropped: usize,
    pub blocked: usize,
    pub published: usize,
}

impl DispatchReport {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Ignored => self.ignored += 1,
            Disposition::Deferred => self.deferred += 1,
            Disposition::Dropped => self.dropped += 1,
            Disposition::Blocked => self.blocked += 1,
            Disposition::Published => self.published += 1,
        }
    }
}

/// Events waiting for the coordinator.
///
/// Each pass delivers every queued event once, in arrival order. Deferred
/// events stay queued, ahead of anything emitted later, and are delivered
/// again on the next pass.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<CertificateCreationRequest>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: CertificateCreationRequest) {
        self.pending.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Delivers queued events one at a time.
    ///
    /// A handler error stops the pass and discards the failing event. Deferred
    /// events and everything after the failing one stay queued.
    pub async fn dispatch(&mut self, coordinator: &mut Coordinator) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        let mut deferred = VecDeque::new();

        while let Some(event) = self.pending.pop_front() {
            let disposition = match coordinator.handle_certificate_request(&event).await {
                Ok(disposition) => disposition,
                Err(err) => {
                    error!(
                        "[dispatch] discarding event for relation {}: {:#}",
                        event.relation_id, err
                    );
                    deferred.append(&mut self.pending);
                    self.pending = deferred;
                    return Err(err);
                }
            };
            debug!(
                "[dispatch] relation {} -> {:?}",
                event.relation_id, disposition
            );
            report.record(disposition);
            if disposition == Disposition::Deferred {
                deferred.push_back(event);
            }
        }

        self.pending = deferred;
        if !self.pending.is_empty() {
            info!("[dispatch] {} event(s) deferred", self.pending.len());
        }
        Ok(report)
    }
}
