//! # Job Dispatch
//!
//! Sends a print queue to a printer session.
//!
//! | Transport | Writes per queue |
//! |-----------|------------------|
//! | bridge | one: every job's buffer appended, copies repeated by the printer |
//! | wireless | one buffer per physical copy, each encoded with `copies = 1` |
//!
//! The dispatcher owns one session per transport kind behind an async
//! mutex; a second dispatch to the same transport waits for the first.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::MiseError;
use crate::printer::PhysicalSpec;
use crate::protocol::{self, CommandBuffer, EncodeOptions};
use crate::render::mono::PackedBitmap;
use crate::session::{PrinterSession, SessionState};
use crate::transport::TransportKind;

/// One label in a print queue.
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub label_id: String,
    pub spec: PhysicalSpec,
    pub bitmap: Arc<PackedBitmap>,
    pub copies: u32,
    pub options: EncodeOptions,
}

impl PrintJob {
    /// The job as one buffer, copies repeated by the printer.
    pub fn command_buffer(&self) -> Result<CommandBuffer, MiseError> {
        Ok(protocol::encode(&self.spec, &self.bitmap, self.copies, &self.options)?)
    }

    /// One physical copy.
    pub fn single_copy(&self) -> Result<CommandBuffer, MiseError> {
        Ok(protocol::encode(&self.spec, &self.bitmap, 1, &self.options)?)
    }
}

/// Summary of a completed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub transport: TransportKind,
    pub jobs: usize,
    pub copies: u64,
    pub writes: usize,
    pub bytes: usize,
}

struct SessionSlot {
    session: Arc<Mutex<PrinterSession>>,
    state: watch::Receiver<SessionState>,
}

#[derive(Default)]
pub struct Dispatcher {
    sessions: BTreeMap<TransportKind, SessionSlot>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; replaces any existing one of the same kind.
    pub fn register(&mut self, session: PrinterSession) {
        let kind = session.kind();
        let state = session.subscribe();
        self.sessions.insert(
            kind,
            SessionSlot {
                session: Arc::new(Mutex::new(session)),
                state,
            },
        );
    }

    pub fn with_session(mut self, session: PrinterSession) -> Self {
        self.register(session);
        self
    }

    pub fn session(&self, kind: TransportKind) -> Option<Arc<Mutex<PrinterSession>>> {
        self.sessions.get(&kind).map(|slot| Arc::clone(&slot.session))
    }

    /// Current state of every registered session, without waiting on sends.
    pub fn states(&self) -> Vec<(TransportKind, SessionState)> {
        self.sessions
            .iter()
            .map(|(kind, slot)| (*kind, *slot.state.borrow()))
            .collect()
    }

    fn slot(&self, kind: TransportKind) -> Result<&SessionSlot, MiseError> {
        self.sessions
            .get(&kind)
            .ok_or(MiseError::TransportUnavailable { kind })
    }

    pub async fn connect(&self, kind: TransportKind) -> Result<SessionState, MiseError> {
        let mut session = self.slot(kind)?.session.lock().await;
        session
            .connect()
            .await
            .map_err(|cause| MiseError::ConnectFailed { kind, cause })?;
        Ok(session.state())
    }

    pub async fn disconnect(&self, kind: TransportKind) -> Result<SessionState, MiseError> {
        let mut session = self.slot(kind)?.session.lock().await;
        if let Err(e) = session.disconnect().await {
            warn!(transport = %kind, error = %e, "error while disconnecting");
        }
        Ok(session.state())
    }

    /// Send a queue of jobs, in order.
    ///
    /// Every job is encoded before the first write, so an encode failure
    /// sends nothing.
    pub async fn dispatch(
        &self,
        kind: TransportKind,
        queue: &[PrintJob],
    ) -> Result<DispatchReport, MiseError> {
        let slot = self.slot(kind)?;
        // Fail fast instead of queueing behind a session that cannot print.
        if *slot.state.borrow() == SessionState::Disconnected {
            return Err(MiseError::TransportUnavailable { kind });
        }

        let mut session = slot.session.lock().await;
        let mut connected = session.connected()?;

        let mut report = DispatchReport {
            transport: kind,
            jobs: queue.len(),
            copies: queue.iter().map(|j| j.copies as u64).sum(),
            writes: 0,
            bytes: 0,
        };

        match kind {
            TransportKind::Bridge => {
                let mut buffer = Vec::new();
                for job in queue {
                    buffer.extend_from_slice(job.command_buffer()?.as_bytes());
                }
                if !buffer.is_empty() {
                    report.writes = connected.send(&buffer).await.map_err(|cause| {
                        MiseError::TransportSendFailed {
                            item_index: 0,
                            cause,
                        }
                    })?;
                    report.bytes = buffer.len();
                }
            }
            TransportKind::Wireless => {
                let buffers = queue
                    .iter()
                    .map(PrintJob::single_copy)
                    .collect::<Result<Vec<_>, _>>()?;
                for (item_index, (job, buffer)) in queue.iter().zip(&buffers).enumerate() {
                    for copy in 0..job.copies {
                        debug!(item_index, copy, label = %job.label_id, "sending copy");
                        report.writes += connected.send(buffer.as_bytes()).await.map_err(|cause| {
                            MiseError::TransportSendFailed { item_index, cause }
                        })?;
                        report.bytes += buffer.len();
                    }
                }
            }
        }

        info!(
            transport = %kind,
            jobs = report.jobs,
            copies = report.copies,
            writes = report.writes,
            bytes = report.bytes,
            "print queue dispatched"
        );
        Ok(report)
    }
}
