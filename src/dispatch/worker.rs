//! Worker side of the dispatch protocol.

use tracing::{error, info};

use super::{DispatchError, Reply, Request, WorkerEndpoint, WorkerId};
use crate::executor;

/// Counters for one worker's completed loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerReport {
    /// Jobs whose command exited zero.
    pub succeeded: usize,
    /// Jobs that exited non-zero or could not be started.
    pub failed: usize,
}

/// Blocking request/execute loop run on a dedicated worker thread.
///
/// Processes exactly one job at a time; there is no concurrency inside a
/// single worker.
pub struct WorkerLoop {
    endpoint: WorkerEndpoint,
}

impl WorkerLoop {
    /// Bind a loop to its channel endpoints.
    pub fn new(endpoint: WorkerEndpoint) -> Self {
        Self { endpoint }
    }

    fn id(&self) -> WorkerId {
        self.endpoint.id
    }

    /// Announce readiness, then pull and execute jobs until terminated.
    ///
    /// A `Terminate` in place of the initial `Ready` is a clean zero-job
    /// exit (the coordinator aborted before dispatch started); a job
    /// arriving before `Ready` is a protocol violation that fails this
    /// worker and nobody else.
    pub fn run(self) -> Result<WorkerReport, DispatchError> {
        let mut report = WorkerReport::default();
        self.send(Request::Hello { worker: self.id() })?;
        match self.recv()? {
            Reply::Ready => {}
            Reply::Terminate => {
                info!("Worker {} terminated before dispatch began", self.id());
                return Ok(report);
            }
            reply => {
                return Err(DispatchError::UnexpectedReply {
                    worker: self.id(),
                    expected: "ready",
                    got: reply.kind(),
                });
            }
        }

        loop {
            self.send(Request::Pull { worker: self.id() })?;
            match self.recv()? {
                Reply::Job(job) => {
                    info!("Worker {} executing job {}", self.id(), job.id);
                    match executor::execute(&job) {
                        Ok(true) => report.succeeded += 1,
                        Ok(false) => report.failed += 1,
                        Err(err) => {
                            error!("Worker {} could not run job {}: {err}", self.id(), job.id);
                            report.failed += 1;
                        }
                    }
                }
                Reply::Terminate => break,
                reply => {
                    return Err(DispatchError::UnexpectedReply {
                        worker: self.id(),
                        expected: "job or terminate",
                        got: reply.kind(),
                    });
                }
            }
        }
        info!(
            "Worker {} done: {} succeeded, {} failed",
            self.id(),
            report.succeeded,
            report.failed
        );
        Ok(report)
    }

    fn send(&self, request: Request) -> Result<(), DispatchError> {
        self.endpoint
            .requests
            .send(request)
            .map_err(|_| DispatchError::CoordinatorGone { worker: self.id() })
    }

    fn recv(&self) -> Result<Reply, DispatchError> {
        self.endpoint
            .mailbox
            .recv()
            .map_err(|_| DispatchError::CoordinatorGone { worker: self.id() })
    }
}
