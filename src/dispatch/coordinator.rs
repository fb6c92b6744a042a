//! Coordinator side of the dispatch protocol.

use std::sync::mpsc::{Receiver, Sender};

use tracing::{debug, info};

use super::{DispatchError, Reply, Request, WorkerId};
use crate::job::Job;

/// Counters for one completed dispatch run.
#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchReport {
    /// Jobs handed out; equals the catalog size on success.
    pub dispatched: usize,
}

/// Single-threaded owner of the remaining-work sequence.
///
/// Holds no per-job state beyond the pop cursor: it never records which
/// worker ran which job, and has no heartbeat for stalled workers. A
/// worker that stops pulling stalls the run.
pub struct Coordinator {
    requests: Receiver<Request>,
    mailboxes: Vec<Sender<Reply>>,
}

impl Coordinator {
    pub(super) fn new(requests: Receiver<Request>, mailboxes: Vec<Sender<Reply>>) -> Self {
        Self {
            requests,
            mailboxes,
        }
    }

    /// Number of worker identities known to this coordinator.
    pub fn worker_count(&self) -> usize {
        self.mailboxes.len()
    }

    /// Hand every job to a requesting worker, then terminate the pool.
    ///
    /// Dispatch order is the iteration order of `jobs`; which worker gets
    /// which job is first-requester-wins. Returns once every worker has
    /// been sent its termination signal.
    pub fn dispatch(self, jobs: impl IntoIterator<Item = Job>) -> Result<DispatchReport, DispatchError> {
        self.handshake()?;
        let mut report = DispatchReport::default();
        for job in jobs {
            let worker = self.expect_pull("dispatch")?;
            debug!("Dispatching job {} to worker {worker}", job.id);
            self.send(worker, Reply::Job(Box::new(job)))?;
            report.dispatched += 1;
        }
        self.drain()?;
        info!(
            "Dispatched {} jobs across {} workers",
            report.dispatched,
            self.worker_count()
        );
        Ok(report)
    }

    /// Catalog construction failed: answer every worker's hello with a
    /// termination signal so none of them blocks forever.
    pub fn abort(self) -> Result<(), DispatchError> {
        for _ in 0..self.worker_count() {
            let request = self.recv()?;
            self.send(request.worker(), Reply::Terminate)?;
        }
        debug!("Aborted; all {} workers terminated", self.worker_count());
        Ok(())
    }

    /// Receive `Hello` from every worker, then acknowledge each with
    /// `Ready`. No job is handed out before the whole pool has checked
    /// in, so no worker can race ahead of catalog construction.
    fn handshake(&self) -> Result<(), DispatchError> {
        let mut greeted = vec![false; self.worker_count()];
        let mut remaining = self.worker_count();
        while remaining > 0 {
            let request = self.recv()?;
            let worker = request.worker();
            match request {
                Request::Hello { .. } => {
                    let seen = greeted
                        .get_mut(worker)
                        .ok_or(DispatchError::UnknownWorker { worker })?;
                    if *seen {
                        return Err(DispatchError::UnexpectedRequest {
                            worker,
                            got: "hello",
                            phase: "handshake",
                        });
                    }
                    *seen = true;
                    remaining -= 1;
                }
                Request::Pull { .. } => {
                    return Err(DispatchError::UnexpectedRequest {
                        worker,
                        got: "pull",
                        phase: "handshake",
                    });
                }
            }
        }
        for worker in 0..self.worker_count() {
            self.send(worker, Reply::Ready)?;
        }
        debug!("All {} workers ready", self.worker_count());
        Ok(())
    }

    /// Answer exactly one further pull per worker with a termination
    /// signal. Workers only pull after finishing their current job, so
    /// this inherently waits for the last dispatched job per worker.
    fn drain(&self) -> Result<(), DispatchError> {
        let mut terminated = vec![false; self.worker_count()];
        for _ in 0..self.worker_count() {
            let worker = self.expect_pull("drain")?;
            let done = terminated
                .get_mut(worker)
                .ok_or(DispatchError::UnknownWorker { worker })?;
            if *done {
                return Err(DispatchError::UnexpectedRequest {
                    worker,
                    got: "pull",
                    phase: "drain",
                });
            }
            *done = true;
            self.send(worker, Reply::Terminate)?;
            debug!("Terminated worker {worker}");
        }
        Ok(())
    }

    fn expect_pull(&self, phase: &'static str) -> Result<WorkerId, DispatchError> {
        match self.recv()? {
            Request::Pull { worker } => Ok(worker),
            Request::Hello { worker } => Err(DispatchError::UnexpectedRequest {
                worker,
                got: "hello",
                phase,
            }),
        }
    }

    fn recv(&self) -> Result<Request, DispatchError> {
        self.requests
            .recv()
            .map_err(|_| DispatchError::RequestsClosed)
    }

    fn send(&self, worker: WorkerId, reply: Reply) -> Result<(), DispatchError> {
        let mailbox = self
            .mailboxes
            .get(worker)
            .ok_or(DispatchError::UnknownWorker { worker })?;
        mailbox
            .send(reply)
            .map_err(|_| DispatchError::MailboxClosed { worker })
    }
}
