//! Pull-model dispatch: one coordinator hands jobs to a pool of workers.
//!
//! Workers announce themselves once (`Hello`), wait for the coordinator's
//! `Ready` acknowledgment, then pull jobs until told to terminate. All
//! exchanges happen over mpsc channels: a shared request channel into the
//! coordinator and one single-writer mailbox per worker, with worker
//! identity carried explicitly in every request.

mod coordinator;
mod worker;

pub use coordinator::{Coordinator, DispatchReport};
pub use worker::{WorkerLoop, WorkerReport};

use std::sync::mpsc::{self, Receiver, Sender};

use thiserror::Error;

use crate::job::Job;

/// Identity of one worker within a run, assigned at wiring time.
pub type WorkerId = usize;

/// Messages workers send over the shared request channel.
#[derive(Debug)]
pub enum Request {
    /// One-time readiness signal, sent before the first pull.
    Hello {
        /// Sender's identity.
        worker: WorkerId,
    },
    /// The worker is idle and wants its next job.
    Pull {
        /// Sender's identity.
        worker: WorkerId,
    },
}

impl Request {
    /// Worker identity carried by the message.
    pub fn worker(&self) -> WorkerId {
        match self {
            Request::Hello { worker } | Request::Pull { worker } => *worker,
        }
    }
}

/// Replies delivered into a single worker's mailbox.
#[derive(Debug)]
pub enum Reply {
    /// Handshake acknowledgment; dispatch is about to begin.
    Ready,
    /// The next job to execute.
    Job(Box<Job>),
    /// No more work; exit the loop.
    Terminate,
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Reply::Ready => "ready",
            Reply::Job(_) => "job",
            Reply::Terminate => "terminate",
        }
    }
}

/// Errors in the dispatch protocol.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Every worker endpoint disconnected while requests were expected.
    #[error("All workers disconnected before dispatch finished")]
    RequestsClosed,
    /// A worker dropped its mailbox while the coordinator held a reply.
    #[error("Worker {worker} is gone; its mailbox is closed")]
    MailboxClosed {
        /// The worker whose mailbox disappeared.
        worker: WorkerId,
    },
    /// A request carried an identity outside the wired pool.
    #[error("Unknown worker identity {worker}")]
    UnknownWorker {
        /// The identity that was not recognized.
        worker: WorkerId,
    },
    /// The coordinator received a request the current phase forbids.
    #[error("Unexpected {got} request from worker {worker} during {phase}")]
    UnexpectedRequest {
        /// The offending worker.
        worker: WorkerId,
        /// The request kind that arrived.
        got: &'static str,
        /// The protocol phase it arrived in.
        phase: &'static str,
    },
    /// A worker received a reply the protocol forbids at this point.
    #[error("Worker {worker} expected {expected} but received {got}")]
    UnexpectedReply {
        /// The worker that saw the violation.
        worker: WorkerId,
        /// The reply kinds the protocol allows here.
        expected: &'static str,
        /// The reply kind that arrived.
        got: &'static str,
    },
    /// The coordinator hung up before this worker was terminated.
    #[error("Worker {worker} lost its link to the coordinator")]
    CoordinatorGone {
        /// The orphaned worker.
        worker: WorkerId,
    },
}

/// One worker's endpoints: the shared request line plus its own mailbox.
pub struct WorkerEndpoint {
    /// Identity this endpoint speaks as.
    pub id: WorkerId,
    /// Shared request channel into the coordinator.
    pub requests: Sender<Request>,
    /// Replies addressed to this worker only.
    pub mailbox: Receiver<Reply>,
}

/// Wire a coordinator to `workers` worker endpoints.
pub fn wire(workers: usize) -> (Coordinator, Vec<WorkerEndpoint>) {
    let (request_tx, request_rx) = mpsc::channel();
    let mut mailboxes = Vec::with_capacity(workers);
    let mut endpoints = Vec::with_capacity(workers);
    for id in 0..workers {
        let (reply_tx, reply_rx) = mpsc::channel();
        mailboxes.push(reply_tx);
        endpoints.push(WorkerEndpoint {
            id,
            requests: request_tx.clone(),
            mailbox: reply_rx,
        });
    }
    (Coordinator::new(request_rx, mailboxes), endpoints)
}
