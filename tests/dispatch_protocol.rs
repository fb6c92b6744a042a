//! Protocol-level tests driving the coordinator and worker loop over raw
//! channel endpoints, without executing any real job commands.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;

use simbatch::dispatch::{self, DispatchError, Reply, Request, WorkerEndpoint, WorkerLoop};
use simbatch::job::Job;

fn stub_job(id: &str) -> Job {
    Job {
        id: id.to_string(),
        dir: std::env::temp_dir(),
        command: "true".to_string(),
        geometry: format!("POINT({id} 0)"),
        outputs: Vec::new(),
    }
}

/// Drive one endpoint through the full protocol by hand, returning the
/// ids of every job it was handed.
fn drive_worker(endpoint: WorkerEndpoint) -> Vec<String> {
    endpoint
        .requests
        .send(Request::Hello {
            worker: endpoint.id,
        })
        .unwrap();
    match endpoint.mailbox.recv().unwrap() {
        Reply::Ready => {}
        other => panic!("expected ready, got {other:?}"),
    }
    let mut seen = Vec::new();
    loop {
        endpoint
            .requests
            .send(Request::Pull {
                worker: endpoint.id,
            })
            .unwrap();
        match endpoint.mailbox.recv().unwrap() {
            Reply::Job(job) => seen.push(job.id.clone()),
            Reply::Terminate => break,
            Reply::Ready => panic!("duplicate ready"),
        }
    }
    seen
}

#[test]
fn every_job_dispatched_once_and_every_worker_terminated() {
    let jobs: Vec<Job> = (0..5).map(|idx| stub_job(&format!("job{idx}"))).collect();
    let (coordinator, endpoints) = dispatch::wire(3);

    let workers: Vec<_> = endpoints
        .into_iter()
        .map(|endpoint| thread::spawn(move || drive_worker(endpoint)))
        .collect();
    let report = coordinator.dispatch(jobs).unwrap();
    assert_eq!(report.dispatched, 5);

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for handle in workers {
        // Each join implies the worker received exactly one terminate.
        for id in handle.join().unwrap() {
            *counts.entry(id).or_default() += 1;
        }
    }
    assert_eq!(counts.len(), 5);
    assert!(counts.values().all(|&count| count == 1));
}

#[test]
fn single_worker_receives_jobs_in_catalog_order() {
    let jobs: Vec<Job> = ["a", "b", "c"].iter().map(|id| stub_job(id)).collect();
    let (coordinator, mut endpoints) = dispatch::wire(1);
    let endpoint = endpoints.remove(0);

    let worker = thread::spawn(move || drive_worker(endpoint));
    coordinator.dispatch(jobs).unwrap();
    assert_eq!(worker.join().unwrap(), ["a", "b", "c"]);
}

#[test]
fn empty_catalog_terminates_every_worker_after_ready() {
    let (coordinator, endpoints) = dispatch::wire(2);
    let workers: Vec<_> = endpoints
        .into_iter()
        .map(|endpoint| thread::spawn(move || drive_worker(endpoint)))
        .collect();

    let report = coordinator.dispatch(Vec::new()).unwrap();
    assert_eq!(report.dispatched, 0);
    for handle in workers {
        assert!(handle.join().unwrap().is_empty());
    }
}

#[test]
fn abort_answers_every_hello_with_terminate() {
    let (coordinator, endpoints) = dispatch::wire(2);
    let workers: Vec<_> = endpoints
        .into_iter()
        .map(|endpoint| {
            thread::spawn(move || {
                endpoint
                    .requests
                    .send(Request::Hello {
                        worker: endpoint.id,
                    })
                    .unwrap();
                matches!(endpoint.mailbox.recv().unwrap(), Reply::Terminate)
            })
        })
        .collect();

    coordinator.abort().unwrap();
    for handle in workers {
        assert!(handle.join().unwrap());
    }
}

#[test]
fn worker_loop_exits_cleanly_when_terminated_before_ready() {
    let (request_tx, _request_rx) = mpsc::channel();
    let (reply_tx, reply_rx) = mpsc::channel();
    reply_tx.send(Reply::Terminate).unwrap();

    let report = WorkerLoop::new(WorkerEndpoint {
        id: 0,
        requests: request_tx,
        mailbox: reply_rx,
    })
    .run()
    .unwrap();
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 0);
}

#[test]
fn worker_loop_fails_loudly_on_job_before_ready() {
    let (request_tx, _request_rx) = mpsc::channel();
    let (reply_tx, reply_rx) = mpsc::channel();
    reply_tx
        .send(Reply::Job(Box::new(stub_job("early"))))
        .unwrap();

    let err = WorkerLoop::new(WorkerEndpoint {
        id: 3,
        requests: request_tx,
        mailbox: reply_rx,
    })
    .run()
    .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::UnexpectedReply { worker: 3, .. }
    ));
}

#[test]
fn worker_loop_fails_on_duplicate_ready() {
    let (request_tx, _request_rx) = mpsc::channel();
    let (reply_tx, reply_rx) = mpsc::channel();
    reply_tx.send(Reply::Ready).unwrap();
    reply_tx.send(Reply::Ready).unwrap();

    let err = WorkerLoop::new(WorkerEndpoint {
        id: 0,
        requests: request_tx,
        mailbox: reply_rx,
    })
    .run()
    .unwrap_err();
    assert!(matches!(err, DispatchError::UnexpectedReply { .. }));
}

#[test]
fn coordinator_rejects_pull_before_hello() {
    let (coordinator, mut endpoints) = dispatch::wire(1);
    let endpoint = endpoints.remove(0);
    endpoint
        .requests
        .send(Request::Pull { worker: 0 })
        .unwrap();

    let err = coordinator.dispatch(vec![stub_job("x")]).unwrap_err();
    assert!(matches!(
        err,
        DispatchError::UnexpectedRequest { got: "pull", .. }
    ));
}
