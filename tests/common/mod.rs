//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use waymark::lifecycle::HookOutcome;
use waymark::routing::Side;
use waymark::{HookKind, Location, LocationError, LocationSource, MatchNode, MemoryHistory, Router, Shutdown};

/// In-memory history that records pushes and replaces and can be told to
/// fail replaces.
pub struct RecordingHistory {
    inner: MemoryHistory,
    pushes: Mutex<Vec<String>>,
    replaces: Mutex<Vec<String>>,
    fail_replace: AtomicBool,
}

impl RecordingHistory {
    pub fn new(initial: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryHistory::new(initial).unwrap(),
            pushes: Mutex::new(Vec::new()),
            replaces: Mutex::new(Vec::new()),
            fail_replace: AtomicBool::new(false),
        })
    }

    pub fn replaces(&self) -> Vec<String> {
        self.replaces.lock().unwrap().clone()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn fail_replaces(&self, fail: bool) {
        self.fail_replace.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocationSource for RecordingHistory {
    fn current(&self) -> Location {
        self.inner.current()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<Location> {
        self.inner.subscribe()
    }

    async fn push(&self, reference: &str) -> Result<(), LocationError> {
        self.pushes.lock().unwrap().push(reference.to_string());
        self.inner.push(reference).await
    }

    async fn replace(&self, reference: &str) -> Result<(), LocationError> {
        self.replaces.lock().unwrap().push(reference.to_string());
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(LocationError::Rejected {
                reference: reference.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.replace(reference).await
    }
}

/// Records `<kind>:<node>` for every hook it is attached to.
#[derive(Clone, Default)]
pub struct HookLog(Arc<Mutex<Vec<String>>>);

impl HookLog {
    pub fn attach(&self, node: &MatchNode) {
        for kind in HookKind::ALL {
            let log = self.clone();
            node.on(kind, move |ctx| {
                let log = log.clone();
                async move {
                    log.push(format!("{}:{}", ctx.kind, ctx.node.full_name()));
                    Ok(HookOutcome::Proceed)
                }
            });
        }
    }

    pub fn attach_all(&self, router: &Router) {
        for node in router.tree().nodes(Side::Committed) {
            self.attach(&node);
        }
    }

    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// A router processing locations on a background task.
pub struct Running {
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl Running {
    /// Signal shutdown without waiting for the loop to exit.
    pub fn trigger(&self) {
        self.shutdown.trigger();
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap();
    }
}

/// Spawn `router.run` and wait for its first commit.
pub async fn start(router: &Router) -> Running {
    let mut version = router.watch_version();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn({
        let router = router.clone();
        let rx = shutdown.subscribe();
        async move { router.run(rx).await }
    });

    tokio::time::timeout(Duration::from_secs(5), version.changed())
        .await
        .expect("initial location was never committed")
        .unwrap();

    Running { shutdown, handle }
}

/// Wait until every location queued so far has been processed.
///
/// Submits the history's current location; the queue is FIFO, so once that
/// settles everything queued before it has too.
pub async fn drain(router: &Router, history: &dyn LocationSource) {
    let _ = router.submit(history.current()).await;
}
