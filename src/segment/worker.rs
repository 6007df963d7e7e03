//! Segment worker pool
//!
//! Classified requests are executed off the I/O task by a fixed set of
//! worker tasks. Each worker owns a bounded FIFO queue and requests are
//! routed by stream key, so every request for one stream is served by the
//! same worker in submission order.
//!
//! ```text
//!   on_http_data ──► submit(item) ──► hash(app/stream) % N
//!                                          │
//!                 ┌────────────────────────┼────────────────────────┐
//!                 ▼                        ▼                        ▼
//!           [queue 0]                [queue 1]                [queue N-1]
//!           worker 0                 worker 1                 worker N-1
//!                 └──────────► process_handler(item) ◄──────────────┘
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::request::{SegmentRequestKind, SegmentStreamRequestInfo, StreamKey};
use crate::error::{Error, Result};
use crate::http::HttpConnection;

/// A classified request waiting for a worker
#[derive(Debug)]
pub struct SegmentWorkItem {
    /// Connection the response goes back on
    pub connection: Arc<HttpConnection>,
    /// Parsed request target
    pub request_info: SegmentStreamRequestInfo,
    /// Handling category
    pub kind: SegmentRequestKind,
}

impl SegmentWorkItem {
    pub fn new(connection: Arc<HttpConnection>, request_info: SegmentStreamRequestInfo) -> Self {
        let kind = request_info.kind();
        Self {
            connection,
            request_info,
            kind,
        }
    }
}

/// Callback executed by workers. Returning false rejects the request if no
/// response was sent.
pub type SegmentProcessHandler = Arc<dyn Fn(&SegmentWorkItem) -> bool + Send + Sync>;

/// Why a work item was not queued
#[derive(Debug)]
pub enum SubmitError {
    /// The pool is not running (never started, or stopping)
    NotStarted,
    /// The target worker's queue is at capacity; the item is handed back
    QueueFull(Box<SegmentWorkItem>),
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::NotStarted => write!(f, "Segment workers are not running"),
            SubmitError::QueueFull(item) => write!(
                f,
                "Segment worker queue is full: {}",
                item.request_info.stream_key()
            ),
        }
    }
}

impl std::error::Error for SubmitError {}

struct RunningPool {
    senders: Vec<mpsc::Sender<SegmentWorkItem>>,
    handles: Vec<JoinHandle<()>>,
}

/// Fixed-size pool of segment workers
pub struct SegmentWorkerManager {
    queue_capacity: usize,
    pool: Mutex<Option<RunningPool>>,
}

impl SegmentWorkerManager {
    /// Create a stopped pool whose per-worker queues hold `queue_capacity` items
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            pool: Mutex::new(None),
        }
    }

    /// Spawn `thread_count` workers on the current tokio runtime
    pub fn start(&self, thread_count: usize, process_handler: SegmentProcessHandler) -> Result<()> {
        if thread_count == 0 {
            return Err(Error::Config("segment worker count must be at least 1".into()));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Config("segment workers need a tokio runtime".into()))?;

        let mut pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        if pool.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let mut senders = Vec::with_capacity(thread_count);
        let mut handles = Vec::with_capacity(thread_count);

        for index in 0..thread_count {
            let (tx, rx) = mpsc::channel(self.queue_capacity);
            let handler = Arc::clone(&process_handler);
            senders.push(tx);
            handles.push(runtime.spawn(run_worker(index, rx, handler)));
        }

        *pool = Some(RunningPool { senders, handles });

        tracing::info!(
            workers = thread_count,
            queue_capacity = self.queue_capacity,
            "Segment workers started"
        );

        Ok(())
    }

    /// Queue a work item without waiting
    pub fn submit(&self, item: SegmentWorkItem) -> std::result::Result<(), SubmitError> {
        let pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        let pool = pool.as_ref().ok_or(SubmitError::NotStarted)?;

        let index = shard_index(&item.request_info.stream_key(), pool.senders.len());

        pool.senders[index].try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(item) => SubmitError::QueueFull(Box::new(item)),
            mpsc::error::TrySendError::Closed(_) => SubmitError::NotStarted,
        })
    }

    /// Stop accepting work, let queued items finish, and join the workers.
    ///
    /// Returns false if the pool was not running.
    pub async fn stop(&self) -> bool {
        let running = self.pool.lock().unwrap_or_else(|e| e.into_inner()).take();

        let RunningPool { senders, handles } = match running {
            Some(running) => running,
            None => return false,
        };

        // Closing the senders ends each worker once its queue drains
        drop(senders);

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Segment worker terminated abnormally");
            }
        }

        tracing::info!("Segment workers stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Number of running workers (0 when stopped)
    pub fn worker_count(&self) -> usize {
        self.pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|pool| pool.senders.len())
            .unwrap_or(0)
    }
}

impl Default for SegmentWorkerManager {
    fn default() -> Self {
        Self::new(1024)
    }
}

fn shard_index(key: &StreamKey, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}

async fn run_worker(
    index: usize,
    mut rx: mpsc::Receiver<SegmentWorkItem>,
    handler: SegmentProcessHandler,
) {
    tracing::debug!(worker = index, "Segment worker running");

    while let Some(item) = rx.recv().await {
        let handled = std::panic::catch_unwind(AssertUnwindSafe(|| handler(&item)));

        let ok = match handled {
            Ok(ok) => ok,
            Err(_) => {
                tracing::error!(
                    worker = index,
                    connection_id = item.connection.id,
                    stream = %item.request_info.stream_key(),
                    "Segment handler panicked"
                );
                false
            }
        };

        if !ok && !item.connection.phase().is_terminal() {
            item.connection.reject();
        }
    }

    tracing::debug!(worker = index, "Segment worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpConnectionPolicy, HttpMethod, HttpRequest, HttpResponse, RequestPhase};
    use crate::segment::request::parse_request_url;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item(id: u64, target: &str) -> (SegmentWorkItem, crate::http::PendingResponse) {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);
        let (conn, pending) = HttpConnection::new(id, addr, HttpRequest::new(HttpMethod::GET, target));
        let info = parse_request_url(target).unwrap();
        (SegmentWorkItem::new(Arc::new(conn), info), pending)
    }

    #[tokio::test]
    async fn test_submit_before_start() {
        let manager = SegmentWorkerManager::new(8);
        let (work, _pending) = item(1, "/live/s/a.ts");

        assert!(matches!(manager.submit(work), Err(SubmitError::NotStarted)));
        assert!(!manager.stop().await);
    }

    #[tokio::test]
    async fn test_start_rejects_zero_and_double_start() {
        let manager = SegmentWorkerManager::new(8);
        let handler: SegmentProcessHandler = Arc::new(|_| true);

        assert!(matches!(
            manager.start(0, Arc::clone(&handler)),
            Err(Error::Config(_))
        ));

        tokio_test::assert_ok!(manager.start(2, Arc::clone(&handler)));
        assert_eq!(manager.worker_count(), 2);
        assert!(matches!(manager.start(2, handler), Err(Error::AlreadyStarted)));

        assert!(manager.stop().await);
        assert_eq!(manager.worker_count(), 0);
    }

    #[tokio::test]
    async fn test_same_stream_preserves_order() {
        let manager = SegmentWorkerManager::new(256);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let recorder = Arc::clone(&seen);
        manager
            .start(
                4,
                Arc::new(move |item: &SegmentWorkItem| {
                    recorder.lock().unwrap().push(item.connection.id);
                    true
                }),
            )
            .unwrap();

        let mut pending = Vec::new();
        for id in 0..100u64 {
            let (work, rx) = item(id, &format!("/live/stream1/seg_{}.ts", id));
            manager.submit(work).unwrap();
            pending.push(rx);
        }

        manager.stop().await;

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..100u64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_stop_drains_queued_items() {
        let manager = SegmentWorkerManager::new(64);
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        manager
            .start(
                2,
                Arc::new(move |item: &SegmentWorkItem| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    item.connection
                        .respond(HttpResponse::ok(), HttpConnectionPolicy::KeepAlive)
                }),
            )
            .unwrap();

        let mut pending = Vec::new();
        for id in 0..20u64 {
            let (work, rx) = item(id, &format!("/app/stream{}/index.m3u8", id % 3));
            manager.submit(work).unwrap();
            pending.push(rx);
        }

        manager.stop().await;
        assert_eq!(count.load(Ordering::SeqCst), 20);

        let (late, _rx) = item(99, "/app/stream0/index.m3u8");
        assert!(matches!(manager.submit(late), Err(SubmitError::NotStarted)));

        for rx in pending {
            assert!(rx.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn test_failed_handler_rejects() {
        let manager = SegmentWorkerManager::new(8);
        manager.start(1, Arc::new(|_| false)).unwrap();

        let (work, pending) = item(1, "/live/s/a.ts");
        let conn = Arc::clone(&work.connection);
        manager.submit(work).unwrap();
        manager.stop().await;

        assert_eq!(conn.phase(), RequestPhase::Rejected);
        assert!(pending.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_kill_worker() {
        let manager = SegmentWorkerManager::new(8);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        manager
            .start(
                1,
                Arc::new(move |item: &SegmentWorkItem| {
                    if item.connection.id == 1 {
                        panic!("boom");
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    true
                }),
            )
            .unwrap();

        let (first, _p1) = item(1, "/live/s/a.ts");
        let (second, _p2) = item(2, "/live/s/b.ts");
        manager.submit(first).unwrap();
        manager.submit(second).unwrap();
        manager.stop().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_queue_full_hands_item_back() {
        let manager = SegmentWorkerManager::new(1);
        manager.start(1, Arc::new(|_| true)).unwrap();

        // On a current-thread runtime the worker cannot run until we yield
        let (first, _p1) = item(1, "/live/s/a.ts");
        let (second, _p2) = item(2, "/live/s/b.ts");
        manager.submit(first).unwrap();

        match manager.submit(second) {
            Err(SubmitError::QueueFull(item)) => assert_eq!(item.connection.id, 2),
            other => panic!("expected QueueFull, got {:?}", other.map(|_| ())),
        }

        manager.stop().await;
    }

    #[test]
    fn test_shard_index_stable() {
        let key = StreamKey::new("live", "stream1");
        let first = shard_index(&key, 8);
        for _ in 0..10 {
            assert_eq!(shard_index(&key, 8), first);
        }
        assert!(first < 8);
        assert_eq!(shard_index(&key, 1), 0);
    }
}
