//! Dispatcher — a fixed pool of lanes, each a bounded queue plus one worker.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use edgescale_core::config::DispatchConfig;
use edgescale_core::epoch_millis;

use crate::error::{DispatchError, DispatchResult};

/// Processes one datagram on a lane.
///
/// Called by exactly one worker per lane, one datagram at a time.
#[async_trait]
pub trait DatagramHandler: Send + Sync + 'static {
    async fn handle(&self, lane: usize, datagram: Bytes);
}

/// Routes datagrams onto a fixed set of bounded lanes.
pub struct Dispatcher {
    lanes: Vec<mpsc::Sender<Bytes>>,
    workers: Vec<JoinHandle<()>>,
    queue_depth: usize,
}

impl Dispatcher {
    /// Create the lanes and spawn one worker per lane.
    ///
    /// Must be called from within a Tokio runtime. Rejects an empty pool or
    /// zero-depth queues before any worker starts.
    pub fn start<H: DatagramHandler>(config: DispatchConfig, handler: Arc<H>) -> DispatchResult<Self> {
        if config.pool_size == 0 {
            return Err(DispatchError::InvalidConfig("pool_size must be at least 1".into()));
        }
        if config.queue_depth == 0 {
            return Err(DispatchError::InvalidConfig("queue_depth must be at least 1".into()));
        }

        let mut lanes = Vec::with_capacity(config.pool_size);
        let mut workers = Vec::with_capacity(config.pool_size);

        for lane in 0..config.pool_size {
            let (tx, rx) = mpsc::channel(config.queue_depth);
            let handler = Arc::clone(&handler);
            workers.push(tokio::spawn(run_lane(lane, rx, handler)));
            lanes.push(tx);
        }

        info!(
            pool_size = config.pool_size,
            queue_depth = config.queue_depth,
            "dispatcher started"
        );

        Ok(Self {
            lanes,
            workers,
            queue_depth: config.queue_depth,
        })
    }

    /// Hand one datagram to a lane, waiting while that lane is full.
    ///
    /// Returns the lane the datagram was queued on.
    pub async fn submit(&self, datagram: Bytes) -> DispatchResult<usize> {
        let lane = self.select_lane();
        self.lanes[lane]
            .send(datagram)
            .await
            .map_err(|_| DispatchError::LaneClosed(lane))?;
        Ok(lane)
    }

    /// Lane for a datagram arriving now.
    pub fn select_lane(&self) -> usize {
        lane_for_millis(epoch_millis(), self.lanes.len())
    }

    pub fn pool_size(&self) -> usize {
        self.lanes.len()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Datagrams currently waiting on `lane` (never above `queue_depth`).
    pub fn queued(&self, lane: usize) -> usize {
        self.lanes
            .get(lane)
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    /// Close every lane, let the workers drain what is already queued, and
    /// wait for them to finish.
    pub async fn shutdown(self) {
        let Self { lanes, workers, .. } = self;
        drop(lanes);

        for (lane, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                warn!(lane, error = %e, "lane worker ended abnormally");
            }
        }
        info!("dispatcher stopped");
    }
}

/// Time-based lane assignment: `millis % pool_size`.
pub fn lane_for_millis(millis: u64, pool_size: usize) -> usize {
    (millis % pool_size as u64) as usize
}

async fn run_lane<H: DatagramHandler>(lane: usize, mut rx: mpsc::Receiver<Bytes>, handler: Arc<H>) {
    debug!(lane, "lane worker started");
    while let Some(datagram) = rx.recv().await {
        handler.handle(lane, datagram).await;
    }
    debug!(lane, "lane worker drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::{Mutex, Notify, Semaphore};

    /// Records every datagram it sees, in order.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(usize, Bytes)>>,
    }

    #[async_trait]
    impl DatagramHandler for Recorder {
        async fn handle(&self, lane: usize, datagram: Bytes) {
            self.seen.lock().await.push((lane, datagram));
        }
    }

    /// Blocks every datagram until a permit is released.
    struct Gate {
        started: Notify,
        permits: Semaphore,
        handled: AtomicUsize,
    }

    impl Gate {
        fn new() -> Self {
            Self {
                started: Notify::new(),
                permits: Semaphore::new(0),
                handled: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DatagramHandler for Gate {
        async fn handle(&self, _lane: usize, _datagram: Bytes) {
            self.started.notify_one();
            self.permits.acquire().await.unwrap().forget();
            self.handled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(pool_size: usize, queue_depth: usize) -> DispatchConfig {
        DispatchConfig {
            pool_size,
            queue_depth,
        }
    }

    #[test]
    fn lane_selection_is_time_modulo_pool() {
        assert_eq!(lane_for_millis(1_697_716_800_123, 10), 3);
        assert_eq!(lane_for_millis(7, 1), 0);
        for ms in 0..100 {
            assert!(lane_for_millis(ms, 4) < 4);
        }
    }

    #[tokio::test]
    async fn rejects_empty_pool_and_zero_depth() {
        let handler = Arc::new(Recorder::default());
        assert!(matches!(
            Dispatcher::start(config(0, 8), Arc::clone(&handler)),
            Err(DispatchError::InvalidConfig(_))
        ));
        assert!(matches!(
            Dispatcher::start(config(2, 0), handler),
            Err(DispatchError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn lane_is_fifo() {
        let handler = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::start(config(1, 4), Arc::clone(&handler)).unwrap();

        for i in 0..20u8 {
            assert_eq!(dispatcher.submit(Bytes::from(vec![i])).await.unwrap(), 0);
        }
        dispatcher.shutdown().await;

        let seen = handler.seen.lock().await;
        let order: Vec<u8> = seen.iter().map(|(_, d)| d[0]).collect();
        assert_eq!(order, (0..20).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn every_datagram_handled_exactly_once() {
        let handler = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::start(config(4, 8), Arc::clone(&handler)).unwrap();
        assert_eq!(dispatcher.pool_size(), 4);
        assert_eq!(dispatcher.queue_depth(), 8);

        for i in 0..200u32 {
            let lane = dispatcher.submit(Bytes::from(i.to_be_bytes().to_vec())).await.unwrap();
            assert!(lane < dispatcher.pool_size());
            assert!(dispatcher.queued(lane) <= dispatcher.queue_depth());
        }
        dispatcher.shutdown().await;

        let seen = handler.seen.lock().await;
        let mut ids: Vec<u32> = seen
            .iter()
            .map(|(_, d)| u32::from_be_bytes([d[0], d[1], d[2], d[3]]))
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..200).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn full_lane_blocks_submit_until_consumed() {
        let gate = Arc::new(Gate::new());
        let dispatcher = Arc::new(Dispatcher::start(config(1, 4), Arc::clone(&gate)).unwrap());

        // The worker takes the first datagram and stalls on it.
        dispatcher.submit(Bytes::from_static(b"0")).await.unwrap();
        gate.started.notified().await;

        // Four more fill the queue to its depth.
        for i in 1..=4u8 {
            dispatcher.submit(Bytes::from(vec![i])).await.unwrap();
        }
        assert_eq!(dispatcher.queued(0), 4);

        // The next one cannot be queued yet.
        let blocked = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.submit(Bytes::from_static(b"5")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());
        assert_eq!(dispatcher.queued(0), 4);

        // Finishing one datagram frees a slot.
        gate.permits.add_permits(1);
        tokio::time::timeout(Duration::from_secs(5), blocked)
            .await
            .expect("submit stayed blocked")
            .unwrap()
            .unwrap();
        assert!(dispatcher.queued(0) <= 4);

        // Drain the rest.
        gate.permits.add_permits(5);
        let dispatcher = Arc::into_inner(dispatcher).unwrap();
        dispatcher.shutdown().await;
        assert_eq!(gate.handled.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_datagrams() {
        let gate = Arc::new(Gate::new());
        let dispatcher = Dispatcher::start(config(1, 16), Arc::clone(&gate)).unwrap();

        for i in 0..10u8 {
            dispatcher.submit(Bytes::from(vec![i])).await.unwrap();
        }
        gate.permits.add_permits(10);
        dispatcher.shutdown().await;

        assert_eq!(gate.handled.load(Ordering::SeqCst), 10);
    }
}
