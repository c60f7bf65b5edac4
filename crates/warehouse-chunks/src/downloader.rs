//! Bounded worker pool over a `ResultDescriptor`'s chunk list: default 8
//! workers, backpressure cap of 4 ready-but-unconsumed chunks, a prefetch
//! window, strict in-order delivery, and 401/403 presigned-URL renewal
//! (spec §4.2). Grounded on the teacher's `HydrationManager`
//! (`DashMap` + `Semaphore` + `CancellationToken` fan-out over a bounded
//! worker count).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use warehouse_core::domain::{ChunkRef, ColumnMeta, QueryId, ResultDescriptor, ResultFormat, RowsCursor, WarehouseError};
use warehouse_core::ports::ICloudSession;

use crate::decode::decode_chunk;
use crate::fetcher::{ChunkFetchOutcome, ChunkFetcher};

pub const DEFAULT_MAX_WORKERS: usize = 8;
pub const DEFAULT_BACKPRESSURE_CAP: usize = 4;
pub const DEFAULT_PREFETCH_WINDOW: usize = DEFAULT_BACKPRESSURE_CAP;

#[derive(Debug, Clone)]
pub struct ChunkDownloaderConfig {
    pub max_workers: usize,
    pub backpressure_cap: usize,
    pub prefetch_window: usize,
    pub response_body_limit_bytes: u64,
}

impl Default for ChunkDownloaderConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            backpressure_cap: DEFAULT_BACKPRESSURE_CAP,
            prefetch_window: DEFAULT_PREFETCH_WINDOW,
            response_body_limit_bytes: 100 * 1024 * 1024,
        }
    }
}

enum SlotState {
    Pending,
    Ready(Vec<Vec<Option<String>>>),
    Failed(WarehouseError),
}

struct Slot {
    state: tokio::sync::Mutex<SlotState>,
    ready: Notify,
}

/// Shared state every worker task and the consumer-facing cursor hold an
/// `Arc` to.
struct Shared {
    chunks: RwLock<Vec<ChunkRef>>,
    slots: Vec<Slot>,
    format: ResultFormat,
    next_claim: AtomicUsize,
    consumed: AtomicUsize,
    window: usize,
    admit: Notify,
    backpressure: Semaphore,
    cancel: CancellationToken,
    session: Arc<dyn ICloudSession>,
    query_id: QueryId,
    fetcher: ChunkFetcher,
}

impl Shared {
    async fn worker_loop(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let idx = self.next_claim.fetch_add(1, Ordering::SeqCst);
            let total = self.slots.len();
            if idx >= total {
                return;
            }

            loop {
                let notified = self.admit.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let consumed = self.consumed.load(Ordering::SeqCst);
                if idx <= consumed + self.window {
                    break;
                }

                tokio::select! {
                    _ = notified => {}
                    _ = self.cancel.cancelled() => return,
                }
            }

            let permit = tokio::select! {
                permit = self.backpressure.acquire() => match permit {
                    Ok(p) => p,
                    Err(_) => return,
                },
                _ = self.cancel.cancelled() => return,
            };
            // Capacity is released by the consumer when it finishes reading
            // this slot, not when the permit guard drops here.
            permit.forget();

            let result = self.fetch_chunk(idx).await;
            {
                let mut state = self.slots[idx].state.lock().await;
                *state = match result {
                    Ok(rows) => SlotState::Ready(rows),
                    Err(err) => SlotState::Failed(err),
                };
            }
            self.slots[idx].ready.notify_waiters();
        }
    }

    async fn fetch_chunk(&self, idx: usize) -> Result<Vec<Vec<Option<String>>>, WarehouseError> {
        let mut chunk_ref = self.chunks.read().await[idx].clone();
        let mut renewed = false;

        loop {
            match self.fetcher.attempt(&chunk_ref).await? {
                ChunkFetchOutcome::Body(bytes) => {
                    return decode_chunk(self.format, &bytes).map_err(|err| match err {
                        WarehouseError::UnknownChunkFormat(msg) => WarehouseError::UnknownChunkFormat(msg),
                        other => WarehouseError::ChunkFetchFailed {
                            index: idx,
                            attempts: 1,
                            message: other.to_string(),
                        },
                    });
                }
                ChunkFetchOutcome::NeedsRenewal => {
                    if renewed {
                        return Err(WarehouseError::ChunkFetchFailed {
                            index: idx,
                            attempts: 1,
                            message: "presigned URL renewal did not resolve the 401/403".to_string(),
                        });
                    }
                    renewed = true;
                    warn!(index = idx, "chunk URL expired, renewing");
                    let descriptor = self.session.renew_chunk_urls(self.query_id.as_str()).await?;
                    {
                        let mut chunks = self.chunks.write().await;
                        *chunks = descriptor.chunks;
                    }
                    chunk_ref = self.chunks.read().await[idx].clone();
                }
            }
        }
    }
}

/// `RowsCursor` implementation driven by the worker pool. `RowsCursor`'s
/// methods are synchronous (the port is I/O-free by design so the core
/// stays free of an async runtime dependency); this adapter bridges to
/// the pool's async slots via a held `Handle::block_on`, the same way the
/// teacher's FUSE filesystem bridges sync callbacks to its tokio runtime.
pub struct ChunkCursor {
    shared: Arc<Shared>,
    rt_handle: Handle,
    workers: Vec<JoinHandle<()>>,
    columns: Vec<ColumnMeta>,
    inline_rows: std::collections::VecDeque<Vec<Option<String>>>,
    current_chunk_rows: std::collections::VecDeque<Vec<Option<String>>>,
    total_chunks: usize,
    closed: bool,
}

impl ChunkCursor {
    pub fn spawn(
        rt_handle: Handle,
        session: Arc<dyn ICloudSession>,
        query_id: QueryId,
        descriptor: ResultDescriptor,
        config: ChunkDownloaderConfig,
    ) -> Self {
        let total_chunks = descriptor.chunks.len();
        let slots = (0..total_chunks)
            .map(|_| Slot {
                state: tokio::sync::Mutex::new(SlotState::Pending),
                ready: Notify::new(),
            })
            .collect();

        let shared = Arc::new(Shared {
            chunks: RwLock::new(descriptor.chunks),
            slots,
            format: descriptor.format,
            next_claim: AtomicUsize::new(0),
            consumed: AtomicUsize::new(0),
            window: config.prefetch_window,
            admit: Notify::new(),
            backpressure: Semaphore::new(config.backpressure_cap),
            cancel: CancellationToken::new(),
            session,
            query_id,
            fetcher: ChunkFetcher::new(reqwest::Client::new(), config.response_body_limit_bytes),
        });

        let worker_count = config.max_workers.min(total_chunks.max(1));
        let workers = (0..worker_count)
            .map(|_| {
                let shared = shared.clone();
                rt_handle.spawn(async move { shared.worker_loop().await })
            })
            .collect();

        Self {
            shared,
            rt_handle,
            workers,
            columns: descriptor.columns,
            inline_rows: descriptor.inline_rows.into(),
            current_chunk_rows: std::collections::VecDeque::new(),
            total_chunks,
            closed: false,
        }
    }

    fn next_chunk_index(&self) -> usize {
        self.shared.consumed.load(Ordering::SeqCst)
    }

    /// Blocks until the slot at `idx` is ready, returning its rows (or
    /// propagating the terminal error, per Invariant 3.2.2: "Workers
    /// never deliver out-of-order rows").
    ///
    /// Registers for the slot's notification *before* checking its
    /// state, via `Notified::enable`, so a worker that finishes and
    /// calls `notify_waiters` between our check and our await is never
    /// missed (`tokio::sync::Notify` only wakes already-registered
    /// waiters).
    fn await_slot(&self, idx: usize) -> Result<Vec<Vec<Option<String>>>, WarehouseError> {
        self.rt_handle.block_on(async {
            loop {
                let notified = self.shared.slots[idx].ready.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                {
                    let mut state = self.shared.slots[idx].state.lock().await;
                    match &mut *state {
                        SlotState::Ready(_) => {
                            if let SlotState::Ready(rows) = std::mem::replace(&mut *state, SlotState::Ready(Vec::new())) {
                                return Ok(rows);
                            }
                            unreachable!("state was checked Ready above");
                        }
                        SlotState::Failed(err) => return Err(err.clone()),
                        SlotState::Pending => {}
                    }
                }

                notified.await;
            }
        })
    }

    fn advance_past_chunk(&self) {
        self.shared.consumed.fetch_add(1, Ordering::SeqCst);
        self.shared.backpressure.add_permits(1);
        self.shared.admit.notify_waiters();
    }
}

impl RowsCursor for ChunkCursor {
    fn next(&mut self) -> Result<Option<Vec<Option<String>>>, WarehouseError> {
        if let Some(row) = self.inline_rows.pop_front() {
            return Ok(Some(row));
        }

        loop {
            if let Some(row) = self.current_chunk_rows.pop_front() {
                return Ok(Some(row));
            }

            let idx = self.next_chunk_index();
            if idx >= self.total_chunks {
                return Ok(None);
            }

            let rows = self.await_slot(idx)?;
            self.advance_past_chunk();
            self.current_chunk_rows = rows.into();
        }
    }

    fn column_types(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_result_set(&mut self) -> Result<bool, WarehouseError> {
        // Multi-statement chaining rebuilds the cursor from the next
        // descriptor at the `QueryExecutor` layer; this cursor only
        // materialises a single statement's rows.
        Ok(false)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shared.cancel.cancel();
        for worker in self.workers.drain(..) {
            worker.abort();
        }
        debug!("chunk cursor closed");
    }
}

impl Drop for ChunkCursor {
    fn drop(&mut self) {
        self.close();
    }
}
