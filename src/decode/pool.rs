//! Fixed-size pool of decoder threads.
//!
//! Requests go to the least-loaded ready worker (ties broken round-robin)
//! over a per-worker channel. A router thread receives every reply, removes
//! the task from the pending map and hands the reply to the awaiting caller.
//! Task-id allocation, insertion and removal all happen under the one
//! pending-map lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch, Semaphore};

use super::codec::DecoderFactory;
use super::protocol::{
    AttributeRequest, DecodeRequest, IndicesRequest, Payload, ReplyBody, SharedArray, Targets,
    TaskId, WorkerMessage, WorkerReply, READY_TASK_ID,
};
use super::worker::worker_loop;
use crate::access::TypedArray;
use crate::config::{PoolConfig, TransferMode};
use crate::load::CancellationToken;
use crate::util::{Error, Result};

/// A compressed payload and the outputs to extract from it.
#[derive(Clone, Debug)]
pub struct DecodeJob {
    pub buffer: Arc<[u8]>,
    pub byte_offset: usize,
    pub byte_length: usize,
    pub attributes: Vec<AttributeRequest>,
    pub indices: Option<IndicesRequest>,
}

/// Decoded arrays, attributes in request order.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedMesh {
    pub attributes: Vec<TypedArray>,
    pub indices: Option<TypedArray>,
}

struct PendingTask {
    worker: usize,
    reply: oneshot::Sender<ReplyBody>,
}

#[derive(Default)]
struct Pending {
    next_id: TaskId,
    tasks: HashMap<TaskId, PendingTask>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum WorkerState {
    #[default]
    Starting,
    Ready,
    Failed,
}

struct WorkerSlot {
    tx: Sender<WorkerMessage>,
    state: WorkerState,
    in_flight: usize,
}

#[derive(Clone, Debug, Default)]
struct Readiness {
    ready: usize,
    failed: usize,
    last_error: Option<String>,
}

/// State shared with the router thread.
struct Shared {
    pending: Mutex<Pending>,
    workers: Mutex<Vec<WorkerSlot>>,
    readiness: watch::Sender<Readiness>,
}

impl Shared {
    /// Remove `task_id` if still pending. Whoever removes it also releases the
    /// worker's load count.
    fn take(&self, task_id: TaskId) -> Option<PendingTask> {
        let task = self.pending.lock().tasks.remove(&task_id)?;
        if let Some(slot) = self.workers.lock().get_mut(task.worker) {
            slot.in_flight = slot.in_flight.saturating_sub(1);
        }
        Some(task)
    }

    fn set_state(&self, worker: usize, state: WorkerState, error: Option<String>) {
        if let Some(slot) = self.workers.lock().get_mut(worker) {
            slot.state = state;
        }
        self.readiness.send_modify(|r| {
            match state {
                WorkerState::Ready => r.ready += 1,
                WorkerState::Failed => r.failed += 1,
                WorkerState::Starting => {}
            }
            if error.is_some() {
                r.last_error = error;
            }
        });
    }
}

struct Threads {
    workers: Vec<JoinHandle<()>>,
    router: JoinHandle<()>,
}

/// Pool of background decoder threads.
pub struct DecoderPool {
    config: PoolConfig,
    factory: Arc<dyn DecoderFactory>,
    shared: Arc<Shared>,
    permits: Semaphore,
    cursor: AtomicUsize,
    threads: Mutex<Option<Threads>>,
}

impl DecoderPool {
    /// A pool that starts its threads on the first [`DecoderPool::init`].
    pub fn new(config: PoolConfig, factory: Arc<dyn DecoderFactory>) -> Self {
        let (readiness, _) = watch::channel(Readiness::default());
        let permits = Semaphore::new(config.max_pending.max(1));
        Self {
            config,
            factory,
            shared: Arc::new(Shared {
                pending: Mutex::new(Pending::default()),
                workers: Mutex::new(Vec::new()),
                readiness,
            }),
            permits,
            cursor: AtomicUsize::new(0),
            threads: Mutex::new(None),
        }
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.config.workers.max(1)
    }

    /// Workers that reported ready.
    pub fn ready_workers(&self) -> usize {
        self.shared.readiness.borrow().ready
    }

    /// Tasks posted and not yet answered.
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().tasks.len()
    }

    /// Transfer mode after resolving [`TransferMode::Auto`].
    pub fn transfer(&self) -> TransferMode {
        self.config.transfer.resolve()
    }

    /// Start the workers (once) and wait until at least one is ready.
    ///
    /// Fails when every worker failed to create its decoder.
    pub async fn init(&self) -> Result<()> {
        self.start()?;
        let total = self.worker_count();
        let mut rx = self.shared.readiness.subscribe();
        let state = rx
            .wait_for(|r| r.ready > 0 || r.failed >= total)
            .await
            .map_err(|_| Error::decode("decoder pool shut down"))?
            .clone();
        if state.ready == 0 {
            return Err(Error::decode(format!(
                "no decoder worker could start: {}",
                state.last_error.unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let mut threads = self.threads.lock();
        if threads.is_some() {
            return Ok(());
        }
        let (reply_tx, reply_rx) = channel::<WorkerReply>();
        let mut handles = Vec::with_capacity(self.worker_count());
        let mut slots = Vec::with_capacity(self.worker_count());
        for index in 0..self.worker_count() {
            let (tx, rx) = channel::<WorkerMessage>();
            let factory = Arc::clone(&self.factory);
            let reply_tx = reply_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("gltf-decoder-{}", index))
                .spawn(move || worker_loop(index, factory, rx, reply_tx))?;
            handles.push(handle);
            slots.push(WorkerSlot {
                tx,
                state: WorkerState::Starting,
                in_flight: 0,
            });
        }
        // Only workers hold reply senders, so the router stops once they exit.
        drop(reply_tx);
        *self.shared.workers.lock() = slots;

        let shared = Arc::clone(&self.shared);
        let router = thread::Builder::new()
            .name("gltf-decoder-router".into())
            .spawn(move || route_replies(shared, reply_rx))?;

        tracing::debug!(
            workers = handles.len(),
            transfer = ?self.transfer(),
            "decoder pool started"
        );
        *threads = Some(Threads {
            workers: handles,
            router,
        });
        Ok(())
    }

    /// Decode `job` on a worker.
    ///
    /// Waits for a free slot when `max_pending` tasks are in flight. Raising
    /// `token` drops the task from the pending map and releases its slot.
    pub async fn decode(&self, job: DecodeJob, token: &CancellationToken) -> Result<DecodedMesh> {
        token.check()?;
        self.init().await?;
        let _permit = token
            .run(async {
                self.permits
                    .acquire()
                    .await
                    .map_err(|_| Error::decode("decoder pool closed"))
            })
            .await?;

        let mut attributes: Vec<TypedArray> = job
            .attributes
            .iter()
            .map(|a| {
                a.byte_len()?;
                Ok(TypedArray::zeroed(a.component_type, a.count * a.components))
            })
            .collect::<Result<_>>()?;
        let mut indices = match &job.indices {
            Some(i) => {
                i.byte_len()?;
                Some(TypedArray::zeroed(i.component_type, i.count))
            }
            None => None,
        };

        let transfer = self.transfer();
        let (targets, shared_out) = match transfer {
            TransferMode::Copy | TransferMode::Auto => (Targets::Copy, None),
            TransferMode::Shared => {
                let attrs: Vec<SharedArray> = attributes
                    .drain(..)
                    .map(|a| Arc::new(Mutex::new(a)))
                    .collect();
                let idx = indices.take().map(|a| Arc::new(Mutex::new(a)));
                let targets = Targets::Shared {
                    attributes: attrs.clone(),
                    indices: idx.clone(),
                };
                (targets, Some((attrs, idx)))
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let task_id = self.dispatch(job, targets, token, reply_tx)?;
        let guard = TaskGuard {
            shared: &self.shared,
            task_id,
        };
        tracing::trace!(task_id, "decode task posted");

        let body = token
            .run(async {
                reply_rx
                    .await
                    .map_err(|_| Error::decode("decoder worker exited"))
            })
            .await?;
        drop(guard);

        match body {
            ReplyBody::Decoded(Payload::InPlace) => {
                let (attrs, idx) = shared_out
                    .ok_or_else(|| Error::decode("in-place reply to a copy transfer"))?;
                Ok(DecodedMesh {
                    attributes: attrs.into_iter().map(reclaim).collect(),
                    indices: idx.map(reclaim),
                })
            }
            ReplyBody::Decoded(Payload::Bytes {
                attributes: attr_bytes,
                indices: index_bytes,
            }) => {
                if shared_out.is_some() {
                    return Err(Error::decode("copied reply to a shared transfer"));
                }
                if attr_bytes.len() != attributes.len() {
                    return Err(Error::decode(format!(
                        "worker returned {} attributes, {} requested",
                        attr_bytes.len(),
                        attributes.len()
                    )));
                }
                for (array, bytes) in attributes.iter_mut().zip(&attr_bytes) {
                    copy_into(array, bytes)?;
                }
                match (&mut indices, &index_bytes) {
                    (Some(array), Some(bytes)) => copy_into(array, bytes)?,
                    (None, None) => {}
                    _ => return Err(Error::decode("worker reply disagrees on indices")),
                }
                Ok(DecodedMesh {
                    attributes,
                    indices,
                })
            }
            ReplyBody::Failed { error } => Err(Error::Decode(error)),
            ReplyBody::Cancelled => Err(Error::Cancelled),
            ReplyBody::Ready | ReplyBody::InitFailed { .. } => {
                Err(Error::decode(format!("unexpected sentinel for task {}", task_id)))
            }
        }
    }

    /// Pick a worker, allocate a task id and post the request.
    fn dispatch(
        &self,
        job: DecodeJob,
        targets: Targets,
        token: &CancellationToken,
        reply: oneshot::Sender<ReplyBody>,
    ) -> Result<TaskId> {
        token.check()?;
        let mut workers = self.shared.workers.lock();
        let worker = pick_worker(&workers, self.cursor.load(Ordering::Relaxed))
            .ok_or_else(|| Error::decode("no ready decoder worker"))?;
        self.cursor.store(worker + 1, Ordering::Relaxed);

        let task_id = {
            let mut pending = self.shared.pending.lock();
            pending.next_id += 1;
            let id = pending.next_id;
            pending.tasks.insert(id, PendingTask { worker, reply });
            id
        };

        let request = DecodeRequest {
            task_id,
            buffer: job.buffer,
            byte_offset: job.byte_offset,
            byte_length: job.byte_length,
            attributes: job.attributes,
            indices: job.indices,
            targets,
            token: token.clone(),
        };
        let slot = &mut workers[worker];
        if slot.tx.send(WorkerMessage::Decode(request)).is_err() {
            slot.state = WorkerState::Failed;
            drop(workers);
            self.shared.pending.lock().tasks.remove(&task_id);
            return Err(Error::decode(format!("decoder worker {} is gone", worker)));
        }
        slot.in_flight += 1;
        tracing::debug!(task_id, worker, in_flight = slot.in_flight, "dispatched decode task");
        Ok(task_id)
    }
}

/// Least-loaded ready worker, scanning from `start` so ties rotate.
fn pick_worker(workers: &[WorkerSlot], start: usize) -> Option<usize> {
    let n = workers.len();
    (0..n)
        .map(|k| (start + k) % n.max(1))
        .filter(|&i| workers[i].state == WorkerState::Ready)
        .min_by_key(|&i| workers[i].in_flight)
}

fn copy_into(array: &mut TypedArray, bytes: &[u8]) -> Result<()> {
    let dst = array.as_bytes_mut();
    if dst.len() != bytes.len() {
        return Err(Error::decode(format!(
            "worker returned {} bytes, expected {}",
            bytes.len(),
            dst.len()
        )));
    }
    dst.copy_from_slice(bytes);
    Ok(())
}

/// Take an array back from a shared target.
fn reclaim(array: SharedArray) -> TypedArray {
    match Arc::try_unwrap(array) {
        Ok(mutex) => mutex.into_inner(),
        Err(shared) => shared.lock().clone(),
    }
}

/// Removes an abandoned task from the pending map.
struct TaskGuard<'a> {
    shared: &'a Shared,
    task_id: TaskId,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if self.shared.take(self.task_id).is_some() {
            tracing::trace!(task_id = self.task_id, "abandoned decode task");
        }
    }
}

fn route_replies(shared: Arc<Shared>, rx: Receiver<WorkerReply>) {
    while let Ok(reply) = rx.recv() {
        match reply.body {
            ReplyBody::Ready if reply.task_id == READY_TASK_ID => {
                shared.set_state(reply.worker, WorkerState::Ready, None);
            }
            ReplyBody::InitFailed { error } => {
                tracing::warn!(worker = reply.worker, %error, "decoder worker failed to start");
                shared.set_state(reply.worker, WorkerState::Failed, Some(error));
            }
            body => match shared.take(reply.task_id) {
                Some(task) => {
                    let _ = task.reply.send(body);
                }
                None => {
                    tracing::trace!(task_id = reply.task_id, "reply for abandoned task");
                }
            },
        }
    }
}

impl Drop for DecoderPool {
    fn drop(&mut self) {
        let Some(threads) = self.threads.get_mut().take() else {
            return;
        };
        for slot in self.shared.workers.lock().drain(..) {
            let _ = slot.tx.send(WorkerMessage::Shutdown);
        }
        for handle in threads.workers {
            let _ = handle.join();
        }
        let _ = threads.router.join();
    }
}

impl fmt::Debug for DecoderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderPool")
            .field("workers", &self.worker_count())
            .field("ready", &self.ready_workers())
            .field("pending", &self.pending())
            .field("transfer", &self.transfer())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::codec::{DecodeOutputs, MeshDecoder};
    use crate::util::ComponentType;

    /// Writes the payload's first byte into every output byte.
    struct EchoDecoder;

    impl MeshDecoder for EchoDecoder {
        fn decode(
            &mut self,
            data: &[u8],
            _attributes: &[AttributeRequest],
            _indices: Option<&IndicesRequest>,
            outputs: &mut DecodeOutputs<'_>,
        ) -> Result<()> {
            let v = *data.first().ok_or_else(|| Error::decode("empty payload"))?;
            if v == 0xFF {
                panic!("poisoned payload");
            }
            for out in outputs.attributes.iter_mut() {
                out.fill(v);
            }
            if let Some(out) = outputs.indices.as_deref_mut() {
                out.fill(v);
            }
            Ok(())
        }
    }

    fn echo_factory() -> Arc<dyn DecoderFactory> {
        Arc::new(|| Ok::<_, Error>(Box::new(EchoDecoder) as Box<dyn MeshDecoder>))
    }

    fn job(byte: u8) -> DecodeJob {
        DecodeJob {
            buffer: Arc::from(vec![byte]),
            byte_offset: 0,
            byte_length: 1,
            attributes: vec![AttributeRequest {
                semantic: "POSITION".into(),
                unique_id: 0,
                component_type: ComponentType::Uint8,
                components: 3,
                count: 2,
            }],
            indices: Some(IndicesRequest {
                component_type: ComponentType::Uint8,
                count: 3,
            }),
        }
    }

    fn config(workers: usize, transfer: TransferMode) -> PoolConfig {
        PoolConfig {
            workers,
            max_pending: 4,
            transfer,
        }
    }

    #[tokio::test]
    async fn test_init_reports_ready() {
        let pool = DecoderPool::new(config(3, TransferMode::Copy), echo_factory());
        assert_eq!(pool.ready_workers(), 0);
        pool.init().await.unwrap();
        assert!(pool.ready_workers() >= 1);
        pool.init().await.unwrap();
    }

    #[tokio::test]
    async fn test_init_fails_when_no_worker_starts() {
        let factory: Arc<dyn DecoderFactory> =
            Arc::new(|| Err::<Box<dyn MeshDecoder>, _>(Error::decode("no decoder module")));
        let pool = DecoderPool::new(config(2, TransferMode::Copy), factory);
        let err = pool.init().await.unwrap_err();
        assert!(err.to_string().contains("no decoder module"));
    }

    #[tokio::test]
    async fn test_decode_both_transfers() {
        for transfer in [TransferMode::Copy, TransferMode::Shared] {
            let pool = DecoderPool::new(config(2, transfer), echo_factory());
            let token = CancellationToken::new();
            let out = pool.decode(job(7), &token).await.unwrap();
            assert_eq!(out.attributes, vec![TypedArray::U8(vec![7; 6])]);
            assert_eq!(out.indices, Some(TypedArray::U8(vec![7; 3])));
            assert_eq!(pool.pending(), 0);
        }
    }

    #[tokio::test]
    async fn test_failure_and_panic_are_isolated() {
        let pool = DecoderPool::new(config(1, TransferMode::Copy), echo_factory());
        let token = CancellationToken::new();
        let mut empty = job(1);
        empty.byte_length = 0;
        assert!(matches!(pool.decode(empty, &token).await, Err(Error::Decode(_))));
        assert!(matches!(pool.decode(job(0xFF), &token).await, Err(Error::Decode(_))));
        let out = pool.decode(job(3), &token).await.unwrap();
        assert_eq!(out.indices, Some(TypedArray::U8(vec![3; 3])));
    }

    #[tokio::test]
    async fn test_oversized_request_rejected() {
        let pool = DecoderPool::new(config(1, TransferMode::Shared), echo_factory());
        let token = CancellationToken::new();
        let mut huge = job(1);
        huge.attributes[0].count = usize::MAX / 2;
        assert!(matches!(pool.decode(huge, &token).await, Err(Error::Decode(_))));
        assert_eq!(pool.pending(), 0);
        assert!(pool.decode(job(2), &token).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let pool = DecoderPool::new(config(1, TransferMode::Copy), echo_factory());
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(pool.decode(job(1), &token).await, Err(Error::Cancelled)));
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_pick_worker_least_loaded_round_robin() {
        let slot = |state, in_flight| WorkerSlot {
            tx: channel().0,
            state,
            in_flight,
        };
        let workers = vec![
            slot(WorkerState::Ready, 1),
            slot(WorkerState::Ready, 0),
            slot(WorkerState::Failed, 0),
            slot(WorkerState::Ready, 0),
        ];
        assert_eq!(pick_worker(&workers, 0), Some(1));
        assert_eq!(pick_worker(&workers, 2), Some(3));
        assert_eq!(pick_worker(&workers, 4), Some(1));
        assert_eq!(pick_worker(&[], 0), None);
    }
}
