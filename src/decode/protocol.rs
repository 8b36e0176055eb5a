//! Messages exchanged between the pool and its worker threads.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::access::TypedArray;
use crate::load::CancellationToken;
use crate::util::{ComponentType, Error, Result};

/// Correlates a reply with its request. Real tasks start at 1.
pub type TaskId = u64;

/// Task id carried by the readiness sentinel.
pub const READY_TASK_ID: TaskId = 0;

/// A dense output array shared with a worker for in-place writes.
pub type SharedArray = Arc<Mutex<TypedArray>>;

/// One attribute to extract from a compressed payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeRequest {
    /// Attribute semantic on the owning primitive, e.g. `POSITION`.
    pub semantic: String,
    /// Id of the attribute inside the compressed payload.
    pub unique_id: u32,
    pub component_type: ComponentType,
    /// Components per element.
    pub components: usize,
    /// Number of elements.
    pub count: usize,
}

impl AttributeRequest {
    /// Components in the dense output.
    pub fn component_count(&self) -> Result<usize> {
        self.count
            .checked_mul(self.components)
            .ok_or_else(|| Error::decode(format!("attribute {} size overflows", self.semantic)))
    }

    /// Size of the dense output in bytes.
    pub fn byte_len(&self) -> Result<usize> {
        self.component_count()?
            .checked_mul(self.component_type.num_bytes())
            .ok_or_else(|| Error::decode(format!("attribute {} size overflows", self.semantic)))
    }
}

/// Index data to extract from a compressed payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndicesRequest {
    pub component_type: ComponentType,
    pub count: usize,
}

impl IndicesRequest {
    pub fn byte_len(&self) -> Result<usize> {
        self.count
            .checked_mul(self.component_type.num_bytes())
            .ok_or_else(|| Error::decode("index data size overflows"))
    }
}

/// Where a worker writes decoded data.
#[derive(Debug)]
pub enum Targets {
    /// Pre-allocated arrays written in place.
    Shared {
        attributes: Vec<SharedArray>,
        indices: Option<SharedArray>,
    },
    /// The worker returns byte vectors that the pool copies.
    Copy,
}

/// A decode task as posted to a worker.
#[derive(Debug)]
pub struct DecodeRequest {
    pub task_id: TaskId,
    pub buffer: Arc<[u8]>,
    pub byte_offset: usize,
    pub byte_length: usize,
    pub attributes: Vec<AttributeRequest>,
    pub indices: Option<IndicesRequest>,
    pub targets: Targets,
    pub token: CancellationToken,
}

/// Pool to worker.
#[derive(Debug)]
pub enum WorkerMessage {
    Decode(DecodeRequest),
    Shutdown,
}

/// Decoded data carried by a successful reply.
#[derive(Debug)]
pub enum Payload {
    /// Written into the request's shared targets.
    InPlace,
    /// Returned by value, in request order.
    Bytes {
        attributes: Vec<Vec<u8>>,
        indices: Option<Vec<u8>>,
    },
}

/// Worker to pool.
#[derive(Debug)]
pub struct WorkerReply {
    pub task_id: TaskId,
    pub worker: usize,
    pub body: ReplyBody,
}

#[derive(Debug)]
pub enum ReplyBody {
    /// Decoder created; sent once with [`READY_TASK_ID`].
    Ready,
    /// Decoder creation failed; the worker exits.
    InitFailed { error: String },
    Decoded(Payload),
    Failed { error: String },
    /// The task's token was raised before the worker picked it up.
    Cancelled,
}
