//! Decoder worker thread.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

use parking_lot::MutexGuard;

use super::codec::{DecodeOutputs, DecoderFactory, MeshDecoder};
use super::protocol::{
    DecodeRequest, Payload, ReplyBody, Targets, WorkerMessage, WorkerReply, READY_TASK_ID,
};
use crate::access::TypedArray;
use crate::util::{Error, Result};

/// Main worker loop, runs on its own thread.
///
/// Creates the decoder first and reports readiness (or failure) with the
/// sentinel task id, then serves decode requests until shutdown.
pub(crate) fn worker_loop(
    index: usize,
    factory: Arc<dyn DecoderFactory>,
    rx: Receiver<WorkerMessage>,
    tx: Sender<WorkerReply>,
) {
    let created = catch_unwind(AssertUnwindSafe(|| factory.create()));
    let mut decoder = match created {
        Ok(Ok(decoder)) => decoder,
        Ok(Err(e)) => {
            let _ = tx.send(sentinel(index, ReplyBody::InitFailed { error: e.to_string() }));
            return;
        }
        Err(panic) => {
            let error = format!("decoder factory panicked: {}", panic_message(&*panic));
            let _ = tx.send(sentinel(index, ReplyBody::InitFailed { error }));
            return;
        }
    };
    if tx.send(sentinel(index, ReplyBody::Ready)).is_err() {
        return;
    }
    tracing::debug!(worker = index, "decoder worker ready");

    loop {
        let msg = match rx.recv() {
            Ok(msg) => msg,
            Err(_) => break, // Pool dropped
        };

        match msg {
            WorkerMessage::Decode(request) => {
                let task_id = request.task_id;
                let body = run_task(decoder.as_mut(), request);
                if let ReplyBody::Failed { error } = &body {
                    tracing::warn!(worker = index, task_id, %error, "decode task failed");
                }
                if tx.send(WorkerReply { task_id, worker: index, body }).is_err() {
                    break;
                }
            }
            WorkerMessage::Shutdown => break,
        }
    }
    tracing::debug!(worker = index, "decoder worker stopped");
}

fn sentinel(worker: usize, body: ReplyBody) -> WorkerReply {
    WorkerReply {
        task_id: READY_TASK_ID,
        worker,
        body,
    }
}

/// Run one task. The request (and any shared targets it holds) is dropped
/// before returning so the pool can reclaim the arrays.
fn run_task(decoder: &mut dyn MeshDecoder, request: DecodeRequest) -> ReplyBody {
    if request.token.is_cancelled() {
        return ReplyBody::Cancelled;
    }
    match catch_unwind(AssertUnwindSafe(|| decode(decoder, &request))) {
        Ok(Ok(payload)) => ReplyBody::Decoded(payload),
        Ok(Err(e)) => ReplyBody::Failed {
            error: e.to_string(),
        },
        Err(panic) => ReplyBody::Failed {
            error: format!("decoder panicked: {}", panic_message(&*panic)),
        },
    }
}

fn decode(decoder: &mut dyn MeshDecoder, request: &DecodeRequest) -> Result<Payload> {
    let end = request
        .byte_offset
        .checked_add(request.byte_length)
        .ok_or_else(|| Error::decode("payload range overflows"))?;
    let data = request.buffer.get(request.byte_offset..end).ok_or_else(|| {
        Error::decode(format!(
            "payload [{}, {}) outside buffer of {} bytes",
            request.byte_offset,
            end,
            request.buffer.len()
        ))
    })?;

    match &request.targets {
        Targets::Shared {
            attributes,
            indices,
        } => {
            let mut attr_guards: Vec<MutexGuard<'_, TypedArray>> =
                attributes.iter().map(|a| a.lock()).collect();
            let mut index_guard = indices.as_ref().map(|a| a.lock());
            let mut outputs = DecodeOutputs {
                attributes: attr_guards.iter_mut().map(|g| g.as_bytes_mut()).collect(),
                indices: index_guard.as_mut().map(|g| g.as_bytes_mut()),
            };
            decoder.decode(data, &request.attributes, request.indices.as_ref(), &mut outputs)?;
            Ok(Payload::InPlace)
        }
        Targets::Copy => {
            let mut attr_bytes: Vec<Vec<u8>> = request
                .attributes
                .iter()
                .map(|a| a.byte_len().map(|n| vec![0u8; n]))
                .collect::<Result<_>>()?;
            let mut index_bytes = match &request.indices {
                Some(i) => Some(vec![0u8; i.byte_len()?]),
                None => None,
            };
            let mut outputs = DecodeOutputs {
                attributes: attr_bytes.iter_mut().map(|b| b.as_mut_slice()).collect(),
                indices: index_bytes.as_mut().map(|b| b.as_mut_slice()),
            };
            decoder.decode(data, &request.attributes, request.indices.as_ref(), &mut outputs)?;
            drop(outputs);
            Ok(Payload::Bytes {
                attributes: attr_bytes,
                indices: index_bytes,
            })
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
