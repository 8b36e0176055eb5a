//! Background decoding of compressed primitives.
//!
//! A [`DecoderPool`] runs a fixed number of OS threads, each owning one
//! [`MeshDecoder`] created by a [`DecoderFactory`]. The graph reaches it
//! through the [`MeshCompression`] extension record, which gathers the
//! primitive's accessors into a [`DecodeJob`] and installs the decoded arrays
//! as accessor data.

mod codec;
mod extension;
mod pool;
mod protocol;
mod worker;

pub use codec::{
    DecodeOutputs, DecoderFactory, Geometry, MeshDecoder, PackedMeshDecoder, PackedMeshEncoder,
    PackedMeshFactory, PACKED_MAGIC,
};
pub use extension::{register, MeshCompression, MESH_COMPRESSION};
pub use pool::{DecodeJob, DecodedMesh, DecoderPool};
pub use protocol::{
    AttributeRequest, DecodeRequest, IndicesRequest, Payload, ReplyBody, SharedArray, Targets,
    TaskId, WorkerMessage, WorkerReply, READY_TASK_ID,
};
