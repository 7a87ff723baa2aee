//! Inter-process plumbing: the wire protocol, worker process handles, and
//! the worker-side serve loop.

mod protocol;
mod worker;

pub use protocol::{WorkerReply, WorkerRequest, read_frame, read_frame_opt, write_frame};
pub use worker::{WORKER_PATH_ENV, WorkerHandle, serve, serve_on};
