//! edgescale-dispatch — bounded-concurrency datagram dispatch.
//!
//! # Architecture
//!
//! ```text
//! listener ──submit()──► Dispatcher
//!                          ├── lane 0: bounded queue ─► worker ─► IngestPipeline
//!                          ├── lane 1: bounded queue ─► worker ─► IngestPipeline
//!                          └── ...                             parse → filter → record
//! ```
//!
//! A datagram goes to lane `now_millis % pool_size`. Each lane runs one
//! worker that handles its queue strictly in arrival order; lanes run
//! concurrently. `submit` waits while the chosen lane is full, so at most
//! `pool_size × queue_depth` datagrams are ever buffered and none are dropped.

pub mod dispatcher;
pub mod error;
pub mod pipeline;

pub use dispatcher::{DatagramHandler, Dispatcher};
pub use error::{DispatchError, DispatchResult};
pub use pipeline::{IngestPipeline, PipelineStats};
