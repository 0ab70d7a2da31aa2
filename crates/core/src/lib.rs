//! `rensv-core`: task model, wire codec and the downstream apply contract.
//!
//! This crate contains **pure** building blocks (no IO). Transports and the
//! concrete downstream client live in `rensv-infra`; retry orchestration lives
//! in `rensv-relay`.

pub mod apply;
pub mod codec;
pub mod error;
pub mod task;

pub use apply::{AppliedResource, ApplyError, Applier};
pub use codec::{decode, decode_lenient, encode};
pub use error::{CodecError, CodecResult};
pub use task::Task;
