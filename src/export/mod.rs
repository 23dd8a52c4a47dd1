//! Building blocks for the native side of the service ABI
//!
//! A library exporting services to this crate keeps its instances in a [`HandleRegistry`] and
//! answers endpoint calls through [`respond`]. The test suite's reference service is written
//! this way.

mod endpoint;
mod registry;

pub use endpoint::{free_response, input_bytes, respond, write_bytes, write_error};
pub use registry::{HandleRegistry, CREATE_FAILED};
