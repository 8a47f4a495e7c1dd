//! Emission runtime: signal loops, connection status and the HTTP probe.

pub mod emitter;
pub mod probe;
pub mod service;
pub mod signal;
pub mod status;
