//! WASM bindings for the Taylor-model flow integrator.
//!
//! `system` owns the integrator wrapper and stepping; `output` exposes the
//! enclosures, boundary tables and coefficient table to JavaScript.

mod output;
mod system;

pub use system::WasmTaylorFlow;
