//! Remote code-execution service.
//!
//! Accepts a [`job::JobRequest`] (source file, three build/run scripts,
//! stdin, a wall-clock deadline) and drives it through a fresh, isolated
//! Docker sandbox: setup → compile → run. See [`job::executor`] for the
//! state machine and [`rpc`] for the request/response surface.

pub mod config;
pub mod container;
pub mod job;
pub mod logging;
pub mod pool;
pub mod rpc;
