//! A flat C ABI over the V8 engine.
//!
//! Embedders written in languages that cannot speak C++ drive the engine through the
//! `v8glue_*` functions in [`api`]. Engine objects cross the boundary as opaque tokens (see
//! [`handle`]), fallible calls report through a [`capture::CallContext`], and callbacks into the
//! embedder go through the trampolines in [`callback`].

pub mod allocator;
pub mod api;
pub mod callback;
pub mod capture;
pub mod config;
pub mod enums;
pub mod error;
pub mod handle;
pub mod isolate;
pub mod logging;
pub mod maybe;
pub mod platform;

pub use crate::capture::CallContext;
pub use crate::error::{BridgeError, BridgeResult};
pub use crate::handle::{
    ContextRef, Durable, FunctionTemplateRef, MessageRef, ObjectTemplateRef, ScriptRef,
    StackTraceRef, ValueRef,
};
pub use crate::isolate::{Isolate, IsolatePtr};
pub use crate::maybe::*;

#[cfg(test)]
mod tests;
