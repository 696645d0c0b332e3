//! # weft-core
//!
//! Ids, pointer handles, errors and logging for the weft session runtime.
//!
//! This crate provides the shared vocabulary that all other weft crates depend on:
//!
//! - **Session ids**: [`ScopeId`], kept apart from plain strings
//! - **Pointers**: [`Ptr`] handles and the per-scope [`PtrAllocator`]
//! - **Request correlation**: [`RequestId`] echoed back in responses
//! - **Errors**: [`CoreError`] via `thiserror`
//! - **Logging**: `tracing` subscriber bootstrap, panic hook, and test capture

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;

pub use errors::CoreError;
pub use ids::{Ptr, PtrAllocator, RequestId, ScopeId};
