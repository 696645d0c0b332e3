//! # weft-protocol
//!
//! Wire vocabulary between a client and a scope.
//!
//! - [`ClientEvent`]: closed set of inbound events, decoded by [`decode`]
//! - [`ServerEvent`]: closed set of outbound events, encoded by [`encode`]
//! - [`codes`]: machine-readable error codes carried by `ErrorOccurred`
//!
//! Events are JSON objects discriminated by a `type` field. Unknown inbound
//! types decode to [`ClientEvent::Unknown`] so newer clients keep working
//! against older servers.

#![deny(unsafe_code)]

pub mod codec;
pub mod codes;
pub mod events;
pub mod types;

pub use codec::{ProtocolError, decode, encode};
pub use events::{ClientEvent, ServerEvent};
pub use types::{CallArgs, ImportedFile, RenderTree, SizeClass, WindowInfo};
