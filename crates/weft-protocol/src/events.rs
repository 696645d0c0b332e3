//! Inbound and outbound protocol events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::{Ptr, RequestId};

use crate::types::{CallArgs, RenderTree, WindowInfo};

/// Event sent by a client to its scope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Several events to be handled in wire order and acknowledged once.
    #[serde(rename = "events.aggregated", rename_all = "camelCase")]
    Aggregated {
        /// Correlation id of the acknowledgement.
        #[serde(default)]
        request_id: RequestId,
        /// Inner events.
        events: Vec<ClientEvent>,
    },

    /// Assign a value to a property pointer.
    #[serde(rename = "property.set", rename_all = "camelCase")]
    SetPropertyValue {
        /// Correlation id for errors.
        #[serde(default)]
        request_id: RequestId,
        /// Property pointer.
        ptr: Ptr,
        /// New value, parsed into the property's type.
        value: Value,
    },

    /// Invoke a callback pointer.
    #[serde(rename = "function.call", rename_all = "camelCase")]
    FunctionCallRequested {
        /// Correlation id for errors and the follow-up render.
        #[serde(default)]
        request_id: RequestId,
        /// Callback pointer.
        ptr: Ptr,
    },

    /// Allocate and render a component from a named factory.
    #[serde(rename = "component.new", rename_all = "camelCase")]
    NewComponentRequested {
        /// Correlation id echoed in the first render.
        #[serde(default)]
        request_id: RequestId,
        /// Factory id.
        factory: String,
        /// Navigation values (query parameters).
        #[serde(default)]
        values: BTreeMap<String, String>,
    },

    /// Re-render an allocated component.
    #[serde(rename = "component.invalidate", rename_all = "camelCase")]
    ComponentInvalidationRequested {
        /// Correlation id echoed in the render.
        #[serde(default)]
        request_id: RequestId,
        /// Component pointer.
        ptr: Ptr,
    },

    /// Destroy an allocated component.
    #[serde(rename = "component.destroy", rename_all = "camelCase")]
    ComponentDestructionRequested {
        /// Correlation id of the acknowledgement.
        #[serde(default)]
        request_id: RequestId,
        /// Component pointer.
        ptr: Ptr,
    },

    /// Destroy the whole scope.
    #[serde(rename = "scope.destroy", rename_all = "camelCase")]
    ScopeDestructionRequested {
        /// Correlation id of the acknowledgement.
        #[serde(default)]
        request_id: RequestId,
    },

    /// Negotiate locale, timezone and application configuration.
    #[serde(rename = "configuration.request", rename_all = "camelCase")]
    ConfigurationRequested {
        /// Correlation id echoed in `ConfigurationDefined`.
        #[serde(default)]
        request_id: RequestId,
        /// `Accept-Language` style preference list.
        #[serde(default)]
        accept_language: String,
        /// IANA timezone name.
        #[serde(default)]
        timezone: String,
        /// Initial viewport metrics.
        #[serde(default)]
        window_info: Option<WindowInfo>,
    },

    /// Viewport metrics changed.
    #[serde(rename = "window.changed", rename_all = "camelCase")]
    WindowInfoChanged {
        /// New metrics.
        info: WindowInfo,
    },

    /// Answer to a `CallRequested`.
    #[serde(rename = "call.resolved", rename_all = "camelCase")]
    CallResolved {
        /// Pointer of the pending call.
        ptr: Ptr,
        /// Returned value.
        #[serde(default)]
        ret: Value,
    },

    /// Keep-alive.
    #[serde(rename = "ping")]
    Ping,

    /// Any event type this server does not understand.
    #[serde(other)]
    Unknown,
}

impl ClientEvent {
    /// Short name of the event kind, used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Aggregated { .. } => "events.aggregated",
            Self::SetPropertyValue { .. } => "property.set",
            Self::FunctionCallRequested { .. } => "function.call",
            Self::NewComponentRequested { .. } => "component.new",
            Self::ComponentInvalidationRequested { .. } => "component.invalidate",
            Self::ComponentDestructionRequested { .. } => "component.destroy",
            Self::ScopeDestructionRequested { .. } => "scope.destroy",
            Self::ConfigurationRequested { .. } => "configuration.request",
            Self::WindowInfoChanged { .. } => "window.changed",
            Self::CallResolved { .. } => "call.resolved",
            Self::Ping => "ping",
            Self::Unknown => "unknown",
        }
    }

    /// Correlation id, or the default when the event carries none.
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Aggregated { request_id, .. }
            | Self::SetPropertyValue { request_id, .. }
            | Self::FunctionCallRequested { request_id, .. }
            | Self::NewComponentRequested { request_id, .. }
            | Self::ComponentInvalidationRequested { request_id, .. }
            | Self::ComponentDestructionRequested { request_id, .. }
            | Self::ScopeDestructionRequested { request_id }
            | Self::ConfigurationRequested { request_id, .. } => *request_id,
            Self::WindowInfoChanged { .. } | Self::CallResolved { .. } | Self::Ping | Self::Unknown => {
                RequestId::default()
            }
        }
    }
}

/// Event published by a scope to its client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Fresh render of a component.
    #[serde(rename = "component.invalidated", rename_all = "camelCase")]
    ComponentInvalidated {
        /// Request that caused the render, if any.
        request_id: RequestId,
        /// Component pointer.
        ptr: Ptr,
        /// Render output.
        tree: RenderTree,
    },

    /// A request completed without further payload.
    #[serde(rename = "acknowledged", rename_all = "camelCase")]
    Acknowledged {
        /// Acknowledged request.
        request_id: RequestId,
    },

    /// A request failed.
    #[serde(rename = "error.occurred", rename_all = "camelCase")]
    ErrorOccurred {
        /// Failed request.
        request_id: RequestId,
        /// Machine-readable code (see [`crate::codes`]).
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// Negotiated session configuration.
    #[serde(rename = "configuration.defined", rename_all = "camelCase")]
    ConfigurationDefined {
        /// Answered request.
        request_id: RequestId,
        /// Application display name.
        application_name: String,
        /// Chosen locale.
        locale: String,
        /// All supported locales.
        locales: Vec<String>,
        /// Theme definitions.
        themes: Value,
        /// Chosen IANA timezone.
        timezone: String,
    },

    /// Navigate forward to a factory.
    #[serde(rename = "navigation.forward", rename_all = "camelCase")]
    NavigationForwardToRequested {
        /// Target factory id.
        factory: String,
        /// Navigation values.
        values: BTreeMap<String, String>,
    },

    /// Navigate back.
    #[serde(rename = "navigation.back")]
    NavigationBackRequested,

    /// Replace the navigation history with a single factory.
    #[serde(rename = "navigation.reset", rename_all = "camelCase")]
    NavigationResetRequested {
        /// Target factory id.
        factory: String,
        /// Navigation values.
        values: BTreeMap<String, String>,
    },

    /// Reload the current page.
    #[serde(rename = "navigation.reload")]
    NavigationReloadRequested,

    /// Server-initiated call answered by `CallResolved`.
    #[serde(rename = "call.requested", rename_all = "camelCase")]
    CallRequested {
        /// Correlation pointer.
        ptr: Ptr,
        /// Call arguments.
        call: CallArgs,
    },

    /// Write text to the client clipboard.
    #[serde(rename = "clipboard.write", rename_all = "camelCase")]
    ClipboardWriteRequested {
        /// Text to copy.
        text: String,
    },

    /// Open a resource (URL, mail link, ...).
    #[serde(rename = "open.requested", rename_all = "camelCase")]
    OpenRequested {
        /// Resource locator.
        resource: String,
        /// Client-specific options (e.g. target window).
        options: BTreeMap<String, String>,
    },

    /// Offer a file for download.
    #[serde(rename = "file.export", rename_all = "camelCase")]
    FileExportRequested {
        /// Suggested file name.
        name: String,
        /// MIME type.
        mime_type: String,
        /// Base64-encoded content.
        data: String,
    },
}

impl ServerEvent {
    /// Build an error event.
    pub fn error(request_id: RequestId, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ErrorOccurred {
            request_id,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Short name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ComponentInvalidated { .. } => "component.invalidated",
            Self::Acknowledged { .. } => "acknowledged",
            Self::ErrorOccurred { .. } => "error.occurred",
            Self::ConfigurationDefined { .. } => "configuration.defined",
            Self::NavigationForwardToRequested { .. } => "navigation.forward",
            Self::NavigationBackRequested => "navigation.back",
            Self::NavigationResetRequested { .. } => "navigation.reset",
            Self::NavigationReloadRequested => "navigation.reload",
            Self::CallRequested { .. } => "call.requested",
            Self::ClipboardWriteRequested { .. } => "clipboard.write",
            Self::OpenRequested { .. } => "open.requested",
            Self::FileExportRequested { .. } => "file.export",
        }
    }
}
