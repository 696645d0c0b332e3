//! Payload types shared by inbound and outbound events.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::ProtocolError;

/// Opaque render output of a component.
///
/// The runtime never inspects the tree; it only moves it from a component's
/// render pass to the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderTree(pub Value);

impl RenderTree {
    /// Wrap a JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// An empty tree.
    pub fn empty() -> Self {
        Self(Value::Null)
    }

    /// Borrow the underlying value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for RenderTree {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Responsive breakpoint derived from the viewport width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    /// Narrower than 640 dp.
    #[default]
    Sm,
    /// 640 to 767 dp.
    Md,
    /// 768 to 1023 dp.
    Lg,
    /// 1024 to 1279 dp.
    Xl,
    /// 1280 dp and wider.
    Xxl,
}

impl SizeClass {
    /// Classify a viewport width in density-independent pixels.
    pub fn for_width(width: f64) -> Self {
        if width < 640.0 {
            Self::Sm
        } else if width < 768.0 {
            Self::Md
        } else if width < 1024.0 {
            Self::Lg
        } else if width < 1280.0 {
            Self::Xl
        } else {
            Self::Xxl
        }
    }
}

/// Client viewport metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowInfo {
    /// Viewport width in density-independent pixels.
    pub width: f64,
    /// Viewport height in density-independent pixels.
    pub height: f64,
    /// Device pixel ratio.
    pub density: f64,
    /// Breakpoint; recomputed from `width` when absent on the wire.
    pub size_class: Option<SizeClass>,
}

impl Default for WindowInfo {
    fn default() -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            density: 1.0,
            size_class: None,
        }
    }
}

impl WindowInfo {
    /// Effective breakpoint.
    pub fn size_class(&self) -> SizeClass {
        self.size_class
            .unwrap_or_else(|| SizeClass::for_width(self.width))
    }
}

/// Arguments of a server-initiated call that the client answers with
/// `CallResolved`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CallArgs {
    /// Ask the client to pick files and upload them.
    #[serde(rename_all = "camelCase")]
    ImportFiles {
        /// Allow selecting more than one file.
        multiple: bool,
        /// Accepted MIME types; empty accepts anything.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        accepted_mime_types: Vec<String>,
        /// Per-file size limit in bytes.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_bytes: Option<u64>,
    },
    /// Application-defined call.
    Custom {
        /// Call name understood by the client.
        name: String,
        /// Arbitrary arguments.
        #[serde(default)]
        payload: Value,
    },
}

/// A file uploaded in answer to [`CallArgs::ImportFiles`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedFile {
    /// Original file name.
    pub name: String,
    /// Reported MIME type.
    pub mime_type: String,
    /// Base64-encoded content.
    pub data: String,
}

impl ImportedFile {
    /// Build from raw bytes.
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Decoded content.
    pub fn bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(STANDARD.decode(&self.data)?)
    }
}
