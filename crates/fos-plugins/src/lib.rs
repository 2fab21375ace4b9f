//! fOS Native Plugin Host
//!
//! Discovers native plugin modules, loads them on demand and hosts plugin
//! instances inside embedded-object elements.
//!
//! Features:
//! - Module discovery across the standard plugin directories
//! - Load counting with deferred module teardown
//! - Windowed and windowless instances, input and geometry delivery
//! - Plugin-issued GET/POST requests answered by data streams
//! - Per-module quirks for plugins with known misbehaviour
//!
//! Everything here runs on one thread. Plugin code may call back into the
//! host at any point during a call into it; see [`context`].

pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod events;
pub mod geometry;
pub mod host;
pub mod host_funcs;
pub mod instance;
pub mod library;
pub mod mime;
pub mod module;
pub mod popup;
pub mod quirks;
pub mod request;
pub mod scheduler;
pub mod scripting;
pub mod stream;
pub mod surface;
pub mod throttler;

pub use config::PluginSettings;
pub use context::{NoScriptLock, ScriptLock};
pub use database::PluginDatabase;
pub use error::{ModuleError, NpError, NpResult};
pub use events::PluginInputEvent;
pub use geometry::{IntPoint, IntRect, LayoutGeometry};
pub use host::{FrameClient, LoadClient, LoadHandle, NativeWindow, PluginWindowSpec, ResourceResponse, ScriptValue};
pub use instance::{InstanceParams, LifecycleState, PluginStatus, PluginView};
pub use library::{DynamicLibraryProvider, LibraryProvider, NativeLibrary};
pub use mime::{MimeEntry, ModuleVersion};
pub use module::PluginModule;
pub use quirks::QuirkSet;
pub use request::{NotifyData, PluginRequest, ResourceRequest};
pub use scheduler::{ManualClock, Scheduler, SystemClock};
pub use stream::{PluginStream, StreamState};
pub use throttler::{MessageThrottler, NativeMessage};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
