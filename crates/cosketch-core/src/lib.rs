//! CoSketch Core Library
//!
//! Platform-agnostic editing engine for the CoSketch collaborative vector
//! editor: scene model, tools, undo history, background artwork and
//! multi-user synchronization.

pub mod background;
pub mod clock;
pub mod config;
pub mod editor;
pub mod element;
pub mod export;
pub mod geometry;
pub mod history;
pub mod input;
pub mod render;
pub mod scene;
pub mod selection;
pub mod shortcuts;
pub mod sync;
pub mod tools;
pub mod viewport;

pub use background::{ArtworkFetcher, BackgroundError, BackgroundLoader, FetchError, sanitize_svg};
pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use config::{ConfigError, EditorConfig, ResolutionStrategy, SyncConfig};
pub use editor::Editor;
pub use element::{Element, ElementId, ElementPatch, ElementRecord, UserId};
pub use export::{ExportError, export_svg};
pub use history::History;
pub use input::{KeyInput, Modifiers, PointerEvent, PointerPhase};
pub use render::{MemoryRenderer, RenderLayer, RenderReconciler};
pub use scene::{Scene, Snapshot, SnapshotError};
pub use selection::Selection;
pub use shortcuts::{Action, Shortcut, ShortcutRegistry};
pub use sync::{ConnectionState, SyncEngine, SyncNotice, Transport, UpdateOutcome};
pub use tools::{ColorTarget, ToolKind, ToolManager, ToolState};
pub use viewport::Viewport;
