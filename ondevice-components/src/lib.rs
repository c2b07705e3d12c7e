//! # On-device Components
//!
//! Lifecycle tracking for the SDK's capability components (LLM, STT, TTS,
//! ...). Each component kind moves through
//! `NotInitialized -> Initializing -> Ready | Failed` and
//! `Ready -> Cleaning -> NotInitialized`, driven by the outcomes of
//! [`ondevice_loader::LoadingOrchestrator`] loads.

pub mod tracker;
pub mod types;

pub use tracker::ComponentTracker;
pub use types::{
    ComponentError, ComponentEvent, ComponentKind, ComponentParams, ComponentState,
    ComponentStatus, TrackerConfig,
};
