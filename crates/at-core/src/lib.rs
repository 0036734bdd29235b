//! Core domain logic for the activity tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Categorization: mapping foreground-window observations to categories
//! - Idle detection and the session state machine
//! - The sampling loop that drives a [`WindowProbe`] into the engine
//! - Usage aggregation for reports

pub mod category;
pub mod engine;
pub mod idle;
mod observation;
mod probe;
pub mod report;
pub mod session;
mod settings;
mod store;
pub mod tracker;

pub use category::{Categorizer, Category, CategoryLabel, CategoryRule};
pub use engine::{EngineWarning, Sample, SessionEngine, TickReport, Transition};
pub use idle::{IdleState, update_idle};
pub use observation::{Observation, ProbeError};
pub use probe::WindowProbe;
pub use report::{DayTotal, TimelineEntry, UsageEntry, UsageSummary};
pub use session::{Session, local_midnight};
pub use settings::{ConfigError, Settings, default_categories};
pub use store::{MemoryStore, SessionStore, StoreError};
pub use tracker::TrackerSummary;
