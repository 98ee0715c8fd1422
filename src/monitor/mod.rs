//! The monitoring engine.
//!
//! Each configured [`Target`] gets its own check loop driven by the
//! [`scheduler`]. Every tick runs a probe through the [`Prober`], persists the
//! resulting [`CheckResult`] through the [`Store`] and feeds it to the
//! [`StateTracker`], which decides whether the target flipped between up and
//! down. Flips are handed to the [`Notifier`] on a detached task.

pub mod engine;
pub mod models;
pub mod probe;
pub mod scheduler;
pub mod state;
pub mod target;
pub mod traits;

pub use engine::{Engine, EngineSettings};
pub use models::{CheckResult, Transition};
pub use probe::{DEFAULT_PROBE_TIMEOUT, ProbeError, Prober};
pub use state::StateTracker;
pub use target::{DEFAULT_INTERVAL, ProbeKind, Target, interval_or_default, parse_interval};
pub use traits::{Notifier, Store};
