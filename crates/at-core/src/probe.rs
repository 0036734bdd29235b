//! The window probe boundary.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::observation::{Observation, ProbeError};

/// Reads the foreground window and the user's last input time.
///
/// Implementations talk to the windowing system and are free to be slow or to
/// hang; the tracker bounds every call with a timeout. Probes take `&mut self`
/// so they can keep state between ticks, such as the last pointer position when
/// input time has to be inferred.
pub trait WindowProbe: Send {
    /// Samples the focused window.
    fn sample(&mut self) -> impl Future<Output = Result<Observation, ProbeError>> + Send;

    /// Time of the most recent keyboard or pointer input.
    fn last_input_time(&mut self)
    -> impl Future<Output = Result<DateTime<Utc>, ProbeError>> + Send;
}
