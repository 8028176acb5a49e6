//! Hardware-facing collaborators
//!
//! The manager only talks to the display server through these traits:
//! - [`DisplayBackend`] enumerates outputs and commits layouts
//! - [`ScaleFactorSink`] propagates scale factors to display clients
//!
//! X11 implementations live in `randr` and `xresources`.

pub mod randr;
pub mod xresources;

use anyhow::Result;

use crate::mode::Arrangement;
use crate::scale::ScaleFactors;

pub use randr::RandrBackend;
pub use xresources::XResourcesSink;

/// Output enumeration and mode-setting
pub trait DisplayBackend: Send + Sync {
    /// Currently connected outputs and the hardware's primary
    fn query_monitors(&self) -> Result<Arrangement>;

    /// Push a full layout to the hardware
    fn commit(&self, arrangement: &Arrangement) -> Result<()>;

    /// Mark one output as primary without touching the rest of the layout
    fn set_primary(&self, name: &str) -> Result<()>;
}

/// Receives every effective scale factor change
pub trait ScaleFactorSink: Send + Sync {
    fn propagate(&self, factors: &ScaleFactors) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory doubles for manager tests

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use crate::monitor::MonitorSet;

    /// Records commits; can be told to fail
    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        pub(crate) monitors: Mutex<Arrangement>,
        pub(crate) commits: Mutex<Vec<Arrangement>>,
        pub(crate) primaries: Mutex<Vec<String>>,
        pub(crate) fail: AtomicBool,
    }

    impl RecordingBackend {
        pub(crate) fn with_monitors(monitors: MonitorSet, primary: &str) -> Self {
            Self {
                monitors: Mutex::new(Arrangement::new(monitors, primary)),
                ..Self::default()
            }
        }

        pub(crate) fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn commit_count(&self) -> usize {
            self.commits.lock().unwrap().len()
        }

        pub(crate) fn last_commit(&self) -> Option<Arrangement> {
            self.commits.lock().unwrap().last().cloned()
        }
    }

    impl DisplayBackend for RecordingBackend {
        fn query_monitors(&self) -> Result<Arrangement> {
            Ok(self.monitors.lock().unwrap().clone())
        }

        fn commit(&self, arrangement: &Arrangement) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("simulated commit failure");
            }
            self.commits.lock().unwrap().push(arrangement.clone());
            Ok(())
        }

        fn set_primary(&self, name: &str) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("simulated primary failure");
            }
            self.primaries.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    /// Counts propagations
    #[derive(Default)]
    pub(crate) struct CountingSink {
        pub(crate) received: Mutex<Vec<ScaleFactors>>,
    }

    impl CountingSink {
        pub(crate) fn count(&self) -> usize {
            self.received.lock().unwrap().len()
        }
    }

    impl ScaleFactorSink for CountingSink {
        fn propagate(&self, factors: &ScaleFactors) -> Result<()> {
            self.received.lock().unwrap().push(factors.clone());
            Ok(())
        }
    }
}
