//! Rendered-UI probes.
//!
//! A UI that caches stale data needs a reload before each look:
//! [`UiRowProbe`] reloads the page per attempt so every sample reflects
//! the backend's current answer, and counts its reloads so tests can
//! assert one reload per attempt. [`UiVisibilityProbe`] supports the
//! same reload behavior on an opt-in basis.

use crate::probe::{EntityKey, Observation, Probe, ProbeFailure};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Minimal surface a UI probe needs from a browser session.
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// Reload the current page.
    ///
    /// # Errors
    ///
    /// [`ProbeFailure::Transient`] when the reload flakes,
    /// [`ProbeFailure::Fatal`] when the session is gone.
    async fn reload(&self) -> Result<(), ProbeFailure>;

    /// Text of every row the selector matches, top to bottom.
    ///
    /// # Errors
    ///
    /// Same classification as [`reload`](Self::reload).
    async fn table_rows(&self, selector: &str) -> Result<Vec<String>, ProbeFailure>;

    /// Whether the selector matches a visible element.
    ///
    /// # Errors
    ///
    /// Same classification as [`reload`](Self::reload).
    async fn is_visible(&self, selector: &str) -> Result<bool, ProbeFailure>;
}

/// Per-attempt reload bookkeeping shared by the UI probes: the first
/// sample reads the page as navigated, later ones reload first (when
/// enabled), and every reload is counted.
struct ReloadGate {
    enabled: bool,
    samples: AtomicU32,
    reloads: AtomicU32,
}

impl ReloadGate {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            samples: AtomicU32::new(0),
            reloads: AtomicU32::new(0),
        }
    }

    async fn before_sample(&self, driver: &dyn UiDriver) -> Result<(), ProbeFailure> {
        let prior = self.samples.fetch_add(1, Ordering::SeqCst);
        if self.enabled && prior > 0 {
            driver.reload().await?;
            self.reloads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn count(&self) -> u32 {
        self.reloads.load(Ordering::SeqCst)
    }
}

/// Samples the text rows of a table, reloading the page first on every
/// attempt after the initial one.
pub struct UiRowProbe {
    driver: Arc<dyn UiDriver>,
    row_selector: String,
    gate: ReloadGate,
}

impl UiRowProbe {
    /// Probe the rows behind this selector, reloading before each
    /// attempt after the first
    pub fn new(driver: Arc<dyn UiDriver>, row_selector: impl Into<String>) -> Self {
        Self {
            driver,
            row_selector: row_selector.into(),
            gate: ReloadGate::new(true),
        }
    }

    /// Skip the per-attempt reload (for live-updating views)
    #[must_use]
    pub fn without_reload(mut self) -> Self {
        self.gate.enabled = false;
        self
    }

    /// How many reloads the probe has performed
    #[must_use]
    pub fn reload_count(&self) -> u32 {
        self.gate.count()
    }
}

impl fmt::Debug for UiRowProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiRowProbe")
            .field("row_selector", &self.row_selector)
            .field("reloads", &self.reload_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Probe for UiRowProbe {
    type Value = Vec<String>;

    async fn sample(&self, _key: &EntityKey) -> Result<Observation<Vec<String>>, ProbeFailure> {
        self.gate.before_sample(self.driver.as_ref()).await?;
        let rows = self.driver.table_rows(&self.row_selector).await?;
        if rows.is_empty() {
            Ok(Observation::Missing)
        } else {
            Ok(Observation::Found(rows))
        }
    }

    fn target(&self) -> String {
        format!("table rows at '{}'", self.row_selector)
    }
}

/// Samples whether an element is currently visible, optionally reloading
/// the page before each attempt after the first.
///
/// Reload is off by default: visibility waits usually watch the page as
/// rendered (a spinner clearing, a panel expanding). For elements that
/// only appear once the backend has caught up and the page is fetched
/// again, opt in with [`with_reload`](Self::with_reload).
pub struct UiVisibilityProbe {
    driver: Arc<dyn UiDriver>,
    selector: String,
    gate: ReloadGate,
}

impl UiVisibilityProbe {
    /// Probe visibility of this selector
    pub fn new(driver: Arc<dyn UiDriver>, selector: impl Into<String>) -> Self {
        Self {
            driver,
            selector: selector.into(),
            gate: ReloadGate::new(false),
        }
    }

    /// Reload the page before each attempt after the first
    #[must_use]
    pub fn with_reload(mut self) -> Self {
        self.gate.enabled = true;
        self
    }

    /// How many reloads the probe has performed
    #[must_use]
    pub fn reload_count(&self) -> u32 {
        self.gate.count()
    }
}

impl fmt::Debug for UiVisibilityProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiVisibilityProbe")
            .field("selector", &self.selector)
            .field("reloads", &self.reload_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Probe for UiVisibilityProbe {
    type Value = bool;

    async fn sample(&self, _key: &EntityKey) -> Result<Observation<bool>, ProbeFailure> {
        self.gate.before_sample(self.driver.as_ref()).await?;
        let visible = self.driver.is_visible(&self.selector).await?;
        Ok(Observation::Found(visible))
    }

    fn target(&self) -> String {
        format!("visibility of '{}'", self.selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeDriver {
        row_frames: Mutex<VecDeque<Vec<String>>>,
        visible_frames: Mutex<VecDeque<bool>>,
        reloads: AtomicU32,
    }

    impl FakeDriver {
        fn new(row_frames: Vec<Vec<String>>) -> Arc<Self> {
            Self::with_visibility(row_frames, vec![true])
        }

        fn with_visibility(row_frames: Vec<Vec<String>>, visible_frames: Vec<bool>) -> Arc<Self> {
            Arc::new(Self {
                row_frames: Mutex::new(row_frames.into_iter().collect()),
                visible_frames: Mutex::new(visible_frames.into_iter().collect()),
                reloads: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl UiDriver for FakeDriver {
        async fn reload(&self) -> Result<(), ProbeFailure> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn table_rows(&self, _selector: &str) -> Result<Vec<String>, ProbeFailure> {
            Ok(self
                .row_frames
                .lock()
                .expect("frames mutex poisoned")
                .pop_front()
                .unwrap_or_default())
        }

        async fn is_visible(&self, _selector: &str) -> Result<bool, ProbeFailure> {
            let mut frames = self.visible_frames.lock().expect("frames mutex poisoned");
            let front = frames.front().copied().unwrap_or(false);
            if frames.len() > 1 {
                frames.pop_front();
            }
            Ok(front)
        }
    }

    #[tokio::test]
    async fn test_reloads_before_every_attempt_after_the_first() {
        let driver = FakeDriver::new(vec![vec![], vec![], vec!["Ana".to_string()]]);
        let probe = UiRowProbe::new(driver.clone(), "tbody tr");
        let key = EntityKey::from("ana");
        probe.sample(&key).await.unwrap();
        probe.sample(&key).await.unwrap();
        probe.sample(&key).await.unwrap();
        assert_eq!(driver.reloads.load(Ordering::SeqCst), 2);
        assert_eq!(probe.reload_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_table_is_missing() {
        let driver = FakeDriver::new(vec![vec![]]);
        let probe = UiRowProbe::new(driver, "tbody tr");
        let obs = probe.sample(&EntityKey::from("ana")).await.unwrap();
        assert!(!obs.is_found());
    }

    #[tokio::test]
    async fn test_without_reload_never_reloads() {
        let driver = FakeDriver::new(vec![vec![], vec![]]);
        let probe = UiRowProbe::new(driver.clone(), "tbody tr").without_reload();
        let key = EntityKey::from("ana");
        probe.sample(&key).await.unwrap();
        probe.sample(&key).await.unwrap();
        assert_eq!(driver.reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_visibility_probe_reports_state() {
        let driver = FakeDriver::new(vec![]);
        let probe = UiVisibilityProbe::new(driver, "#saldo-ferias");
        let obs = probe.sample(&EntityKey::from("ana")).await.unwrap();
        assert_eq!(obs.value(), Some(&true));
    }

    #[tokio::test]
    async fn test_visibility_probe_does_not_reload_by_default() {
        let driver = FakeDriver::with_visibility(vec![], vec![false, false, true]);
        let probe = UiVisibilityProbe::new(driver.clone(), "#saldo-ferias");
        let key = EntityKey::from("ana");
        probe.sample(&key).await.unwrap();
        probe.sample(&key).await.unwrap();
        assert_eq!(driver.reloads.load(Ordering::SeqCst), 0);
        assert_eq!(probe.reload_count(), 0);
    }

    #[tokio::test]
    async fn test_visibility_probe_reloads_each_attempt_when_opted_in() {
        // element only renders once the page is fetched again
        let driver = FakeDriver::with_visibility(vec![], vec![false, false, true]);
        let probe = UiVisibilityProbe::new(driver.clone(), "#saldo-ferias").with_reload();
        let key = EntityKey::from("ana");
        assert_eq!(probe.sample(&key).await.unwrap().value(), Some(&false));
        assert_eq!(probe.sample(&key).await.unwrap().value(), Some(&false));
        assert_eq!(probe.sample(&key).await.unwrap().value(), Some(&true));
        assert_eq!(driver.reloads.load(Ordering::SeqCst), 2);
        assert_eq!(probe.reload_count(), 2);
    }
}
