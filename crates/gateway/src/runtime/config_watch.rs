//! Background config-file poller.
//!
//! Re-reads the config file on a fixed period, re-applies the command-line
//! overrides, and notifies registered listeners with the old and new config
//! when anything changed. Used to reschedule the full push without a
//! restart.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sb_domain::config::Config;

const POLL_PERIOD: Duration = Duration::from_secs(15);

pub type ConfigListener = Box<dyn Fn(&Config, &Config) + Send + Sync>;

pub struct ConfigWatcher {
    path: PathBuf,
    overrides: Vec<(String, String)>,
    current: Config,
    listeners: Vec<ConfigListener>,
}

impl ConfigWatcher {
    pub fn new(path: PathBuf, overrides: Vec<(String, String)>, current: Config) -> Self {
        Self {
            path,
            overrides,
            current,
            listeners: Vec::new(),
        }
    }

    /// Register a listener invoked with `(old, new)` after each change.
    pub fn on_change(mut self, listener: impl Fn(&Config, &Config) + Send + Sync + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// One poll pass; visible for tests.
    fn poll(&mut self) {
        let mut fresh = match Config::load(&self.path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, path = %self.path.display(), "config reload failed");
                return;
            }
        };
        for (key, value) in &self.overrides {
            if let Err(err) = fresh.apply_override(key, value) {
                tracing::warn!(error = %err, "stale override no longer applies");
            }
        }
        if fresh == self.current {
            return;
        }
        tracing::info!("configuration changed on disk");
        for listener in &self.listeners {
            listener(&self.current, &fresh);
        }
        self.current = fresh;
    }

    /// Spawn the poll loop until `cancel` fires.
    pub fn spawn(mut self, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_PERIOD);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => self.poll(),
                }
            }
        });
    }
}
