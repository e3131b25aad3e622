//! Backend reachability monitor
//!
//! [`HealthMonitor`] polls the backend on a fixed interval and is the only
//! writer of [`HealthState`]. Everyone else reads through a [`HealthHandle`].
//! [`HealthIndicator`] is the display-side state for the warning badge.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::ComparisonBackend;
use crate::error::CompareError;

/// Text shown when the indicator is expanded
pub const UNREACHABLE_MESSAGE: &str = "Backend server unreachable";

/// Tri-state reachability. `Unknown` only ever exists before the first poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Unknown,
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for Reachability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Latest known backend health
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthState {
    pub reachability: Reachability,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl HealthState {
    fn initial() -> Self {
        Self {
            reachability: Reachability::Unknown,
            last_checked_at: None,
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        self.reachability == Reachability::Unhealthy
    }
}

/// Configuration for the monitor
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Time between polls
    pub interval: Duration,
    /// Budget for one probe; much shorter than a generation call
    pub probe_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Polls the backend and owns the health state
pub struct HealthMonitor {
    backend: Arc<dyn ComparisonBackend>,
    config: HealthConfig,
    state: watch::Sender<HealthState>,
}

impl HealthMonitor {
    pub fn new(backend: Arc<dyn ComparisonBackend>, config: HealthConfig) -> Self {
        let (state, _) = watch::channel(HealthState::initial());
        Self {
            backend,
            config,
            state,
        }
    }

    /// Read-only view of the state, for any number of consumers
    pub fn handle(&self) -> HealthHandle {
        HealthHandle {
            rx: self.state.subscribe(),
        }
    }

    /// Run one probe and record its outcome
    pub async fn poll_once(&self) -> Reachability {
        let reachability = match self.probe().await {
            Ok(()) => Reachability::Healthy,
            Err(e) => {
                debug!("Health probe failed: {}", e);
                Reachability::Unhealthy
            }
        };
        self.record(reachability);
        reachability
    }

    async fn probe(&self) -> Result<(), CompareError> {
        let timeout = self.config.probe_timeout;
        tokio::time::timeout(timeout, self.backend.check_health())
            .await
            .unwrap_or(Err(CompareError::Timeout(timeout)))
    }

    fn record(&self, reachability: Reachability) {
        let previous = self.state.borrow().reachability;
        self.state.send_replace(HealthState {
            reachability,
            last_checked_at: Some(Utc::now()),
        });

        if previous != reachability {
            match reachability {
                Reachability::Unhealthy => warn!("Backend became unreachable"),
                _ => info!("Backend is {}", reachability),
            }
        }
    }

    /// Poll on the configured interval until `cancel` fires. The first poll
    /// happens immediately.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            debug!("Health monitor started with interval {:?}", self.config.interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Health monitor stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        self.poll_once().await;
                    }
                }
            }
        })
    }
}

/// Cloneable read handle on the health state
#[derive(Debug, Clone)]
pub struct HealthHandle {
    rx: watch::Receiver<HealthState>,
}

impl HealthHandle {
    pub fn current(&self) -> HealthState {
        self.rx.borrow().clone()
    }

    /// Wait for the next poll result. `None` once the monitor is gone.
    pub async fn changed(&mut self) -> Option<HealthState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// What the indicator should render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorView {
    Hidden,
    Collapsed,
    Expanded { message: &'static str },
}

/// Warning badge state: visible only while unhealthy, expanded while
/// hovered or focused.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthIndicator {
    expanded: bool,
}

impl HealthIndicator {
    pub fn hover_enter(&mut self) {
        self.expanded = true;
    }

    pub fn hover_exit(&mut self) {
        self.expanded = false;
    }

    /// Follow a state change; a badge that disappears forgets its hover
    pub fn observe(&mut self, state: &HealthState) {
        if !state.is_unhealthy() {
            self.expanded = false;
        }
    }

    pub fn view(&self, state: &HealthState) -> IndicatorView {
        match (state.is_unhealthy(), self.expanded) {
            (false, _) => IndicatorView::Hidden,
            (true, false) => IndicatorView::Collapsed,
            (true, true) => IndicatorView::Expanded {
                message: UNREACHABLE_MESSAGE,
            },
        }
    }
}
