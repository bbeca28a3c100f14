// src/blockchain/reconnect.rs
//! Supervision of the shared ledger connection.
//!
//! The connection is established lazily on first use. When the ledger
//! adapter reports a disconnect, the supervisor runs one reconnect loop with
//! a bounded number of attempts and exponential backoff. Only one loop runs
//! at a time; triggers arriving while a loop is active are dropped. A
//! [`CancellationToken`] aborts a loop that is waiting out a delay.

use crate::blockchain::ledger::LedgerAdapter;
use crate::config::ReconnectSettings;
use crate::error::{IdentityError, Result};
use log::{debug, info, warn};
use rand::Rng;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};

/// Cooperative cancellation signal shared by clones.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff parameters for reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Attempts after the first one (0 = a single attempt)
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap on the exponential growth
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay added or removed at random (0.0-1.0)
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_checked(&ReconnectSettings::default())
    }
}

impl ReconnectPolicy {
    /// Builds a policy from settings.
    ///
    /// # Errors
    /// `Config` if `multiplier` is not a finite value of at least 1.0,
    /// `jitter` is not finite, or `max_delay_ms` is below `initial_delay_ms`.
    pub fn from_settings(settings: &ReconnectSettings) -> Result<Self> {
        if !settings.multiplier.is_finite() || settings.multiplier < 1.0 {
            return Err(IdentityError::Config(format!(
                "reconnect.multiplier must be a finite value >= 1.0, got {}",
                settings.multiplier
            )));
        }
        if !settings.jitter.is_finite() {
            return Err(IdentityError::Config(format!(
                "reconnect.jitter must be finite, got {}",
                settings.jitter
            )));
        }
        if settings.max_delay_ms < settings.initial_delay_ms {
            return Err(IdentityError::Config(format!(
                "reconnect.max_delay_ms ({}) is below reconnect.initial_delay_ms ({})",
                settings.max_delay_ms, settings.initial_delay_ms
            )));
        }
        Ok(Self::from_checked(settings))
    }

    fn from_checked(settings: &ReconnectSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier,
            jitter: settings.jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay to wait after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64()).max(0.0);

        let delay = if self.jitter > 0.0 {
            let range = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-range..=range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }
}

/// Result of a reconnect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// The connection is up; `attempts` is 0 when it already was
    Connected { attempts: u32 },
    /// Another reconnect loop was already running
    AlreadyRunning,
}

/// Keeps the ledger connection alive for the lifetime of a session.
pub struct ConnectionSupervisor {
    ledger: Arc<dyn LedgerAdapter>,
    policy: ReconnectPolicy,
    token: CancellationToken,
    gate: AsyncMutex<()>,
}

impl ConnectionSupervisor {
    pub fn new(
        ledger: Arc<dyn LedgerAdapter>,
        policy: ReconnectPolicy,
        token: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            policy,
            token,
            gate: AsyncMutex::new(()),
        })
    }

    /// Registers the disconnect callback that starts a reconnect loop.
    pub fn watch(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.ledger.on_disconnect(Arc::new(move || {
            let Some(supervisor) = weak.upgrade() else {
                return;
            };
            if supervisor.token.is_cancelled() {
                return;
            }
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!("No runtime available to reconnect the ledger");
                return;
            };
            runtime.spawn(async move {
                if let Err(e) = supervisor.reconnect().await {
                    warn!("Ledger reconnect abandoned: {}", e);
                }
            });
        }));
    }

    /// Connects if the shared connection is not up yet.
    pub async fn ensure_connected(&self) -> Result<()> {
        if self.ledger.is_connected() {
            return Ok(());
        }
        self.ledger.connect().await
    }

    /// Runs the bounded reconnect loop.
    ///
    /// # Errors
    /// `Connection` when every attempt failed or the token was cancelled.
    pub async fn reconnect(&self) -> Result<ReconnectOutcome> {
        let Ok(_running) = self.gate.try_lock() else {
            debug!("Reconnect already in progress");
            return Ok(ReconnectOutcome::AlreadyRunning);
        };
        if self.ledger.is_connected() {
            return Ok(ReconnectOutcome::Connected { attempts: 0 });
        }

        let mut attempts = 0;
        loop {
            if self.token.is_cancelled() {
                return Err(IdentityError::Connection("reconnect cancelled".into()));
            }
            attempts += 1;

            match self.ledger.connect().await {
                Ok(()) => {
                    info!("Ledger reconnected after {} attempt(s)", attempts);
                    return Ok(ReconnectOutcome::Connected { attempts });
                }
                Err(e) if attempts > self.policy.max_retries => {
                    return Err(IdentityError::Connection(format!(
                        "gave up after {} attempt(s): {}",
                        attempts, e
                    )));
                }
                Err(e) => {
                    let delay = self.policy.delay_for_attempt(attempts - 1);
                    warn!(
                        "Reconnect attempt {}/{} failed: {}; retrying in {} ms",
                        attempts,
                        self.policy.max_retries + 1,
                        e,
                        delay.as_millis()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.token.cancelled() => {
                            return Err(IdentityError::Connection("reconnect cancelled".into()));
                        }
                    }
                }
            }
        }
    }
}
