//! Scan session controller: one instance per device.
//!
//! Owns the capture handle, the fixed-cadence decode loop, and the
//! single-flight guard that keeps at most one redemption in flight. The
//! guard and frame source are fields of the instance, never process
//! globals, so a controller is testable in isolation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::capture::{Capture, Facing, FrameSource};
use crate::decode::DecoderStack;
use crate::engine::RedemptionEngine;
use crate::errors::CaptureError;
use crate::ledger::Ledger;
use crate::models::outcome::ScanResult;
use crate::store::TokenStore;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(300);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1500);

/// Controller states. `Locked` covers both a redemption in flight and the
/// cooldown while its result is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Armed,
    Locked,
}

/// Operator-facing happenings. `Result` is emitted before the cooldown
/// starts, so every outcome produces an immediate signal.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Result(ScanResult),
    Rearmed,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Decode sampling cadence.
    pub scan_interval: Duration,
    /// How long a result stays on screen before scanning re-arms.
    pub cooldown: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Caller-side handle: receives events, observes state, requests stop.
pub struct SessionHandle {
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    state: watch::Receiver<SessionState>,
    stop: watch::Sender<bool>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the controller reaches `target`.
    pub async fn wait_for_state(&mut self, target: SessionState) {
        let _ = self.state.wait_for(|s| *s == target).await;
    }

    /// Ask the controller to stop. Sampling halts at the next tick boundary;
    /// an in-flight redemption completes first.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

pub struct ScanSession<S> {
    engine: RedemptionEngine<S>,
    decoders: DecoderStack,
    ledger: Arc<Ledger>,
    config: SessionConfig,
    /// Single-flight guard: set before redeeming, cleared after cooldown.
    /// Check-and-set, not a queue — losers drop their payload.
    guard: AtomicBool,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<SessionState>,
    stop_rx: watch::Receiver<bool>,
}

impl<S: TokenStore> ScanSession<S> {
    pub fn new(
        engine: RedemptionEngine<S>,
        decoders: DecoderStack,
        ledger: Arc<Ledger>,
        config: SessionConfig,
    ) -> (Self, SessionHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (stop_tx, stop_rx) = watch::channel(false);
        (
            Self {
                engine,
                decoders,
                ledger,
                config,
                guard: AtomicBool::new(false),
                events: events_tx,
                state: state_tx,
                stop_rx,
            },
            SessionHandle {
                events: events_rx,
                state: state_rx,
                stop: stop_tx,
            },
        )
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Drive the capture → decode → redeem loop until stopped.
    ///
    /// Starting capture arms the session; stopping it drops the frame source
    /// (releasing the device) and returns the controller to idle with all
    /// timers cancelled.
    pub async fn run(self, capture: &dyn Capture, facing: Facing) -> Result<(), CaptureError> {
        let mut source = capture.start(facing)?;
        self.set_state(SessionState::Armed);
        info!(
            interval_ms = self.config.scan_interval.as_millis() as u64,
            cooldown_ms = self.config.cooldown.as_millis() as u64,
            facing = facing.as_str(),
            "scan session armed"
        );

        let mut ticks = time::interval(self.config.scan_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stop_rx = self.stop_rx.clone();

        loop {
            tokio::select! {
                // Also fires on a dropped handle: an unobserved session stops.
                _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => break,
                _ = ticks.tick() => {
                    if let Some(payload) = self.sample(source.as_mut()) {
                        // Runs to completion: the store mutation of an
                        // in-flight redemption is never abandoned halfway.
                        self.handle_decode(&payload).await;
                    }
                }
            }
        }

        drop(source);
        self.set_state(SessionState::Idle);
        let _ = self.events.send(SessionEvent::Stopped);
        info!("scan session stopped");
        Ok(())
    }

    /// One sampling tick: skip silently when locked, when no frame is
    /// available yet, or when no symbol is found.
    fn sample(&self, source: &mut dyn FrameSource) -> Option<String> {
        if self.state() != SessionState::Armed {
            return None;
        }
        let frame = source.latest_frame()?;
        let payload = self.decoders.decode(&frame)?;
        debug!(seq = frame.seq, "frame decoded");
        Some(payload)
    }

    /// Feed one decoded payload through the single-flight guard into the
    /// engine. This is also the entry point for manual (keyboard-wedge)
    /// payloads. Payloads arriving while a redemption is in flight are
    /// dropped, not queued.
    pub async fn handle_decode(&self, payload: &str) {
        if self
            .guard
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("redemption in flight, payload dropped");
            return;
        }
        self.set_state(SessionState::Locked);

        let result = self.engine.redeem(payload).await;
        if let ScanResult::Success {
            subject,
            scope,
            used_at,
        } = &result
        {
            self.ledger.record(subject.clone(), scope.clone(), *used_at);
        }
        // Emitted before the cooldown: the operator sees the outcome
        // immediately, then gets time to read it.
        let _ = self.events.send(SessionEvent::Result(result));

        self.cooldown_then_rearm().await;
    }

    async fn cooldown_then_rearm(&self) {
        let mut stop_rx = self.stop_rx.clone();
        tokio::select! {
            _ = time::sleep(self.config.cooldown) => {}
            _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => {
                debug!("cooldown cut short by stop");
            }
        }
        self.guard.store(false, Ordering::Release);
        self.set_state(SessionState::Armed);
        let _ = self.events.send(SessionEvent::Rearmed);
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }
}
