// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative process driver.
//!
//! One task owns the whole daemon's scheduling: it selects over the monitor
//! event channel, a bounded tick, termination signals, and a programmatic
//! shutdown handle. Engine event handling therefore never overlaps; the
//! driver is the serialization point for all engine and metadata state.
//!
//! After every wake-up the driver runs any periodical call whose
//! next-eligible time has arrived. Each call's interval adapts: an EWMA of
//! `duration + min_interval` samples, never below `min_interval`, so a call
//! that grows slow backs itself off.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};

use ward_core::{ChangeEvent, Clock, SystemClock};

use crate::error::EngineError;
use crate::watcher::WatcherEngine;

/// How long one select wait lasts when no event arrives.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Weight kept from the previous adaptive interval.
const EWMA_KEEP: f64 = 0.98;
/// Weight of the newest `duration + min_interval` sample.
const EWMA_BLEND: f64 = 0.02;

/// One periodic job on the driver.
struct PeriodicalCall {
    name: String,
    callback: Box<dyn FnMut() + Send>,
    min_interval: Duration,
    adaptive_interval: Duration,
    last_invoked: Option<Instant>,
}

/// Registration handle shared with monitors; the driver drains it on every
/// wake-up.
#[derive(Clone, Default)]
pub struct PeriodicalRegistry {
    calls: Arc<Mutex<Vec<PeriodicalCall>>>,
}

impl PeriodicalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        min_interval: Duration,
        callback: Box<dyn FnMut() + Send>,
    ) {
        let name = name.into();
        debug!(call = %name, ?min_interval, "registered periodical call");
        self.calls.lock().push(PeriodicalCall {
            name,
            callback,
            min_interval,
            adaptive_interval: min_interval,
            last_invoked: None,
        });
    }
}

pub struct ProcessDriver<C: Clock = SystemClock> {
    clock: C,
    periodicals: PeriodicalRegistry,
    shutdown: Arc<Notify>,
}

impl ProcessDriver<SystemClock> {
    pub fn new(periodicals: PeriodicalRegistry) -> Self {
        Self::with_clock(periodicals, SystemClock)
    }
}

impl<C: Clock> ProcessDriver<C> {
    pub fn with_clock(periodicals: PeriodicalRegistry, clock: C) -> Self {
        Self {
            clock,
            periodicals,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for requesting loop termination from elsewhere.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Run until a termination signal or shutdown request. Every engine
    /// event is processed to completion before the next wait.
    pub async fn run(
        &self,
        engine: &mut WatcherEngine,
        mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    ) -> Result<(), EngineError> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => engine.on_change(event).await,
                    None => {
                        info!("event channel closed, shutting down");
                        break;
                    }
                },

                _ = self.shutdown.notified() => {
                    info!("shutdown requested");
                    break;
                }

                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                    break;
                }

                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    break;
                }

                _ = tick.tick() => {}
            }

            self.poll_periodicals();
        }
        Ok(())
    }

    /// Invoke every periodical call whose next-eligible time has arrived,
    /// timing each to feed its adaptive interval.
    fn poll_periodicals(&self) {
        let mut calls = self.periodicals.calls.lock();
        for call in calls.iter_mut() {
            let now = self.clock.now();
            let due = match call.last_invoked {
                None => true,
                Some(last) => now >= last + call.adaptive_interval,
            };
            if !due {
                continue;
            }

            (call.callback)();

            let duration = self.clock.now() - now;
            let sample = duration + call.min_interval;
            let blended =
                call.adaptive_interval.mul_f64(EWMA_KEEP) + sample.mul_f64(EWMA_BLEND);
            call.adaptive_interval = blended.max(call.min_interval);
            call.last_invoked = Some(now);
            debug!(
                call = %call.name,
                ?duration,
                adaptive = ?call.adaptive_interval,
                "periodical call finished"
            );
        }
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
