//! Timer state machine used for local issue time tracking.
//!
//! One session at most, persisted on every transition so a running timer survives a restart.
//! While running, a background tick pushes the display text to the notification sink once
//! per second; description edits are written through a debounced single-slot writer.

use log::{debug, info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::format::format_hms;
use crate::ledger::Ledger;
use crate::models::{StoppedWorklog, TimerSession};
use crate::sink::{IndicatorState, NotificationSink};

/// Appended to the display text while paused.
pub const PAUSE_MARKER: &str = "⏸";
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerOptions {
    /// Pass display text through to the sink; the indicator state is always sent.
    pub show_display_text: bool,
    pub description_debounce: Duration,
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            show_display_text: true,
            description_debounce: Duration::from_millis(500),
        }
    }
}

impl From<&Config> for TimerOptions {
    fn from(config: &Config) -> Self {
        Self {
            show_display_text: config.show_timer_in_tray,
            description_debounce: config.description_debounce(),
        }
    }
}

/// Snapshot of the timer with elapsed time computed at the moment of the call.
#[derive(Clone, Serialize, Debug, PartialEq, Eq)]
pub struct TimerState {
    pub indicator: IndicatorState,
    pub issue_key: Option<String>,
    pub elapsed_seconds: i64,
    pub description: String,
    /// Empty when idle.
    pub display_text: String,
}

/// What `start` did: the worklog closed on the way, if any, and the new session.
#[derive(Clone, Serialize, Debug, PartialEq, Eq)]
pub struct TimerStarted {
    pub previous: Option<StoppedWorklog>,
    pub session: TimerSession,
}

fn display_text(session: &TimerSession, now: chrono::DateTime<chrono::Utc>) -> String {
    let text = format!("{} {}", session.issue_key, format_hms(session.elapsed_seconds(now)));
    if session.is_paused {
        format!("{text} {PAUSE_MARKER}")
    } else {
        text
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct Timer {
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    options: TimerOptions,
    session: tokio::sync::Mutex<Option<TimerSession>>,
    ticker: Mutex<Option<Ticker>>,
    description: DescriptionWriter,
}

impl Timer {
    /// Builds the timer, picking up any session left in the ledger by a previous process.
    /// Elapsed time is recomputed from the clock; a running session resumes ticking.
    pub async fn restore(
        ledger: Arc<Ledger>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        options: TimerOptions,
    ) -> Result<Self> {
        let restored = ledger.load_session()?;
        let timer = Self {
            description: DescriptionWriter::new(ledger.clone(), options.description_debounce),
            ledger,
            clock,
            sink,
            options,
            session: tokio::sync::Mutex::new(None),
            ticker: Mutex::new(None),
        };

        match restored {
            Some(session) => {
                info!(
                    "restored timer for {} ({}s banked, paused: {})",
                    session.issue_key, session.accumulated_seconds, session.is_paused
                );
                timer.announce(&session);
                if !session.is_paused {
                    timer.start_ticking(&session);
                }
                *timer.session.lock().await = Some(session);
            }
            None => timer.announce_idle(),
        }
        Ok(timer)
    }

    /// Starts tracking `issue_key`. An open session is stopped first and its worklog returned
    /// as `previous`; two sessions never coexist.
    pub async fn start(&self, issue_key: &str) -> Result<TimerStarted> {
        let issue_key = issue_key.trim();
        if issue_key.is_empty() {
            return Err(Error::Validation("issue key must not be empty".to_string()));
        }

        let mut guard = self.session.lock().await;
        let previous = self.finish(&mut guard)?;

        let session = TimerSession::begin(issue_key, self.clock.now());
        self.ledger.save_session(&session)?;
        self.start_ticking(&session);
        self.announce(&session);
        *guard = Some(session.clone());

        info!("timer started for {issue_key}");
        Ok(TimerStarted { previous, session })
    }

    pub async fn pause(&self) -> Result<TimerSession> {
        let mut guard = self.session.lock().await;
        let current = match guard.as_ref() {
            None => return Err(Error::invalid_state("pause", "no timer is running")),
            Some(session) if session.is_paused => {
                return Err(Error::invalid_state("pause", "timer is already paused"))
            }
            Some(session) => session,
        };

        let paused = current.paused_at(self.clock.now());
        self.ledger
            .update_session_progress(paused.started_at, paused.accumulated_seconds, true)?;
        self.cancel_ticker();
        self.announce(&paused);
        *guard = Some(paused.clone());

        debug!("timer paused at {}s", paused.accumulated_seconds);
        Ok(paused)
    }

    pub async fn resume(&self) -> Result<TimerSession> {
        let mut guard = self.session.lock().await;
        let current = match guard.as_ref() {
            None => return Err(Error::invalid_state("resume", "no timer is running")),
            Some(session) if !session.is_paused => {
                return Err(Error::invalid_state("resume", "timer is not paused"))
            }
            Some(session) => session,
        };

        let resumed = current.resumed_at(self.clock.now());
        self.ledger
            .update_session_progress(resumed.started_at, resumed.accumulated_seconds, false)?;
        self.start_ticking(&resumed);
        self.announce(&resumed);
        *guard = Some(resumed.clone());

        debug!("timer resumed with {}s banked", resumed.accumulated_seconds);
        Ok(resumed)
    }

    /// Closes the session into a pending worklog.
    pub async fn stop(&self) -> Result<StoppedWorklog> {
        let mut guard = self.session.lock().await;
        self.finish(&mut guard)?
            .ok_or_else(|| Error::invalid_state("stop", "no timer is running"))
    }

    /// Replaces the open session's description. Persistence is debounced; the latest text
    /// is always what ends up in the worklog.
    pub async fn update_description(&self, text: &str) -> Result<()> {
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| Error::invalid_state("update description", "no timer is running"))?;
        session.description = text.to_string();
        self.description.schedule(text.to_string());
        Ok(())
    }

    /// Writes a pending description edit now instead of waiting out the debounce window.
    pub fn flush_description(&self) -> Result<()> {
        self.description.flush()
    }

    pub async fn state(&self) -> TimerState {
        let guard = self.session.lock().await;
        let now = self.clock.now();
        match guard.as_ref() {
            None => TimerState {
                indicator: IndicatorState::Idle,
                issue_key: None,
                elapsed_seconds: 0,
                description: String::new(),
                display_text: String::new(),
            },
            Some(session) => TimerState {
                indicator: indicator_for(session),
                issue_key: Some(session.issue_key.clone()),
                elapsed_seconds: session.elapsed_seconds(now),
                description: session.description.clone(),
                display_text: display_text(session, now),
            },
        }
    }

    /// Stops ticking and flushes pending writes. The session itself stays persisted so the
    /// next process can restore it.
    pub async fn shutdown(&self) -> Result<()> {
        let _guard = self.session.lock().await;
        self.cancel_ticker();
        self.description.flush()
    }

    fn finish(&self, guard: &mut Option<TimerSession>) -> Result<Option<StoppedWorklog>> {
        let Some(session) = guard.as_ref() else {
            return Ok(None);
        };

        self.description.flush()?;
        let worklog = self
            .ledger
            .complete_session(&session.clone().into_worklog(self.clock.now()))?;
        self.cancel_ticker();
        *guard = None;
        self.announce_idle();

        info!(
            "timer stopped for {}: worklog {} ({}s)",
            worklog.issue_key, worklog.id, worklog.duration_seconds
        );
        Ok(Some(StoppedWorklog::from(&worklog)))
    }

    fn announce(&self, session: &TimerSession) {
        self.sink.set_indicator_state(indicator_for(session));
        if self.options.show_display_text {
            self.sink
                .set_display_text(&display_text(session, self.clock.now()));
        }
    }

    fn announce_idle(&self) {
        self.sink.set_indicator_state(IndicatorState::Idle);
        if self.options.show_display_text {
            self.sink.set_display_text("");
        }
    }

    fn start_ticking(&self, session: &TimerSession) {
        let mut ticker = lock(&self.ticker);
        if let Some(previous) = ticker.take() {
            previous.cancel();
        }
        if self.options.show_display_text {
            *ticker = Some(Ticker::spawn(
                session.clone(),
                self.clock.clone(),
                self.sink.clone(),
            ));
        }
    }

    fn cancel_ticker(&self) {
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.cancel();
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel_ticker();
        if let Err(err) = self.description.flush() {
            warn!("failed to flush description on drop: {err}");
        }
    }
}

fn indicator_for(session: &TimerSession) -> IndicatorState {
    if session.is_paused {
        IndicatorState::Paused
    } else {
        IndicatorState::Working
    }
}

/// Once-per-second display refresh for a running session.
///
/// The live flag is checked under its lock right before each emission, and `cancel` clears
/// it under the same lock, so nothing is emitted once `cancel` has returned.
struct Ticker {
    live: Arc<Mutex<bool>>,
    handle: JoinHandle<()>,
}

impl Ticker {
    fn spawn(
        session: TimerSession,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let live = Arc::new(Mutex::new(true));
        let flag = live.clone();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let live = lock(&flag);
                if !*live {
                    break;
                }
                sink.set_display_text(&display_text(&session, clock.now()));
            }
        });
        Self { live, handle }
    }

    fn cancel(self) {
        *lock(&self.live) = false;
        self.handle.abort();
    }
}

struct PendingDescription {
    generation: u64,
    text: String,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PendingSlot {
    generation: u64,
    pending: Option<PendingDescription>,
}

/// Single-slot debounced writer for the session description. A new edit replaces the
/// pending one; the delayed write and `flush` both run under the slot lock, so a given
/// edit is written at most once.
struct DescriptionWriter {
    ledger: Arc<Ledger>,
    delay: Duration,
    slot: Arc<Mutex<PendingSlot>>,
}

impl DescriptionWriter {
    fn new(ledger: Arc<Ledger>, delay: Duration) -> Self {
        Self {
            ledger,
            delay,
            slot: Arc::new(Mutex::new(PendingSlot::default())),
        }
    }

    fn schedule(&self, text: String) {
        let mut slot = lock(&self.slot);
        if let Some(previous) = slot.pending.take() {
            previous.handle.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;

        let ledger = self.ledger.clone();
        let shared = self.slot.clone();
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            let mut slot = lock(&shared);
            let due = matches!(&slot.pending, Some(pending) if pending.generation == generation);
            if !due {
                return;
            }
            if let Some(pending) = slot.pending.take() {
                if let Err(err) = ledger.update_session_description(&pending.text) {
                    warn!("failed to persist timer description: {err}");
                }
            }
        });

        slot.pending = Some(PendingDescription {
            generation,
            text,
            handle,
        });
    }

    fn flush(&self) -> Result<()> {
        let mut slot = lock(&self.slot);
        match slot.pending.take() {
            Some(pending) => {
                pending.handle.abort();
                self.ledger.update_session_description(&pending.text)
            }
            None => Ok(()),
        }
    }

    #[cfg(test)]
    fn has_pending(&self) -> bool {
        lock(&self.slot).pending.is_some()
    }
}
