//! Per-channel alarm state machine
//!
//! ```text
//!   DISABLED <──────────── (alarm or channel disabled, any state)
//!
//!   arm ──> INIT ──(1 s)──> WARMUP ──(valid + warmup)──> READY <──┐
//!                                                          │      │ (normal or NaN)
//!                                             (violation persisted)│
//!                                                          ▼      │
//!                                                        ACTIVE ──┘
//! ```
//!
//! Only a valid value that stays outside `(min, max)` for the configured
//! persistence time raises the alarm. A failed read (NaN) never does.

use crate::config::INIT_STABILIZE_MS;

/// Alarm states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmState {
    /// Alarm or channel disabled
    Disabled,
    /// Stabilization after arming, before the first read cycle completes
    Init,
    /// Blocking alarms until the sender reaches operating conditions
    Warmup,
    /// Qualifying readings
    Ready,
    /// Alarm raised
    Active,
}

/// What an output sink should show for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmSeverity {
    Normal,
    /// Violation seen, persistence timer running
    Pending,
    Active,
}

/// Alarm context embedded in each channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlarmContext {
    state: AlarmState,
    /// When the current state was entered
    entered_ms: u32,
    /// When the context was armed; the warmup window counts from here
    armed_ms: u32,
    /// Start of the current violation
    violation_since: Option<u32>,
    warmup_ms: u32,
    persist_ms: u32,
    active: bool,
}

impl Default for AlarmContext {
    fn default() -> Self {
        Self::disabled()
    }
}

impl AlarmContext {
    /// A context that never alarms
    pub const fn disabled() -> Self {
        Self {
            state: AlarmState::Disabled,
            entered_ms: 0,
            armed_ms: 0,
            violation_since: None,
            warmup_ms: 0,
            persist_ms: 0,
            active: false,
        }
    }

    /// Arm (or disarm) a fresh context
    ///
    /// Starts in `Init` when `alarm_enabled`, `Disabled` otherwise.
    pub fn new(warmup_ms: u32, persist_ms: u32, alarm_enabled: bool, now_ms: u32) -> Self {
        Self {
            state: if alarm_enabled {
                AlarmState::Init
            } else {
                AlarmState::Disabled
            },
            entered_ms: now_ms,
            armed_ms: now_ms,
            violation_since: None,
            warmup_ms,
            persist_ms,
            active: false,
        }
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Alarm flag polled by output sinks
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn severity(&self) -> AlarmSeverity {
        if self.active {
            AlarmSeverity::Active
        } else if self.violation_since.is_some() {
            AlarmSeverity::Pending
        } else {
            AlarmSeverity::Normal
        }
    }

    pub fn entered_ms(&self) -> u32 {
        self.entered_ms
    }

    pub fn violation_since(&self) -> Option<u32> {
        self.violation_since
    }

    pub fn warmup_ms(&self) -> u32 {
        self.warmup_ms
    }

    pub fn persist_ms(&self) -> u32 {
        self.persist_ms
    }

    /// Change the timing without re-arming
    pub fn set_timing(&mut self, warmup_ms: u32, persist_ms: u32) {
        self.warmup_ms = warmup_ms;
        self.persist_ms = persist_ms;
    }

    fn enter(&mut self, state: AlarmState, now_ms: u32) {
        self.state = state;
        self.entered_ms = now_ms;
    }

    fn clear(&mut self) {
        self.violation_since = None;
        self.active = false;
    }

    /// Evaluate one tick
    ///
    /// `enabled` is the conjunction of the channel's enable and alarm flags.
    /// Elapsed times use wrapping arithmetic, so the millisecond clock may
    /// roll over.
    pub fn evaluate(&mut self, value: f32, min: f32, max: f32, enabled: bool, now_ms: u32) -> AlarmState {
        if !enabled {
            self.clear();
            self.state = AlarmState::Disabled;
            return self.state;
        }

        match self.state {
            AlarmState::Disabled => {
                self.active = false;
                return self.state;
            }
            AlarmState::Init => {
                if now_ms.wrapping_sub(self.entered_ms) >= INIT_STABILIZE_MS {
                    self.enter(AlarmState::Warmup, now_ms);
                }
                return self.state;
            }
            AlarmState::Warmup => {
                if value.is_nan() || now_ms.wrapping_sub(self.armed_ms) < self.warmup_ms {
                    return self.state;
                }
                self.enter(AlarmState::Ready, now_ms);
            }
            AlarmState::Ready | AlarmState::Active => {}
        }

        let violating = !value.is_nan() && (value >= max || value <= min);
        if violating {
            let since = *self.violation_since.get_or_insert(now_ms);
            if now_ms.wrapping_sub(since) >= self.persist_ms {
                self.active = true;
                if self.state != AlarmState::Active {
                    warn!("alarm raised: value {}, bounds ({}, {})", value, min, max);
                    self.enter(AlarmState::Active, now_ms);
                }
            }
        } else {
            self.clear();
            if self.state == AlarmState::Active {
                info!("alarm cleared");
                self.enter(AlarmState::Ready, now_ms);
            }
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: f32 = -1.0;
    const MAX: f32 = 260.0;

    fn armed() -> AlarmContext {
        AlarmContext::new(30000, 2000, true, 0)
    }

    #[test]
    fn test_new_states() {
        assert_eq!(armed().state(), AlarmState::Init);
        assert_eq!(
            AlarmContext::new(30000, 2000, false, 0).state(),
            AlarmState::Disabled
        );
    }

    #[test]
    fn test_init_waits_one_second() {
        let mut ctx = armed();
        assert_eq!(ctx.evaluate(20.0, MIN, MAX, true, 999), AlarmState::Init);
        assert_eq!(ctx.evaluate(20.0, MIN, MAX, true, 1000), AlarmState::Warmup);
        assert_eq!(ctx.entered_ms(), 1000);
    }

    #[test]
    fn test_init_ignores_violations() {
        let mut ctx = armed();
        ctx.evaluate(500.0, MIN, MAX, true, 500);
        assert!(!ctx.is_active());
        assert_eq!(ctx.severity(), AlarmSeverity::Normal);
    }

    #[test]
    fn test_warmup_requires_valid_value() {
        let mut ctx = armed();
        ctx.evaluate(f32::NAN, MIN, MAX, true, 1000);
        assert_eq!(ctx.evaluate(f32::NAN, MIN, MAX, true, 40000), AlarmState::Warmup);
        assert_eq!(ctx.evaluate(20.0, MIN, MAX, true, 40001), AlarmState::Ready);
    }

    #[test]
    fn test_alarm_timing() {
        let mut ctx = armed();
        let mut first_active = None;
        for t in 0..=33000u32 {
            let value = if t < 30001 { f32::NAN } else if t < 33000 { 300.0 } else { 100.0 };
            ctx.evaluate(value, MIN, MAX, true, t);
            if ctx.is_active() && first_active.is_none() {
                first_active = Some(t);
            }
            if t < 32001 {
                assert!(!ctx.is_active(), "active early at {t}");
            }
        }
        assert_eq!(first_active, Some(32001));
        assert!(!ctx.is_active());
        assert_eq!(ctx.state(), AlarmState::Ready);
    }

    #[test]
    fn test_short_spike_does_not_alarm() {
        let mut ctx = AlarmContext::new(0, 2000, true, 0);
        ctx.evaluate(20.0, MIN, MAX, true, 1000);
        ctx.evaluate(20.0, MIN, MAX, true, 1001);
        assert_eq!(ctx.state(), AlarmState::Ready);

        ctx.evaluate(300.0, MIN, MAX, true, 2000);
        assert_eq!(ctx.severity(), AlarmSeverity::Pending);
        ctx.evaluate(300.0, MIN, MAX, true, 3999);
        ctx.evaluate(20.0, MIN, MAX, true, 4000);
        assert_eq!(ctx.severity(), AlarmSeverity::Normal);
        ctx.evaluate(300.0, MIN, MAX, true, 4001);
        ctx.evaluate(300.0, MIN, MAX, true, 6000);
        assert!(!ctx.is_active());
        ctx.evaluate(300.0, MIN, MAX, true, 6001);
        assert!(ctx.is_active());
        assert_eq!(ctx.severity(), AlarmSeverity::Active);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let mut ctx = AlarmContext::new(0, 0, true, 0);
        ctx.evaluate(20.0, MIN, MAX, true, 1000);
        assert_eq!(ctx.evaluate(MAX, MIN, MAX, true, 1001), AlarmState::Active);
        assert_eq!(ctx.evaluate(0.0, MIN, MAX, true, 1002), AlarmState::Ready);
        assert_eq!(ctx.evaluate(MIN, MIN, MAX, true, 1003), AlarmState::Active);
    }

    #[test]
    fn test_nan_clears_active() {
        let mut ctx = AlarmContext::new(0, 0, true, 0);
        ctx.evaluate(20.0, MIN, MAX, true, 1000);
        ctx.evaluate(300.0, MIN, MAX, true, 1001);
        assert!(ctx.is_active());
        assert_eq!(ctx.evaluate(f32::NAN, MIN, MAX, true, 1002), AlarmState::Ready);
        assert!(!ctx.is_active());
        assert_eq!(ctx.violation_since(), None);
    }

    #[test]
    fn test_disable_is_sticky() {
        let mut ctx = AlarmContext::new(0, 0, true, 0);
        ctx.evaluate(20.0, MIN, MAX, true, 1000);
        ctx.evaluate(300.0, MIN, MAX, true, 1001);
        assert!(ctx.is_active());

        assert_eq!(ctx.evaluate(300.0, MIN, MAX, false, 1002), AlarmState::Disabled);
        assert!(!ctx.is_active());
        // Re-enabling the flag alone does not re-arm
        assert_eq!(ctx.evaluate(300.0, MIN, MAX, true, 1003), AlarmState::Disabled);
        assert!(!ctx.is_active());
    }

    #[test]
    fn test_clock_wraparound() {
        let start = u32::MAX - 500;
        let mut ctx = AlarmContext::new(0, 0, true, start);
        assert_eq!(ctx.evaluate(20.0, MIN, MAX, true, start.wrapping_add(1000)), AlarmState::Warmup);
    }
}
