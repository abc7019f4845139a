//! Burst controller finite-state machine.
//!
//! Each tick the controller derives pulse timing from the register snapshot,
//! decides its next state, then commits counters and the registered output:
//!
//! ```text
//!            enable && trigger
//!   Idle ─────────────────────▶ PulseHigh ◀──────────────┐
//!    ▲                             │ period ≥ high       │ delay ≥ inter_burst_delay
//!    │ !enable || trigger          ▼                     │
//!   Done ◀──── last burst ───── PulseLow ── burst end ─▶ InterBurstDelay
//! ```
//!
//! `enable` and `trigger` are only sampled in Idle and Done; an active
//! sequence always runs to Done (or until reset). All counters are `u32`
//! and wrap on overflow.

use serde::{Serialize, Deserialize};

use crate::regs::{Control, Status, DUTY_SHIFT};

/// Controller state. Discriminants are the STATUS state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BurstState {
    #[default]
    Idle = 0,
    PulseHigh = 1,
    PulseLow = 2,
    InterBurstDelay = 3,
    Done = 4,
}

impl BurstState {
    pub const ALL: [BurstState; 5] = [
        BurstState::Idle,
        BurstState::PulseHigh,
        BurstState::PulseLow,
        BurstState::InterBurstDelay,
        BurstState::Done,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        BurstState::ALL.get(code as usize).copied()
    }

    /// True while a sequence is being generated.
    pub fn is_active(self) -> bool {
        matches!(self, BurstState::PulseHigh | BurstState::PulseLow | BurstState::InterBurstDelay)
    }

    pub fn name(self) -> &'static str {
        match self {
            BurstState::Idle => "Idle",
            BurstState::PulseHigh => "PulseHigh",
            BurstState::PulseLow => "PulseLow",
            BurstState::InterBurstDelay => "InterBurstDelay",
            BurstState::Done => "Done",
        }
    }
}

/// Controller-facing register snapshot, copied out of the register file
/// after the tick's host write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstConfig {
    pub control: Control,
    pub pulse_count: u32,
    pub burst_count: u32,
    /// High fraction of the period, out of 1024.
    pub duty_cycle: u32,
    pub inter_burst_delay: u32,
    pub pulse_period: u32,
}

impl BurstConfig {
    /// `floor(pulse_period * duty_cycle / 1024)` in 32-bit wrapping arithmetic.
    pub fn pulse_high_time(&self) -> u32 {
        self.pulse_period.wrapping_mul(self.duty_cycle) >> DUTY_SHIFT
    }

    /// `pulse_period - pulse_high_time`. Wraps when `duty_cycle > 1024`.
    pub fn pulse_low_time(&self) -> u32 {
        self.pulse_period.wrapping_sub(self.pulse_high_time())
    }
}

/// Result of one controller tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOutput {
    /// Registered output level for this tick.
    pub tone_out: bool,
    /// Status built from the state at the start of the tick.
    pub status: Status,
}

/// Burst controller state and counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstController {
    state: BurstState,
    pulse_counter: u32,
    burst_counter: u32,
    period_counter: u32,
    delay_counter: u32,
    tone_out: bool,
}

impl BurstController {
    pub fn new() -> Self {
        BurstController {
            state: BurstState::Idle,
            pulse_counter: 0,
            burst_counter: 0,
            period_counter: 0,
            delay_counter: 0,
            tone_out: false,
        }
    }

    pub fn reset(&mut self) {
        *self = BurstController::new();
    }

    /// Advance one tick against `cfg`.
    pub fn step(&mut self, cfg: &BurstConfig) -> ControllerOutput {
        let status = self.status();
        let next = self.transition(cfg);
        self.apply(next);
        ControllerOutput { tone_out: self.tone_out, status }
    }

    /// Next-state decision. Reads only; counters are updated by [`apply`](Self::apply).
    pub fn transition(&self, cfg: &BurstConfig) -> BurstState {
        let ctrl = cfg.control;
        match self.state {
            BurstState::Idle => {
                if ctrl.enable && ctrl.trigger { BurstState::PulseHigh } else { BurstState::Idle }
            }
            BurstState::PulseHigh => {
                if self.period_counter >= cfg.pulse_high_time() {
                    BurstState::PulseLow
                } else {
                    BurstState::PulseHigh
                }
            }
            BurstState::PulseLow => {
                if self.period_counter < cfg.pulse_low_time() {
                    BurstState::PulseLow
                } else if self.pulse_counter >= cfg.pulse_count {
                    if self.burst_counter >= cfg.burst_count {
                        BurstState::Done
                    } else {
                        BurstState::InterBurstDelay
                    }
                } else {
                    BurstState::PulseHigh
                }
            }
            BurstState::InterBurstDelay => {
                if self.delay_counter >= cfg.inter_burst_delay {
                    BurstState::PulseHigh
                } else {
                    BurstState::InterBurstDelay
                }
            }
            BurstState::Done => {
                if !ctrl.enable || ctrl.trigger { BurstState::Idle } else { BurstState::Done }
            }
        }
    }

    /// Commit `next`: update counters and the output for the current state.
    pub fn apply(&mut self, next: BurstState) {
        let leaving = next != self.state;
        match self.state {
            BurstState::Idle => {
                self.clear_counters();
                self.tone_out = false;
            }
            BurstState::PulseHigh => {
                self.tone_out = true;
                if leaving {
                    self.period_counter = 0;
                } else {
                    self.period_counter = self.period_counter.wrapping_add(1);
                }
            }
            BurstState::PulseLow => {
                self.tone_out = false;
                match next {
                    BurstState::PulseHigh => {
                        self.period_counter = 0;
                        self.pulse_counter = self.pulse_counter.wrapping_add(1);
                    }
                    BurstState::InterBurstDelay => {
                        self.period_counter = 0;
                        self.pulse_counter = 0;
                        self.burst_counter = self.burst_counter.wrapping_add(1);
                    }
                    BurstState::PulseLow => {
                        self.period_counter = self.period_counter.wrapping_add(1);
                    }
                    // Counters hold into Done
                    _ => {}
                }
            }
            BurstState::InterBurstDelay => {
                self.tone_out = false;
                if leaving {
                    self.delay_counter = 0;
                } else {
                    self.delay_counter = self.delay_counter.wrapping_add(1);
                }
            }
            BurstState::Done => {
                self.tone_out = false;
                if next == BurstState::Idle {
                    self.clear_counters();
                }
            }
        }
        self.state = next;
    }

    fn clear_counters(&mut self) {
        self.pulse_counter = 0;
        self.burst_counter = 0;
        self.period_counter = 0;
        self.delay_counter = 0;
    }

    /// Status word for the current state.
    pub fn status(&self) -> Status {
        Status::new(self.state, self.pulse_counter, self.burst_counter)
    }

    pub fn state(&self) -> BurstState {
        self.state
    }

    pub fn tone_out(&self) -> bool {
        self.tone_out
    }

    pub fn pulse_counter(&self) -> u32 {
        self.pulse_counter
    }

    pub fn burst_counter(&self) -> u32 {
        self.burst_counter
    }

    pub fn period_counter(&self) -> u32 {
        self.period_counter
    }

    pub fn delay_counter(&self) -> u32 {
        self.delay_counter
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> crate::savestate::ControllerState {
        crate::savestate::ControllerState {
            state: self.state,
            pulse_counter: self.pulse_counter,
            burst_counter: self.burst_counter,
            period_counter: self.period_counter,
            delay_counter: self.delay_counter,
            tone_out: self.tone_out,
        }
    }

    /// Restore state from save state.
    pub fn load_state(&mut self, s: &crate::savestate::ControllerState) {
        self.state = s.state;
        self.pulse_counter = s.pulse_counter;
        self.burst_counter = s.burst_counter;
        self.period_counter = s.period_counter;
        self.delay_counter = s.delay_counter;
        self.tone_out = s.tone_out;
    }
}

impl Default for BurstController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register_file::RegisterFile;
    use rstest::rstest;

    fn cfg(period: u32, duty: u32) -> BurstConfig {
        let mut c = RegisterFile::new().config();
        c.pulse_period = period;
        c.duty_cycle = duty;
        c
    }

    #[rstest]
    #[case(100, 512, 50, 50)]
    #[case(100, 1024, 100, 0)]
    #[case(100, 0, 0, 100)]
    #[case(4, 512, 2, 2)]
    #[case(7, 300, 2, 5)]
    #[case(0, 512, 0, 0)]
    fn test_pulse_times(#[case] period: u32, #[case] duty: u32, #[case] high: u32, #[case] low: u32) {
        let c = cfg(period, duty);
        assert_eq!(c.pulse_high_time(), high);
        assert_eq!(c.pulse_low_time(), low);
        assert_eq!(c.pulse_high_time().wrapping_add(c.pulse_low_time()), period);
    }

    #[test]
    fn test_low_time_wraps_when_duty_over_full_scale() {
        let c = cfg(100, 2048);
        assert_eq!(c.pulse_high_time(), 200);
        assert_eq!(c.pulse_low_time(), 100u32.wrapping_sub(200));
        assert_eq!(c.pulse_high_time().wrapping_add(c.pulse_low_time()), 100);
    }

    #[test]
    fn test_idle_needs_enable_and_trigger() {
        let ctl = BurstController::new();
        let mut c = cfg(4, 512);
        assert_eq!(ctl.transition(&c), BurstState::Idle);
        c.control.enable = true;
        assert_eq!(ctl.transition(&c), BurstState::Idle);
        c.control.enable = false;
        c.control.trigger = true;
        assert_eq!(ctl.transition(&c), BurstState::Idle);
        c.control.enable = true;
        assert_eq!(ctl.transition(&c), BurstState::PulseHigh);
    }

    #[test]
    fn test_transition_does_not_mutate() {
        let mut c = cfg(4, 512);
        c.control = Control::fire();
        let ctl = BurstController::new();
        let before = ctl.clone();
        let _ = ctl.transition(&c);
        assert_eq!(ctl, before);
    }

    #[test]
    fn test_pulse_high_lasts_high_time_plus_one() {
        let mut c = cfg(10, 512); // high = 5
        c.control = Control::fire();
        let mut ctl = BurstController::new();
        ctl.step(&c);
        c.control.trigger = false;
        let mut high_ticks = 0;
        while ctl.state() == BurstState::PulseHigh {
            let out = ctl.step(&c);
            assert!(out.tone_out);
            high_ticks += 1;
        }
        assert_eq!(high_ticks, 6);
        assert_eq!(ctl.state(), BurstState::PulseLow);
        assert_eq!(ctl.period_counter(), 0);
    }

    #[test]
    fn test_status_reflects_state_before_transition() {
        let mut c = cfg(4, 512);
        c.control = Control::fire();
        let mut ctl = BurstController::new();
        let out = ctl.step(&c);
        assert_eq!(out.status.state, BurstState::Idle);
        assert!(!out.tone_out);
        assert_eq!(ctl.state(), BurstState::PulseHigh);
        let out = ctl.step(&c);
        assert_eq!(out.status.state, BurstState::PulseHigh);
        assert!(out.status.busy);
        assert!(out.tone_out);
    }

    #[test]
    fn test_done_holds_counters_until_released() {
        let mut c = cfg(2, 512);
        c.pulse_count = 0;
        c.burst_count = 0;
        c.control = Control::fire();
        let mut ctl = BurstController::new();
        ctl.step(&c);
        c.control.trigger = false;
        for _ in 0..100 {
            if ctl.state() == BurstState::Done { break; }
            ctl.step(&c);
        }
        assert_eq!(ctl.state(), BurstState::Done);
        // Enabled, no trigger: stays
        for _ in 0..5 {
            let out = ctl.step(&c);
            assert!(out.status.complete);
            assert!(!out.tone_out);
        }
        assert_eq!(ctl.state(), BurstState::Done);
        c.control.enable = false;
        ctl.step(&c);
        assert_eq!(ctl.state(), BurstState::Idle);
        assert_eq!(ctl.pulse_counter(), 0);
        assert_eq!(ctl.burst_counter(), 0);
    }

    #[test]
    fn test_inter_burst_delay_at_max() {
        let mut ctl = BurstController::new();
        ctl.load_state(&crate::savestate::ControllerState {
            state: BurstState::InterBurstDelay,
            pulse_counter: 0,
            burst_counter: 1,
            period_counter: 0,
            delay_counter: u32::MAX,
            tone_out: false,
        });
        let mut c = cfg(4, 512);
        c.inter_burst_delay = u32::MAX;
        ctl.step(&c);
        assert_eq!(ctl.state(), BurstState::PulseHigh);
        assert_eq!(ctl.delay_counter(), 0);
    }

    #[test]
    fn test_wrapped_high_time() {
        // (MAX * 1024) wraps to 0xFFFF_FC00 before the shift
        let c = cfg(u32::MAX, 1024);
        assert_eq!(c.pulse_high_time(), 0x003F_FFFF);
        assert_eq!(c.pulse_low_time(), u32::MAX - 0x003F_FFFF);

        let mut ctl = BurstController::new();
        ctl.load_state(&crate::savestate::ControllerState {
            state: BurstState::PulseHigh,
            pulse_counter: 0,
            burst_counter: 0,
            period_counter: 0x0040_0000,
            delay_counter: 0,
            tone_out: true,
        });
        ctl.step(&c);
        assert_eq!(ctl.state(), BurstState::PulseLow);
        ctl.step(&c);
        assert_eq!(ctl.state(), BurstState::PulseLow);
        assert_eq!(ctl.period_counter(), 1);
    }

    #[test]
    fn test_status_counters_truncate_to_low_byte() {
        let mut ctl = BurstController::new();
        ctl.load_state(&crate::savestate::ControllerState {
            state: BurstState::PulseLow,
            pulse_counter: 0x1FF,
            burst_counter: 0x302,
            period_counter: 0,
            delay_counter: 0,
            tone_out: false,
        });
        let st = ctl.status();
        assert_eq!(st.pulse_counter, 0xFF);
        assert_eq!(st.burst_counter, 0x02);
        assert_eq!(st.bits() >> 24, 2);
    }

    #[test]
    fn test_state_codes() {
        for s in BurstState::ALL {
            assert_eq!(BurstState::from_code(s.code()), Some(s));
        }
        assert_eq!(BurstState::from_code(5), None);
        assert!(!BurstState::Idle.is_active());
        assert!(!BurstState::Done.is_active());
        assert!(BurstState::InterBurstDelay.is_active());
    }
}
