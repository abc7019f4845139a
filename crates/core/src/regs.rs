//! Register map and packed-word encodings.
//!
//! The host sees a 4-bit address space of 32-bit registers:
//!
//! | Addr | Name              | Access | Default |
//! |------|-------------------|--------|---------|
//! | 0    | CONTROL           | R/W    | 0x0     |
//! | 1    | PULSE_COUNT       | R/W    | 10      |
//! | 2    | BURST_COUNT       | R/W    | 5       |
//! | 3    | DUTY_CYCLE        | R/W    | 512     |
//! | 4    | INTER_BURST_DELAY | R/W    | 1000    |
//! | 5    | PULSE_PERIOD      | R/W    | 100     |
//! | 6    | STATUS            | R      | 0x0     |
//! | 7–15 | unimplemented     | —      | —       |
//!
//! CONTROL and STATUS are packed words. They are decoded into [`Control`] and
//! [`Status`] so that callers mutate named fields and re-encode, instead of
//! slicing bits in place.

use crate::controller::BurstState;

/// Bus address width in bits.
pub const ADDR_WIDTH: u32 = 4;
/// Number of implemented registers (addresses 0–6).
pub const REG_COUNT: usize = 7;

/// Duty cycle full scale: `duty_cycle == DUTY_FULL_SCALE` means 100 % high.
pub const DUTY_FULL_SCALE: u32 = 1024;
/// log2 of [`DUTY_FULL_SCALE`].
pub const DUTY_SHIFT: u32 = 10;

pub const DEFAULT_CONTROL: u32 = 0;
pub const DEFAULT_PULSE_COUNT: u32 = 10;
pub const DEFAULT_BURST_COUNT: u32 = 5;
pub const DEFAULT_DUTY_CYCLE: u32 = 512;
pub const DEFAULT_INTER_BURST_DELAY: u32 = 1000;
pub const DEFAULT_PULSE_PERIOD: u32 = 100;
pub const DEFAULT_STATUS: u32 = 0;

// CONTROL bit positions
pub const CTRL_ENABLE: u32 = 0;
pub const CTRL_TRIGGER: u32 = 1;
pub const CTRL_RESET: u32 = 2;
pub const CTRL_AUTO_MODE: u32 = 3;

// STATUS bit positions and fields
pub const STAT_BUSY: u32 = 0;
pub const STAT_COMPLETE: u32 = 1;
pub const STAT_PULSE_HIGH: u32 = 2;
pub const STAT_PULSE_LOW: u32 = 3;
pub const STAT_INTER_BURST: u32 = 4;
pub const STAT_PULSE_COUNTER_SHIFT: u32 = 8;
pub const STAT_BURST_COUNTER_SHIFT: u32 = 16;
pub const STAT_STATE_SHIFT: u32 = 24;

/// Implemented register addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegAddr {
    Control = 0,
    PulseCount = 1,
    BurstCount = 2,
    DutyCycle = 3,
    InterBurstDelay = 4,
    PulsePeriod = 5,
    Status = 6,
}

impl RegAddr {
    /// All implemented registers in address order.
    pub const ALL: [RegAddr; REG_COUNT] = [
        RegAddr::Control,
        RegAddr::PulseCount,
        RegAddr::BurstCount,
        RegAddr::DutyCycle,
        RegAddr::InterBurstDelay,
        RegAddr::PulsePeriod,
        RegAddr::Status,
    ];

    /// Decode a bus address. Returns `None` for every address `>= 7`,
    /// including values outside the [`ADDR_WIDTH`]-bit space.
    pub fn decode(addr: u8) -> Option<RegAddr> {
        match addr {
            0 => Some(RegAddr::Control),
            1 => Some(RegAddr::PulseCount),
            2 => Some(RegAddr::BurstCount),
            3 => Some(RegAddr::DutyCycle),
            4 => Some(RegAddr::InterBurstDelay),
            5 => Some(RegAddr::PulsePeriod),
            6 => Some(RegAddr::Status),
            _ => None,
        }
    }

    pub fn addr(self) -> u8 {
        self as u8
    }

    /// Register name as printed in dumps.
    pub fn name(self) -> &'static str {
        match self {
            RegAddr::Control => "CONTROL",
            RegAddr::PulseCount => "PULSE_COUNT",
            RegAddr::BurstCount => "BURST_COUNT",
            RegAddr::DutyCycle => "DUTY_CYCLE",
            RegAddr::InterBurstDelay => "INTER_BURST_DELAY",
            RegAddr::PulsePeriod => "PULSE_PERIOD",
            RegAddr::Status => "STATUS",
        }
    }

    /// STATUS is driven by the controller; host writes to it are dropped.
    pub fn is_host_writable(self) -> bool {
        self != RegAddr::Status
    }

    /// Power-on / reset value.
    pub fn default_value(self) -> u32 {
        match self {
            RegAddr::Control => DEFAULT_CONTROL,
            RegAddr::PulseCount => DEFAULT_PULSE_COUNT,
            RegAddr::BurstCount => DEFAULT_BURST_COUNT,
            RegAddr::DutyCycle => DEFAULT_DUTY_CYCLE,
            RegAddr::InterBurstDelay => DEFAULT_INTER_BURST_DELAY,
            RegAddr::PulsePeriod => DEFAULT_PULSE_PERIOD,
            RegAddr::Status => DEFAULT_STATUS,
        }
    }
}

#[inline]
fn bit(word: u32, n: u32) -> bool {
    word & (1 << n) != 0
}

/// Decoded CONTROL register.
///
/// `reset` and `auto_mode` are reserved: stored and read back, but no logic
/// consumes them. Bits 31:4 are kept in `upper` so a write reads back verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Control {
    pub enable: bool,
    /// Self-clearing: reads back as 0 one tick after it is set.
    pub trigger: bool,
    pub reset: bool,
    pub auto_mode: bool,
    /// Unassigned bits 31:4, already shifted into place.
    pub upper: u32,
}

impl Control {
    const FIELD_MASK: u32 = 0xF;

    pub fn from_bits(word: u32) -> Self {
        Control {
            enable: bit(word, CTRL_ENABLE),
            trigger: bit(word, CTRL_TRIGGER),
            reset: bit(word, CTRL_RESET),
            auto_mode: bit(word, CTRL_AUTO_MODE),
            upper: word & !Self::FIELD_MASK,
        }
    }

    pub fn bits(&self) -> u32 {
        self.upper
            | (self.enable as u32) << CTRL_ENABLE
            | (self.trigger as u32) << CTRL_TRIGGER
            | (self.reset as u32) << CTRL_RESET
            | (self.auto_mode as u32) << CTRL_AUTO_MODE
    }

    /// Control word that arms a burst: `enable | trigger`.
    pub fn fire() -> Self {
        Control { enable: true, trigger: true, ..Default::default() }
    }
}

/// Decoded STATUS register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Actively generating (PulseHigh, PulseLow or InterBurstDelay).
    pub busy: bool,
    /// Sequence finished (Done).
    pub complete: bool,
    pub in_pulse_high: bool,
    pub in_pulse_low: bool,
    pub in_inter_burst_delay: bool,
    /// Low byte of the pulse counter.
    pub pulse_counter: u8,
    /// Low byte of the burst counter.
    pub burst_counter: u8,
    pub state: BurstState,
}

impl Status {
    /// Build the status word for a controller state and its counters.
    pub fn new(state: BurstState, pulse_counter: u32, burst_counter: u32) -> Self {
        Status {
            busy: state.is_active(),
            complete: state == BurstState::Done,
            in_pulse_high: state == BurstState::PulseHigh,
            in_pulse_low: state == BurstState::PulseLow,
            in_inter_burst_delay: state == BurstState::InterBurstDelay,
            pulse_counter: pulse_counter as u8,
            burst_counter: burst_counter as u8,
            state,
        }
    }

    pub fn bits(&self) -> u32 {
        (self.busy as u32) << STAT_BUSY
            | (self.complete as u32) << STAT_COMPLETE
            | (self.in_pulse_high as u32) << STAT_PULSE_HIGH
            | (self.in_pulse_low as u32) << STAT_PULSE_LOW
            | (self.in_inter_burst_delay as u32) << STAT_INTER_BURST
            | (self.pulse_counter as u32) << STAT_PULSE_COUNTER_SHIFT
            | (self.burst_counter as u32) << STAT_BURST_COUNTER_SHIFT
            | (self.state.code() as u32) << STAT_STATE_SHIFT
    }

    /// Decode a STATUS word. Returns `None` if the state code is unknown.
    pub fn from_bits(word: u32) -> Option<Self> {
        let state = BurstState::from_code((word >> STAT_STATE_SHIFT) as u8)?;
        Some(Status {
            busy: bit(word, STAT_BUSY),
            complete: bit(word, STAT_COMPLETE),
            in_pulse_high: bit(word, STAT_PULSE_HIGH),
            in_pulse_low: bit(word, STAT_PULSE_LOW),
            in_inter_burst_delay: bit(word, STAT_INTER_BURST),
            pulse_counter: (word >> STAT_PULSE_COUNTER_SHIFT) as u8,
            burst_counter: (word >> STAT_BURST_COUNTER_SHIFT) as u8,
            state,
        })
    }
}

impl Default for Status {
    /// The reset value of STATUS: all zero, state code Idle.
    fn default() -> Self {
        Status::new(BurstState::Idle, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_addr() {
        assert_eq!(RegAddr::decode(0), Some(RegAddr::Control));
        assert_eq!(RegAddr::decode(6), Some(RegAddr::Status));
        for a in 7..16 {
            assert_eq!(RegAddr::decode(a), None);
        }
        // No aliasing outside the 4-bit space
        for a in [0x10, 0x13, 0x16, 0xFF] {
            assert_eq!(RegAddr::decode(a), None);
        }
    }

    #[test]
    fn test_control_roundtrip_keeps_upper_bits() {
        let word = 0xDEAD_BEEF;
        let ctrl = Control::from_bits(word);
        assert!(ctrl.enable);
        assert!(ctrl.trigger);
        assert!(ctrl.reset);
        assert!(ctrl.auto_mode);
        assert_eq!(ctrl.bits(), word);
    }

    #[test]
    fn test_control_clear_trigger_field() {
        let mut ctrl = Control::from_bits(0xF0);
        ctrl.enable = true;
        ctrl.trigger = true;
        assert_eq!(ctrl.bits(), 0xF3);
        ctrl.trigger = false;
        assert_eq!(ctrl.bits(), 0xF1);
    }

    #[test]
    fn test_status_layout() {
        let st = Status::new(BurstState::PulseLow, 0x1_02, 0x3_04);
        let w = st.bits();
        assert_eq!(w & 0xFF, 0b0_1001); // busy + in_pulse_low
        assert_eq!((w >> 8) & 0xFF, 0x02);
        assert_eq!((w >> 16) & 0xFF, 0x04);
        assert_eq!(w >> 24, 2);
        assert_eq!(Status::from_bits(w), Some(st));
    }

    #[test]
    fn test_status_done_not_busy() {
        let st = Status::new(BurstState::Done, 0, 0);
        assert!(!st.busy);
        assert!(st.complete);
        assert_eq!(st.bits(), (4 << 24) | 0b10);
    }

    #[test]
    fn test_status_idle_is_zero() {
        assert_eq!(Status::default().bits(), DEFAULT_STATUS);
        assert_eq!(Status::from_bits(0xFF00_0000), None);
    }
}
