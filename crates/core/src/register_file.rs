//! Memory-mapped register file.
//!
//! Holds the five configuration registers, the CONTROL word and the STATUS
//! mirror. Host writes land in storage immediately; [`RegisterFile::tick`]
//! then commits the controller's status and performs the trigger self-clear.
//! Reads are combinational and never fail: unimplemented addresses return 0.

use crate::controller::BurstConfig;
use crate::regs::{Control, RegAddr, Status};

/// Register storage, one named field per implemented address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    control: Control,
    pulse_count: u32,
    burst_count: u32,
    duty_cycle: u32,
    inter_burst_delay: u32,
    pulse_period: u32,
    status: Status,
    /// Trigger bit as of the last committed tick. The self-clear is decided
    /// from this, not from a same-tick write.
    trigger_committed: bool,
}

impl RegisterFile {
    pub fn new() -> Self {
        RegisterFile {
            control: Control::from_bits(RegAddr::Control.default_value()),
            pulse_count: RegAddr::PulseCount.default_value(),
            burst_count: RegAddr::BurstCount.default_value(),
            duty_cycle: RegAddr::DutyCycle.default_value(),
            inter_burst_delay: RegAddr::InterBurstDelay.default_value(),
            pulse_period: RegAddr::PulsePeriod.default_value(),
            status: Status::default(),
            trigger_committed: false,
        }
    }

    /// Synchronous reset: every register back to its default.
    pub fn reset(&mut self) {
        *self = RegisterFile::new();
    }

    /// Stored value of an implemented register.
    pub fn get(&self, reg: RegAddr) -> u32 {
        match reg {
            RegAddr::Control => self.control.bits(),
            RegAddr::PulseCount => self.pulse_count,
            RegAddr::BurstCount => self.burst_count,
            RegAddr::DutyCycle => self.duty_cycle,
            RegAddr::InterBurstDelay => self.inter_burst_delay,
            RegAddr::PulsePeriod => self.pulse_period,
            RegAddr::Status => self.status.bits(),
        }
    }

    /// Host read. Returns 0 for unimplemented addresses.
    pub fn read(&self, addr: u8) -> u32 {
        RegAddr::decode(addr).map_or(0, |reg| self.get(reg))
    }

    /// Host write. Dropped for STATUS and unimplemented addresses.
    ///
    /// Returns the register that was written, if the write took effect.
    pub fn write(&mut self, addr: u8, data: u32) -> Option<RegAddr> {
        let reg = RegAddr::decode(addr).filter(|r| r.is_host_writable())?;
        match reg {
            RegAddr::Control => self.control = Control::from_bits(data),
            RegAddr::PulseCount => self.pulse_count = data,
            RegAddr::BurstCount => self.burst_count = data,
            RegAddr::DutyCycle => self.duty_cycle = data,
            RegAddr::InterBurstDelay => self.inter_burst_delay = data,
            RegAddr::PulsePeriod => self.pulse_period = data,
            RegAddr::Status => return None,
        }
        Some(reg)
    }

    /// End-of-tick commit for a non-reset tick.
    ///
    /// Latches `status` for subsequent reads and clears the trigger bit if it
    /// was set at the previous commit, overriding any write made this tick.
    pub fn tick(&mut self, status: Status) {
        self.status = status;
        if self.trigger_committed {
            self.control.trigger = false;
        }
        self.trigger_committed = self.control.trigger;
    }

    pub fn control(&self) -> Control {
        self.control
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Copy of the controller-facing registers.
    pub fn config(&self) -> BurstConfig {
        BurstConfig {
            control: self.control,
            pulse_count: self.pulse_count,
            burst_count: self.burst_count,
            duty_cycle: self.duty_cycle,
            inter_burst_delay: self.inter_burst_delay,
            pulse_period: self.pulse_period,
        }
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> crate::savestate::RegisterFileState {
        crate::savestate::RegisterFileState {
            control: self.control.bits(),
            pulse_count: self.pulse_count,
            burst_count: self.burst_count,
            duty_cycle: self.duty_cycle,
            inter_burst_delay: self.inter_burst_delay,
            pulse_period: self.pulse_period,
            status: self.status.bits(),
            trigger_committed: self.trigger_committed,
        }
    }

    /// Restore state from save state.
    pub fn load_state(&mut self, s: &crate::savestate::RegisterFileState) {
        self.control = Control::from_bits(s.control);
        self.pulse_count = s.pulse_count;
        self.burst_count = s.burst_count;
        self.duty_cycle = s.duty_cycle;
        self.inter_burst_delay = s.inter_burst_delay;
        self.pulse_period = s.pulse_period;
        self.status = Status::from_bits(s.status).unwrap_or_default();
        self.trigger_committed = s.trigger_committed;
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::BurstState;
    use rstest::rstest;

    fn snapshot(rf: &RegisterFile) -> Vec<u32> {
        RegAddr::ALL.iter().map(|&r| rf.get(r)).collect()
    }

    #[test]
    fn test_defaults() {
        let rf = RegisterFile::new();
        assert_eq!(rf.read(0), 0);
        assert_eq!(rf.read(1), 10);
        assert_eq!(rf.read(2), 5);
        assert_eq!(rf.read(3), 512);
        assert_eq!(rf.read(4), 1000);
        assert_eq!(rf.read(5), 100);
        assert_eq!(rf.read(6), 0);
    }

    #[rstest]
    #[case(1, 0)]
    #[case(2, u32::MAX)]
    #[case(3, 2048)]
    #[case(4, 0x8000_0001)]
    #[case(5, 7)]
    #[case(0, 0xFFFF_FFFD)]
    fn test_write_read_roundtrip(#[case] addr: u8, #[case] data: u32) {
        let mut rf = RegisterFile::new();
        assert!(rf.write(addr, data).is_some());
        assert_eq!(rf.read(addr), data);
        rf.tick(Status::default());
        assert_eq!(rf.read(addr), data);
        rf.tick(Status::default());
        assert_eq!(rf.read(addr), data);
    }

    #[test]
    fn test_invalid_writes_ignored() {
        let mut rf = RegisterFile::new();
        let before = snapshot(&rf);
        // Includes addresses wider than the 4-bit bus, which must not alias
        for addr in 6..=u8::MAX {
            assert_eq!(rf.write(addr, 0x1234_5678), None);
        }
        assert_eq!(snapshot(&rf), before);
    }

    #[test]
    fn test_unimplemented_reads_zero() {
        let mut rf = RegisterFile::new();
        rf.write(1, 99);
        for addr in 7..=u8::MAX {
            assert_eq!(rf.read(addr), 0);
        }
    }

    #[test]
    fn test_trigger_visible_one_tick() {
        let mut rf = RegisterFile::new();
        rf.write(0, 0b11);
        // Commit of the write tick: trigger still visible
        rf.tick(Status::default());
        assert_eq!(rf.read(0), 0b11);
        // Following tick: cleared without further writes
        rf.tick(Status::default());
        assert_eq!(rf.read(0), 0b01);
        rf.tick(Status::default());
        assert_eq!(rf.read(0), 0b01);
    }

    #[test]
    fn test_trigger_clear_overrides_same_tick_write() {
        let mut rf = RegisterFile::new();
        rf.write(0, 0b11);
        rf.tick(Status::default());
        // Re-arm on the tick the clear fires: the clear wins
        rf.write(0, 0b11);
        rf.tick(Status::default());
        assert_eq!(rf.read(0), 0b01);
        // Next write arms it again
        rf.write(0, 0b11);
        rf.tick(Status::default());
        assert_eq!(rf.read(0), 0b11);
    }

    #[test]
    fn test_status_latched_on_tick() {
        let mut rf = RegisterFile::new();
        let st = Status::new(BurstState::PulseHigh, 3, 1);
        rf.tick(st);
        assert_eq!(rf.read(6), st.bits());
        assert_eq!(rf.status(), st);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut rf = RegisterFile::new();
        for addr in 0..6u8 {
            rf.write(addr, 0xAAAA_5555);
        }
        rf.tick(Status::new(BurstState::Done, 1, 1));
        rf.reset();
        assert_eq!(rf, RegisterFile::new());
    }

    #[test]
    fn test_config_snapshot() {
        let mut rf = RegisterFile::new();
        rf.write(5, 4);
        rf.write(0, 0b01);
        let cfg = rf.config();
        assert_eq!(cfg.pulse_period, 4);
        assert!(cfg.control.enable);
        assert!(!cfg.control.trigger);
        assert_eq!(cfg.pulse_count, 10);
    }
}
