//! Debugging facilities for the host bus.
//!
//! - **Register Viewer**: named register dump with decoded CONTROL/STATUS
//! - **Watchpoints**: trigger on effective host writes to a register
//!
//! Watchpoints are checked on the write path of [`crate::ToneBurst::tick`].

use crate::regs::{Control, RegAddr, Status};

/// A register watchpoint.
#[derive(Debug, Clone)]
pub struct Watchpoint {
    pub reg: RegAddr,
    /// Optional: only trigger when this value is written
    pub value_match: Option<u32>,
    pub hits: u64,
    pub enabled: bool,
}

/// Watchpoint trigger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHit {
    pub index: usize,
    pub reg: RegAddr,
    pub old_val: u32,
    pub new_val: u32,
    /// Tick on which the write was applied
    pub tick: u64,
}

/// Debugger state.
pub struct Debugger {
    pub watchpoints: Vec<Watchpoint>,
    /// First unconsumed hit (the frontend pauses on it)
    pub watch_hit: Option<WatchHit>,
}

impl Debugger {
    pub fn new() -> Self {
        Debugger {
            watchpoints: Vec::new(),
            watch_hit: None,
        }
    }

    /// Add a watchpoint. Returns its index.
    pub fn add_watchpoint(&mut self, reg: RegAddr, value_match: Option<u32>) -> usize {
        let idx = self.watchpoints.len();
        self.watchpoints.push(Watchpoint { reg, value_match, hits: 0, enabled: true });
        idx
    }

    pub fn remove_watchpoint(&mut self, idx: usize) -> bool {
        if idx < self.watchpoints.len() {
            self.watchpoints.remove(idx);
            true
        } else { false }
    }

    /// Check watchpoints for an effective write.
    #[inline]
    pub fn check_write(&mut self, reg: RegAddr, old_val: u32, new_val: u32, tick: u64) {
        for (i, wp) in self.watchpoints.iter_mut().enumerate() {
            if !wp.enabled || wp.reg != reg { continue; }
            if let Some(v) = wp.value_match {
                if new_val != v { continue; }
            }
            wp.hits += 1;
            if self.watch_hit.is_none() {
                self.watch_hit = Some(WatchHit { index: i, reg, old_val, new_val, tick });
            }
        }
    }

    /// Take pending watchpoint hit (returns and clears it).
    pub fn take_hit(&mut self) -> Option<WatchHit> {
        self.watch_hit.take()
    }

    pub fn list_watchpoints(&self) -> String {
        if self.watchpoints.is_empty() { return "No watchpoints set.\n".into(); }
        let mut s = String::new();
        for (i, wp) in self.watchpoints.iter().enumerate() {
            let en = if wp.enabled { " " } else { "!" };
            let vm = match wp.value_match {
                Some(v) => format!(" =0x{:08X}", v),
                None => String::new(),
            };
            s.push_str(&format!("  [{}]{} {:<17} hits={}{}\n", i, en, wp.reg.name(), wp.hits, vm));
        }
        s
    }
}

impl Default for Debugger {
    fn default() -> Self { Self::new() }
}

// ─── Register Viewer ────────────────────────────────────────────────────────

/// One-line summary of a CONTROL word.
pub fn format_control(ctrl: &Control) -> String {
    let flag = |b: bool, name: &'static str| if b { name } else { "-" };
    format!("[{} {} {} {}]",
        flag(ctrl.enable, "EN"), flag(ctrl.trigger, "TRIG"),
        flag(ctrl.reset, "RST"), flag(ctrl.auto_mode, "AUTO"))
}

/// One-line summary of a STATUS word.
pub fn format_status(st: &Status) -> String {
    let mut flags = Vec::new();
    if st.busy { flags.push("BUSY"); }
    if st.complete { flags.push("COMPLETE"); }
    if st.in_pulse_high { flags.push("HIGH"); }
    if st.in_pulse_low { flags.push("LOW"); }
    if st.in_inter_burst_delay { flags.push("GAP"); }
    format!("{} pulse={} burst={} [{}]",
        st.state.name(), st.pulse_counter, st.burst_counter, flags.join(" "))
}

/// Format a register dump from a read function (address → value).
pub fn dump_regs(read: impl Fn(u8) -> u32) -> String {
    let mut s = String::new();
    for reg in RegAddr::ALL {
        let val = read(reg.addr());
        s.push_str(&format!("  {:>17} ({:X}) = 0x{:08X} {:>10}", reg.name(), reg.addr(), val, val));
        match reg {
            RegAddr::Control => {
                s.push_str("  ");
                s.push_str(&format_control(&Control::from_bits(val)));
            }
            RegAddr::Status => {
                s.push_str("  ");
                match Status::from_bits(val) {
                    Some(st) => s.push_str(&format_status(&st)),
                    None => s.push_str("(bad state code)"),
                }
            }
            _ => {}
        }
        s.push('\n');
    }
    s
}

/// Resolve a register name (case-insensitive) to its address.
pub fn reg_by_name(name: &str) -> Option<RegAddr> {
    RegAddr::ALL.into_iter().find(|r| r.name().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::BurstState;

    #[test]
    fn test_watchpoint() {
        let mut dbg = Debugger::new();
        dbg.add_watchpoint(RegAddr::DutyCycle, None);
        dbg.check_write(RegAddr::PulsePeriod, 100, 4, 0);
        assert!(dbg.take_hit().is_none());
        dbg.check_write(RegAddr::DutyCycle, 512, 256, 7);
        let hit = dbg.take_hit().unwrap();
        assert_eq!(hit.reg, RegAddr::DutyCycle);
        assert_eq!(hit.new_val, 256);
        assert_eq!(hit.tick, 7);
    }

    #[test]
    fn test_watchpoint_value_match() {
        let mut dbg = Debugger::new();
        dbg.add_watchpoint(RegAddr::Control, Some(0b11));
        dbg.check_write(RegAddr::Control, 0, 0b01, 0);
        assert!(dbg.take_hit().is_none());
        dbg.check_write(RegAddr::Control, 0b01, 0b11, 1);
        assert!(dbg.take_hit().is_some());
        assert_eq!(dbg.watchpoints[0].hits, 1);
        assert!(dbg.list_watchpoints().contains("CONTROL"));
    }

    #[test]
    fn test_dump_regs() {
        let st = Status::new(BurstState::PulseHigh, 1, 0).bits();
        let dump = dump_regs(|a| match a {
            0 => 0b11,
            6 => st,
            _ => 0,
        });
        assert!(dump.contains("[EN TRIG - -]"));
        assert!(dump.contains("PulseHigh pulse=1 burst=0 [BUSY HIGH]"));
        assert_eq!(dump.lines().count(), 7);
    }

    #[test]
    fn test_reg_by_name() {
        assert_eq!(reg_by_name("duty_cycle"), Some(RegAddr::DutyCycle));
        assert_eq!(reg_by_name("nope"), None);
    }
}
