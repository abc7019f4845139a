//! Non-authoritative configuration checks.
//!
//! Degenerate configurations are legal and reproduce bit-for-bit; these
//! checks only report them. Nothing here feeds back into the device.

use std::fmt;

use crate::controller::BurstConfig;
use crate::regs::DUTY_FULL_SCALE;

/// A configuration that produces degenerate but deterministic output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    ZeroPulseCount,
    ZeroBurstCount,
    ZeroPulsePeriod,
    /// `duty_cycle` above full scale (1024).
    DutyOverFullScale(u32),
    /// `pulse_period - pulse_high_time` wrapped below zero.
    LowTimeWrapped { high: u32, low: u32 },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::ZeroPulseCount => write!(f, "pulse_count is 0"),
            ConfigWarning::ZeroBurstCount => write!(f, "burst_count is 0"),
            ConfigWarning::ZeroPulsePeriod => write!(f, "pulse_period is 0, output degenerates"),
            ConfigWarning::DutyOverFullScale(d) => {
                write!(f, "duty_cycle {} exceeds full scale {}", d, DUTY_FULL_SCALE)
            }
            ConfigWarning::LowTimeWrapped { high, low } => {
                write!(f, "pulse_low_time wrapped to {} (pulse_high_time {})", low, high)
            }
        }
    }
}

pub fn check_config(cfg: &BurstConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    if cfg.pulse_count == 0 {
        warnings.push(ConfigWarning::ZeroPulseCount);
    }
    if cfg.burst_count == 0 {
        warnings.push(ConfigWarning::ZeroBurstCount);
    }
    if cfg.pulse_period == 0 {
        warnings.push(ConfigWarning::ZeroPulsePeriod);
    }
    if cfg.duty_cycle > DUTY_FULL_SCALE {
        warnings.push(ConfigWarning::DutyOverFullScale(cfg.duty_cycle));
    }
    let high = cfg.pulse_high_time();
    if high > cfg.pulse_period {
        warnings.push(ConfigWarning::LowTimeWrapped { high, low: cfg.pulse_low_time() });
    }
    warnings
}

/// Log every warning for `cfg` at `warn` level.
pub fn log_config(cfg: &BurstConfig) {
    for w in check_config(cfg) {
        log::warn!("degenerate configuration: {}", w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register_file::RegisterFile;

    #[test]
    fn test_defaults_are_clean() {
        assert!(check_config(&RegisterFile::new().config()).is_empty());
    }

    #[test]
    fn test_degenerate_values_reported() {
        let mut cfg = RegisterFile::new().config();
        cfg.pulse_count = 0;
        cfg.burst_count = 0;
        cfg.pulse_period = 0;
        let w = check_config(&cfg);
        assert_eq!(w, vec![
            ConfigWarning::ZeroPulseCount,
            ConfigWarning::ZeroBurstCount,
            ConfigWarning::ZeroPulsePeriod,
        ]);
    }

    #[test]
    fn test_duty_over_full_scale_wraps_low_time() {
        let mut cfg = RegisterFile::new().config();
        cfg.duty_cycle = 1500;
        let w = check_config(&cfg);
        assert_eq!(w[0], ConfigWarning::DutyOverFullScale(1500));
        assert_eq!(w[1], ConfigWarning::LowTimeWrapped { high: 146, low: 100u32.wrapping_sub(146) });
        assert!(w[1].to_string().contains("wrapped"));
    }
}
