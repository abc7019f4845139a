//! # toneburst-core
//!
//! Cycle-accurate core of a tone-burst generator: a single digital output
//! (`tone_out`) driven with groups of square-wave pulses separated by idle
//! gaps, configured through a 4-bit memory-mapped register file.
//!
//! ## Architecture
//!
//! - [`ToneBurst`]: Top-level device that wires the register file to the controller
//! - [`RegisterFile`]: Host-visible registers, trigger self-clear, status mirror
//! - [`BurstController`]: Pulse/burst finite-state machine
//! - [`regs`]: Register map, defaults, packed CONTROL/STATUS encodings
//! - [`savestate`]: Compressed save states
//! - [`trace`]: Waveform ring buffer for the oscilloscope view
//! - [`audio_buffer`]: Edge capture and PCM rendering of `tone_out`
//! - [`debugger`]: Register dump and write watchpoints
//! - [`diagnostics`]: Optional warnings for degenerate configurations
//!
//! ## Tick ordering
//!
//! Every call to [`ToneBurst::tick`] is one clock edge:
//!
//! 1. Reset, if asserted, restores all defaults and ends the tick (reset wins
//!    over a simultaneous write).
//! 2. The host write, if any, is applied to the register file or dropped.
//! 3. The controller steps against a copy of the post-write registers.
//! 4. The register file latches the controller's status and self-clears the
//!    trigger bit armed on the previous tick.
//!
//! Host reads are combinational and see the state committed by the last tick.

pub mod regs;
pub mod register_file;
pub mod controller;
pub mod savestate;
pub mod trace;
pub mod audio_buffer;
pub mod debugger;
pub mod diagnostics;

pub use audio_buffer::AudioBuffer;
pub use controller::{BurstConfig, BurstController, BurstState};
pub use register_file::RegisterFile;
pub use regs::{Control, RegAddr, Status};
pub use trace::WaveformTrace;

use std::path::Path;

/// Default tick rate used to turn ticks into audio: 100 kHz.
pub const CLOCK_HZ: u32 = 100_000;
/// Samples kept by the default waveform trace.
pub const TRACE_CAPACITY: usize = 4096;

/// A host write presented on the bus for one tick (`write_en` asserted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusWrite {
    pub addr: u8,
    pub data: u32,
}

/// Inputs sampled on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusInput {
    pub reset: bool,
    pub write: Option<BusWrite>,
}

impl BusInput {
    pub fn idle() -> Self {
        BusInput::default()
    }

    pub fn write(addr: u8, data: u32) -> Self {
        BusInput { reset: false, write: Some(BusWrite { addr, data }) }
    }

    pub fn reset() -> Self {
        BusInput { reset: true, write: None }
    }
}

/// Outputs produced by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutput {
    pub tone_out: bool,
    /// Status snapshot committed this tick (state at the start of the tick).
    pub status: Status,
}

/// Tone-burst device: register file plus burst controller.
pub struct ToneBurst {
    pub regs: RegisterFile,
    pub controller: BurstController,
    /// Ticks since power-on
    tick: u64,
    /// Recent output for the oscilloscope view
    pub trace: WaveformTrace,
    /// Output edges for audio rendering, filled only while `audio_capture` is set
    pub audio_buf: AudioBuffer,
    pub audio_capture: bool,
    pub debugger: debugger::Debugger,
    /// Log degenerate configurations on every config write
    pub diagnostics: bool,
}

impl ToneBurst {
    pub fn new() -> Self {
        ToneBurst {
            regs: RegisterFile::new(),
            controller: BurstController::new(),
            tick: 0,
            trace: WaveformTrace::new(TRACE_CAPACITY),
            audio_buf: AudioBuffer::new(),
            audio_capture: false,
            debugger: debugger::Debugger::new(),
            diagnostics: false,
        }
    }

    /// Power-on reset. Clears the tick counter and captures; watchpoints
    /// and the diagnostics flag are kept.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.controller.reset();
        self.tick = 0;
        self.trace.clear();
        self.audio_buf = AudioBuffer::new();
    }

    /// Advance one tick.
    pub fn tick(&mut self, input: BusInput) -> TickOutput {
        let t = self.tick;
        self.tick += 1;

        if input.reset {
            if input.write.is_some() {
                log::trace!("tick {}: write discarded by reset", t);
            }
            self.regs.reset();
            self.controller.reset();
            self.record(t, BurstState::Idle, false);
            return TickOutput { tone_out: false, status: Status::default() };
        }

        if let Some(w) = input.write {
            self.apply_write(t, w);
        }

        let cfg = self.regs.config();
        let out = self.controller.step(&cfg);
        self.regs.tick(out.status);
        self.record(t, out.status.state, out.tone_out);

        TickOutput { tone_out: out.tone_out, status: out.status }
    }

    fn apply_write(&mut self, t: u64, w: BusWrite) {
        let old = self.regs.read(w.addr);
        match self.regs.write(w.addr, w.data) {
            Some(reg) => {
                log::trace!("tick {}: {} <- 0x{:08X}", t, reg.name(), w.data);
                self.debugger.check_write(reg, old, w.data, t);
                if self.diagnostics && reg != RegAddr::Control {
                    diagnostics::log_config(&self.regs.config());
                }
            }
            None => log::trace!("tick {}: write to 0x{:X} dropped", t, w.addr),
        }
    }

    fn record(&mut self, t: u64, state: BurstState, tone_out: bool) {
        self.trace.push(trace::TraceSample { tick: t, tone_out, state });
        if self.audio_capture {
            self.audio_buf.push(t, tone_out);
        }
    }

    /// One tick carrying a host write.
    pub fn write(&mut self, addr: u8, data: u32) -> TickOutput {
        self.tick(BusInput::write(addr, data))
    }

    /// One tick with no bus activity.
    pub fn idle_tick(&mut self) -> TickOutput {
        self.tick(BusInput::idle())
    }

    /// Run `n` idle ticks.
    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            self.idle_tick();
        }
    }

    /// Run idle ticks until the controller is in `state`, at most `max` ticks.
    /// Returns the number of ticks run, or `None` if `state` was not reached.
    pub fn run_until(&mut self, state: BurstState, max: u64) -> Option<u64> {
        for n in 0..=max {
            if self.controller.state() == state {
                return Some(n);
            }
            if n < max {
                self.idle_tick();
            }
        }
        None
    }

    /// Write every config register, one tick each.
    pub fn configure(&mut self, pulse_count: u32, burst_count: u32, duty_cycle: u32,
                     inter_burst_delay: u32, pulse_period: u32) {
        self.write(RegAddr::PulseCount.addr(), pulse_count);
        self.write(RegAddr::BurstCount.addr(), burst_count);
        self.write(RegAddr::DutyCycle.addr(), duty_cycle);
        self.write(RegAddr::InterBurstDelay.addr(), inter_burst_delay);
        self.write(RegAddr::PulsePeriod.addr(), pulse_period);
    }

    /// Write `enable | trigger` to CONTROL.
    pub fn fire(&mut self) -> TickOutput {
        self.write(RegAddr::Control.addr(), Control::fire().bits())
    }

    /// Combinational host read.
    pub fn read(&self, addr: u8) -> u32 {
        self.regs.read(addr)
    }

    pub fn tone_out(&self) -> bool {
        self.controller.tone_out()
    }

    /// Decoded STATUS as the host currently reads it.
    pub fn status(&self) -> Status {
        self.regs.status()
    }

    /// Internal controller state (one tick ahead of STATUS).
    pub fn state(&self) -> BurstState {
        self.controller.state()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Register dump plus the internal controller counters.
    pub fn dump_regs(&self) -> String {
        let c = &self.controller;
        format!("{}  tick={} state={} out={} pulse={} burst={} period={} delay={}",
            debugger::dump_regs(|a| self.regs.read(a)),
            self.tick, c.state().name(), c.tone_out() as u8,
            c.pulse_counter(), c.burst_counter(), c.period_counter(), c.delay_counter())
    }

    // ─── Save states ────────────────────────────────────────────────────────

    pub fn save_state(&self) -> savestate::SaveState {
        savestate::SaveState {
            registers: self.regs.save_state(),
            controller: self.controller.save_state(),
            tick: self.tick,
        }
    }

    /// Restore a save state. Captures restart at the restored tick.
    pub fn load_state(&mut self, s: &savestate::SaveState) {
        self.regs.load_state(&s.registers);
        self.controller.load_state(&s.controller);
        self.tick = s.tick;
        self.trace.clear();
        self.audio_buf.begin_window(s.tick);
        self.audio_buf.level = s.controller.tone_out;
    }

    pub fn save_state_to_file(&self, path: &Path) -> Result<(), savestate::SaveStateError> {
        savestate::save_to_file(&self.save_state(), path)
    }

    pub fn load_state_from_file(&mut self, path: &Path) -> Result<(), savestate::SaveStateError> {
        let s = savestate::load_from_file(path)?;
        self.load_state(&s);
        Ok(())
    }
}

impl Default for ToneBurst {
    fn default() -> Self {
        Self::new()
    }
}
