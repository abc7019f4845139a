//! Tone-burst generator frontend.
//!
//! Provides three execution modes:
//!
//! - **GUI mode** (default): oscilloscope window of `tone_out` colored by
//!   controller state, mono audio of the output line, keyboard/gamepad trigger,
//!   save states.
//! - **Headless mode** (`--headless`): fire once, run N ticks, print a
//!   run-length trace and the final registers.
//! - **Step mode** (`--step`): interactive host-bus console.
//!
//! Register values come from `--profile <file.toml>` and are overridden by
//! the individual register flags.

use anyhow::Context;
use clap::Parser;
use gilrs::{Button as GilrsButton, Event as GilrsEvent, EventType, Gilrs};
use minifb::{Key, Scale, ScaleMode, Window, WindowOptions};
use serde::Deserialize;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use toneburst_core::{
    debugger, savestate, BusInput, BurstState, Control, RegAddr, ToneBurst, WaveformTrace,
};

/// Audio output sample rate in Hz
const AUDIO_SAMPLE_RATE: u32 = 44100;
/// Square wave amplitude (0.0–1.0)
const AUDIO_VOLUME: f32 = 0.15;
/// Oscilloscope size at 1x
const SCOPE_WIDTH: usize = 256;
const SCOPE_HEIGHT: usize = 96;
const FPS: u32 = 60;

type AudioRing = Arc<Mutex<VecDeque<f32>>>;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Tone-burst generator
#[derive(Parser, Debug)]
#[command(name = "toneburst", version)]
struct Opt {
    /// Pulses per burst register value
    #[arg(long)]
    pulse_count: Option<u32>,
    /// Burst count register value
    #[arg(long)]
    burst_count: Option<u32>,
    /// High fraction of the period, 0–1024
    #[arg(long)]
    duty_cycle: Option<u32>,
    /// Gap between bursts, in ticks
    #[arg(long)]
    inter_burst_delay: Option<u32>,
    /// Pulse period, in ticks
    #[arg(long)]
    pulse_period: Option<u32>,
    /// Ticks per second
    #[arg(long, default_value_t = toneburst_core::CLOCK_HZ)]
    clock_hz: u32,
    /// Run without a window
    #[arg(long)]
    headless: bool,
    /// Ticks to run after the trigger in headless mode
    #[arg(long, default_value_t = 100_000)]
    ticks: u64,
    /// Interactive bus console
    #[arg(long)]
    step: bool,
    /// Start with audio muted
    #[arg(long)]
    mute: bool,
    /// Verbose logging
    #[arg(long)]
    debug: bool,
    /// Warn about degenerate register values as they are written
    #[arg(long)]
    diagnostics: bool,
    /// Initial window scale (1–6)
    #[arg(long, default_value_t = 3)]
    scale: usize,
    /// TOML profile with a `[registers]` table
    #[arg(long)]
    profile: Option<PathBuf>,
    /// Save state to restore before running
    #[arg(long)]
    load_state: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct Profile {
    #[serde(default)]
    registers: RegisterProfile,
}

/// Register values to program at startup. Unset fields keep their reset value.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegisterProfile {
    pulse_count: Option<u32>,
    burst_count: Option<u32>,
    duty_cycle: Option<u32>,
    inter_burst_delay: Option<u32>,
    pulse_period: Option<u32>,
    enable: Option<bool>,
}

impl RegisterProfile {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read profile '{}'.", path.display()))?;
        let profile: Profile = toml::de::from_str(&data)
            .with_context(|| format!("Could not parse profile '{}'.", path.display()))?;
        log::debug!("profile = {:?}", profile);
        Ok(profile.registers)
    }

    /// Command-line values take precedence.
    fn merge_opt(self, opt: &Opt) -> Self {
        RegisterProfile {
            pulse_count: opt.pulse_count.or(self.pulse_count),
            burst_count: opt.burst_count.or(self.burst_count),
            duty_cycle: opt.duty_cycle.or(self.duty_cycle),
            inter_burst_delay: opt.inter_burst_delay.or(self.inter_burst_delay),
            pulse_period: opt.pulse_period.or(self.pulse_period),
            enable: self.enable,
        }
    }

    /// Bus writes that program this profile, one per tick.
    fn writes(&self) -> Vec<BusInput> {
        let mut w = Vec::new();
        let fields = [
            (RegAddr::PulseCount, self.pulse_count),
            (RegAddr::BurstCount, self.burst_count),
            (RegAddr::DutyCycle, self.duty_cycle),
            (RegAddr::InterBurstDelay, self.inter_burst_delay),
            (RegAddr::PulsePeriod, self.pulse_period),
        ];
        for (reg, val) in fields {
            if let Some(v) = val {
                w.push(BusInput::write(reg.addr(), v));
            }
        }
        if self.enable == Some(true) {
            let ctrl = Control { enable: true, ..Control::default() };
            w.push(BusInput::write(RegAddr::Control.addr(), ctrl.bits()));
        }
        w
    }
}

// ─── Audio Source ───────────────────────────────────────────────────────────

/// Mono source draining PCM rendered from the device's output edges.
/// Plays silence when the ring runs dry.
struct ToneAudioSource {
    ring: AudioRing,
    sample_rate: u32,
}

impl Iterator for ToneAudioSource {
    type Item = f32;
    fn next(&mut self) -> Option<f32> {
        if let Ok(mut ring) = self.ring.try_lock() {
            if let Some(s) = ring.pop_front() {
                return Some(s);
            }
        }
        Some(0.0)
    }
}

impl rodio::Source for ToneAudioSource {
    fn current_frame_len(&self) -> Option<usize> { None }
    fn channels(&self) -> u16 { 1 }
    fn sample_rate(&self) -> u32 { self.sample_rate }
    fn total_duration(&self) -> Option<Duration> { None }
}

fn setup_audio(ring: AudioRing) -> Option<(rodio::OutputStream, rodio::OutputStreamHandle, rodio::Sink)> {
    match rodio::OutputStream::try_default() {
        Ok((stream, handle)) => match rodio::Sink::try_new(&handle) {
            Ok(sink) => {
                sink.append(ToneAudioSource { ring, sample_rate: AUDIO_SAMPLE_RATE });
                Some((stream, handle, sink))
            }
            Err(e) => { log::warn!("audio sink: {}", e); None }
        },
        Err(e) => { log::warn!("audio device: {}", e); None }
    }
}

// ─── Gamepad ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct GamepadState {
    trigger: bool,
    enable: bool,
    reset: bool,
}

fn init_gamepad() -> Option<Gilrs> {
    match Gilrs::new() {
        Ok(gilrs) => {
            for (id, gp) in gilrs.gamepads() {
                log::debug!("Gamepad: [{}] \"{}\" ({})", id, gp.name(), gp.os_name());
            }
            Some(gilrs)
        }
        Err(e) => { log::warn!("gamepad: {}", e); None }
    }
}

fn poll_gamepad(gilrs: &mut Gilrs, state: &mut GamepadState) {
    while let Some(GilrsEvent { event, .. }) = gilrs.next_event() {
        match event {
            EventType::ButtonPressed(b, _) => apply_button(state, b, true),
            EventType::ButtonReleased(b, _) => apply_button(state, b, false),
            EventType::Disconnected => {
                log::debug!("Gamepad disconnected");
                *state = GamepadState::default();
            }
            _ => {}
        }
    }
}

fn apply_button(state: &mut GamepadState, btn: GilrsButton, pressed: bool) {
    match btn {
        GilrsButton::South | GilrsButton::RightTrigger | GilrsButton::RightTrigger2 => {
            state.trigger = pressed
        }
        GilrsButton::East => state.enable = pressed,
        GilrsButton::Start => state.reset = pressed,
        _ => {}
    }
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() {
    let opt = Opt::parse();
    let filter = if opt.debug { "toneburst=debug" } else { "toneburst=info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if let Err(e) = main_inner(opt) {
        log::error!("Command failed.\n{:?}", e);
        std::process::exit(1);
    }
}

fn main_inner(opt: Opt) -> anyhow::Result<()> {
    let profile = match &opt.profile {
        Some(path) => RegisterProfile::load(path)?,
        None => RegisterProfile::default(),
    };
    let profile = profile.merge_opt(&opt);

    let mut dev = ToneBurst::new();
    dev.diagnostics = opt.diagnostics;

    if let Some(path) = &opt.load_state {
        dev.load_state_from_file(path)
            .with_context(|| format!("Could not load state '{}'.", path.display()))?;
    } else {
        for w in profile.writes() {
            dev.tick(w);
        }
    }

    let state_file = match &opt.profile {
        Some(p) => savestate::state_path(p),
        None => PathBuf::from("toneburst.state"),
    };

    if opt.step {
        run_step_mode(&mut dev)
    } else if opt.headless {
        run_headless(&mut dev, opt.ticks);
        Ok(())
    } else {
        run_gui(&mut dev, &opt, &state_file)
    }
}

// ─── GUI Mode ───────────────────────────────────────────────────────────────

fn state_color(state: BurstState) -> u32 {
    match state {
        BurstState::Idle => 0x0050_5050,
        BurstState::PulseHigh => 0x0040_E040,
        BurstState::PulseLow => 0x0030_90FF,
        BurstState::InterBurstDelay => 0x00E0_A020,
        BurstState::Done => 0x00E0_4040,
    }
}

/// Draw the trace into a `SCOPE_WIDTH` x `SCOPE_HEIGHT` buffer, oldest sample
/// on the left. Each column covers an equal share of the captured samples.
fn draw_scope(trace: &WaveformTrace, buf: &mut [u32]) {
    const HIGH_Y: usize = 16;
    const LOW_Y: usize = SCOPE_HEIGHT - 24;
    const STRIP_Y: usize = SCOPE_HEIGHT - 8;

    buf.iter_mut().for_each(|p| *p = 0x0010_1010);
    let samples: Vec<_> = trace.iter().copied().collect();
    if samples.is_empty() { return; }

    let mut prev_level: Option<bool> = None;
    for x in 0..SCOPE_WIDTH {
        let lo = x * samples.len() / SCOPE_WIDTH;
        let hi = ((x + 1) * samples.len() / SCOPE_WIDTH).max(lo + 1).min(samples.len());
        if lo >= samples.len() { break; }
        let col = &samples[lo..hi];
        let any_high = col.iter().any(|s| s.tone_out);
        let any_low = col.iter().any(|s| !s.tone_out);
        let last = col[col.len() - 1];
        let color = state_color(last.state);

        let first_level = col[0].tone_out;
        let edge = (any_high && any_low) || prev_level.map_or(false, |p| p != first_level);
        if edge {
            for y in HIGH_Y..=LOW_Y { buf[y * SCOPE_WIDTH + x] = color; }
        } else {
            let y = if any_high { HIGH_Y } else { LOW_Y };
            buf[y * SCOPE_WIDTH + x] = color;
        }
        for y in STRIP_Y..SCOPE_HEIGHT { buf[y * SCOPE_WIDTH + x] = color; }
        prev_level = Some(last.tone_out);
    }
}

fn open_window(scale: usize) -> anyhow::Result<Window> {
    let mut window = Window::new(
        "Tone Burst", SCOPE_WIDTH * scale, SCOPE_HEIGHT * scale,
        WindowOptions {
            scale: Scale::X1,
            scale_mode: ScaleMode::AspectRatioStretch,
            resize: true,
            ..Default::default()
        },
    ).map_err(|e| anyhow::anyhow!("Could not create window: {}", e))?;
    window.set_target_fps(FPS as usize);
    Ok(window)
}

fn run_gui(dev: &mut ToneBurst, opt: &Opt, state_file: &Path) -> anyhow::Result<()> {
    let mut scale = opt.scale.clamp(1, 6);
    let mut window = open_window(scale)?;
    dev.audio_capture = true;
    let ticks_per_frame = (opt.clock_hz / FPS).max(1) as u64;

    let audio_ring: AudioRing = Arc::new(Mutex::new(VecDeque::with_capacity(16384)));
    let mut muted = opt.mute;
    let mut _audio = if !muted { setup_audio(audio_ring.clone()) } else { None };
    let mut pcm_buf: Vec<f32> = Vec::with_capacity(16384);

    let mut gilrs = init_gamepad();
    let mut gp = GamepadState::default();
    let mut prev_gp = (false, false, false);

    let mut scope = vec![0u32; SCOPE_WIDTH * SCOPE_HEIGHT];
    let mut scaled_buf = vec![0u32; SCOPE_WIDTH * scale * SCOPE_HEIGHT * scale];
    let mut pending: VecDeque<BusInput> = VecDeque::new();
    let mut prev_keys = [false; 7];
    let mut prev_num = [false; 6];
    let mut last_title = Instant::now();

    log::info!("T=trigger E=enable R=reset M=mute F5=save F9=load D=dump 1-6=scale Esc=quit");

    while window.is_open() && !window.is_key_down(Key::Escape) {
        if let Some(ref mut g) = gilrs { poll_gamepad(g, &mut gp); }

        // Scale toggle (1-6)
        let num = [
            window.is_key_down(Key::Key1), window.is_key_down(Key::Key2),
            window.is_key_down(Key::Key3), window.is_key_down(Key::Key4),
            window.is_key_down(Key::Key5), window.is_key_down(Key::Key6),
        ];
        for i in 0..6 {
            if num[i] && !prev_num[i] && scale != i + 1 {
                scale = i + 1;
                scaled_buf.resize(SCOPE_WIDTH * scale * SCOPE_HEIGHT * scale, 0);
                window = open_window(scale)?;
            }
        }
        prev_num = num;

        let keys = [
            window.is_key_down(Key::T), window.is_key_down(Key::E),
            window.is_key_down(Key::R), window.is_key_down(Key::M),
            window.is_key_down(Key::F5), window.is_key_down(Key::F9),
            window.is_key_down(Key::D),
        ];
        let pressed = |i: usize| keys[i] && !prev_keys[i];
        let gp_now = (gp.trigger, gp.enable, gp.reset);

        // Trigger (T / South)
        if pressed(0) || (gp_now.0 && !prev_gp.0) {
            pending.push_back(BusInput::write(RegAddr::Control.addr(), Control::fire().bits()));
        }
        // Enable toggle (E / East)
        if pressed(1) || (gp_now.1 && !prev_gp.1) {
            let mut ctrl = dev.regs.control();
            ctrl.enable = !ctrl.enable;
            ctrl.trigger = false;
            pending.push_back(BusInput::write(RegAddr::Control.addr(), ctrl.bits()));
        }
        // Reset (R / Start)
        if pressed(2) || (gp_now.2 && !prev_gp.2) {
            pending.push_back(BusInput::reset());
        }
        // Mute (M)
        if pressed(3) {
            muted = !muted;
            _audio = if muted { None } else { setup_audio(audio_ring.clone()) };
            if let Ok(mut ring) = audio_ring.lock() { ring.clear(); }
        }
        // Save / load state (F5 / F9)
        if pressed(4) {
            if let Err(e) = dev.save_state_to_file(state_file) {
                log::error!("Save state failed: {}", e);
            }
        }
        if pressed(5) {
            pending.clear();
            if let Err(e) = dev.load_state_from_file(state_file) {
                log::error!("Load state failed: {}", e);
            }
        }
        // Register dump (D)
        if pressed(6) {
            eprintln!("--- Regs ---\n{}\n---", dev.dump_regs());
        }
        prev_keys = keys;
        prev_gp = gp_now;

        // One queued bus operation per tick
        dev.audio_buf.begin_window(dev.tick_count());
        for _ in 0..ticks_per_frame {
            let input = pending.pop_front().unwrap_or_default();
            dev.tick(input);
        }

        if let Some(hit) = dev.debugger.take_hit() {
            log::info!("watchpoint {} hit at tick {}: {} 0x{:08X} -> 0x{:08X}",
                hit.index, hit.tick, hit.reg.name(), hit.old_val, hit.new_val);
        }

        if !muted && dev.audio_buf.needs_render() {
            dev.audio_buf.render_samples(&mut pcm_buf, AUDIO_SAMPLE_RATE, opt.clock_hz, AUDIO_VOLUME);
            if let Ok(mut ring) = audio_ring.lock() {
                // Limit buffer to avoid latency buildup
                let max_buf = AUDIO_SAMPLE_RATE as usize / 5;
                if ring.len() < max_buf {
                    ring.extend(pcm_buf.iter());
                }
            }
        }

        // Render
        draw_scope(&dev.trace, &mut scope);
        let scaled_w = SCOPE_WIDTH * scale;
        for y in 0..SCOPE_HEIGHT {
            for x in 0..SCOPE_WIDTH {
                let c = scope[y * SCOPE_WIDTH + x];
                for sy in 0..scale {
                    let base = (y * scale + sy) * scaled_w + x * scale;
                    scaled_buf[base..base + scale].iter_mut().for_each(|p| *p = c);
                }
            }
        }
        window.update_with_buffer(&scaled_buf, scaled_w, SCOPE_HEIGHT * scale)
            .map_err(|e| anyhow::anyhow!("Could not update window: {}", e))?;

        if last_title.elapsed() >= Duration::from_millis(500) {
            let st = dev.status();
            let en = if dev.regs.control().enable { " [EN]" } else { "" };
            let ms = if muted { " [MUTE]" } else { "" };
            window.set_title(&format!("Tone Burst - {}{}{} ({}x)",
                debugger::format_status(&st), en, ms, scale));
            last_title = Instant::now();
        }
    }
    log::debug!("{} ticks, {} sequences completed", dev.tick_count(), dev.trace.completed());
    Ok(())
}

// ─── Step Mode ──────────────────────────────────────────────────────────────

/// Decimal or `0x` hex.
fn parse_num(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Register name or numeric address. Numbers reach the bus unmasked, so
/// anything past 6 is an unimplemented address.
fn parse_addr(s: &str) -> Option<u8> {
    debugger::reg_by_name(s)
        .map(|r| r.addr())
        .or_else(|| parse_num(s).and_then(|n| u8::try_from(n).ok()))
}

fn run_step_mode(dev: &mut ToneBurst) -> anyhow::Result<()> {
    println!("Bus console: w <addr> <data>, r <addr>, t [n], fire, reset, d, watch <reg> [value], unwatch <n>, q");
    println!("{}", dev.dump_regs());

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("bus> ");
        std::io::stdout().flush()?;
        let line = match lines.next() {
            Some(l) => l?,
            None => break,
        };
        let args: Vec<&str> = line.split_whitespace().collect();
        match args.as_slice() {
            [] => {}
            ["q"] | ["quit"] => break,
            ["d"] | ["dump"] => println!("{}", dev.dump_regs()),
            ["reset"] => {
                dev.tick(BusInput::reset());
                println!("{}", dev.dump_regs());
            }
            ["fire"] => print_tick(dev.fire()),
            ["w", addr, data] => match (parse_addr(addr), parse_num(data)) {
                (Some(a), Some(v)) => print_tick(dev.write(a, v)),
                _ => println!("usage: w <addr> <data>"),
            },
            ["r", addr] => match parse_addr(addr) {
                Some(a) => {
                    let v = dev.read(a);
                    println!("  [{:X}] = 0x{:08X} ({})", a, v, v);
                }
                None => println!("usage: r <addr>"),
            },
            ["t"] => print_tick(dev.idle_tick()),
            ["t", n] => match parse_num(n) {
                Some(n) => {
                    for _ in 0..n { dev.idle_tick(); }
                    println!("{}", dev.dump_regs());
                }
                None => println!("usage: t [n]"),
            },
            ["watch", reg, rest @ ..] => match (debugger::reg_by_name(reg), rest) {
                (Some(r), []) => println!("watchpoint {}", dev.debugger.add_watchpoint(r, None)),
                (Some(r), [v]) => match parse_num(v) {
                    Some(v) => println!("watchpoint {}", dev.debugger.add_watchpoint(r, Some(v))),
                    None => println!("usage: watch <reg> [value]"),
                },
                _ => println!("usage: watch <reg> [value]"),
            },
            ["watch"] => print!("{}", dev.debugger.list_watchpoints()),
            ["unwatch", n] => match n.parse() {
                Ok(i) if dev.debugger.remove_watchpoint(i) => println!("removed {}", i),
                _ => println!("no such watchpoint"),
            },
            _ => println!("unknown command: {}", line.trim()),
        }
        if let Some(hit) = dev.debugger.take_hit() {
            println!("*** Watchpoint {}: {} 0x{:08X} -> 0x{:08X} at tick {} ***",
                hit.index, hit.reg.name(), hit.old_val, hit.new_val, hit.tick);
        }
    }
    println!("Total: {} ticks", dev.tick_count());
    Ok(())
}

fn print_tick(out: toneburst_core::TickOutput) {
    println!("  out={} {}", out.tone_out as u8, debugger::format_status(&out.status));
}

// ─── Headless Mode ──────────────────────────────────────────────────────────

fn run_headless(dev: &mut ToneBurst, ticks: u64) {
    // Keep every tick of the run
    dev.trace = WaveformTrace::new((ticks.min(1 << 22) as usize) + 1);

    let start = Instant::now();
    dev.fire();
    dev.run_ticks(ticks);
    let elapsed = start.elapsed();

    println!("{:>10} {:>10}  {:<16} out", "tick", "length", "state");
    for (state, out, tick, len) in dev.trace.runs() {
        println!("{:>10} {:>10}  {:<16} {}", tick, len, state.name(), out as u8);
    }
    println!("---");
    for state in BurstState::ALL {
        println!("  {:<16} {} ticks", state.name(), dev.trace.ticks_in(state));
    }
    println!("  completed sequences: {}", dev.trace.completed());
    println!("{}", dev.dump_regs());
    log::info!("{} ticks in {:.3}s", headless_tick_total(ticks), elapsed.as_secs_f64());
}

/// Ticks run by headless mode: the trigger write plus `ticks`.
fn headless_tick_total(ticks: u64) -> u64 {
    ticks.saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_tick_total_saturates() {
        assert_eq!(headless_tick_total(100), 101);
        assert_eq!(headless_tick_total(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_parse_num() {
        assert_eq!(parse_num("42"), Some(42));
        assert_eq!(parse_num("0x1F"), Some(31));
        assert_eq!(parse_num("zz"), None);
    }

    #[test]
    fn test_parse_addr_keeps_wide_addresses() {
        assert_eq!(parse_addr("duty_cycle"), Some(3));
        assert_eq!(parse_addr("0x13"), Some(0x13));
        assert_eq!(parse_addr("0x113"), None);
    }

    #[test]
    fn test_profile_cli_overrides() {
        let profile: Profile = toml::de::from_str(
            "[registers]\npulse_count = 4\npulse_period = 8\nenable = true\n",
        ).unwrap();
        let opt = Opt::parse_from(["toneburst", "--pulse-period", "16"]);
        let regs = profile.registers.merge_opt(&opt);
        assert_eq!(regs.pulse_count, Some(4));
        assert_eq!(regs.pulse_period, Some(16));
        assert_eq!(regs.writes().len(), 3);
    }
}
