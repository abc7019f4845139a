//! Tick-accurate audio rendering of `tone_out`.
//!
//! Records output-level transitions (edges) with tick timestamps over a
//! capture window, then converts them to mono PCM at the target sample rate.
//!
//! ## Post-processing pipeline
//!
//! When enabled ([`AudioBuffer::filters_enabled`]), three stages run after
//! edge interpolation:
//!
//! 1. **Click suppression**: fades in (~2 ms) when edges start arriving and
//!    out (~5 ms) when the line goes quiet, so burst boundaries do not pop.
//! 2. **Low-pass filter**: 2nd-order Butterworth at 8 kHz, rounding off the
//!    harshest harmonics of the raw square wave.
//! 3. **DC-blocking high-pass**: 2nd-order Butterworth at 20 Hz. A duty cycle
//!    other than 50 % leaves a DC offset that this removes.

use std::f32::consts::{PI, SQRT_2};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Low-pass filter cutoff (Hz).
const LPF_CUTOFF: f32 = 8000.0;
/// DC-blocking high-pass cutoff (Hz).
const HPF_CUTOFF: f32 = 20.0;
/// Envelope attack time (seconds).
const ENV_ATTACK_S: f32 = 0.002;
/// Envelope release time (seconds).
const ENV_RELEASE_S: f32 = 0.005;
/// Edges kept per window. Reaching it restarts the window at the current tick.
pub const MAX_EDGES: usize = 1 << 16;

// ─── Edge recording ─────────────────────────────────────────────────────────

/// A single output-level transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioEdge {
    /// Tick on which the new level was produced.
    pub tick: u64,
    /// Level after transition (true = high).
    pub level: bool,
}

// ─── 2nd-order biquad IIR filter ────────────────────────────────────────────

/// Biquad IIR filter using Direct Form 2 Transposed.
#[derive(Debug, Clone)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    /// 2nd-order Butterworth low-pass filter (Q = 1/√2).
    fn lowpass(cutoff: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let (sin_w, cos_w) = (w0.sin(), w0.cos());
        let alpha = sin_w / (2.0 * SQRT_2);
        let a0_inv = 1.0 / (1.0 + alpha);
        Biquad {
            b0: ((1.0 - cos_w) * 0.5) * a0_inv,
            b1: (1.0 - cos_w) * a0_inv,
            b2: ((1.0 - cos_w) * 0.5) * a0_inv,
            a1: (-2.0 * cos_w) * a0_inv,
            a2: (1.0 - alpha) * a0_inv,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// 2nd-order Butterworth high-pass filter.
    fn highpass(cutoff: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let (sin_w, cos_w) = (w0.sin(), w0.cos());
        let alpha = sin_w / (2.0 * SQRT_2);
        let a0_inv = 1.0 / (1.0 + alpha);
        Biquad {
            b0: ((1.0 + cos_w) * 0.5) * a0_inv,
            b1: (-(1.0 + cos_w)) * a0_inv,
            b2: ((1.0 + cos_w) * 0.5) * a0_inv,
            a1: (-2.0 * cos_w) * a0_inv,
            a2: (1.0 - alpha) * a0_inv,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

// ─── Audio buffer ───────────────────────────────────────────────────────────

/// Mono edge buffer with an optional post-processing pipeline.
pub struct AudioBuffer {
    edges: Vec<AudioEdge>,
    /// Output level carried across windows.
    pub level: bool,
    /// First tick of the current capture window.
    pub window_start: u64,
    /// One past the last tick of the current capture window.
    pub window_end: u64,

    lpf: Biquad,
    hpf: Biquad,
    envelope: f32,
    configured_rate: u32,

    /// Enable/disable the post-processing pipeline.
    pub filters_enabled: bool,
}

impl AudioBuffer {
    pub fn new() -> Self {
        // Reconfigured on first render
        let sr = 44100.0;
        AudioBuffer {
            edges: Vec::with_capacity(4096),
            level: false,
            window_start: 0,
            window_end: 0,
            lpf: Biquad::lowpass(LPF_CUTOFF, sr),
            hpf: Biquad::highpass(HPF_CUTOFF, sr),
            envelope: 0.0,
            configured_rate: 0,
            filters_enabled: true,
        }
    }

    fn configure_filters(&mut self, sample_rate: u32) {
        let sr = sample_rate as f32;
        self.lpf = Biquad::lowpass(LPF_CUTOFF, sr);
        self.hpf = Biquad::highpass(HPF_CUTOFF, sr);
        self.configured_rate = sample_rate;
    }

    /// Begin a capture window at `tick`, dropping edges from the last one.
    pub fn begin_window(&mut self, tick: u64) {
        self.window_start = tick;
        self.window_end = tick;
        self.edges.clear();
    }

    /// Record the output level produced on `tick`.
    #[inline]
    pub fn push(&mut self, tick: u64, level: bool) {
        if self.edges.len() >= MAX_EDGES {
            self.begin_window(tick);
        }
        if level != self.level {
            self.edges.push(AudioEdge { tick, level });
            self.level = level;
        }
        self.window_end = tick + 1;
    }

    pub fn edges(&self) -> &[AudioEdge] { &self.edges }

    /// True if any edge was recorded this window.
    pub fn has_audio(&self) -> bool {
        !self.edges.is_empty()
    }

    /// True while there is audio or the envelope is still fading out.
    pub fn needs_render(&self) -> bool {
        self.has_audio() || self.envelope > 0.001
    }

    pub fn toggle_filters(&mut self) {
        self.filters_enabled = !self.filters_enabled;
    }

    /// Render the current window to mono f32 PCM.
    ///
    /// `clock_hz` is the device tick rate. `volume` scales the amplitude
    /// (0.0–1.0). Returns the number of samples written to `out`.
    pub fn render_samples(
        &mut self,
        out: &mut Vec<f32>,
        sample_rate: u32,
        clock_hz: u32,
        volume: f32,
    ) -> usize {
        if self.configured_rate != sample_rate {
            self.configure_filters(sample_rate);
        }

        out.clear();
        let window_ticks = self.window_end.saturating_sub(self.window_start);
        if window_ticks == 0 || clock_hz == 0 { return 0; }

        let num_samples = ((window_ticks as f64 * sample_rate as f64) / clock_hz as f64)
            .ceil() as usize;
        out.reserve(num_samples);

        let tps = clock_hz as f64 / sample_rate as f64; // ticks per sample
        let start = self.window_start as f64;

        // Level before the first edge of this window
        let mut level = match self.edges.first() {
            Some(e) => !e.level,
            None => self.level,
        };
        let mut idx = 0usize;
        let active = !self.edges.is_empty();

        let attack_rate = 1.0 / (ENV_ATTACK_S * sample_rate as f32);
        let release_rate = 1.0 / (ENV_RELEASE_S * sample_rate as f32);

        for i in 0..num_samples {
            let p_start = start + i as f64 * tps;
            let p_end = p_start + tps;
            let raw = Self::sample_level(&mut idx, &self.edges, &mut level, p_start, p_end, tps, volume);

            if self.filters_enabled {
                if active {
                    self.envelope = (self.envelope + attack_rate).min(1.0);
                } else {
                    self.envelope = (self.envelope - release_rate).max(0.0);
                }
                let lp = self.lpf.process(raw * self.envelope);
                out.push(self.hpf.process(lp));
            } else {
                out.push(raw);
            }
        }

        num_samples
    }

    /// Time-weighted average level over `[p_start, p_end)`, mapped to
    /// `[-volume, +volume]`. A transition 30 % into the period yields
    /// 30 % old level + 70 % new level.
    #[inline]
    fn sample_level(
        edge_idx: &mut usize,
        edges: &[AudioEdge],
        level: &mut bool,
        p_start: f64,
        p_end: f64,
        tps: f64,
        volume: f32,
    ) -> f32 {
        let mut time_high = 0.0f64;
        let mut cursor = p_start;

        while *edge_idx < edges.len() && (edges[*edge_idx].tick as f64) < p_end {
            let edge_tick = edges[*edge_idx].tick as f64;
            if edge_tick > cursor {
                if *level {
                    time_high += edge_tick - cursor;
                }
                cursor = edge_tick;
            }
            *level = edges[*edge_idx].level;
            *edge_idx += 1;
        }

        if *level {
            time_high += p_end - cursor;
        }

        let duty = (time_high / tps) as f32;
        volume * (2.0 * duty - 1.0)
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Square wave: `half` ticks high, `half` ticks low, for `ticks` ticks.
    fn fill_square(buf: &mut AudioBuffer, ticks: u64, half: u64) {
        buf.begin_window(0);
        for t in 0..ticks {
            buf.push(t, (t / half) % 2 == 0);
        }
    }

    #[test]
    fn test_edges_only_on_change() {
        let mut buf = AudioBuffer::new();
        buf.begin_window(0);
        for (t, l) in [false, true, true, false, false, true].into_iter().enumerate() {
            buf.push(t as u64, l);
        }
        let ticks: Vec<u64> = buf.edges().iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![1, 3, 5]);
        assert_eq!(buf.window_end, 6);
    }

    #[test]
    fn test_raw_square_is_zero_mean() {
        let mut buf = AudioBuffer::new();
        buf.filters_enabled = false;
        // 1 kHz square at 48 kHz ticks, rendered at 48 kHz: 24 samples per half period
        fill_square(&mut buf, 48_000, 24);
        let mut out = Vec::new();
        let n = buf.render_samples(&mut out, 48_000, 48_000, 0.5);
        assert_eq!(n, 48_000);
        let mean: f32 = out.iter().sum::<f32>() / n as f32;
        assert!(mean.abs() < 1e-3, "mean = {}", mean);
        assert!(out.iter().all(|s| (s.abs() - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_interpolates_sub_sample_edges() {
        let mut buf = AudioBuffer::new();
        buf.filters_enabled = false;
        buf.begin_window(0);
        // 4 ticks per sample; high for the first tick only
        buf.push(0, true);
        buf.push(1, false);
        buf.push(2, false);
        buf.push(3, false);
        let mut out = Vec::new();
        buf.render_samples(&mut out, 1000, 4000, 1.0);
        assert_eq!(out.len(), 1);
        assert!((out[0] - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_edge_count_bounded_without_window_reset() {
        let mut buf = AudioBuffer::new();
        buf.begin_window(0);
        let ticks = (MAX_EDGES as u64) * 3 + 17;
        for t in 0..ticks {
            buf.push(t, t % 2 == 1);
        }
        assert!(buf.edges().len() <= MAX_EDGES);
        assert_eq!(buf.window_end, ticks);
        assert!(buf.window_start > 0);
        // Every kept edge lies inside the window
        assert!(buf.edges().iter().all(|e| e.tick >= buf.window_start));
    }

    #[test]
    fn test_silence_fades_out() {
        let mut buf = AudioBuffer::new();
        fill_square(&mut buf, 4800, 24);
        let mut out = Vec::new();
        buf.render_samples(&mut out, 48_000, 48_000, 0.5);
        assert!(buf.needs_render());
        // Quiet windows release the envelope
        for w in 1..10u64 {
            buf.begin_window(w * 4800);
            for t in 0..4800 {
                buf.push(w * 4800 + t, false);
            }
            buf.render_samples(&mut out, 48_000, 48_000, 0.5);
        }
        assert!(!buf.needs_render());
    }
}
