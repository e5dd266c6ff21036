//! Simulated receive data path

use std::f64::consts::TAU;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use super::frontend::{SimFrontend, NOISE_FLOOR_DBFS};
use super::{lock_state, SimState};
use crate::diagnostics::MessageKind;
use crate::driver::RxTransport;
use crate::error::{Error, Result};
use crate::stream::{AcquisitionState, SampleFormat};
use crate::types::{RxErrorCode, RxMetadata};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub(crate) struct SimRxTransport {
    state: Arc<Mutex<SimState>>,
    /// (board, frontend) per stream channel, in buffer order.
    targets: Vec<(usize, usize)>,
    format: SampleFormat,
    spp: usize,
}

impl SimRxTransport {
    pub(super) fn new(
        state: Arc<Mutex<SimState>>,
        targets: Vec<(usize, usize)>,
        format: SampleFormat,
        spp: usize,
    ) -> Self {
        Self {
            state,
            targets,
            format,
            spp,
        }
    }

    /// One look at the device. `None` means keep waiting.
    fn poll(
        &self,
        state: &mut SimState,
        buffers: &mut [&mut [u8]],
        samples: usize,
        one_packet: bool,
        final_pass: bool,
    ) -> Option<(usize, RxMetadata)> {
        if let Some(code) = state.faults.pop_front() {
            return Some((0, RxMetadata::error(code)));
        }
        let reported = self
            .targets
            .iter()
            .find_map(|&(b, f)| state.boards[b].frontends[f].stream.pending.pop_front());
        if let Some(code) = reported {
            for &(b, f) in &self.targets {
                let pending = &mut state.boards[b].frontends[f].stream.pending;
                if let Some(pos) = pending.iter().position(|&c| c == code) {
                    pending.remove(pos);
                }
            }
            return Some((0, RxMetadata::error(code)));
        }

        let timeout = || Some((0, RxMetadata::error(RxErrorCode::Timeout)));
        let armed = self
            .targets
            .iter()
            .filter(|&&(b, f)| state.boards[b].frontends[f].stream.state.is_armed())
            .count();
        if armed == 0 {
            return if final_pass { timeout() } else { None };
        }
        if !self.aligned(state, armed) {
            for &(b, f) in &self.targets {
                let stream = &mut state.boards[b].frontends[f].stream;
                stream.state = AcquisitionState::Idle;
                stream.disarm();
            }
            state.sink.message(
                MessageKind::Error,
                "stream channels are not aligned in time or rate; acquisition stopped",
            );
            return Some((0, RxMetadata::error(RxErrorCode::Alignment)));
        }

        let now = state.clock.elapsed();
        let (b0, f0) = self.targets[0];
        let lead = &state.boards[b0].frontends[f0];
        let (Some(start), delivered, rate) = (lead.stream.start, lead.stream.delivered, lead.rate)
        else {
            return if final_pass { timeout() } else { None };
        };
        let board_now = state.boards[b0].time_at(now);
        let elapsed = board_now.secs_since(&start);
        let produced = if elapsed > 0.0 {
            (elapsed * rate).floor() as u64
        } else {
            0
        };
        let available = produced.saturating_sub(delivered);

        if available > state.config.buffer_samples {
            self.drop_backlog(state, available);
            state.sink.message(MessageKind::FastPath, "O");
            return Some((0, RxMetadata::error(RxErrorCode::Overflow)));
        }

        let mut want = samples as u64;
        if one_packet {
            want = want.min(self.spp as u64 - delivered % self.spp as u64);
        }
        let allowance = self
            .targets
            .iter()
            .map(|&(b, f)| state.boards[b].frontends[f].stream.state.allowance(want))
            .min()
            .unwrap_or(0);
        let ready = available.min(allowance);
        if ready < allowance && !final_pass {
            return None;
        }
        if ready == 0 {
            return timeout();
        }
        Some(self.deliver(state, buffers, ready))
    }

    /// Every channel armed, started within one sample period of the
    /// others, at one rate.
    fn aligned(&self, state: &SimState, armed: usize) -> bool {
        if armed != self.targets.len() {
            return false;
        }
        let (b0, f0) = self.targets[0];
        let lead = &state.boards[b0].frontends[f0];
        let period = 1.0 / lead.rate;
        self.targets[1..].iter().all(|&(b, f)| {
            let fe = &state.boards[b].frontends[f];
            let skew = match (fe.stream.start_instant, lead.stream.start_instant) {
                (Some(a), Some(c)) => (a.as_secs_f64() - c.as_secs_f64()).abs(),
                _ => f64::INFINITY,
            };
            fe.rate == lead.rate && skew <= period
        })
    }

    fn drop_backlog(&self, state: &mut SimState, count: u64) {
        let mut broken = false;
        for &(b, f) in &self.targets {
            let stream = &mut state.boards[b].frontends[f].stream;
            let consumed = stream.state.consume(count);
            stream.delivered += count;
            broken |= consumed.broken_chain;
        }
        if broken {
            let (b0, f0) = self.targets[0];
            state.boards[b0].frontends[f0]
                .stream
                .pending
                .push_back(RxErrorCode::BrokenChain);
        }
    }

    fn deliver(&self, state: &mut SimState, buffers: &mut [&mut [u8]], count: u64) -> (usize, RxMetadata) {
        let (tone_hz, tone_dbfs) = (state.config.tone_hz, state.config.tone_dbfs);
        let spp = self.spp as u64;
        let bps = self.format.bytes_per_sample();

        let (b0, f0) = self.targets[0];
        let lead = &state.boards[b0].frontends[f0];
        let first = lead.stream.delivered;
        let start = lead.stream.start.unwrap_or_default();
        let time_spec = start.add_secs(first as f64 / lead.rate);
        let start_of_burst = lead.stream.fresh_burst;

        for (i, (buffer, &(b, f))) in buffers.iter_mut().zip(&self.targets).enumerate() {
            let fe = &state.boards[b].frontends[f];
            let synth = ToneSynth::new(fe, tone_hz, tone_dbfs, i as u64);
            for k in 0..count {
                let (re, im) = synth.sample(first + k);
                let offset = k as usize * bps;
                self.format.host.write_sample(
                    &mut buffer[offset..offset + bps],
                    self.format.wire.quantize(re),
                    self.format.wire.quantize(im),
                );
            }
        }

        let mut end_of_burst = false;
        let mut broken_chain = false;
        for (i, &(b, f)) in self.targets.iter().enumerate() {
            let stream = &mut state.boards[b].frontends[f].stream;
            let consumed = stream.state.consume(count);
            stream.delivered += count;
            stream.fresh_burst = false;
            if i == 0 {
                end_of_burst = consumed.end_of_burst;
                broken_chain = consumed.broken_chain;
            }
        }
        if broken_chain {
            state.boards[b0].frontends[f0]
                .stream
                .pending
                .push_back(RxErrorCode::BrokenChain);
        }

        let next = first + count;
        let metadata = RxMetadata {
            has_time_spec: true,
            time_spec,
            more_fragments: !end_of_burst && next % spp != 0,
            fragment_offset: (first % spp) as usize,
            start_of_burst,
            end_of_burst,
            error_code: RxErrorCode::None,
        };
        (count as usize, metadata)
    }
}

impl Drop for SimRxTransport {
    fn drop(&mut self) {
        // Errors queued for this stream must not reach the next one.
        if let Ok(mut state) = lock_state(&self.state) {
            for &(b, f) in &self.targets {
                state.boards[b].frontends[f].stream.pending.clear();
            }
        }
    }
}

impl RxTransport for SimRxTransport {
    fn recv(
        &mut self,
        buffers: &mut [&mut [u8]],
        samples: usize,
        timeout: Duration,
        one_packet: bool,
    ) -> Result<(usize, RxMetadata)> {
        if buffers.len() != self.targets.len() {
            return Err(Error::Transport(format!(
                "{} buffers for a {}-channel stream",
                buffers.len(),
                self.targets.len()
            )));
        }
        let needed = samples
            .checked_mul(self.format.bytes_per_sample())
            .ok_or_else(|| {
                Error::InvalidParameter(format!("{} samples per buffer is too many", samples))
            })?;
        if let Some(short) = buffers.iter().find(|b| b.len() < needed) {
            return Err(Error::BufferTooSmall {
                needed,
                actual: short.len(),
            });
        }
        if samples == 0 {
            return Ok((0, RxMetadata::default()));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let final_pass = Instant::now() >= deadline;
            {
                let mut state = lock_state(&self.state)?;
                if let Some(result) = self.poll(&mut state, buffers, samples, one_packet, final_pass) {
                    if result.1.error_code == RxErrorCode::Alignment {
                        warn!("Receive alignment failure on {} channels", self.targets.len());
                    }
                    return Ok(result);
                }
            }
            let left = deadline.saturating_duration_since(Instant::now());
            thread::sleep(left.min(POLL_INTERVAL));
        }
    }

    fn samples_per_packet(&self) -> usize {
        self.spp
    }
}

/// Deterministic per-channel signal: the test tone (when in band) over a
/// hashed pseudo-noise floor.
struct ToneSynth {
    tone: Option<(f64, f64)>,
    noise_amp: f64,
    seed: u64,
}

impl ToneSynth {
    fn new(fe: &SimFrontend, tone_hz: f64, tone_dbfs: f64, channel: u64) -> Self {
        let tone = fe.tone_offset(tone_hz).map(|offset| {
            let amp = 10f64.powf(fe.tone_power_dbfs(tone_hz, tone_dbfs) / 20.0);
            (amp, TAU * offset / fe.rate)
        });
        Self {
            tone,
            noise_amp: 10f64.powf(NOISE_FLOOR_DBFS / 20.0),
            seed: channel << 48,
        }
    }

    fn sample(&self, index: u64) -> (f64, f64) {
        let (mut re, mut im) = (
            self.noise_amp * unit_noise(self.seed ^ (index << 1)),
            self.noise_amp * unit_noise(self.seed ^ ((index << 1) | 1)),
        );
        if let Some((amp, step)) = self.tone {
            let phase = step * index as f64;
            re += amp * phase.cos();
            im += amp * phase.sin();
        }
        (re, im)
    }
}

/// splitmix64 mapped onto [-1, 1).
fn unit_noise(x: u64) -> f64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 52) as f64 - 1.0
}
