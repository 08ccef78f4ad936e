//! Stateful PCM16 mono resampling.
//!
//! Each mediator direction (ACS -> AOAI, AOAI -> ACS) owns one opaque
//! [`ResamplerState`]. The state is only valid for a fixed
//! `(src_rate, dst_rate, quality)` triple; callers must discard and
//! recreate it whenever any of those three change.

use crate::config::{ResamplerQuality, SoxrQuality};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

const CHUNK_FRAMES: usize = 1024;

struct HighQuality {
    resampler: SincFixedIn<f32>,
    pending: Vec<f32>,
}

impl HighQuality {
    fn new(src_rate: u32, dst_rate: u32, quality: SoxrQuality) -> Option<Self> {
        if src_rate == 0 || dst_rate == 0 {
            return None;
        }
        let (sinc_len, oversampling_factor, window) = match quality {
            SoxrQuality::Quick => (64, 128, WindowFunction::Hann2),
            SoxrQuality::Low => (128, 128, WindowFunction::Hann2),
            SoxrQuality::Medium => (192, 192, WindowFunction::Blackman2),
            SoxrQuality::High => (256, 256, WindowFunction::BlackmanHarris2),
            SoxrQuality::VeryHigh => (384, 384, WindowFunction::BlackmanHarris2),
        };
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor,
            window,
        };
        let resampler = SincFixedIn::<f32>::new(
            dst_rate as f64 / src_rate as f64,
            2.0,
            params,
            CHUNK_FRAMES,
            1,
        )
        .ok()?;
        Some(Self {
            resampler,
            pending: Vec::new(),
        })
    }

    fn push(&mut self, samples: &[f32], flush: bool) -> Vec<f32> {
        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            if let Ok(mut result) = self.resampler.process(&[chunk], None) {
                out.append(&mut result[0]);
            } else {
                return Vec::new();
            }
        }
        if flush && !self.pending.is_empty() {
            let needed = self.resampler.input_frames_next();
            let mut chunk = self.pending.drain(..).collect::<Vec<_>>();
            let produced_fraction = chunk.len() as f64 / needed as f64;
            chunk.resize(needed, 0.0);
            if let Ok(mut result) = self.resampler.process(&[chunk], None) {
                let keep = ((result[0].len() as f64) * produced_fraction).round() as usize;
                result[0].truncate(keep.min(result[0].len()));
                out.append(&mut result[0]);
            }
        }
        out
    }
}

struct Linear {
    // Fractional read position into the logical, infinite input stream.
    position: f64,
    carry: Option<i16>,
}

impl Linear {
    fn new() -> Self {
        Self {
            position: 0.0,
            carry: None,
        }
    }

    fn process(&mut self, samples: &[i16], src_rate: u32, dst_rate: u32, flush: bool) -> Vec<i16> {
        if samples.is_empty() && !flush {
            return Vec::new();
        }
        let ratio = src_rate as f64 / dst_rate as f64;
        let mut extended = Vec::with_capacity(samples.len() + 1);
        if let Some(c) = self.carry {
            extended.push(c);
        }
        extended.extend_from_slice(samples);
        if extended.len() < 2 {
            if flush {
                self.carry = None;
                return extended;
            }
            self.carry = extended.first().copied();
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut pos = self.position;
        loop {
            let idx = pos.floor() as usize;
            if idx + 1 >= extended.len() {
                break;
            }
            let frac = pos - idx as f64;
            let a = extended[idx] as f64;
            let b = extended[idx + 1] as f64;
            let v = a + (b - a) * frac;
            out.push(v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
            pos += ratio;
        }

        let consumed_whole = pos.floor() as usize;
        if flush {
            self.position = 0.0;
            self.carry = None;
        } else {
            let keep_from = consumed_whole.min(extended.len().saturating_sub(1));
            self.carry = extended.get(keep_from).copied();
            self.position = pos - keep_from as f64;
        }
        out
    }
}

enum Inner {
    HighQuality(HighQuality),
    Linear(Linear),
}

/// Opaque resampler state for one direction of one session.
pub struct ResamplerState {
    src_rate: u32,
    dst_rate: u32,
    quality: ResamplerQuality,
    soxr_quality: SoxrQuality,
    inner: Inner,
}

fn bytes_to_i16(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

fn i16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Resamples a chunk of mono 16-bit PCM from `src_rate` to `dst_rate`.
///
/// `state` is created on first call or whenever `(src_rate, dst_rate,
/// quality)` changes since the previous call. Pass `final_chunk = true` to
/// flush any samples buffered inside the resampler (end of stream / a
/// session-ending barge-in). Non-even trailing byte lengths in `pcm` are
/// truncated before resampling. Internal resampler failures return an
/// empty buffer and reset `state` rather than propagating an error - no
/// single malformed chunk should end the call.
pub fn resample(
    pcm: &[u8],
    src_rate: u32,
    dst_rate: u32,
    quality: ResamplerQuality,
    soxr_quality: SoxrQuality,
    state: &mut Option<ResamplerState>,
    final_chunk: bool,
) -> Vec<u8> {
    let truncated = if pcm.len() % 2 != 0 {
        &pcm[..pcm.len() - 1]
    } else {
        pcm
    };

    if src_rate == dst_rate {
        *state = None;
        return truncated.to_vec();
    }

    let needs_reset = match state {
        Some(s) => s.src_rate != src_rate || s.dst_rate != dst_rate || s.quality != quality,
        None => true,
    };
    if needs_reset {
        *state = build_state(src_rate, dst_rate, quality, soxr_quality);
    }

    let Some(s) = state.as_mut() else {
        // Required quality tier unavailable (soxr construction failed).
        return Vec::new();
    };

    let samples = bytes_to_i16(truncated);
    let out = match &mut s.inner {
        Inner::HighQuality(hq) => {
            let floats: Vec<f32> = samples.iter().map(|&v| v as f32 / 32768.0).collect();
            let produced = hq.push(&floats, final_chunk);
            produced
                .iter()
                .map(|&v| (v * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
                .collect()
        }
        Inner::Linear(lin) => lin.process(&samples, src_rate, dst_rate, final_chunk),
    };

    if final_chunk {
        *state = None;
    }

    i16_to_bytes(&out)
}

fn build_state(
    src_rate: u32,
    dst_rate: u32,
    quality: ResamplerQuality,
    soxr_quality: SoxrQuality,
) -> Option<ResamplerState> {
    let inner = match quality {
        ResamplerQuality::Linear => Inner::Linear(Linear::new()),
        ResamplerQuality::Soxr => Inner::HighQuality(HighQuality::new(src_rate, dst_rate, soxr_quality)?),
        ResamplerQuality::Auto => match HighQuality::new(src_rate, dst_rate, soxr_quality) {
            Some(hq) => Inner::HighQuality(hq),
            None => Inner::Linear(Linear::new()),
        },
    };
    Some(ResamplerState {
        src_rate,
        dst_rate,
        quality,
        soxr_quality,
        inner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_rates_match() {
        let pcm: Vec<u8> = (0..100i16).flat_map(|v| v.to_le_bytes()).collect();
        let mut state = None;
        let out = resample(&pcm, 16_000, 16_000, ResamplerQuality::Linear, SoxrQuality::High, &mut state, false);
        assert_eq!(out, pcm);
        assert!(state.is_none());
    }

    #[test]
    fn odd_trailing_byte_is_truncated() {
        let pcm = [0u8, 1, 2];
        let mut state = None;
        let out = resample(&pcm, 8000, 8000, ResamplerQuality::Linear, SoxrQuality::High, &mut state, false);
        assert_eq!(out, vec![0u8, 1]);
    }

    #[test]
    fn linear_upsampling_roughly_doubles_sample_count() {
        let samples: Vec<i16> = (0..320).map(|i| (i % 100) as i16).collect();
        let pcm = i16_to_bytes(&samples);
        let mut state = None;
        let out = resample(&pcm, 8000, 16000, ResamplerQuality::Linear, SoxrQuality::High, &mut state, true);
        let out_samples = out.len() / 2;
        assert!(out_samples > 500 && out_samples < 700, "got {out_samples}");
    }

    #[test]
    fn state_resets_on_rate_change() {
        let pcm = i16_to_bytes(&[1, 2, 3, 4]);
        let mut state = None;
        let _ = resample(&pcm, 8000, 16000, ResamplerQuality::Linear, SoxrQuality::High, &mut state, false);
        assert!(state.is_some());
        let _ = resample(&pcm, 8000, 24000, ResamplerQuality::Linear, SoxrQuality::High, &mut state, false);
        assert!(state.as_ref().unwrap().dst_rate == 24000);
    }
}
