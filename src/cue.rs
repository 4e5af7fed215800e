//! Success cue: a short descending two-tone sweep.
//!
//! The tone is synthesized here; [`SoundCue`] implementations decide how it
//! reaches the user. Cue failures are never fatal.

use std::io::Write;

use crate::error::Result;

/// Sweep start frequency (A5).
pub const START_HZ: f32 = 880.0;
/// Sweep end frequency (A4).
pub const END_HZ: f32 = 440.0;
/// Cue length in seconds.
pub const DURATION_SECS: f32 = 0.5;

const START_GAIN: f32 = 0.1;
const END_GAIN: f32 = 0.001;

/// Synthesize the cue: a sine whose frequency and gain both ramp
/// exponentially (880 → 440 Hz, 0.1 → 0.001) over half a second.
pub fn success_tone(sample_rate: u32) -> Vec<f32> {
    let total = (sample_rate as f32 * DURATION_SECS).round() as usize;
    let mut samples = Vec::with_capacity(total);
    let mut phase = 0.0_f32;
    for n in 0..total {
        let progress = n as f32 / total as f32;
        let freq = START_HZ * (END_HZ / START_HZ).powf(progress);
        let gain = START_GAIN * (END_GAIN / START_GAIN).powf(progress);
        samples.push(phase.sin() * gain);
        phase += std::f32::consts::TAU * freq / sample_rate as f32;
        if phase > std::f32::consts::TAU {
            phase -= std::f32::consts::TAU;
        }
    }
    samples
}

/// Something that can announce a successful generation.
pub trait SoundCue: Send + Sync {
    /// Play the success cue.
    fn play_success(&self) -> Result<()>;
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl SoundCue for TerminalBell {
    fn play_success(&self) -> Result<()> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// Plays nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentCue;

impl SoundCue for SilentCue {
    fn play_success(&self) -> Result<()> {
        Ok(())
    }
}

/// Plays the synthesized tone on the default output device.
#[cfg(feature = "audio")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SpeakerCue;

#[cfg(feature = "audio")]
impl SoundCue for SpeakerCue {
    fn play_success(&self) -> Result<()> {
        use crate::error::TexSauceError;
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
        use std::sync::{Arc, Mutex};

        const SAMPLE_RATE: u32 = 24_000;

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| TexSauceError::Io(std::io::Error::other("no default output device")))?;
        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            buffer_size: cpal::BufferSize::Default,
        };

        let samples = success_tone(SAMPLE_RATE);
        let cursor = Arc::new(Mutex::new((0_usize, false)));
        let cursor_cb = Arc::clone(&cursor);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let Ok(mut state) = cursor_cb.lock() else { return };
                    for sample in data.iter_mut() {
                        if state.0 < samples.len() {
                            *sample = samples[state.0];
                            state.0 += 1;
                        } else {
                            *sample = 0.0;
                            state.1 = true;
                        }
                    }
                },
                |err| tracing::warn!("cue output stream error: {err}"),
                None,
            )
            .map_err(|e| {
                TexSauceError::Io(std::io::Error::other(format!(
                    "failed to build output stream: {e}"
                )))
            })?;
        stream.play().map_err(|e| {
            TexSauceError::Io(std::io::Error::other(format!(
                "failed to start output stream: {e}"
            )))
        })?;

        loop {
            std::thread::sleep(std::time::Duration::from_millis(10));
            let done = cursor.lock().map(|s| s.1).unwrap_or(true);
            if done {
                break;
            }
        }
        Ok(())
    }
}

/// The cue used by the binary: speakers with the `audio` feature, else a bell.
pub fn default_cue() -> Box<dyn SoundCue> {
    #[cfg(feature = "audio")]
    {
        Box::new(SpeakerCue)
    }
    #[cfg(not(feature = "audio"))]
    {
        Box::new(TerminalBell)
    }
}

/// Play `cue`, logging rather than returning failures.
pub fn play_best_effort(cue: &dyn SoundCue) {
    if let Err(e) = cue.play_success() {
        tracing::warn!("sound playback failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_is_half_a_second() {
        assert_eq!(success_tone(48_000).len(), 24_000);
        assert_eq!(success_tone(24_000).len(), 12_000);
    }

    #[test]
    fn tone_decays_and_stays_in_range() {
        let samples = success_tone(24_000);
        assert!(samples.iter().all(|s| s.abs() <= START_GAIN + f32::EPSILON));

        let peak = |chunk: &[f32]| chunk.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        let head = peak(&samples[..1_200]);
        let tail = peak(&samples[samples.len() - 1_200..]);
        assert!(head > 0.05, "head peak {head}");
        assert!(tail < 0.01, "tail peak {tail}");
    }

    #[test]
    fn silent_cue_succeeds() {
        assert!(SilentCue.play_success().is_ok());
    }
}
