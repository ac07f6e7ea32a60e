//! Block-based offline renderer and WAV export.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use tracing::debug;

use crate::dsp::DspGraph;
use crate::error::EngineFault;

pub const DEFAULT_BLOCK_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStats {
    pub render_time_ms: f64,
    pub blocks: usize,
    /// Whether rendering finished inside the latency budget.
    pub realtime_success: bool,
}

pub struct AudioRenderer {
    pub block_size: usize,
}

impl AudioRenderer {
    pub fn new() -> Self {
        AudioRenderer {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Render `total_samples` of audio by feeding silence blocks through the
    /// graph. A panic inside a stage is contained and surfaced as an
    /// `EngineFault` instead of unwinding through the caller.
    pub fn render(
        &self,
        graph: &mut DspGraph,
        total_samples: usize,
        max_latency_ms: f64,
    ) -> Result<(Vec<f32>, RenderStats), EngineFault> {
        let block_size = self.block_size.max(1);
        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut out = Vec::with_capacity(total_samples);
            let silence = vec![0.0f32; block_size];
            let mut blocks = 0usize;
            while out.len() < total_samples {
                let want = (total_samples - out.len()).min(block_size);
                let block = graph.process(&silence[..want]);
                out.extend_from_slice(&block);
                blocks += 1;
            }
            out.truncate(total_samples);
            (out, blocks)
        }));

        let render_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok((out, blocks)) => {
                let realtime_success = render_time_ms <= max_latency_ms;
                debug!(total_samples, blocks, render_time_ms, realtime_success, "render complete");
                Ok((
                    out,
                    RenderStats {
                        render_time_ms,
                        blocks,
                        realtime_success,
                    },
                ))
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "stage panicked during render".to_string());
                Err(EngineFault { message })
            }
        }
    }
}

impl Default for AudioRenderer {
    fn default() -> Self {
        AudioRenderer::new()
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32_767.0) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
