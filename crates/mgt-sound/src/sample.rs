// sample.rs — sound samples, WAV metadata and the sample cache
//
// Only what scheduling needs is kept: the play length and a coarse amplitude
// envelope. PCM data is read once to build the envelope and then dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use mgt_common::common::com_dprintf;

/// Envelope values per second of audio.
pub const AMPLITUDE_RATE: i32 = 60;

#[derive(Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("{0}: missing RIFF/WAVE chunks")]
    NotWave(String),
    #[error("{0}: missing fmt chunk")]
    MissingFormat(String),
    #[error("{name}: Microsoft PCM format only (format tag {format})")]
    UnsupportedFormat { name: String, format: i16 },
    #[error("{name}: unsupported layout ({channels} channels, {bits} bits, {rate} Hz)")]
    UnsupportedLayout { name: String, channels: i32, bits: i32, rate: i32 },
    #[error("{0}: missing data chunk")]
    MissingData(String),
    #[error("{0}: bad loop length")]
    BadLoop(String),
    #[error("couldn't load {0}")]
    NotFound(String),
}

// ============================================================
// WAV header parsing
// ============================================================

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WavInfo {
    pub rate: i32,
    /// Bytes per sample per channel.
    pub width: i32,
    pub channels: i32,
    /// Loop start in frames, -1 without a cue chunk.
    pub loopstart: i32,
    /// Length in frames.
    pub samples: i32,
    pub dataofs: usize,
    pub datalen: usize,
}

struct WavParser<'a> {
    data: &'a [u8],
    pos: usize,
    iff_end: usize,
    last_chunk: usize,
    iff_data: usize,
    iff_chunk_len: i32,
}

impl<'a> WavParser<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            iff_end: data.len(),
            last_chunk: 0,
            iff_data: 0,
            iff_chunk_len: 0,
        }
    }

    fn get_little_short(&mut self) -> i16 {
        if self.pos + 2 > self.data.len() {
            return 0;
        }
        let val = i16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        val
    }

    fn get_little_long(&mut self) -> i32 {
        if self.pos + 4 > self.data.len() {
            return 0;
        }
        let val = i32::from_le_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        val
    }

    fn find_next_chunk(&mut self, name: &[u8; 4]) -> bool {
        loop {
            self.pos = self.last_chunk;

            if self.pos + 8 > self.iff_end {
                return false;
            }

            self.pos += 4;
            self.iff_chunk_len = self.get_little_long();
            if self.iff_chunk_len < 0 {
                return false;
            }
            self.pos -= 8;
            self.last_chunk = self.pos + 8 + ((self.iff_chunk_len as usize + 1) & !1);

            if &self.data[self.pos..self.pos + 4] == name {
                return true;
            }
        }
    }

    fn find_chunk(&mut self, name: &[u8; 4]) -> bool {
        self.last_chunk = self.iff_data;
        self.find_next_chunk(name)
    }

    fn get_wavinfo(&mut self, name: &str) -> Result<WavInfo, SampleError> {
        let mut info = WavInfo::default();

        if !self.find_chunk(b"RIFF")
            || self.pos + 12 > self.data.len()
            || &self.data[self.pos + 8..self.pos + 12] != b"WAVE"
        {
            return Err(SampleError::NotWave(name.to_string()));
        }

        self.iff_data = self.pos + 12;

        if !self.find_chunk(b"fmt ") {
            return Err(SampleError::MissingFormat(name.to_string()));
        }

        self.pos += 8;
        let format = self.get_little_short();
        if format != 1 {
            return Err(SampleError::UnsupportedFormat { name: name.to_string(), format });
        }

        info.channels = self.get_little_short() as i32;
        info.rate = self.get_little_long();
        self.pos += 4 + 2; // skip avgBytesPerSec + blockAlign
        let bits = self.get_little_short() as i32;
        info.width = bits / 8;

        if !(1..=2).contains(&info.channels) || !(1..=2).contains(&info.width) || bits % 8 != 0 || info.rate <= 0 {
            return Err(SampleError::UnsupportedLayout {
                name: name.to_string(),
                channels: info.channels,
                bits,
                rate: info.rate,
            });
        }

        let mut marked_samples = 0;
        if self.find_chunk(b"cue ") {
            self.pos += 32;
            info.loopstart = self.get_little_long();
            if info.loopstart < 0 {
                return Err(SampleError::BadLoop(name.to_string()));
            }

            // a LIST chunk right after can carry the loop length
            if self.find_next_chunk(b"LIST")
                && self.pos + 32 <= self.data.len()
                && &self.data[self.pos + 28..self.pos + 32] == b"mark"
            {
                self.pos += 24;
                let length = self.get_little_long();
                marked_samples = match info.loopstart.checked_add(length) {
                    Some(end) if length >= 0 => end,
                    _ => return Err(SampleError::BadLoop(name.to_string())),
                };
            }
        } else {
            info.loopstart = -1;
        }

        if !self.find_chunk(b"data") {
            return Err(SampleError::MissingData(name.to_string()));
        }

        self.pos += 4;
        let declared = self.get_little_long().max(0) as usize;
        info.dataofs = self.pos;
        info.datalen = declared.min(self.data.len().saturating_sub(self.pos));

        let frames = (info.datalen / (info.width * info.channels) as usize) as i32;
        if marked_samples != 0 {
            if frames < marked_samples {
                return Err(SampleError::BadLoop(name.to_string()));
            }
            info.samples = marked_samples;
        } else {
            info.samples = frames;
        }

        Ok(info)
    }
}

/// Parse just the header of a WAV file.
pub fn wav_info(name: &str, data: &[u8]) -> Result<WavInfo, SampleError> {
    WavParser::new(data).get_wavinfo(name)
}

/// Peak absolute level per 1/AMPLITUDE_RATE window, full scale = 1.0.
fn build_envelope(pcm: &[u8], info: &WavInfo) -> Vec<f32> {
    let frames = info.samples.max(0) as usize;
    let channels = info.channels as usize;
    let width = info.width as usize;
    let frame_bytes = channels * width;
    let window = ((info.rate / AMPLITUDE_RATE).max(1)) as usize;

    let level = |frame: usize, ch: usize| -> f32 {
        let ofs = frame * frame_bytes + ch * width;
        if width == 1 {
            (pcm[ofs] as f32 - 128.0).abs() / 128.0
        } else {
            (i16::from_le_bytes([pcm[ofs], pcm[ofs + 1]]) as f32).abs() / 32768.0
        }
    };

    let usable = frames.min(pcm.len() / frame_bytes.max(1));
    (0..usable.div_ceil(window))
        .map(|w| {
            let end = ((w + 1) * window).min(usable);
            let mut peak = 0.0f32;
            for frame in w * window..end {
                for ch in 0..channels {
                    peak = peak.max(level(frame, ch));
                }
            }
            peak.min(1.0)
        })
        .collect()
}

// ============================================================
// SoundSample
// ============================================================

/// Immutable metadata of one decoded sound.
#[derive(Debug)]
pub struct SoundSample {
    name: String,
    length_ms: i32,
    amplitude: Vec<f32>,
    /// Sound time this sample was last picked by StartSound.
    last_played: AtomicI32,
}

impl SoundSample {
    pub fn new(name: &str, length_ms: i32, amplitude: Vec<f32>) -> Self {
        Self {
            name: name.to_string(),
            length_ms: length_ms.max(0),
            amplitude,
            last_played: AtomicI32::new(0),
        }
    }

    pub fn from_wav(name: &str, data: &[u8]) -> Result<Self, SampleError> {
        let info = wav_info(name, data)?;
        let pcm = &data[info.dataofs..info.dataofs + info.datalen];
        let length_ms = (info.samples as i64 * 1000 / info.rate as i64) as i32;
        Ok(Self::new(name, length_ms, build_envelope(pcm, &info)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length_ms(&self) -> i32 {
        self.length_ms
    }

    /// Envelope value `ms` into the sample, 0 outside it.
    pub fn amplitude_at(&self, ms: i32) -> f32 {
        if ms < 0 {
            return 0.0;
        }
        let index = ms as i64 * AMPLITUDE_RATE as i64 / 1000;
        self.amplitude.get(index as usize).copied().unwrap_or(0.0)
    }

    pub fn last_played(&self) -> i32 {
        self.last_played.load(Ordering::Relaxed)
    }

    pub fn set_last_played(&self, time: i32) {
        self.last_played.store(time, Ordering::Relaxed);
    }
}

// ============================================================
// SampleCache
// ============================================================

/// Samples by name. Shaders hold `Arc`s to entries.
#[derive(Default)]
pub struct SampleCache {
    samples: HashMap<String, Arc<SoundSample>>,
}

impl SampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// File path a sample name is loaded from. A leading '#' means the name
    /// is already a full path.
    pub fn sample_path(name: &str) -> String {
        match name.strip_prefix('#') {
            Some(path) => path.to_string(),
            None => format!("sound/{}", name),
        }
    }

    pub fn insert(&mut self, sample: SoundSample) -> Arc<SoundSample> {
        let sample = Arc::new(sample);
        self.samples.insert(sample.name().to_string(), sample.clone());
        sample
    }

    pub fn find(&self, name: &str) -> Option<Arc<SoundSample>> {
        self.samples.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Load every name not already cached, parsing in parallel. Names that
    /// fail are left out and reported.
    pub fn load_all<F>(&mut self, names: &[&str], load_file: F) -> Vec<SampleError>
    where
        F: Fn(&str) -> Option<Vec<u8>> + Sync,
    {
        let pending: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| !self.samples.contains_key(*name))
            .collect();

        let results: Vec<Result<SoundSample, SampleError>> = pending
            .par_iter()
            .map(|name| {
                let path = Self::sample_path(name);
                let data = load_file(&path).ok_or_else(|| SampleError::NotFound(path.clone()))?;
                SoundSample::from_wav(name, &data)
            })
            .collect();

        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(sample) => {
                    self.insert(sample);
                }
                Err(err) => {
                    com_dprintf(&format!("{}\n", err));
                    errors.push(err);
                }
            }
        }
        tracing::debug!(loaded = self.samples.len(), failed = errors.len(), "sample cache load");
        errors
    }
}
