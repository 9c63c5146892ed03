//! Audio feature extraction.
//!
//! Uploads are spooled to a temporary file (symphonia probes and seeks), decoded,
//! folded to mono, resampled to 16 kHz, peak-normalised and run through the
//! embedding model. Per-frame embeddings are mean-pooled into one vector.

use std::{
    fs::File,
    io::Write,
    panic::{self, AssertUnwindSafe},
    path::Path,
};

use ndarray::{Array1, Array2, Axis};
use rubato::{FftFixedIn, Resampler};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{
    features::ExtractionError,
    model::{AUDIO_SAMPLE_RATE, EMBEDDING_DIM, EmbeddingModel},
};

/// Upload bytes materialised on disk. The file is removed when this is dropped,
/// whichever way the caller leaves.
pub struct SpooledUpload {
    file: NamedTempFile,
}

impl SpooledUpload {
    pub fn create(bytes: &[u8], filename: &str, dir: Option<&Path>) -> std::io::Result<Self> {
        let suffix = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload-").suffix(&suffix);
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[derive(Debug)]
pub struct DecodedAudio {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }
}

/// Decodes a whole file to interleaved `f32`. symphonia asserts on some
/// malformed headers (a zero sample rate, for one) instead of returning an
/// error, so a panic while probing or decoding is reported as a decode failure.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, ExtractionError> {
    panic::catch_unwind(AssertUnwindSafe(|| decode_with_symphonia(path))).unwrap_or_else(|_| {
        Err(ExtractionError::Decode(
            "malformed audio header rejected by decoder".into(),
        ))
    })
}

fn decode_with_symphonia(path: &Path) -> Result<DecodedAudio, ExtractionError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ExtractionError::Decode(format!("unrecognised audio format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ExtractionError::Decode("no audio track".into()))?;
    let track_id = track.id;
    if track.codec_params.sample_rate == Some(0) {
        return Err(ExtractionError::Decode("header declares a zero sample rate".into()));
    }
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ExtractionError::Decode(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => {
                warn!(error = %e, "error reading packet, stopping decode");
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count());
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = %e, "decode error, skipping packet");
            }
            Err(e) => return Err(ExtractionError::Decode(e.to_string())),
        }
    }

    let sample_rate = sample_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| ExtractionError::Decode("missing sample rate".into()))?;
    Ok(DecodedAudio {
        samples,
        channels: channels.unwrap_or(1).max(1),
        sample_rate,
    })
}

/// FFT resampling. The resampler's own delay is dropped from the front and
/// its buffered tail is flushed, so the output lines up with the input and
/// has exactly `len * to / from` samples.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, ExtractionError> {
    if samples.is_empty() || from_rate == to_rate {
        return Ok(samples.to_vec());
    }
    let resample_err =
        |e: rubato::ResampleError| ExtractionError::Decode(format!("resample failed: {e}"));

    let mut resampler = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, 1024, 1, 1)
        .map_err(|e| ExtractionError::Decode(format!("resampler init failed: {e}")))?;
    let delay = resampler.output_delay();
    let expected_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;

    let mut output = Vec::with_capacity(delay + expected_len + resampler.output_frames_max());
    let mut remaining = samples;
    while remaining.len() >= resampler.input_frames_next() {
        let (chunk, rest) = remaining.split_at(resampler.input_frames_next());
        let resampled = resampler.process(&[chunk][..], None).map_err(resample_err)?;
        output.extend_from_slice(&resampled[0]);
        remaining = rest;
    }
    if !remaining.is_empty() {
        let resampled = resampler
            .process_partial(Some(&[remaining][..]), None)
            .map_err(resample_err)?;
        output.extend_from_slice(&resampled[0]);
    }
    while output.len() < delay + expected_len {
        let resampled = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(resample_err)?;
        if resampled[0].is_empty() {
            break;
        }
        output.extend_from_slice(&resampled[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected_len);
    Ok(output)
}

/// Scales so the loudest sample has magnitude 1. Silent input is left alone.
pub fn peak_normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 0.0 {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

/// Averages per-frame embeddings into one `EMBEDDING_DIM` vector.
pub fn mean_pool(frames: &Array2<f32>) -> Result<Array1<f32>, ExtractionError> {
    if frames.ncols() != EMBEDDING_DIM {
        return Err(ExtractionError::Shape(format!(
            "embedding model produced width {}, expected {EMBEDDING_DIM}",
            frames.ncols()
        )));
    }
    frames
        .mean_axis(Axis(0))
        .ok_or_else(|| ExtractionError::Shape("embedding model produced no frames".into()))
}

/// Pooled embedding plus what the decoder saw, for logging.
#[derive(Debug)]
pub struct AudioFeatures {
    pub embedding: Array1<f32>,
    pub duration_s: f32,
    pub frames: usize,
}

/// Decodes an upload into a 16 kHz mono waveform.
pub fn load_waveform(
    bytes: &[u8],
    filename: &str,
    tmp_dir: Option<&Path>,
) -> Result<Vec<f32>, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::EmptyWaveform);
    }
    let spooled = SpooledUpload::create(bytes, filename, tmp_dir)?;
    let decoded = decode_file(spooled.path())?;
    drop(spooled);

    let mono = decoded.to_mono();
    debug!(
        filename,
        channels = decoded.channels,
        sample_rate = decoded.sample_rate,
        samples = mono.len(),
        "audio decoded"
    );
    resample(&mono, decoded.sample_rate, AUDIO_SAMPLE_RATE)
}

pub fn embed_waveform(
    mut waveform: Vec<f32>,
    embedder: &dyn EmbeddingModel,
) -> Result<AudioFeatures, ExtractionError> {
    if waveform.is_empty() {
        return Err(ExtractionError::EmptyWaveform);
    }
    peak_normalize(&mut waveform);
    let frames = embedder.embed(&waveform)?;
    let embedding = mean_pool(&frames)?;
    Ok(AudioFeatures {
        embedding,
        duration_s: waveform.len() as f32 / AUDIO_SAMPLE_RATE as f32,
        frames: frames.nrows(),
    })
}

pub fn extract_audio_features(
    bytes: &[u8],
    filename: &str,
    tmp_dir: Option<&Path>,
    embedder: &dyn EmbeddingModel,
) -> Result<AudioFeatures, ExtractionError> {
    let waveform = load_waveform(bytes, filename, tmp_dir)?;
    embed_waveform(waveform, embedder)
}
