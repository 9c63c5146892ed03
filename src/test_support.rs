//! Fake models and media fixtures shared by the unit tests.

use std::{io::Cursor, sync::Arc};

use ::image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use bytes::Bytes;
use ndarray::{Array2, ArrayViewD};
use parking_lot::Mutex;

use crate::model::{
    AudioArtifacts, ClassifierModel, EMBEDDING_DIM, EmbeddingModel, ImageArtifacts, LabelEncoder,
    LabelMap, ModelError, ModelRegistry, ModelSlot, Scaler,
};

pub struct FixedScores(pub Vec<f32>);

impl ClassifierModel for FixedScores {
    fn predict(&self, _input: ArrayViewD<'_, f32>) -> Result<Vec<f32>, ModelError> {
        Ok(self.0.clone())
    }
}

pub struct Failing;

impl ClassifierModel for Failing {
    fn predict(&self, _input: ArrayViewD<'_, f32>) -> Result<Vec<f32>, ModelError> {
        Err(ModelError::Inference("fixture failure".into()))
    }
}

/// Keeps a copy of the last input it was given.
pub struct Recording {
    pub seen: Arc<Mutex<Vec<f32>>>,
    pub scores: Vec<f32>,
}

impl ClassifierModel for Recording {
    fn predict(&self, input: ArrayViewD<'_, f32>) -> Result<Vec<f32>, ModelError> {
        *self.seen.lock() = input.iter().copied().collect();
        Ok(self.scores.clone())
    }
}

/// One all-zero frame per 0.48 s of audio.
pub struct ZeroEmbedder;

impl EmbeddingModel for ZeroEmbedder {
    fn embed(&self, waveform: &[f32]) -> Result<Array2<f32>, ModelError> {
        let frames = waveform.len().div_ceil(7_680).max(1);
        Ok(Array2::zeros((frames, EMBEDDING_DIM)))
    }
}

pub fn image_labels() -> LabelMap {
    LabelMap::from_labels(vec!["drum".into(), "guitar".into(), "violin".into()]).unwrap()
}

pub fn audio_encoder() -> LabelEncoder {
    LabelEncoder::new(vec!["cello".into(), "flute".into(), "harp".into()]).unwrap()
}

fn image_slot(classifier: Box<dyn ClassifierModel>) -> ModelSlot<ImageArtifacts> {
    ModelSlot::Loaded(Arc::new(ImageArtifacts {
        classifier,
        labels: image_labels(),
    }))
}

fn audio_slot(
    classifier: Box<dyn ClassifierModel>,
    scaler: Option<Scaler>,
    label_encoder: Option<LabelEncoder>,
) -> ModelSlot<AudioArtifacts> {
    ModelSlot::Loaded(Arc::new(AudioArtifacts {
        classifier,
        embedder: Box::new(ZeroEmbedder),
        scaler,
        label_encoder,
    }))
}

pub fn registry(image_scores: Vec<f32>, audio_scores: Vec<f32>) -> Arc<ModelRegistry> {
    Arc::new(ModelRegistry::from_parts(
        image_slot(Box::new(FixedScores(image_scores))),
        audio_slot(Box::new(FixedScores(audio_scores)), None, Some(audio_encoder())),
    ))
}

pub fn registry_without_image() -> Arc<ModelRegistry> {
    Arc::new(ModelRegistry::from_parts(
        ModelSlot::Unavailable("image.pt missing".into()),
        audio_slot(Box::new(FixedScores(vec![1.0])), None, Some(audio_encoder())),
    ))
}

pub fn registry_without_audio() -> Arc<ModelRegistry> {
    Arc::new(ModelRegistry::from_parts(
        image_slot(Box::new(FixedScores(vec![0.0, 1.0]))),
        ModelSlot::Unavailable("audio.pt missing".into()),
    ))
}

pub fn registry_bare_audio(audio_scores: Vec<f32>) -> Arc<ModelRegistry> {
    Arc::new(ModelRegistry::from_parts(
        ModelSlot::Unavailable("not needed".into()),
        audio_slot(Box::new(FixedScores(audio_scores)), None, None),
    ))
}

pub fn registry_recording_audio_input() -> (Arc<ModelRegistry>, Arc<Mutex<Vec<f32>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let classifier = Recording {
        seen: seen.clone(),
        scores: vec![0.4, 0.6],
    };
    let scaler = Scaler::new(vec![1.0; EMBEDDING_DIM], vec![2.0; EMBEDDING_DIM]).unwrap();
    let registry = Arc::new(ModelRegistry::from_parts(
        ModelSlot::Unavailable("not needed".into()),
        audio_slot(Box::new(classifier), Some(scaler), Some(audio_encoder())),
    ));
    (registry, seen)
}

pub fn failing_registry() -> Arc<ModelRegistry> {
    Arc::new(ModelRegistry::from_parts(
        image_slot(Box::new(Failing)),
        audio_slot(Box::new(Failing), None, None),
    ))
}

pub fn png_bytes() -> Bytes {
    let img = RgbImage::from_pixel(64, 48, Rgb([180, 120, 60]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    Bytes::from(buf.into_inner())
}

/// 16-bit PCM WAV.
pub fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Two seconds of silence at 16 kHz.
pub fn silent_wav() -> Bytes {
    Bytes::from(wav_bytes(&vec![0i16; 32_000], 16_000, 1))
}
