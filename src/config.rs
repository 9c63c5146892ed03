use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

#[cfg(feature = "tch-backend")]
use tch::Device;
#[cfg(feature = "tch-backend")]
use tracing::warn;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:3000",
    "http://localhost",
    "http://127.0.0.1:5173",
    "http://127.0.0.1:3000",
    "http://127.0.0.1",
];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub image_model_path: PathBuf,
    pub image_labels_path: PathBuf,
    pub audio_model_path: PathBuf,
    pub audio_label_encoder_path: PathBuf,
    pub audio_scaler_path: PathBuf,
    pub audio_embedding_model_path: PathBuf,
    /// Where uploaded audio is spooled for decoding; the system temp dir if unset.
    pub upload_tmp_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
    #[cfg(feature = "tch-backend")]
    pub device: Device,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            image_model_path: PathBuf::from("models/image/resnet50_instrument_classifier.pt"),
            image_labels_path: PathBuf::from("models/image/image_class_indices.json"),
            audio_model_path: PathBuf::from("models/audio/instrument_classifier.pt"),
            audio_label_encoder_path: PathBuf::from("models/audio/label_encoder.json"),
            audio_scaler_path: PathBuf::from("models/audio/scaler.json"),
            audio_embedding_model_path: PathBuf::from("models/audio/yamnet.pt"),
            upload_tmp_dir: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            #[cfg(feature = "tch-backend")]
            device: Device::Cpu,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let listen_addr = env::var("SERVER_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.listen_addr);

        let path = |key: &str, fallback: PathBuf| {
            env::var(key).map(PathBuf::from).unwrap_or(fallback)
        };

        let image_model_path = path("IMAGE_MODEL_PATH", defaults.image_model_path);
        let image_labels_path = path("IMAGE_LABELS_PATH", defaults.image_labels_path);
        let audio_model_path = path("AUDIO_MODEL_PATH", defaults.audio_model_path);
        let audio_label_encoder_path =
            path("AUDIO_LABEL_ENCODER_PATH", defaults.audio_label_encoder_path);
        let audio_scaler_path = path("AUDIO_SCALER_PATH", defaults.audio_scaler_path);
        let audio_embedding_model_path = path(
            "AUDIO_EMBEDDING_MODEL_PATH",
            defaults.audio_embedding_model_path,
        );

        let upload_tmp_dir = env::var("UPLOAD_TMP_DIR").ok().map(PathBuf::from);

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_upload_bytes);

        let cors_origins = env::var("CORS_ORIGINS")
            .ok()
            .map(|raw| parse_origins(&raw))
            .unwrap_or(defaults.cors_origins);

        #[cfg(feature = "tch-backend")]
        let device = env::var("DEVICE")
            .map(|raw| parse_device(&raw, tch::Cuda::is_available()))
            .unwrap_or(Device::Cpu);

        Ok(Self {
            listen_addr,
            image_model_path,
            image_labels_path,
            audio_model_path,
            audio_label_encoder_path,
            audio_scaler_path,
            audio_embedding_model_path,
            upload_tmp_dir,
            max_upload_bytes,
            cors_origins,
            #[cfg(feature = "tch-backend")]
            device,
        })
    }
}

/// `cpu`, `cuda` or `cuda:<index>`. Falls back to the CPU when CUDA is asked
/// for but not present, or the value is not recognised.
#[cfg(feature = "tch-backend")]
fn parse_device(raw: &str, cuda_available: bool) -> Device {
    let raw = raw.trim().to_ascii_lowercase();
    let Some(rest) = raw.strip_prefix("cuda") else {
        if raw != "cpu" {
            warn!(device = %raw, "unknown DEVICE, using cpu");
        }
        return Device::Cpu;
    };
    let index = rest
        .strip_prefix(':')
        .and_then(|i| i.parse().ok())
        .unwrap_or(0);
    if cuda_available {
        Device::Cuda(index)
    } else {
        warn!(device = %raw, "CUDA not available, using cpu");
        Device::Cpu
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_models_dir() {
        let config = AppConfig::default();
        assert_eq!(config.listen_addr.port(), 8000);
        assert!(config.image_model_path.starts_with("models/image"));
        assert!(config.audio_scaler_path.starts_with("models/audio"));
        assert!(config.upload_tmp_dir.is_none());
        assert_eq!(config.cors_origins.len(), 6);
    }

    #[cfg(feature = "tch-backend")]
    #[test]
    fn device_names_resolve() {
        assert_eq!(parse_device("cpu", true), Device::Cpu);
        assert_eq!(parse_device(" CUDA:1 ", true), Device::Cuda(1));
        assert_eq!(parse_device("cuda", true), Device::Cuda(0));
        assert_eq!(parse_device("cuda:1", false), Device::Cpu);
        assert_eq!(parse_device("tpu", true), Device::Cpu);
    }

    #[test]
    fn origins_are_trimmed_and_filtered() {
        let origins = parse_origins(" http://a.test , ,http://b.test");
        assert_eq!(origins, vec!["http://a.test", "http://b.test"]);
    }
}
