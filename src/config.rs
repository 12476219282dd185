use std::path::Path;

use anyhow::{anyhow, Context};
use hashbrown::HashMap;
use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::storage::backends::BackendConfigs;

static CONFIG: OnceCell<RuntimeConfig> = OnceCell::new();

/// Loads the runtime config from the given file.
///
/// YAML or JSON is selected by the file extension.
pub async fn init(config_file: &Path) -> anyhow::Result<()> {
    let data = tokio::fs::read_to_string(config_file)
        .await
        .with_context(|| format!("failed to read config file {:?}", config_file))?;

    let cfg = match config_file.extension().and_then(|v| v.to_str()) {
        Some("yaml") | Some("yml") => RuntimeConfig::from_yaml(&data)?,
        Some("json") => serde_json::from_str(&data)?,
        _ => {
            return Err(anyhow!(
                "config file must have a .yaml, .yml or .json extension"
            ))
        }
    };

    CONFIG
        .set(cfg)
        .map_err(|_| anyhow!("config has already been initialised"))?;

    Ok(())
}

#[inline]
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get().expect("config init before first access")
}

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// The set storage backend configuration.
    pub backend: BackendConfigs,

    /// An optional cap on the number of upload batches processed
    /// at once across the whole server.
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// A set of upload profile configs.
    ///
    /// Each profile represents one call site of the parent application
    /// (complaint threads, message threads, amenities) and carries its
    /// own limits, compression bound and directory pair.
    pub profiles: HashMap<String, ProfileConfig>,
}

impl RuntimeConfig {
    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(data).map_err(anyhow::Error::from)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_max_file_size")]
    /// The maximum accepted size of a single file in bytes.
    ///
    /// Defaults to 10 MiB.
    pub max_file_size: usize,

    #[serde(default = "default_max_files")]
    /// The maximum number of files accepted in one upload batch.
    ///
    /// Defaults to `10`.
    pub max_files: usize,

    #[serde(default = "ImageKind::default_allowed")]
    /// The set of image formats the profile accepts.
    pub allowed_types: Vec<ImageKind>,

    #[serde(default)]
    /// The maximum dimensions of the compressed copy.
    ///
    /// Images already within the bound are re-encoded but never
    /// upscaled.
    pub bound: Bound,

    #[serde(default = "default_quality")]
    /// The JPEG quality used for the compressed copy.
    pub quality: u8,

    #[serde(default = "default_concurrency")]
    /// How many files of one batch may be processed at once.
    pub concurrency: usize,

    #[serde(default = "default_timeout_secs")]
    /// How long a single file may spend in decode/resize/encode
    /// before the batch is failed.
    pub processing_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Bound {
    pub width: u32,
    pub height: u32,
}

impl Default for Bound {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 1200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageKind {
    /// Maps a declared content type onto a supported image kind.
    ///
    /// `image/jpg` is accepted as an alias of `image/jpeg` as several
    /// mobile clients still send it.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let parsed: mime::Mime = content_type.parse().ok()?;

        if parsed.type_() != mime::IMAGE {
            return None;
        }

        match parsed.subtype().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn as_file_extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    pub fn as_content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    pub fn default_allowed() -> Vec<Self> {
        vec![Self::Jpeg, Self::Png, Self::Gif, Self::Webp]
    }
}

const fn default_port() -> u16 {
    8000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

const fn default_max_files() -> usize {
    10
}

const fn default_quality() -> u8 {
    80
}

const fn default_concurrency() -> usize {
    4
}

const fn default_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(
            ImageKind::from_content_type("image/jpeg"),
            Some(ImageKind::Jpeg),
        );
        assert_eq!(
            ImageKind::from_content_type("image/jpg"),
            Some(ImageKind::Jpeg),
        );
        assert_eq!(
            ImageKind::from_content_type("IMAGE/PNG"),
            Some(ImageKind::Png),
        );
        assert_eq!(
            ImageKind::from_content_type("image/webp; charset=binary"),
            Some(ImageKind::Webp),
        );
        assert_eq!(ImageKind::from_content_type("application/pdf"), None);
        assert_eq!(ImageKind::from_content_type("not a mime"), None);
    }

    #[test]
    fn test_profile_defaults() {
        let cfg = RuntimeConfig::from_yaml(
            r#"
backend:
  filesystem:
    directory: /tmp/atrium-data
profiles:
  complaints: {}
  messages:
    max_files: 5
    bound:
      width: 800
      height: 800
"#,
        )
        .expect("config should parse");

        let complaints = &cfg.profiles["complaints"];
        assert_eq!(complaints.max_file_size, 10 * 1024 * 1024);
        assert_eq!(complaints.max_files, 10);
        assert_eq!(complaints.quality, 80);
        assert_eq!(complaints.bound.width, 1200);

        let messages = &cfg.profiles["messages"];
        assert_eq!(messages.max_files, 5);
        assert_eq!(messages.bound.width, 800);
        assert_eq!(messages.bound.height, 800);
    }
}
