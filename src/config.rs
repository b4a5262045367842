use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use snafu::prelude::*;

use crate::annotate::Annotator;
use crate::describe::{DescriptionError, OpenAiDescriber, VisionDescriber};
use crate::exam::{ContainerMap, ContainerMapError};
use crate::pipeline::SubmissionPipeline;
use crate::storage::{FilesystemObjectStore, ObjectStore, S3ObjectStore};
use crate::utils::S3Config;

/// Description stored for artifacts that are not images
pub const NON_IMAGE_PLACEHOLDER: &str = "Description not generated (non-image file).";

pub const DEFAULT_ROOT_DIR: &str = "./exam-storage";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// Invalid container mapping
    Containers { source: ContainerMapError },

    /// S3 backend requires s3Config to be provided
    MissingS3Config,

    /// Could not configure the description provider
    Describer { source: DescriptionError },
}

/// Storage backend type
#[napi(string_enum)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Local filesystem storage, served by ExamUploadServer
    Filesystem,
    /// S3-compatible object storage
    S3,
}

/// Storage configuration
#[napi(object)]
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Storage backend type
    pub backend: StorageBackend,
    /// Root directory for filesystem storage (default: "./exam-storage")
    pub root_dir: Option<String>,
    /// Base URL under which the upload server is reachable (default: "http://localhost:8080")
    pub public_base_url: Option<String>,
    /// S3 configuration (required if backend is S3)
    pub s3_config: Option<S3Config>,
}

/// Vision model configuration
#[napi(object)]
#[derive(Debug, Clone, Default)]
pub struct DescriberOptions {
    /// API key (default: OPENAI_API_KEY environment variable)
    pub api_key: Option<String>,
    /// Base URL of an OpenAI compatible API (default: "https://api.openai.com/v1")
    pub endpoint: Option<String>,
    /// Model name (default: "gpt-4o-mini")
    pub model: Option<String>,
    /// Maximum tokens of the description (default: 300)
    pub max_tokens: Option<u32>,
    /// Request timeout in seconds (default: 60)
    pub timeout_secs: Option<u32>,
}

/// Configuration of the exam intake pipeline.
///
/// @example
/// ```typescript
/// const intake = new ExamIntake({
///   containers: {
///     'OCT': 'oct-exams',
///     'Pentacam': 'pentacam-exams',
///     'Retinography': 'retinography-exams',
///     'Visual Field': 'visual-field-exams',
///     'Echography': 'echography-exams',
///     'Dry-Eye Topographer': 'dry-eye-exams',
///     'Epithelial Map': 'epithelial-map-exams',
///     'Biometer': 'biometer-exams'
///   },
///   storage: {
///     backend: 'S3',
///     s3Config: { accessKey: 'ACCESS_KEY', secretKey: 'SECRET_KEY', endpoint: 'http://localhost:9000' }
///   },
///   describer: { model: 'gpt-4o-mini' }
/// });
/// ```
#[napi(object)]
#[derive(Debug, Clone)]
pub struct ExamIntakeOptions {
    /// Enable verbose logging (default: false)
    pub verbose: Option<bool>,
    /// Container id per exam category, keyed by label ("Visual Field") or enum value ("VisualField")
    pub containers: HashMap<String, String>,
    /// Storage backend configuration
    pub storage: StorageOptions,
    /// Vision model configuration
    pub describer: Option<DescriberOptions>,
    /// Font file for annotations (default: DejaVuSans or another system font)
    pub font_path: Option<String>,
    /// Return image branch failures as errors instead of a degraded result (default: false)
    pub strict_image_branch: Option<bool>,
}

/// Pipeline settings that are not external collaborators
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub containers: ContainerMap,
    pub strict_image_branch: bool,
}

impl IntakeConfig {
    pub fn from_options(options: &ExamIntakeOptions) -> Result<Self, ConfigError> {
        let containers = ContainerMap::from_labels(&options.containers).context(ContainersSnafu)?;
        Ok(Self {
            containers,
            strict_image_branch: options.strict_image_branch.unwrap_or(false),
        })
    }
}

pub fn build_object_store(options: &StorageOptions) -> Result<Arc<dyn ObjectStore>, ConfigError> {
    match options.backend {
        StorageBackend::S3 => {
            let s3_config = options.s3_config.clone().context(MissingS3ConfigSnafu)?;
            Ok(Arc::new(S3ObjectStore::new(s3_config)))
        }
        StorageBackend::Filesystem => Ok(Arc::new(FilesystemObjectStore::new(
            options.root_dir.as_deref().unwrap_or(DEFAULT_ROOT_DIR),
            options.public_base_url.as_deref().unwrap_or(DEFAULT_PUBLIC_BASE_URL),
        ))),
    }
}

pub fn build_describer(options: Option<&DescriberOptions>) -> Result<Arc<dyn VisionDescriber>, ConfigError> {
    let options = options.cloned().unwrap_or_default();
    let api_key = options
        .api_key
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_default();

    let describer = OpenAiDescriber::new(
        &api_key,
        options.endpoint.as_deref(),
        options.model.as_deref(),
        options.max_tokens,
        options.timeout_secs.map(u64::from),
    )
    .context(DescriberSnafu)?;
    Ok(Arc::new(describer))
}

/// Assemble the production pipeline from JavaScript options
pub fn build_pipeline(options: &ExamIntakeOptions) -> Result<SubmissionPipeline, ConfigError> {
    let config = IntakeConfig::from_options(options)?;
    let store = build_object_store(&options.storage)?;
    let describer = build_describer(options.describer.as_ref())?;
    let annotator = Annotator::new(options.font_path.as_deref().map(Path::new));

    Ok(SubmissionPipeline::new(store, describer, Arc::new(annotator), config))
}
