use anyhow::{Context, Result};
use config_rs::{Config as ConfigBuilder, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides, e.g. `RGPRUNE_SCAN__PARALLELISM=4`
pub const ENV_PREFIX: &str = "RGPRUNE";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where data files and indexes live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Worker pool and dataset layout
    #[serde(default)]
    pub scan: ScanConfig,

    /// Footer statistics extraction
    #[serde(default)]
    pub extract: ExtractConfig,
}

/// Object store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local filesystem rooted at `storage.root`
    #[default]
    Local,
    S3,
    Gcs,
    /// Process-local store, empty at startup
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory for the local backend
    #[serde(default = "default_root")]
    pub root: String,

    /// Dataset prefix within the store (e.g. "warehouse/sales")
    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub s3: S3Config,

    #[serde(default)]
    pub gcs: GcsConfig,
}

/// Configuration for S3-compatible object storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 endpoint URL (e.g., "http://localhost:9000")
    /// Optional - if not provided, uses the default endpoint for the region
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub bucket: String,

    /// AWS region (required but ignored by Minio)
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default)]
    pub secret_access_key: String,

    /// S3 session token (optional, for temporary credentials)
    #[serde(default)]
    pub session_token: Option<String>,

    /// Allow HTTP connections (true for Minio, false for AWS S3)
    #[serde(default)]
    pub allow_http: bool,

    /// Use the AWS credential chain via AmazonS3Builder::from_env()
    #[serde(default)]
    pub use_env_credentials: bool,

    /// Maximum number of idle connections per host (default: 30)
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// Pool idle timeout in seconds (default: 120)
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
}

/// Configuration for Google Cloud Storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcsConfig {
    #[serde(default)]
    pub bucket: String,

    /// Path to a service account JSON key
    #[serde(default)]
    pub service_account_path: Option<String>,

    /// Use GOOGLE_* environment credentials via GoogleCloudStorageBuilder::from_env()
    #[serde(default)]
    pub use_env_credentials: bool,
}

/// What happens to in-flight files when a scan is cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelMode {
    /// Let running files finish
    #[default]
    Drain,
    /// Abort running files immediately
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Concurrent files; 0 uses the available parallelism
    #[serde(default)]
    pub parallelism: usize,

    /// Only objects ending with this suffix are treated as data files
    #[serde(default = "default_data_suffix")]
    pub data_suffix: String,

    /// Sibling directory holding the per-file indexes
    #[serde(default = "default_index_dir")]
    pub index_dir: String,

    #[serde(default)]
    pub cancel_policy: CancelMode,

    /// Rows per record batch when fetching
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Record columns without orderable statistics as bound-less instead of failing the file
    #[serde(default)]
    pub skip_unsupported_columns: bool,
}

// Default value functions
fn default_root() -> String {
    ".".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_pool_max_idle_per_host() -> usize {
    30
}

fn default_pool_idle_timeout() -> u64 {
    120
}

fn default_data_suffix() -> String {
    ".parquet".to_string()
}

fn default_index_dir() -> String {
    "metadata".to_string()
}

fn default_batch_size() -> usize {
    8192
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: default_root(),
            prefix: String::new(),
            s3: S3Config::default(),
            gcs: GcsConfig::default(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            region: default_region(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: None,
            allow_http: false,
            use_env_credentials: false,
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            parallelism: 0,
            data_suffix: default_data_suffix(),
            index_dir: default_index_dir(),
            cancel_policy: CancelMode::default(),
            batch_size: default_batch_size(),
        }
    }
}

impl Config {
    /// Load Config with layered configuration priority:
    /// 1. Default values
    /// 2. TOML file (if provided)
    /// 3. Environment variables (`RGPRUNE_<SECTION>__<KEY>`, e.g. `RGPRUNE_STORAGE__S3__BUCKET`)
    /// 4. Explicit AWS credentials from environment (fallback for empty credentials)
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut app_config = Self::build(config_file, None)?;

        // Fallback: If credentials are still empty, try AWS_* environment variables
        if app_config.storage.s3.access_key_id.is_empty() {
            if let Ok(key) = std::env::var("AWS_ACCESS_KEY_ID") {
                app_config.storage.s3.access_key_id = key;
            }
        }

        if app_config.storage.s3.secret_access_key.is_empty() {
            if let Ok(secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
                app_config.storage.s3.secret_access_key = secret;
            }
        }

        if app_config.storage.s3.session_token.is_none() {
            if let Ok(token) = std::env::var("AWS_SESSION_TOKEN") {
                app_config.storage.s3.session_token = Some(token);
            }
        }

        Ok(app_config)
    }

    /// Layers defaults, file and environment. `env` replaces the process
    /// environment when given.
    fn build(config_file: Option<&str>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            // Storage defaults
            .set_default("storage.backend", "local")?
            .set_default("storage.root", default_root())?
            .set_default("storage.prefix", "")?
            .set_default("storage.s3.region", default_region())?
            .set_default("storage.s3.allow_http", false)?
            .set_default("storage.s3.use_env_credentials", false)?
            .set_default("storage.s3.pool_max_idle_per_host", 30)?
            .set_default("storage.s3.pool_idle_timeout_secs", 120)?
            .set_default("storage.gcs.use_env_credentials", false)?
            // Scan defaults
            .set_default("scan.parallelism", 0)?
            .set_default("scan.data_suffix", default_data_suffix())?
            .set_default("scan.index_dir", default_index_dir())?
            .set_default("scan.cancel_policy", "drain")?
            .set_default("scan.batch_size", 8192)?
            // Extract defaults
            .set_default("extract.skip_unsupported_columns", false)?;

        if let Some(file_path) = config_file {
            let path = Path::new(file_path);
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Load Config from a TOML file
    ///
    /// Environment variables can still override values from the file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_string_lossy();
        Self::load(Some(&path))
    }

    /// Create a new Config from environment variables with defaults
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        self.scan.validate()?;
        Ok(())
    }
}

impl StorageConfig {
    /// Validate the settings of the selected backend only
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            StorageBackend::Local => {
                anyhow::ensure!(!self.root.is_empty(), "Local storage root cannot be empty");
            }
            StorageBackend::S3 => self.s3.validate()?,
            StorageBackend::Gcs => self.gcs.validate()?,
            StorageBackend::Memory => {}
        }
        Ok(())
    }
}

impl S3Config {
    /// Validate the S3 configuration
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.bucket.is_empty(), "S3 bucket cannot be empty");

        // If not using env credentials, validate that credentials are provided
        if !self.use_env_credentials {
            anyhow::ensure!(
                !self.access_key_id.is_empty(),
                "S3 access key ID cannot be empty (unless use_env_credentials=true)"
            );
            anyhow::ensure!(
                !self.secret_access_key.is_empty(),
                "S3 secret access key cannot be empty (unless use_env_credentials=true)"
            );
        }

        Ok(())
    }
}

impl GcsConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.bucket.is_empty(), "GCS bucket cannot be empty");
        anyhow::ensure!(
            self.use_env_credentials || self.service_account_path.is_some(),
            "GCS needs service_account_path or use_env_credentials=true"
        );
        Ok(())
    }
}

impl ScanConfig {
    /// Worker count after resolving 0 to the machine's available parallelism
    pub fn effective_parallelism(&self) -> usize {
        if self.parallelism > 0 {
            self.parallelism
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.batch_size > 0, "Batch size must be positive");
        anyhow::ensure!(!self.index_dir.is_empty(), "Index directory cannot be empty");
        anyhow::ensure!(
            !self.index_dir.contains('/'),
            "Index directory must be a single path segment, got {}",
            self.index_dir
        );
        Ok(())
    }
}
