use config::{GcsConfig, S3Config, StorageBackend, StorageConfig};
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{ClientOptions, ObjectStore, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Create the object store selected by `config.backend`
pub fn create_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config.backend {
        StorageBackend::Local => {
            info!("Using local filesystem store rooted at {}", config.root);
            Arc::new(LocalFileSystem::new_with_prefix(&config.root)?)
        }
        StorageBackend::S3 => create_s3_store(&config.s3)?,
        StorageBackend::Gcs => create_gcs_store(&config.gcs)?,
        StorageBackend::Memory => {
            info!("Using in-memory store");
            Arc::new(InMemory::new())
        }
    };

    Ok(store)
}

/// Create an S3-compatible object store from configuration
pub fn create_s3_store(config: &S3Config) -> Result<Arc<dyn ObjectStore>> {
    // Configure HTTP client options with connection pool settings
    let client_options = ClientOptions::new()
        .with_pool_max_idle_per_host(config.pool_max_idle_per_host)
        .with_pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs));

    let mut builder = if config.use_env_credentials {
        info!("Using AWS environment credential chain");
        AmazonS3Builder::from_env()
    } else {
        AmazonS3Builder::new()
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
    };

    builder = builder
        .with_bucket_name(&config.bucket)
        .with_region(&config.region)
        .with_client_options(client_options);

    // Only set endpoint if explicitly provided (AWS uses default regional endpoints)
    if !config.endpoint.is_empty() {
        builder = builder.with_endpoint(&config.endpoint);
    }

    if config.allow_http {
        builder = builder.with_allow_http(true);
    }

    if let Some(token) = &config.session_token {
        builder = builder.with_token(token);
    }

    Ok(Arc::new(builder.build()?))
}

/// Create a Google Cloud Storage object store from configuration
pub fn create_gcs_store(config: &GcsConfig) -> Result<Arc<dyn ObjectStore>> {
    let mut builder = if config.use_env_credentials {
        info!("Using GCS environment credentials");
        GoogleCloudStorageBuilder::from_env()
    } else {
        GoogleCloudStorageBuilder::new()
    };

    builder = builder.with_bucket_name(&config.bucket);
    if let Some(path) = &config.service_account_path {
        builder = builder.with_service_account_path(path);
    }

    Ok(Arc::new(builder.build()?))
}
