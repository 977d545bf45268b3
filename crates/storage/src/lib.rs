pub mod discovery;
pub mod error;
pub mod index_store;
pub mod object_store;

pub use discovery::{DataFile, DataFileDiscovery};
pub use error::{StoreError, StoreResult};
pub use index_store::{IndexLayout, IndexStore, SourceVersion, StoredIndex, FORMAT_VERSION};
pub use self::object_store::{create_gcs_store, create_object_store, create_s3_store};
