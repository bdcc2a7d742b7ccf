//! Blob gateway: S3-compatible object storage for originals, clips,
//! thumbnails and subtitle files.
//!
//! Keys are constructed deterministically per job (see [`keys`]); the
//! gateway issues time-limited pre-authorized upload URLs so clients never
//! hold bucket credentials.

pub mod client;
pub mod error;
pub mod keys;

pub use client::{BlobStore, S3Config, UploadGrant};
pub use error::{StorageError, StorageResult};
pub use keys::{clip_key, object_ext, subtitle_key, thumbnail_key, upload_key};
