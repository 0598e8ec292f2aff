//! # Uploader
//!
//! Moves finished CSV files into an S3-compatible bucket.
//!
//! - picks `<prefix>_*.csv` files, never the `.wip__` file still being written
//! - deletes a local file only after its upload succeeded
//! - runs once (`smartmeter upload`) or periodically next to the pipeline

mod error;
mod store;
mod uploader;

pub use error::{Result, UploadError};
pub use store::{LocalObjectStore, ObjectStore, S3Store, StoreCredentials, ACCESS_KEY_ENV, SECRET_KEY_ENV};
pub use uploader::{CsvUploader, UploadReport, UploadTask};
