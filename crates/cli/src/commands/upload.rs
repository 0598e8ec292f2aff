//! `upload` command implementation.

use anyhow::{Context, Result};
use contracts::{ApplianceConfig, CsvConfig, UploadConfig};
use tracing::info;
use uploader::{CsvUploader, S3Store, StoreCredentials};

use crate::cli::UploadArgs;
use crate::error::CliError;

/// Execute the `upload` command
pub async fn run_upload(args: &UploadArgs) -> Result<()> {
    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }
    let appliance = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let (upload, csv) = upload_settings(args, &appliance)?;

    let credentials = StoreCredentials::from_env().context("Missing object store credentials")?;
    let store = S3Store::new(&upload, &credentials)?;
    let mut uploader = CsvUploader::new(store, &csv).with_key_prefix(&upload.key_prefix);

    info!(
        dir = %csv.file_path.display(),
        bucket = %upload.bucket,
        endpoint = %upload.endpoint_url(),
        "Uploading finished CSV files"
    );
    let report = uploader.upload_pending().await?;
    println!(
        "Uploaded {} file(s), {} bytes; {} failed",
        report.uploaded, report.bytes, report.failed
    );

    if report.failed > 0 {
        return Err(CliError::UploadIncomplete {
            failed: report.failed,
        }
        .into());
    }
    Ok(())
}

/// `[upload]` and `[csv]` with the command line overrides applied
fn upload_settings(args: &UploadArgs, appliance: &ApplianceConfig) -> Result<(UploadConfig, CsvConfig), CliError> {
    let mut upload = appliance.upload.clone();
    if let Some(bucket) = &args.bucket {
        upload.bucket.clone_from(bucket);
    }
    if let Some(endpoint) = &args.endpoint {
        upload.endpoint.clone_from(endpoint);
    }
    let mut csv = appliance.csv.clone();
    if let Some(dir) = &args.directory {
        csv.file_path.clone_from(dir);
    }

    if upload.bucket.trim().is_empty() {
        return Err(CliError::invalid_argument("--bucket", "no bucket given and `[upload] bucket` is empty"));
    }
    if csv.file_path.as_os_str().is_empty() {
        return Err(CliError::invalid_argument(
            "--directory",
            "no directory given and `[csv] file_path` is empty",
        ));
    }
    Ok((upload, csv))
}
