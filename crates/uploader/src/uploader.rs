//! CsvUploader - moves finished CSV files to the object store

use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::time::Duration;

use contracts::CsvConfig;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, UploadError};
use crate::store::ObjectStore;

/// Outcome of one or more upload passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Files stored and removed locally
    pub uploaded: u64,
    /// Files left in place for the next pass
    pub failed: u64,
    pub bytes: u64,
}

impl AddAssign for UploadReport {
    fn add_assign(&mut self, other: Self) {
        self.uploaded += other.uploaded;
        self.failed += other.failed;
        self.bytes += other.bytes;
    }
}

/// Uploads the closed files of one CSV sink directory
pub struct CsvUploader<S> {
    store: S,
    csv: CsvConfig,
    key_prefix: String,
    totals: UploadReport,
}

impl<S: ObjectStore> CsvUploader<S> {
    /// Upload the files `csv` writes, from `csv.file_path`
    pub fn new(store: S, csv: &CsvConfig) -> Self {
        Self {
            store,
            csv: csv.clone(),
            key_prefix: String::new(),
            totals: UploadReport::default(),
        }
    }

    /// Look for files in `dir` instead of the sink's directory
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.csv.file_path = dir.into();
        self
    }

    /// Prepend `prefix` to every object key
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.csv.file_path
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sum of every pass so far
    pub fn totals(&self) -> UploadReport {
        self.totals
    }

    /// Finished files in name order, which is creation order
    pub async fn pending_files(&self) -> Result<Vec<PathBuf>> {
        let list_error = |source| UploadError::List {
            path: self.dir().display().to_string(),
            source,
        };
        let mut entries = tokio::fs::read_dir(self.dir()).await.map_err(list_error)?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
            let name = entry.file_name();
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if is_file && name.to_str().is_some_and(|n| self.csv.is_finished_file(n)) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Upload every pending file once
    ///
    /// A failed file stays where it is and is retried by the next pass; the
    /// remaining files are still attempted.
    ///
    /// # Errors
    /// `List` when the directory cannot be read.
    #[instrument(name = "upload_pass", skip(self), fields(store = %self.store.name()))]
    pub async fn upload_pending(&mut self) -> Result<UploadReport> {
        let files = self.pending_files().await?;
        let mut report = UploadReport::default();

        for path in files {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let key = format!("{}{}", self.key_prefix, file_name);

            let body = match tokio::fs::read(&path).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "cannot read file, skipped");
                    report.failed += 1;
                    continue;
                }
            };
            let size = body.len() as u64;

            if let Err(e) = self.store.put(&key, body).await {
                error!(file = %path.display(), error = %e, "upload failed, file kept");
                report.failed += 1;
                continue;
            }

            report.uploaded += 1;
            report.bytes += size;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(file = %path.display(), key = %key, "uploaded and removed"),
                Err(e) => warn!(file = %path.display(), error = %e, "uploaded but not removed"),
            }
        }

        ::metrics::counter!("smartmeter_upload_files_total", "result" => "ok").increment(report.uploaded);
        ::metrics::counter!("smartmeter_upload_files_total", "result" => "failed").increment(report.failed);
        if report.uploaded > 0 || report.failed > 0 {
            info!(uploaded = report.uploaded, failed = report.failed, bytes = report.bytes, "upload pass done");
        }

        self.totals += report;
        Ok(report)
    }
}

impl<S: ObjectStore + Sync + 'static> CsvUploader<S> {
    /// Run an upload pass every `period` on its own task
    pub fn spawn_periodic(self, period: Duration) -> UploadTask<S> {
        let (stop_tx, stop_rx) = oneshot::channel();
        info!(dir = %self.dir().display(), period_secs = period.as_secs(), "periodic upload started");
        UploadTask {
            stop: stop_tx,
            handle: tokio::spawn(self.run_periodic(period, stop_rx)),
        }
    }

    async fn run_periodic(mut self, period: Duration, mut stop: oneshot::Receiver<()>) -> Self {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.upload_pending().await {
                        warn!(error = %e, "upload pass failed");
                    }
                }
            }
        }
        self
    }
}

/// Periodic uploader running next to the pipeline
pub struct UploadTask<S> {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<CsvUploader<S>>,
}

impl<S: ObjectStore + Sync + 'static> UploadTask<S> {
    /// Stop after the pass in progress, then upload what is left
    ///
    /// Call after the CSV sink closed, so its last file goes too.
    pub async fn finish(self) -> UploadReport {
        let _ = self.stop.send(());
        let mut uploader = match self.handle.await {
            Ok(uploader) => uploader,
            Err(e) => {
                error!(error = %e, "upload task failed");
                return UploadReport::default();
            }
        };
        if let Err(e) = uploader.upload_pending().await {
            warn!(error = %e, "final upload pass failed");
        }
        uploader.totals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Keeps objects in memory; puts to a key in `failing` are refused
    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<BTreeMap<String, Vec<u8>>>,
        failing: Mutex<Vec<String>>,
    }

    impl MemoryStore {
        fn failing(keys: &[&str]) -> Self {
            Self {
                failing: Mutex::new(keys.iter().map(|k| k.to_string()).collect()),
                ..Default::default()
            }
        }

        fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }
    }

    impl ObjectStore for MemoryStore {
        fn name(&self) -> &str {
            "memory"
        }

        async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
            if self.failing.lock().unwrap().iter().any(|k| k == key) {
                return Err(UploadError::store(key, "HTTP 503"));
            }
            self.objects.lock().unwrap().insert(key.to_string(), body);
            Ok(())
        }
    }

    fn csv_config(dir: &Path) -> CsvConfig {
        CsvConfig {
            enabled: true,
            file_prefix: "meter".into(),
            file_path: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_uploads_finished_files_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("meter_20240601_120000.csv"), "a\n1\n").unwrap();
        fs::write(dir.path().join("meter_20240601_120500.csv"), "a\n2\n").unwrap();
        fs::write(dir.path().join(".wip__meter_20240601_121000.csv"), "a\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();
        fs::create_dir(dir.path().join("meter_old.csv")).unwrap();

        let mut uploader = CsvUploader::new(MemoryStore::default(), &csv_config(dir.path()));
        let report = uploader.upload_pending().await.unwrap();

        assert_eq!(report.uploaded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.bytes, 8);
        assert_eq!(
            uploader.store().keys(),
            vec!["meter_20240601_120000.csv", "meter_20240601_120500.csv"]
        );
        assert_eq!(
            names(dir.path()),
            vec![".wip__meter_20240601_121000.csv", "meter_old.csv", "notes.txt"]
        );
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_file_for_next_pass() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("meter_1.csv"), "x").unwrap();
        fs::write(dir.path().join("meter_2.csv"), "y").unwrap();

        let store = MemoryStore::failing(&["meter_1.csv"]);
        let mut uploader = CsvUploader::new(store, &csv_config(dir.path()));

        let report = uploader.upload_pending().await.unwrap();
        assert_eq!((report.uploaded, report.failed), (1, 1));
        assert_eq!(names(dir.path()), vec!["meter_1.csv"]);

        uploader.store().heal();
        let report = uploader.upload_pending().await.unwrap();
        assert_eq!((report.uploaded, report.failed), (1, 0));
        assert!(names(dir.path()).is_empty());
        assert_eq!(uploader.totals().uploaded, 2);
        assert_eq!(uploader.totals().failed, 1);
    }

    #[tokio::test]
    async fn test_key_prefix_and_dir_override() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("meter_1.csv"), "x").unwrap();

        let mut uploader = CsvUploader::new(MemoryStore::default(), &csv_config(Path::new("/nonexistent")))
            .with_dir(dir.path())
            .with_key_prefix("site-a/");
        uploader.upload_pending().await.unwrap();

        assert_eq!(uploader.store().keys(), vec!["site-a/meter_1.csv"]);
    }

    #[tokio::test]
    async fn test_missing_dir_is_list_error() {
        let mut uploader = CsvUploader::new(MemoryStore::default(), &csv_config(Path::new("/nonexistent/csv")));
        let err = uploader.upload_pending().await.unwrap_err();
        assert!(matches!(err, UploadError::List { .. }));
    }

    #[tokio::test]
    async fn test_periodic_upload_and_final_pass() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("meter_1.csv"), "x").unwrap();

        let uploader = CsvUploader::new(MemoryStore::default(), &csv_config(dir.path()));
        let task = uploader.spawn_periodic(Duration::from_millis(20));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while dir.path().join("meter_1.csv").exists() {
            assert!(std::time::Instant::now() < deadline, "periodic pass never ran");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // closed late, picked up by a tick or by the final pass
        fs::write(dir.path().join("meter_2.csv"), "yy").unwrap();
        let totals = task.finish().await;

        assert_eq!(totals.uploaded, 2);
        assert_eq!(totals.bytes, 3);
        assert!(names(dir.path()).is_empty());
    }
}
