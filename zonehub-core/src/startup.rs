//! Boot-time zone directory scan: every `*.json` under the configured
//! root is decoded and validated; invalid files are logged and
//! skipped rather than blocking startup. Lazy activation in the cache
//! picks up valid files as they're first queried or mutated.

use std::path::{Path, PathBuf};

use zonehub_proto::zone::{validate_zone, Zone};

pub struct ScanReport {
    pub valid: usize,
    pub invalid: usize,
}

pub async fn scan_zones_folder(root: &Path) -> ScanReport {
    let mut report = ScanReport { valid: 0, invalid: 0 };
    let mut files = Vec::new();
    collect_json_files(root, &mut files).await;
    files.sort();

    for path in files {
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<Zone>(&data) {
                Ok(zone) => match validate_zone(&zone) {
                    Ok(_) => report.valid += 1,
                    Err(e) => {
                        tracing::warn!(?path, error = %e, "zone file failed validation, skipping");
                        report.invalid += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!(?path, error = %e, "zone file is not valid JSON, skipping");
                    report.invalid += 1;
                }
            },
            Err(e) => {
                tracing::warn!(?path, error = %e, "could not read zone file, skipping");
                report.invalid += 1;
            }
        }
    }

    report
}

async fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!(?dir, error = %e, "could not read zones directory");
            return;
        }
    };

    while let Ok(Some(entry)) = reader.next_entry().await {
        let path = entry.path();
        if path.is_dir() {
            Box::pin(collect_json_files(&path, out)).await;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use serde_json::json;
    use zonehub_proto::zone::RawRecord;

    fn a_zone(name: &str) -> Zone {
        Zone {
            name: name.to_string(),
            version: Some(1),
            records: vec![RawRecord {
                name: None,
                rtype: json!("A"),
                class: None,
                ttl: Some(json!(300)),
                data: json!("1.2.3.4"),
            }],
        }
    }

    #[tokio::test]
    async fn counts_valid_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        storage.write("good.test", &a_zone("good.test")).await.unwrap();

        let bad_path = dir.path().join("bad.json");
        tokio::fs::write(&bad_path, b"not json").await.unwrap();

        let report = scan_zones_folder(dir.path()).await;
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 1);
    }

    #[tokio::test]
    async fn empty_directory_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let report = scan_zones_folder(dir.path()).await;
        assert_eq!(report.valid, 0);
        assert_eq!(report.invalid, 0);
    }
}
