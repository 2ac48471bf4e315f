//! Persistence of per-dork result files and the combined aggregate file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::aggregator::AggregateResults;
use crate::{DorkError, Result};

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RESULT_FILE_SUFFIX: &str = "_results.json";

/// Longest file stem kept verbatim. Longer stems are cut and tagged with a
/// hash so the full name stays under the common 255-byte limit.
const MAX_STEM_BYTES: usize = 200;

const TEMP_PREFIX: &str = ".";
const TEMP_SUFFIX: &str = ".tmp";

/// Replaces every character in `<>:"/\|?*` with `_`. All other characters,
/// and the character count, are preserved.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Sanitized stem for a dork's result file, shortened when too long.
fn file_stem(dork: &str) -> String {
    let sanitized = sanitize_filename(dork);
    if sanitized.len() <= MAX_STEM_BYTES {
        return sanitized;
    }

    let tag = format!("-{:016x}", fnv1a(dork.as_bytes()));
    let mut end = MAX_STEM_BYTES - tag.len();
    while !sanitized.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &sanitized[..end], tag)
}

/// 64-bit FNV-1a; stable across runs and toolchains.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Writes `contents` to a temporary sibling of `path`, then renames it into
/// place, so readers see either the old file or the new one.
///
/// The write runs on the blocking pool and always finishes once started, so
/// a cancelled caller never leaves the temporary file behind.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            tokio::fs::create_dir_all(parent).await?;
            parent.to_path_buf()
        }
        _ => PathBuf::from("."),
    };

    let path = path.to_path_buf();
    let contents = contents.to_vec();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&parent)?;
        tmp.write_all(&contents)?;
        tmp.persist(&path).map_err(|e| DorkError::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| DorkError::Io(std::io::Error::other(e)))?
}

/// Deletes temporary files a killed process left in `dir`.
async fn remove_stale_temp_files(dir: &Path) -> Result<()> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX) {
            debug!("Removing stale temporary file {}", entry.path().display());
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                warn!("Failed to remove {}: {}", entry.path().display(), e);
            }
        }
    }
    Ok(())
}

/// Owns the aggregate map and writes every result file.
///
/// Aggregate updates are merge-then-persist under one lock, so concurrent
/// completions never lose each other's links and the file on disk always
/// matches some prefix of the merges.
pub struct ResultStore {
    results_dir: PathBuf,
    aggregate_path: PathBuf,
    aggregate: Mutex<AggregateResults>,
}

impl ResultStore {
    /// Creates the store, making `results_dir` if it does not exist and
    /// clearing temporary files left there by an earlier, killed run.
    pub async fn create(
        results_dir: impl Into<PathBuf>,
        aggregate_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let results_dir = results_dir.into();
        let aggregate_path = aggregate_path.into();
        tokio::fs::create_dir_all(&results_dir).await?;

        remove_stale_temp_files(&results_dir).await?;
        match aggregate_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && parent != results_dir => {
                remove_stale_temp_files(parent).await?
            }
            _ => {}
        }

        Ok(Self {
            results_dir,
            aggregate_path,
            aggregate: Mutex::new(AggregateResults::new()),
        })
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn aggregate_path(&self) -> &Path {
        &self.aggregate_path
    }

    /// Path of the per-dork result file.
    ///
    /// Stems longer than 200 bytes are truncated and suffixed with a hash of
    /// the full dork.
    pub fn result_path(&self, dork: &str) -> PathBuf {
        self.results_dir
            .join(format!("{}{}", file_stem(dork), RESULT_FILE_SUFFIX))
    }

    /// Overwrites the dork's result file with `{dork: links}`.
    pub async fn record_per_query(&self, dork: &str, links: &[String]) -> Result<PathBuf> {
        let path = self.result_path(dork);
        let mut body = BTreeMap::new();
        body.insert(dork, links);
        write_atomic(&path, &serde_json::to_vec_pretty(&body)?).await?;
        debug!("Saved {} results for '{}' to {}", links.len(), dork, path.display());
        Ok(path)
    }

    /// Unions `links` into the aggregate and rewrites the aggregate file.
    pub async fn merge_aggregate(&self, dork: &str, links: &[String]) -> Result<()> {
        let mut aggregate = self.aggregate.lock().await;
        aggregate.merge(dork, links.iter().cloned());
        let bytes = serde_json::to_vec_pretty(&*aggregate)?;
        write_atomic(&self.aggregate_path, &bytes).await
    }

    /// Records one completed dork in its per-query file and the aggregate.
    ///
    /// The aggregate is merged even when the per-query write fails; that
    /// failure is still returned.
    pub async fn record(&self, dork: &str, links: &[String]) -> Result<PathBuf> {
        let per_query = self.record_per_query(dork, links).await;
        self.merge_aggregate(dork, links).await?;
        per_query
    }

    /// Rewrites the aggregate file from memory.
    pub async fn flush(&self) -> Result<()> {
        let aggregate = self.aggregate.lock().await;
        let bytes = serde_json::to_vec_pretty(&*aggregate)?;
        write_atomic(&self.aggregate_path, &bytes).await
    }

    /// Copy of the in-memory aggregate.
    pub async fn snapshot(&self) -> AggregateResults {
        self.aggregate.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn links(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sanitize_filename_replaces_invalid() {
        assert_eq!(
            sanitize_filename(r#"inurl:"admin"/login?x=*|<a>\b"#),
            "inurl__admin__login_x=___a__b"
        );
    }

    #[test]
    fn test_sanitize_filename_preserves_everything_else() {
        let input = "intitle:índex of — ファイル site:example.com";
        let out = sanitize_filename(input);
        assert_eq!(out.chars().count(), input.chars().count());
        for (a, b) in input.chars().zip(out.chars()) {
            if INVALID_FILENAME_CHARS.contains(&a) {
                assert_eq!(b, '_');
            } else {
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_sanitize_filename_is_pure() {
        let s = "filetype:pdf \"confidential\"";
        assert_eq!(sanitize_filename(s), sanitize_filename(s));
        assert_eq!(sanitize_filename(""), "");
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_record_per_query_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::create(dir.path().join("results"), dir.path().join("all.json"))
            .await
            .unwrap();

        store.record_per_query("inurl:admin", &links(&["https://a.com"])).await.unwrap();
        let path = store
            .record_per_query("inurl:admin", &links(&["https://b.com", "https://c.com"]))
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("results").join("inurl_admin_results.json"));
        let body: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(body["inurl:admin"], links(&["https://b.com", "https://c.com"]));
    }

    #[tokio::test]
    async fn test_merge_aggregate_persists_union() {
        let dir = tempfile::tempdir().unwrap();
        let aggregate_path = dir.path().join("all.json");
        let store = ResultStore::create(dir.path().join("results"), &aggregate_path)
            .await
            .unwrap();

        store.merge_aggregate("d", &links(&["https://a.com"])).await.unwrap();
        store.merge_aggregate("d", &links(&["https://a.com", "https://b.com"])).await.unwrap();

        let on_disk: AggregateResults =
            serde_json::from_str(&std::fs::read_to_string(&aggregate_path).unwrap()).unwrap();
        assert_eq!(on_disk, store.snapshot().await);
        assert_eq!(on_disk.get("d").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_merges_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let aggregate_path = dir.path().join("all.json");
        let store = Arc::new(
            ResultStore::create(dir.path().join("results"), &aggregate_path)
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let dork = format!("dork-{}", i % 4);
                let link = format!("https://example.com/{}", i);
                store.merge_aggregate(&dork, &[link]).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 4);
        let total: usize = snapshot.iter().map(|(_, links)| links.len()).sum();
        assert_eq!(total, 32);

        let on_disk: AggregateResults =
            serde_json::from_str(&std::fs::read_to_string(&aggregate_path).unwrap()).unwrap();
        assert_eq!(on_disk, snapshot);
    }

    #[test]
    fn test_file_stem_keeps_short_names() {
        assert_eq!(file_stem("inurl:admin"), "inurl_admin");
        assert_eq!(file_stem(&"a".repeat(200)), "a".repeat(200));
    }

    #[test]
    fn test_file_stem_shortens_long_names() {
        let a = format!("{}a", "x".repeat(300));
        let b = format!("{}b", "x".repeat(300));
        assert!(file_stem(&a).len() <= MAX_STEM_BYTES);
        assert!(file_stem(&a).starts_with("xxxx"));
        assert_ne!(file_stem(&a), file_stem(&b));
        assert_eq!(file_stem(&a), file_stem(&a));

        // Multi-byte characters are never split.
        let wide = "ファイル".repeat(40);
        assert!(file_stem(&wide).len() <= MAX_STEM_BYTES);
    }

    #[tokio::test]
    async fn test_record_long_dork_reaches_file_and_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let aggregate_path = dir.path().join("all.json");
        let store = ResultStore::create(dir.path().join("results"), &aggregate_path)
            .await
            .unwrap();

        let dork = "x".repeat(230);
        let path = store.record(&dork, &links(&["https://a.com"])).await.unwrap();

        assert!(path.file_name().unwrap().len() < 255);
        let body: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(body[&dork], links(&["https://a.com"]));

        let on_disk: AggregateResults =
            serde_json::from_str(&std::fs::read_to_string(&aggregate_path).unwrap()).unwrap();
        assert_eq!(on_disk.dorks().collect::<Vec<_>>(), vec![dork.as_str()]);
    }

    #[tokio::test]
    async fn test_record_merges_aggregate_when_result_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let results_dir = dir.path().join("results");
        let store = ResultStore::create(&results_dir, dir.path().join("all.json"))
            .await
            .unwrap();

        // A directory where the result file should go makes the rename fail.
        std::fs::create_dir(store.result_path("blocked")).unwrap();

        let result = store.record("blocked", &links(&["https://a.com"])).await;
        assert!(result.is_err());
        assert_eq!(store.snapshot().await.get("blocked").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_removes_stale_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let results_dir = dir.path().join("results");
        std::fs::create_dir_all(&results_dir).unwrap();
        std::fs::write(results_dir.join(".abc123.tmp"), "partial").unwrap();
        std::fs::write(dir.path().join(".def456.tmp"), "partial").unwrap();
        std::fs::write(results_dir.join("kept_results.json"), "{}").unwrap();

        ResultStore::create(&results_dir, dir.path().join("all.json"))
            .await
            .unwrap();

        assert!(!results_dir.join(".abc123.tmp").exists());
        assert!(!dir.path().join(".def456.tmp").exists());
        assert!(results_dir.join("kept_results.json").exists());
    }

    #[tokio::test]
    async fn test_flush_writes_empty_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let aggregate_path = dir.path().join("all.json");
        let store = ResultStore::create(dir.path().join("results"), &aggregate_path)
            .await
            .unwrap();
        store.flush().await.unwrap();
        assert_eq!(std::fs::read_to_string(&aggregate_path).unwrap(), "{}");
    }
}
