// The content-addressed freshness cache (spec §4.6). Recipes and file targets are keyed by a
// SHA-256 fingerprint of their declared inputs, not by mtime, and the fingerprint table is
// persisted to `.jake/cache` with atomic temp-file-then-rename writes (grounded on the teacher's
// own `tempfile`-based atomic-write idiom).

use crate::failure::{system_error, Failure};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

pub const CACHE_DIR: &str = ".jake";
pub const CACHE_FILE: &str = "cache";

// Entries live behind an `Arc<Mutex<..>>` so a `Cache` can be cheaply cloned and shared across the
// parallel scheduler's worker threads (spec §5: "the runtime cache... [is] internally synchronized
// for the parallel worker path") while sequential and watch mode keep using it as an owned value.
#[derive(Clone)]
pub struct Cache {
    path: Option<PathBuf>,
    entries: Arc<Mutex<HashMap<String, String>>>,
    dirty: Arc<AtomicBool>,
}

impl Cache {
    // Loads `<root>/.jake/cache` if present; a missing file means every recipe starts out stale.
    pub fn load(root: &Path) -> Result<Self, Failure> {
        let path = root.join(CACHE_DIR).join(CACHE_FILE);

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(system_error(&format!("Couldn't read cache file `{}`.", path.display())))?;
            parse_cache_file(&contents)
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: Some(path),
            entries: Arc::new(Mutex::new(entries)),
            dirty: Arc::new(AtomicBool::new(false)),
        })
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Arc::new(Mutex::new(HashMap::new())),
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    // Computes the fingerprint of a recipe invocation (spec §3 CacheEntry, §4.8 `@cache`
    // semantics): SHA-256 over the sorted, concatenated SHA-256 of every resolved input file's
    // bytes, plus the recipe name and any extra key material (e.g. resolved parameter values) so
    // two differently-parameterized invocations of the same recipe never collide.
    #[must_use]
    pub fn fingerprint(recipe_name: &str, inputs: &[PathBuf], extra: &[String]) -> String {
        let mut file_hashes: Vec<String> = inputs
            .iter()
            .map(|input| {
                let contents = fs::read(input).unwrap_or_default();
                let mut hasher = Sha256::new();
                hasher.update(&contents);
                hex::encode(hasher.finalize())
            })
            .collect();
        file_hashes.sort();

        let mut hasher = Sha256::new();
        hasher.update(recipe_name.as_bytes());
        for hash in &file_hashes {
            hasher.update(hash.as_bytes());
        }
        for item in extra {
            hasher.update(item.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    #[must_use]
    pub fn is_fresh(&self, key: &str, fingerprint: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .is_some_and(|stored| stored == fingerprint)
    }

    pub fn record(&self, key: &str, fingerprint: &str) {
        self.entries.lock().unwrap().insert(key.to_owned(), fingerprint.to_owned());
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn invalidate(&self, key: &str) {
        if self.entries.lock().unwrap().remove(key).is_some() {
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    // Persists the cache atomically: write to a sibling temp file, then rename over the real
    // path. A failure here is reported as a non-fatal `IOError` (spec §9 resolution) so watch mode
    // can keep running even if the cache directory becomes briefly unwritable.
    pub fn persist(&self) -> Result<(), crate::failure::ErrorKind> {
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(());
        }

        let Some(path) = &self.path else {
            self.dirty.store(false, Ordering::SeqCst);
            return Ok(());
        };

        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let result = (|| -> std::io::Result<()> {
            fs::create_dir_all(dir)?;
            let mut temp = tempfile::NamedTempFile::new_in(dir)?;
            let entries = self.entries.lock().unwrap();
            let mut sorted: Vec<_> = entries.iter().collect();
            sorted.sort();
            for (key, fingerprint) in sorted {
                writeln!(temp, "{}\t{}", key, fingerprint)?;
            }
            drop(entries);
            temp.persist(path).map_err(|e| e.error)?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => Err(crate::failure::ErrorKind::IOError {
                message: format!("Couldn't persist cache file `{}`: {}.", path.display(), err),
                fatal: false,
            }),
        }
    }
}

fn parse_cache_file(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(key, fingerprint)| (key.to_owned(), fingerprint.to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_cache_file, Cache};

    #[test]
    fn fingerprint_is_pure() {
        assert_eq!(
            Cache::fingerprint("build", &[], &[]),
            Cache::fingerprint("build", &[], &[])
        );
    }

    #[test]
    fn fingerprint_differs_by_name() {
        assert_ne!(Cache::fingerprint("build", &[], &[]), Cache::fingerprint("test", &[], &[]));
    }

    #[test]
    fn fresh_when_fingerprint_matches() {
        let cache = Cache::in_memory();
        cache.record("build", "abc123");
        assert!(cache.is_fresh("build", "abc123"));
        assert!(!cache.is_fresh("build", "def456"));
    }

    #[test]
    fn stale_when_not_recorded() {
        let cache = Cache::in_memory();
        assert!(!cache.is_fresh("build", "abc123"));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = Cache::in_memory();
        cache.record("build", "abc123");
        cache.invalidate("build");
        assert!(!cache.is_fresh("build", "abc123"));
    }

    #[test]
    fn cloned_cache_shares_entries_with_original() {
        let cache = Cache::in_memory();
        let clone = cache.clone();
        clone.record("build", "abc123");
        assert!(cache.is_fresh("build", "abc123"));
    }

    #[test]
    fn parse_cache_file_round_trip() {
        let parsed = parse_cache_file("build\tabc123\ntest\tdef456\n");
        assert_eq!(parsed.get("build"), Some(&"abc123".to_owned()));
        assert_eq!(parsed.get("test"), Some(&"def456".to_owned()));
    }
}
