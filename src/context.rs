// `RuntimeContext` bundles the services configured once at startup and shared across the
// sequential runner, the parallel scheduler, and watch mode (spec §4.7). Grounded on the teacher's
// `Settings`/shared-state bundle threaded through `run` in `main.rs`.

use crate::{cache::Cache, env::Environment};
use std::path::PathBuf;

pub struct RuntimeContext {
    pub environment: Environment,
    pub cache: Cache,
    pub working_dir: PathBuf,
    pub dry_run: bool,
    pub verbose: bool,
    pub auto_yes: bool,
    pub watch_mode: bool,
    pub jobs: usize,
}

impl RuntimeContext {
    #[must_use]
    pub fn new(working_dir: PathBuf, cache: Cache) -> Self {
        Self {
            environment: Environment::from_process(),
            cache,
            working_dir,
            dry_run: false,
            verbose: false,
            auto_yes: false,
            watch_mode: false,
            jobs: num_cpus(),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn for_test() -> Self {
        Self {
            environment: Environment::default(),
            cache: Cache::in_memory(),
            working_dir: PathBuf::from("."),
            dry_run: false,
            verbose: false,
            auto_yes: false,
            watch_mode: false,
            jobs: 1,
        }
    }
}

#[must_use]
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}
