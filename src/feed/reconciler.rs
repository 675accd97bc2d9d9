//! Removes state left behind by feeds that are no longer configured.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::config::Paths;
use crate::error::StoreError;
use crate::feed::alternates::AlternateCache;
use crate::feed::remove_artifact;
use crate::store::{KvStore, StoreName};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Orphaned keys removed, per store.
    pub removed: BTreeMap<StoreName, usize>,
    /// Feed XML and temp files with no configured feed behind them.
    pub stray_files: usize,
    /// Alternate pages and leftover temp files no feed refers to.
    pub stray_pages: usize,
    pub failures: usize,
}

impl PruneReport {
    pub fn removed_from(&self, store: StoreName) -> usize {
        self.removed.get(&store).copied().unwrap_or(0)
    }

    pub fn total_removed(&self) -> usize {
        self.removed.values().sum::<usize>() + self.stray_files + self.stray_pages
    }

    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

pub struct Reconciler<'a> {
    store: &'a dyn KvStore,
    paths: &'a Paths,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn KvStore, paths: &'a Paths) -> Self {
        Self { store, paths }
    }

    /// Delete every stored key and generated file whose feed is not in
    /// `configured`. A failing store or key is logged and skipped.
    pub fn prune_orphans(&self, configured: &BTreeSet<String>) -> PruneReport {
        let mut report = PruneReport::default();

        for name in StoreName::ALL {
            let orphans: Vec<String> = match self.store.keys(name) {
                Ok(keys) => keys.difference(configured).cloned().collect(),
                Err(e) => {
                    error!("Cannot list store '{name}' for pruning: {e}");
                    report.failures += 1;
                    continue;
                }
            };

            for feed_name in orphans {
                match self.prune_key(name, &feed_name) {
                    Ok(()) => {
                        info!("Pruned feed '{feed_name}' from store '{name}'");
                        *report.removed.entry(name).or_default() += 1;
                    }
                    Err(e) => {
                        error!("Failed to prune feed '{feed_name}' from store '{name}': {e}");
                        report.failures += 1;
                    }
                }
            }
        }

        self.remove_stray_feed_files(configured, &mut report);
        self.remove_stray_pages(&mut report);

        if report.total_removed() > 0 || !report.is_clean() {
            info!(
                "Prune finished: {} removed, {} failures",
                report.total_removed(),
                report.failures
            );
        } else {
            debug!("Prune finished: nothing to remove");
        }
        report
    }

    fn prune_key(&self, name: StoreName, feed_name: &str) -> Result<(), StoreError> {
        match name {
            StoreName::Feeds => {
                self.store.delete(name, feed_name)?;
                remove_file(&self.paths.feed_file(feed_name));
            }
            StoreName::Alternates => {
                let pages = AlternateCache::new(self.store, self.paths.alt_dir.clone())
                    .purge(feed_name)?;
                debug!("Removed {pages} alternate pages of feed '{feed_name}'");
            }
            StoreName::SeenMail => self.store.delete(name, feed_name)?,
        }
        Ok(())
    }

    fn remove_stray_feed_files(&self, configured: &BTreeSet<String>, report: &mut PruneReport) {
        let Some(paths) = list_dir(&self.paths.feed_dir, report) else {
            return;
        };
        for path in paths {
            let keep = match extension(&path) {
                Some("xml") => stem(&path).is_some_and(|s| configured.contains(s)),
                Some("tmp") => false,
                _ => true,
            };
            if !keep {
                remove_stray(&path, &mut report.stray_files, &mut report.failures);
            }
        }
    }

    /// Pages in the alternate directory that no feed's list mentions. Skipped
    /// entirely when any list cannot be read.
    fn remove_stray_pages(&self, report: &mut PruneReport) {
        let listed = match AlternateCache::new(self.store, self.paths.alt_dir.clone()).all_ids() {
            Ok(ids) => ids,
            Err(e) => {
                error!("Cannot read alternate lists; keeping unlisted pages: {e}");
                report.failures += 1;
                return;
            }
        };
        let Some(paths) = list_dir(&self.paths.alt_dir, report) else {
            return;
        };
        for path in paths {
            let keep = match extension(&path) {
                Some("html") => stem(&path).is_some_and(|s| listed.contains(s)),
                Some("tmp") => false,
                _ => true,
            };
            if !keep {
                remove_stray(&path, &mut report.stray_pages, &mut report.failures);
            }
        }
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

fn stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// Regular files in `dir`; `None` when it cannot be listed.
fn list_dir(dir: &Path, report: &mut PruneReport) -> Option<Vec<PathBuf>> {
    match fs::read_dir(dir) {
        Ok(entries) => Some(
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect(),
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            error!("Cannot list {}: {e}", dir.display());
            report.failures += 1;
            None
        }
    }
}

fn remove_stray(path: &Path, removed: &mut usize, failures: &mut usize) {
    match remove_artifact(path) {
        Ok(_) => {
            info!("Removed stray file {}", path.display());
            *removed += 1;
        }
        Err(e) => {
            error!("{e}");
            *failures += 1;
        }
    }
}

fn remove_file(path: &Path) {
    match remove_artifact(path) {
        Ok(true) => debug!("Removed {}", path.display()),
        Ok(false) => warn!("{} was already gone", path.display()),
        Err(e) => error!("{e}"),
    }
}
