//! Externalized HTML bodies ("alternates") and their per-feed id lists.
//!
//! Each feed keeps an oldest-first list of alternate ids in the store; the
//! HTML itself lives at `<alt_dir>/<id>.html`. The list and the directory may
//! drift apart (a crash between writes, manual cleanup). Every operation here
//! treats a missing file as already removed.

use std::collections::HashSet;
use std::path::PathBuf;

use log::{debug, error, info, warn};

use crate::error::StoreError;
use crate::feed::{random_token, remove_artifact, write_artifact};
use crate::store::{KvStore, StoreName, read_json, write_json};

pub type AlternateId = String;

pub const ALTERNATE_ID_LEN: usize = 30;

pub struct AlternateCache<'a> {
    store: &'a dyn KvStore,
    alt_dir: PathBuf,
}

impl<'a> AlternateCache<'a> {
    pub fn new(store: &'a dyn KvStore, alt_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            alt_dir: alt_dir.into(),
        }
    }

    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.alt_dir.join(format!("{id}.html"))
    }

    /// Oldest-first ids stored for the feed.
    pub fn ids(&self, feed_name: &str) -> Result<Vec<AlternateId>, StoreError> {
        Ok(read_json(self.store, StoreName::Alternates, feed_name)?.unwrap_or_default())
    }

    /// Every id listed by any feed.
    pub fn all_ids(&self) -> Result<HashSet<AlternateId>, StoreError> {
        let mut all = HashSet::new();
        for feed_name in self.store.keys(StoreName::Alternates)? {
            all.extend(self.ids(&feed_name)?);
        }
        Ok(all)
    }

    /// A fresh id unused by every feed and by `reserved`.
    pub fn generate_id(&self, reserved: &HashSet<AlternateId>) -> Result<AlternateId, StoreError> {
        let taken = self.all_ids()?;
        loop {
            let id = random_token(ALTERNATE_ID_LEN);
            if !taken.contains(&id) && !reserved.contains(&id) {
                return Ok(id);
            }
            debug!("Alternate id collision on {id}; regenerating");
        }
    }

    /// Write `html` under a new id without recording it in any feed's list.
    ///
    /// A failed file write is logged and the id is still returned.
    pub fn stage(
        &self,
        html: &str,
        reserved: &HashSet<AlternateId>,
    ) -> Result<AlternateId, StoreError> {
        let id = self.generate_id(reserved)?;
        if let Err(e) = write_artifact(&self.artifact_path(&id), html.as_bytes()) {
            error!("Failed to write alternate page {id}: {e}");
        }
        Ok(id)
    }

    /// Externalize `html` for the feed and append its id to the feed's list.
    pub fn store(&self, feed_name: &str, html: &str) -> Result<AlternateId, StoreError> {
        let id = self.stage(html, &HashSet::new())?;
        let mut ids = self.ids(feed_name)?;
        ids.push(id.clone());
        write_json(self.store, StoreName::Alternates, feed_name, &ids)?;
        Ok(id)
    }

    /// Drop the oldest ids beyond `max_count`, deleting their pages.
    pub fn evict(&self, feed_name: &str, max_count: usize) -> Result<Vec<AlternateId>, StoreError> {
        let mut ids = self.ids(feed_name)?;
        if ids.len() <= max_count {
            return Ok(Vec::new());
        }

        let kept = ids.split_off(ids.len() - max_count);
        let evicted = ids;
        for id in &evicted {
            self.remove_page(feed_name, id);
        }
        write_json(self.store, StoreName::Alternates, feed_name, &kept)?;

        info!(
            "Evicted {} alternate pages for feed '{}', {} kept",
            evicted.len(),
            feed_name,
            kept.len()
        );
        Ok(evicted)
    }

    /// Delete every page listed for the feed and the list itself.
    /// Returns how many pages were listed. An undecodable list is still
    /// deleted; its pages are left for the orphan page sweep.
    pub fn purge(&self, feed_name: &str) -> Result<usize, StoreError> {
        let ids = match self.ids(feed_name) {
            Ok(ids) => ids,
            Err(e @ StoreError::Corrupt { .. }) => {
                warn!("Dropping unreadable alternate list of feed '{feed_name}': {e}");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        for id in &ids {
            self.remove_page(feed_name, id);
        }
        self.store.delete(StoreName::Alternates, feed_name)?;
        Ok(ids.len())
    }

    fn remove_page(&self, feed_name: &str, id: &str) {
        match remove_artifact(&self.artifact_path(id)) {
            Ok(true) => debug!("Removed alternate page {id} for feed '{feed_name}'"),
            Ok(false) => warn!("Alternate page {id} for feed '{feed_name}' was already gone"),
            Err(e) => error!("{e}"),
        }
    }
}
