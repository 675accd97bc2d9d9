//! Tracks which mail ids have already become entries in each feed.

use std::collections::BTreeSet;

use log::debug;

use crate::domain::mail::MailId;
use crate::error::StoreError;
use crate::store::{KvStore, StoreName, read_json, write_json};

/// Mail ids already merged into one feed.
pub type SeenMailIds = BTreeSet<MailId>;

pub struct DedupIndex<'a> {
    store: &'a dyn KvStore,
}

impl<'a> DedupIndex<'a> {
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self { store }
    }

    /// All ids seen for the feed. No record means nothing seen yet; a failed
    /// read is an error, never an empty set.
    pub fn seen(&self, feed_name: &str) -> Result<SeenMailIds, StoreError> {
        Ok(read_json(self.store, StoreName::SeenMail, feed_name)?.unwrap_or_default())
    }

    pub fn is_new(&self, feed_name: &str, mail_id: MailId) -> Result<bool, StoreError> {
        Ok(!self.seen(feed_name)?.contains(&mail_id))
    }

    /// Extends the stored set for the feed.
    pub fn mark_seen(
        &self,
        feed_name: &str,
        mail_ids: impl IntoIterator<Item = MailId>,
    ) -> Result<(), StoreError> {
        let merged = self.extended(feed_name, mail_ids)?;
        write_json(self.store, StoreName::SeenMail, feed_name, &merged)?;
        debug!("Stored {} seen mail ids for feed '{}'", merged.len(), feed_name);
        Ok(())
    }

    /// The stored set plus `mail_ids`, without writing it.
    pub fn extended(
        &self,
        feed_name: &str,
        mail_ids: impl IntoIterator<Item = MailId>,
    ) -> Result<SeenMailIds, StoreError> {
        let mut seen = self.seen(feed_name)?;
        seen.extend(mail_ids);
        Ok(seen)
    }
}
