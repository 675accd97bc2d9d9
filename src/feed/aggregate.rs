//! One feed's generation cycle: load, merge, publish, persist.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::config::{Config, FeedConfig, Paths};
use crate::domain::mail::{MailField, MailId, MailMessage};
use crate::error::{CycleError, StoreError};
use crate::feed::alternates::{AlternateCache, AlternateId};
use crate::feed::dedup::{DedupIndex, SeenMailIds};
use crate::feed::document::{EntryBody, FeedDocument};
use crate::feed::random_token;
use crate::mail::{FetchRequest, MailFilter, MailSource};
use crate::store::{KvStore, StoreName, WriteBatch, read_json, to_json};

pub const ID_NOT_FOUND: &str = "ID_NOT_FOUND";
pub const SUBJECT_NOT_FOUND: &str = "SUBJECT_NOT_FOUND";
pub const MAIL_BODY_NOT_FOUND: &str = "MAIL_BODY_NOT_FOUND";
pub const FALLBACK_SUFFIX_LEN: usize = 10;

/// Shared collaborators for every cycle in a sweep.
pub struct CycleContext<'a> {
    pub config: &'a Config,
    pub paths: &'a Paths,
    pub store: &'a dyn KvStore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub feed_name: String,
    pub added: usize,
    pub evicted: usize,
}

pub struct FeedAggregate<'a> {
    name: String,
    feed: &'a FeedConfig,
    paths: &'a Paths,
    store: &'a dyn KvStore,
    document: FeedDocument,
    seen: SeenMailIds,
    pending_seen: Vec<MailId>,
    pending_alternates: Vec<AlternateId>,
}

impl<'a> FeedAggregate<'a> {
    /// Read the stored document and seen ids, or start a fresh document.
    pub fn load(ctx: &CycleContext<'a>, feed_name: &str) -> Result<Self, CycleError> {
        let feed = ctx.config.feed(feed_name)?;
        let document = match read_json(ctx.store, StoreName::Feeds, feed_name)? {
            Some(doc) => doc,
            None => {
                info!("No stored document for feed '{feed_name}'; creating one");
                FeedDocument::new(feed_name, feed, Utc::now())
            }
        };
        let seen = DedupIndex::new(ctx.store).seen(feed_name)?;

        Ok(Self {
            name: feed_name.to_string(),
            feed,
            paths: ctx.paths,
            store: ctx.store,
            document,
            seen,
            pending_seen: Vec::new(),
            pending_alternates: Vec::new(),
        })
    }

    pub fn document(&self) -> &FeedDocument {
        &self.document
    }

    fn alternates(&self) -> AlternateCache<'a> {
        AlternateCache::new(self.store, self.paths.alt_dir.clone())
    }

    fn is_new(&self, mail_id: MailId) -> bool {
        !self.seen.contains(&mail_id) && !self.pending_seen.contains(&mail_id)
    }

    /// Add an entry for every unseen mail, oldest id first so the newest ends
    /// up at the top. Stops at the first store failure; entries added before
    /// it stay in the document.
    pub fn merge(&mut self, mails: BTreeMap<MailId, MailMessage>) -> Result<usize, StoreError> {
        let mut added = 0;
        for (mail_id, mail) in mails {
            if !self.is_new(mail_id) {
                debug!("Mail {} already in feed '{}'", mail_id, self.name);
                continue;
            }
            self.add_entry(mail_id, &mail)?;
            added += 1;
        }
        if added > 0 {
            info!("Added {} entries to feed '{}'", added, self.name);
        }
        Ok(added)
    }

    fn add_entry(&mut self, mail_id: MailId, mail: &MailMessage) -> Result<(), StoreError> {
        let feed = self.feed;
        let info = &feed.feed_info;
        let tag_base = format!(
            "tag:{},{}/feeds/{}.xml",
            info.fqdn,
            Utc::now().format("%Y-%m-%d"),
            self.name
        );

        let entry_id = match mail.field(MailField::MessageId) {
            Ok(message_id) => format!("{tag_base}:{message_id}"),
            Err(e) => {
                warn!("Mail {} in feed '{}': {e}", mail_id, self.name);
                format!("{tag_base}:{}", fallback(ID_NOT_FOUND))
            }
        };

        let title = match mail.field(MailField::Subject) {
            Ok(subject) => subject.to_string(),
            Err(e) => {
                warn!("Mail {} in feed '{}': {e}", mail_id, self.name);
                fallback(SUBJECT_NOT_FOUND)
            }
        };

        let body = match mail.field(MailField::Body) {
            Ok(html) => {
                let reserved: HashSet<AlternateId> =
                    self.pending_alternates.iter().cloned().collect();
                let alt_id = self.alternates().stage(html, &reserved)?;
                let link = info.url(&format!("alt/{alt_id}.html"));
                self.pending_alternates.push(alt_id);
                EntryBody::Alternate {
                    link,
                    html: html.to_string(),
                }
            }
            Err(e) => {
                warn!("Mail {} in feed '{}': {e}", mail_id, self.name);
                EntryBody::Missing {
                    text: MAIL_BODY_NOT_FOUND.to_string(),
                }
            }
        };

        self.document.add_entry(entry_id, title, body, Utc::now());
        self.pending_seen.push(mail_id);
        Ok(())
    }

    /// Write the Atom file. Failures are logged; stored state is unaffected.
    pub fn publish(&self) {
        let path = self.paths.feed_file(&self.name);
        match self.document.publish(&path) {
            Ok(()) => debug!("Wrote feed '{}' to {}", self.name, path.display()),
            Err(e) => error!("Failed to publish feed '{}': {e}", self.name),
        }
    }

    /// Store the document, alternate ids and seen ids in one batch, then
    /// apply the feed's alternate cache bound. Returns the eviction count.
    pub fn persist(&mut self) -> Result<usize, StoreError> {
        let alternates = self.alternates();
        let mut batch = WriteBatch::new();
        batch.put(
            StoreName::Feeds,
            self.name.clone(),
            to_json(StoreName::Feeds, &self.document)?,
        );

        if !self.pending_alternates.is_empty() {
            let mut ids = alternates.ids(&self.name)?;
            ids.extend(self.pending_alternates.iter().cloned());
            batch.put(
                StoreName::Alternates,
                self.name.clone(),
                to_json(StoreName::Alternates, &ids)?,
            );
        }

        if !self.pending_seen.is_empty() {
            let seen = DedupIndex::new(self.store)
                .extended(&self.name, self.pending_seen.iter().copied())?;
            batch.put(
                StoreName::SeenMail,
                self.name.clone(),
                to_json(StoreName::SeenMail, &seen)?,
            );
        }

        self.store.commit(batch)?;
        self.seen.extend(self.pending_seen.drain(..));
        self.pending_alternates.clear();
        info!("Feed '{}' stored ({} entries)", self.name, self.document.len());

        let evicted = alternates.evict(&self.name, self.feed.alternate_cache)?;
        Ok(evicted.len())
    }
}

fn fallback(prefix: &str) -> String {
    format!("{prefix}-{}", random_token(FALLBACK_SUFFIX_LEN))
}

/// Run one full cycle for `feed_name`.
///
/// A fetch failure abandons the cycle before anything is written. Once
/// merging starts, the document and seen ids are persisted even if merging
/// stops early.
pub fn run_cycle(
    ctx: &CycleContext<'_>,
    feed_name: &str,
    source: &dyn MailSource,
) -> Result<CycleOutcome, CycleError> {
    let feed = ctx.config.feed(feed_name)?;
    let account = ctx.config.account_for(feed_name)?;
    let filter = MailFilter::compile(feed_name, &feed.filters)?;

    let mut aggregate = FeedAggregate::load(ctx, feed_name)?;

    let request = FetchRequest {
        account_name: &feed.account_name,
        account,
        folder: &feed.folder,
        filter: &filter,
        since_days: ctx.config.app.fetch_window_days,
    };
    let mails = source.fetch(&request)?;

    let merged = aggregate.merge(mails);
    aggregate.publish();
    let persisted = aggregate.persist();

    match (merged, persisted) {
        (Ok(added), Ok(evicted)) => Ok(CycleOutcome {
            feed_name: feed_name.to_string(),
            added,
            evicted,
        }),
        (Err(e), Ok(_)) => Err(e.into()),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(merge_err), Err(e)) => {
            error!("Merge for feed '{feed_name}' also failed: {merge_err}");
            Err(e.into())
        }
    }
}
