//! Shared harness for mailfeed integration tests.
//!
//! Provides a temp-dir backed store and output tree, an in-memory mailbox
//! standing in for IMAP, and a store wrapper that fails reads on demand.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use tempfile::TempDir;

use mailfeed::config::{Config, Paths, parse_config};
use mailfeed::domain::mail::{MailId, MailMessage};
use mailfeed::error::{CycleError, FetchError, StoreError};
use mailfeed::feed::{CycleContext, CycleOutcome, run_cycle};
use mailfeed::mail::{FetchRequest, MailSource};
use mailfeed::store::{KvStore, SqliteStore, StoreName, WriteBatch};

pub const ACCOUNT: &str = r#"
[accounts.personal.server]
host = "mail.example.com"

[accounts.personal.auth]
auth_type = "login"
user = "me@example.com"
password = "secret"
"#;

/// TOML for one feed on the shared account.
pub fn feed_toml(name: &str, alternate_cache: usize) -> String {
    format!(
        r#"
[feeds.{name}]
account_name = "personal"
alternate_cache = {alternate_cache}

[feeds.{name}.feed_info]
fqdn = "feeds.example.com"
"#
    )
}

pub fn mail(message_id: &str, subject: &str, html: &str) -> MailMessage {
    MailMessage {
        message_id: Some(message_id.to_string()),
        subject: Some(subject.to_string()),
        from: Some("sender@example.com".to_string()),
        html_body: Some(html.to_string()),
        ..Default::default()
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub paths: Paths,
    pub store: SqliteStore,
}

impl TestHarness {
    /// Harness with the shared account and the given feed sections.
    pub fn new(feeds_toml: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let paths = Paths::new(temp_dir.path(), &temp_dir.path().join("static"));
        paths.make_run_dirs().expect("Failed to create run dirs");
        let store = SqliteStore::open(&paths.db_path).expect("Failed to open store");
        let config = parse_config(&format!("{ACCOUNT}{feeds_toml}")).expect("Invalid test config");
        Self {
            temp_dir,
            config,
            paths,
            store,
        }
    }

    pub fn with_feed(name: &str, alternate_cache: usize) -> Self {
        Self::new(&feed_toml(name, alternate_cache))
    }

    /// Swap in a new feed configuration, keeping the store and files.
    pub fn reconfigure(&mut self, feeds_toml: &str) {
        self.config =
            parse_config(&format!("{ACCOUNT}{feeds_toml}")).expect("Invalid test config");
    }

    pub fn ctx(&self) -> CycleContext<'_> {
        CycleContext {
            config: &self.config,
            paths: &self.paths,
            store: &self.store,
        }
    }

    pub fn cycle(&self, feed_name: &str, source: &dyn MailSource) -> Result<CycleOutcome, CycleError> {
        run_cycle(&self.ctx(), feed_name, source)
    }

    pub fn alt_pages(&self) -> BTreeSet<String> {
        files_with_extension(&self.paths.alt_dir, "html")
    }

    pub fn feed_files(&self) -> BTreeSet<String> {
        files_with_extension(&self.paths.feed_dir, "xml")
    }

    pub fn stored_keys(&self, store: StoreName) -> BTreeSet<String> {
        self.store.keys(store).expect("Failed to list keys")
    }

    pub fn read_atom(&self, feed_name: &str) -> atom_syndication::Feed {
        let xml = fs::read_to_string(self.paths.feed_file(feed_name)).expect("Feed not written");
        xml.parse().expect("Feed XML does not parse")
    }
}

fn files_with_extension(dir: &Path, ext: &str) -> BTreeSet<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return BTreeSet::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ext))
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect()
}

/// A mailbox that returns everything delivered so far, filtered like IMAP
/// results are.
#[derive(Default)]
pub struct FakeSource {
    mailbox: RefCell<BTreeMap<MailId, MailMessage>>,
    fail_next: Cell<Option<FetchError>>,
    pub fetches: Cell<usize>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, id: MailId, mail: MailMessage) {
        self.mailbox.borrow_mut().insert(id, mail);
    }

    pub fn fail_next_with(&self, err: FetchError) {
        self.fail_next.set(Some(err));
    }
}

impl MailSource for FakeSource {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<BTreeMap<MailId, MailMessage>, FetchError> {
        self.fetches.set(self.fetches.get() + 1);
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        Ok(self
            .mailbox
            .borrow()
            .iter()
            .filter(|(_, mail)| request.filter.matches(mail))
            .map(|(id, mail)| (*id, mail.clone()))
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Get,
    Keys,
}

/// Delegates to SQLite, failing one kind of read on one store once `allowed`
/// calls have gone through.
pub struct FailingStore<'a> {
    pub inner: &'a SqliteStore,
    pub broken: StoreName,
    pub fault: Fault,
    pub allowed: Cell<usize>,
}

impl<'a> FailingStore<'a> {
    pub fn failing_get(inner: &'a SqliteStore, broken: StoreName) -> Self {
        Self {
            inner,
            broken,
            fault: Fault::Get,
            allowed: Cell::new(0),
        }
    }

    pub fn failing_keys_after(inner: &'a SqliteStore, broken: StoreName, allowed: usize) -> Self {
        Self {
            inner,
            broken,
            fault: Fault::Keys,
            allowed: Cell::new(allowed),
        }
    }

    fn check(&self, store: StoreName, fault: Fault) -> Result<(), StoreError> {
        if store != self.broken || fault != self.fault {
            return Ok(());
        }
        match self.allowed.get() {
            0 => Err(StoreError::Io(std::io::Error::other("disk unavailable"))),
            n => {
                self.allowed.set(n - 1);
                Ok(())
            }
        }
    }
}

impl KvStore for FailingStore<'_> {
    fn get(&self, store: StoreName, key: &str) -> Result<Option<String>, StoreError> {
        self.check(store, Fault::Get)?;
        self.inner.get(store, key)
    }

    fn put(&self, store: StoreName, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.put(store, key, value)
    }

    fn delete(&self, store: StoreName, key: &str) -> Result<(), StoreError> {
        self.inner.delete(store, key)
    }

    fn keys(&self, store: StoreName) -> Result<BTreeSet<String>, StoreError> {
        self.check(store, Fault::Keys)?;
        self.inner.keys(store)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.inner.commit(batch)
    }
}
