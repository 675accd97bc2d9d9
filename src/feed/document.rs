use std::path::Path;

use atom_syndication::{Content, Link, Person, Text};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FeedConfig;
use crate::error::ArtifactError;
use crate::feed::write_artifact;

/// Accumulated feed state for one feed name, stored between cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDocument {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub logo: Option<String>,
    pub language: Option<String>,
    /// Public URL of the feed's own XML.
    pub link: String,
    pub updated: DateTime<Utc>,
    /// Newest first.
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub updated: DateTime<Utc>,
    pub body: EntryBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryBody {
    /// HTML hosted at `link`, mirrored inline.
    Alternate { link: String, html: String },
    /// Plain text shown when the mail body could not be extracted.
    Missing { text: String },
}

impl FeedDocument {
    /// Fresh document for a feed that has no stored state yet.
    pub fn new(feed_name: &str, feed: &FeedConfig, created: DateTime<Utc>) -> Self {
        let info = &feed.feed_info;
        Self {
            id: format!(
                "tag:{},{}/feeds/{}.xml",
                info.fqdn,
                created.format("%Y-%m-%d"),
                feed_name
            ),
            title: feed_name.to_string(),
            subtitle: format!(
                "Feed generated from mail messages received at {} by mailfeed",
                feed.account_name
            ),
            author: info.author_name.clone(),
            logo: info.logo.as_deref().map(|logo| info.url(logo)),
            language: info.language.clone(),
            link: info.url(&format!("feeds/{feed_name}.xml")),
            updated: created,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prepend an entry. The entry and the document share one timestamp.
    pub fn add_entry(&mut self, id: String, title: String, body: EntryBody, now: DateTime<Utc>) {
        self.updated = now;
        self.entries.insert(
            0,
            Entry {
                id,
                title,
                updated: now,
                body,
            },
        );
    }

    pub fn to_atom(&self) -> atom_syndication::Feed {
        let mut feed = atom_syndication::Feed::default();
        feed.set_id(self.id.clone());
        feed.set_title(self.title.clone());
        feed.set_subtitle(Some(Text::from(self.subtitle.clone())));
        feed.set_updated(self.updated);
        feed.set_logo(self.logo.clone());
        feed.set_lang(self.language.clone());

        let mut author = Person::default();
        author.set_name(self.author.clone());
        feed.set_authors(vec![author]);

        let mut self_link = Link::default();
        self_link.set_href(self.link.clone());
        self_link.set_rel("self");
        self_link.set_mime_type(Some("application/atom+xml".to_string()));
        feed.set_links(vec![self_link]);

        feed.set_entries(self.entries.iter().map(Entry::to_atom).collect::<Vec<_>>());
        feed
    }

    /// Write the Atom XML for this document to `path`.
    pub fn publish(&self, path: &Path) -> Result<(), ArtifactError> {
        let xml = self
            .to_atom()
            .write_to(Vec::new())
            .map_err(|e| ArtifactError::Serialize {
                feed: self.title.clone(),
                message: e.to_string(),
            })?;
        write_artifact(path, &xml)
    }
}

impl Entry {
    fn to_atom(&self) -> atom_syndication::Entry {
        let mut entry = atom_syndication::Entry::default();
        entry.set_id(self.id.clone());
        entry.set_title(self.title.clone());
        entry.set_updated(self.updated);

        let mut content = Content::default();
        match &self.body {
            EntryBody::Alternate { link, html } => {
                let mut alternate = Link::default();
                alternate.set_href(link.clone());
                alternate.set_rel("alternate");
                alternate.set_mime_type(Some("text/html".to_string()));
                entry.set_links(vec![alternate]);

                content.set_content_type(Some("html".to_string()));
                content.set_value(Some(html.clone()));
            }
            EntryBody::Missing { text } => {
                content.set_content_type(Some("text".to_string()));
                content.set_value(Some(text.clone()));
            }
        }
        entry.set_content(Some(content));
        entry
    }
}
