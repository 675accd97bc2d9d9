use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server-assigned message identifier (IMAP UID).
pub type MailId = u32;

/// Mail fields that filters and feed entries can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailField {
    Subject,
    #[serde(alias = "from_")]
    From,
    To,
    Cc,
    Date,
    MessageId,
    Body,
}

impl MailField {
    pub fn as_str(self) -> &'static str {
        match self {
            MailField::Subject => "subject",
            MailField::From => "from",
            MailField::To => "to",
            MailField::Cc => "cc",
            MailField::Date => "date",
            MailField::MessageId => "message_id",
            MailField::Body => "body",
        }
    }
}

impl fmt::Display for MailField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("mail field '{0}' could not be read")]
pub struct ParseFailure(pub MailField);

/// A parsed mail message. Fields the parser could not recover are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailMessage {
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub date: Option<String>,
    /// HTML rendering of the body, ready to be written out as a page.
    pub html_body: Option<String>,
}

impl MailMessage {
    pub fn field(&self, field: MailField) -> Result<&str, ParseFailure> {
        let value = match field {
            MailField::Subject => &self.subject,
            MailField::From => &self.from,
            MailField::To => &self.to,
            MailField::Cc => &self.cc,
            MailField::Date => &self.date,
            MailField::MessageId => &self.message_id,
            MailField::Body => &self.html_body,
        };
        value.as_deref().ok_or(ParseFailure(field))
    }
}
