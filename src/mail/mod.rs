pub mod decoders;
pub mod filter;
pub mod imap_client;

use std::collections::BTreeMap;

use crate::config::AccountConfig;
use crate::domain::mail::{MailId, MailMessage};
use crate::error::FetchError;

pub use filter::MailFilter;
pub use imap_client::ImapSource;

/// What one feed asks of its mail account.
pub struct FetchRequest<'a> {
    pub account_name: &'a str,
    pub account: &'a AccountConfig,
    pub folder: &'a str,
    pub filter: &'a MailFilter,
    /// Messages received within this many days are returned.
    pub since_days: u32,
}

pub trait MailSource {
    /// Messages in the window that pass the request's filter, keyed by id.
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<BTreeMap<MailId, MailMessage>, FetchError>;
}
