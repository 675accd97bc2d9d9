use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose};
use chrono::{Days, NaiveDate, Utc};
use native_tls::TlsConnector;

use crate::config::{AccountConfig, AuthKind};
use crate::domain::mail::{MailId, MailMessage};
use crate::error::FetchError;
use crate::mail::{FetchRequest, MailSource};
use crate::secrets;

type ImapSession = imap::Session<native_tls::TlsStream<std::net::TcpStream>>;

/// Build canonical auth string as bytes.
fn build_xoauth2_bytes(user: &str, access_token: &str) -> Vec<u8> {
    let user_field = format!("user={}", user);
    let auth_field = format!("auth=Bearer {}", access_token);
    let auth_string = format!("{}{}{}{}{}", user_field, "\x01", auth_field, "\x01", "\x01");
    auth_string.into_bytes()
}

struct OAuth2Authenticator {
    response: Vec<u8>,
}

impl imap::Authenticator for OAuth2Authenticator {
    type Response = Vec<u8>;
    fn process(&self, _challenge: &[u8]) -> Self::Response {
        self.response.clone()
    }
}

/// IMAP date for a `SINCE` search, e.g. `16-Oct-2026`.
pub fn since_criterion(today: NaiveDate, days: u32) -> String {
    let since = today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN);
    format!("SINCE {}", since.format("%d-%b-%Y"))
}

/// Mail source backed by live IMAP accounts. One connection per fetch.
#[derive(Default)]
pub struct ImapSource;

impl ImapSource {
    pub fn new() -> Self {
        Self
    }

    fn connect_and_auth(
        &self,
        account_name: &str,
        account: &AccountConfig,
    ) -> Result<ImapSession, FetchError> {
        let secret = secrets::resolve_account_secret(account_name, &account.auth)
            .map_err(|e| FetchError::Config(e.to_string()))?;

        let server = &account.server;
        let tls = TlsConnector::builder().build()?;
        let addr = (server.host.as_str(), server.port);
        let client = if server.ssl {
            imap::connect(addr, server.host.as_str(), &tls)?
        } else {
            imap::connect_starttls(addr, server.host.as_str(), &tls)?
        };

        let user = account.auth.user.as_str();
        match account.auth.auth_type {
            AuthKind::Login => client.login(user, &secret).map_err(|(e, _)| {
                FetchError::Transient(format!("login failed for account '{account_name}': {e}"))
            }),
            AuthKind::XOAuth2 => {
                let raw_payload = build_xoauth2_bytes(user, &secret);

                // Try RAW first
                let auth_raw = OAuth2Authenticator {
                    response: raw_payload.clone(),
                };
                let client = match client.authenticate("XOAUTH2", &auth_raw) {
                    Ok(session) => return Ok(session),
                    Err((_e, returned_client)) => returned_client,
                };

                // Fallback BASE64
                let b64_bytes = general_purpose::STANDARD.encode(&raw_payload).into_bytes();
                let auth_b64 = OAuth2Authenticator {
                    response: b64_bytes,
                };
                client.authenticate("XOAUTH2", &auth_b64).map_err(|(e, _)| {
                    FetchError::Transient(format!(
                        "XOAUTH2 failed (raw+base64) for account '{account_name}': {e}"
                    ))
                })
            }
        }
    }

    fn select_folder(&self, session: &mut ImapSession, folder: &str) -> Result<(), FetchError> {
        let names = session.list(None, Some(folder))?;
        if !names.iter().any(|n| n.name() == folder) {
            return Err(FetchError::Config(format!("folder '{folder}' does not exist")));
        }
        session.select(folder)?;
        Ok(())
    }

    fn fetch_in_session(
        &self,
        session: &mut ImapSession,
        request: &FetchRequest<'_>,
    ) -> Result<BTreeMap<MailId, MailMessage>, FetchError> {
        self.select_folder(session, request.folder)?;

        let query = since_criterion(Utc::now().date_naive(), request.since_days);
        let mut uids: Vec<u32> = session.uid_search(&query)?.into_iter().collect();
        let mut out = BTreeMap::new();
        if uids.is_empty() {
            return Ok(out);
        }
        uids.sort_unstable();

        let uid_set = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let fetches = session.uid_fetch(&uid_set, "(UID BODY.PEEK[])")?;

        for f in fetches.iter() {
            let Some(uid) = f.uid else {
                log::warn!("Fetch response without UID in '{}'; skipping", request.folder);
                continue;
            };
            let Some(raw) = f.body() else {
                log::warn!("UID {} missing body; skipping", uid);
                continue;
            };
            let mail = MailMessage::parse(raw);
            if request.filter.matches(&mail) {
                out.insert(uid, mail);
            } else {
                log::debug!("UID {} rejected by filters", uid);
            }
        }
        Ok(out)
    }
}

impl MailSource for ImapSource {
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
    ) -> Result<BTreeMap<MailId, MailMessage>, FetchError> {
        let mut session = self.connect_and_auth(request.account_name, request.account)?;
        let result = self.fetch_in_session(&mut session, request);
        if let Err(e) = session.logout() {
            log::debug!("IMAP logout for '{}' failed: {e}", request.account_name);
        }
        let mails = result?;
        log::info!(
            "Fetched {} matching messages from '{}' folder '{}'",
            mails.len(),
            request.account_name,
            request.folder
        );
        Ok(mails)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_criterion() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(since_criterion(today, 2), "SINCE 27-Feb-2026");
        assert_eq!(since_criterion(today, 0), "SINCE 01-Mar-2026");
        // Saturates instead of overflowing.
        assert!(since_criterion(today, u32::MAX).starts_with("SINCE "));
    }

    #[test]
    fn test_xoauth2_payload() {
        let bytes = build_xoauth2_bytes("me@example.com", "tok");
        assert_eq!(bytes, b"user=me@example.com\x01auth=Bearer tok\x01\x01".to_vec());
    }
}
