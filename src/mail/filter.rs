//! Per-field regex filters for incoming mail.
//!
//! Rules are grouped by mail field. A field passes when every `and` pattern
//! matches, no `exclude` pattern matches, and at least one `or` pattern
//! matches if any are given. A mail passes when every filtered field passes.

use regex::Regex;
use std::collections::BTreeMap;

use crate::config::FieldRules;
use crate::domain::mail::{MailField, MailMessage};
use crate::error::ConfigError;

#[derive(Debug, Clone)]
struct CompiledRules {
    and: Vec<Regex>,
    or: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl CompiledRules {
    fn passes(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            // Nothing to match against: only exclude-only rules can hold.
            return self.and.is_empty() && self.or.is_empty();
        };
        if self.exclude.iter().any(|re| re.is_match(value)) {
            return false;
        }
        if !self.and.iter().all(|re| re.is_match(value)) {
            return false;
        }
        self.or.is_empty() || self.or.iter().any(|re| re.is_match(value))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MailFilter {
    fields: BTreeMap<MailField, CompiledRules>,
}

impl MailFilter {
    pub fn compile(
        feed_name: &str,
        rules: &BTreeMap<MailField, FieldRules>,
    ) -> Result<Self, ConfigError> {
        let mut fields = BTreeMap::new();
        for (field, rule) in rules {
            let compile_all = |patterns: &[String]| -> Result<Vec<Regex>, ConfigError> {
                patterns
                    .iter()
                    .map(|p| {
                        Regex::new(p).map_err(|source| ConfigError::InvalidPattern {
                            feed: feed_name.to_string(),
                            field: field.to_string(),
                            pattern: p.clone(),
                            source,
                        })
                    })
                    .collect()
            };
            fields.insert(
                *field,
                CompiledRules {
                    and: compile_all(&rule.and)?,
                    or: compile_all(&rule.or)?,
                    exclude: compile_all(&rule.exclude)?,
                },
            );
        }
        Ok(Self { fields })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn matches(&self, mail: &MailMessage) -> bool {
        self.fields
            .iter()
            .all(|(field, rules)| rules.passes(mail.field(*field).ok()))
    }
}
