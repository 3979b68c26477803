//! Query option parsing.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{ActionError, ActionResult};
use crate::protocol_constants::MULTI_VALUE_DELIMITER;

/// Parsed request options.
///
/// Keys are lower-cased, so lookups are case-insensitive. A key given twice
/// keeps its last value. Ordered by key, which keeps request signatures stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOptions {
    values: BTreeMap<String, String>,
}

impl ActionOptions {
    /// Parses a raw (percent-encoded) query string. Never fails; pairs without
    /// a key are skipped.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let values = url::form_urlencoded::parse(query.as_bytes())
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.to_lowercase(), value.into_owned()))
            .collect();
        Self { values }
    }

    /// Returns the value of an option.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Returns the value of an option or `default` when absent.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Splits a multi-value option (`id=Kitchen,Office`). Empty entries are dropped.
    #[must_use]
    pub fn get_multiple(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(MULTI_VALUE_DELIMITER)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns a non-empty option or a validation error naming it.
    pub fn require(&self, key: &str) -> ActionResult<&str> {
        match self.get(key) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ActionError::Validation(format!(
                "Option '{}' is required!",
                key
            ))),
        }
    }

    /// Parses an optional value, failing validation if present but malformed.
    pub fn parse_opt<T: FromStr>(&self, key: &str) -> ActionResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) if v.trim().is_empty() => Ok(None),
            Some(v) => v.trim().parse::<T>().map(Some).map_err(|_| {
                ActionError::Validation(format!("Option '{}' has invalid value '{}'!", key, v))
            }),
        }
    }

    /// Parses a required value.
    pub fn require_parsed<T: FromStr>(&self, key: &str) -> ActionResult<T> {
        self.require(key)?;
        self.parse_opt(key)?.ok_or_else(|| {
            ActionError::Validation(format!("Option '{}' is required!", key))
        })
    }

    /// Interprets a boolean flag (`true`/`1`/`yes` vs `false`/`0`/`no`).
    pub fn flag(&self, key: &str) -> ActionResult<Option<bool>> {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(None),
            Some(v) => match v.as_str() {
                "" => Ok(None),
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" => Ok(Some(false)),
                _ => Err(ActionError::Validation(format!(
                    "Option '{}' must be true or false!",
                    key
                ))),
            },
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
