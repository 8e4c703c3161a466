//! Source priority as data.
//!
//! A default ordering over source ids plus an exception table keyed by
//! `(tag, platform)`. New exceptions are table rows, never code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tooldrop_schema::PlatformPattern;

/// One row of the exception table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRule {
    /// Exact release tag the rule applies to.
    pub tag: String,
    /// Platform key (`linux-aarch64`) or an explicit platform literal.
    pub platform: String,
    /// Sources to try first, in order. Remaining defaults follow.
    pub prefer: Vec<String>,
}

/// Normalize a platform spelling so `linux-arm64` and `Linux-aarch64` share a key.
pub fn platform_key(raw: &str) -> String {
    raw.parse::<PlatformPattern>()
        .map_or_else(|_| raw.trim().to_lowercase(), |p| p.key())
}

#[derive(Debug, Clone, Default)]
pub struct SourcePriority {
    default: Vec<String>,
    exceptions: HashMap<(String, String), Vec<String>>,
}

impl SourcePriority {
    pub fn new(default: Vec<String>) -> Self {
        Self {
            default,
            exceptions: HashMap::new(),
        }
    }

    /// Install an exception, replacing any previous one for the same pair.
    ///
    /// Returns the replaced preference list, if there was one.
    pub fn set_override(&mut self, rule: OverrideRule) -> Option<Vec<String>> {
        let key = (rule.tag, platform_key(&rule.platform));
        self.exceptions.insert(key, rule.prefer)
    }

    pub fn default_order(&self) -> &[String] {
        &self.default
    }

    /// Exception for `(tag, platform)`, if one is registered.
    pub fn exception(&self, tag: &str, platform: &str) -> Option<&[String]> {
        self.exceptions
            .get(&(tag.to_string(), platform_key(platform)))
            .map(Vec::as_slice)
    }

    /// Effective order for one lookup: the exception's preferred sources
    /// first, then the default order minus anything already listed.
    pub fn order_for(&self, tag: &str, platform: &str) -> Vec<String> {
        self.order_for_keys(tag, &[platform.to_string()])
    }

    /// Like [`Self::order_for`], trying each platform key in turn. The first
    /// key with an exception for `tag` decides.
    pub fn order_for_keys(&self, tag: &str, platforms: &[String]) -> Vec<String> {
        let Some(prefer) = platforms.iter().find_map(|p| self.exception(tag, p)) else {
            return self.default.clone();
        };

        let mut order: Vec<String> = Vec::with_capacity(self.default.len());
        for id in prefer.iter().chain(self.default.iter()) {
            if !order.contains(id) {
                order.push(id.clone());
            }
        }
        order
    }
}
