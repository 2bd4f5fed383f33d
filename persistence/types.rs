/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The persisted desired pin set.

use std::collections::HashSet;

use serde_json::{Map, Value};

/// Ordered set of managed URLs.
///
/// Stored as `{ "<url>": <rank> }` with ranks `1..=N`. In memory the set is
/// kept as an ordered list so ranks are dense by construction; every
/// mutation re-derives them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredPinSet {
    urls: Vec<String>,
}

impl DesiredPinSet {
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for url in urls {
            set.append(url);
        }
        set
    }

    /// Decode a stored value. Anything malformed decodes to the empty set or
    /// drops the offending entry; the stored ranks may be sparse or tied,
    /// the decoded set is always dense.
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        let Some(object) = value.as_object() else {
            log::warn!("persistence: desired set is not an object, treating as empty");
            return Self::default();
        };

        let mut ranked: Vec<(u64, &str)> = Vec::with_capacity(object.len());
        for (url, rank) in object {
            match rank.as_u64().filter(|rank| *rank > 0) {
                Some(rank) if !url.is_empty() => ranked.push((rank, url.as_str())),
                _ => log::warn!("persistence: dropping malformed desired entry {url:?} => {rank}"),
            }
        }
        ranked.sort();
        Self {
            urls: ranked.into_iter().map(|(_, url)| url.to_string()).collect(),
        }
    }

    pub fn to_value(&self) -> Value {
        let object: Map<String, Value> = self
            .ranked()
            .map(|(url, rank)| (url.to_string(), Value::from(rank)))
            .collect();
        Value::Object(object)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.iter().any(|u| u == url)
    }

    /// 1-based rank of `url`.
    pub fn rank_of(&self, url: &str) -> Option<u32> {
        self.urls
            .iter()
            .position(|u| u == url)
            .and_then(|pos| u32::try_from(pos + 1).ok())
    }

    /// URLs in rank order.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn ranked(&self) -> impl Iterator<Item = (&str, u32)> {
        self.urls
            .iter()
            .zip(1u32..)
            .map(|(url, rank)| (url.as_str(), rank))
    }

    /// Add `url` after the current highest rank. Returns `false` when it was
    /// already present.
    pub fn append(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if url.is_empty() || self.contains(&url) {
            return false;
        }
        self.urls.push(url);
        true
    }

    /// Remove `url`, closing the gap it leaves.
    pub fn remove(&mut self, url: &str) -> bool {
        let before = self.urls.len();
        self.urls.retain(|u| u != url);
        self.urls.len() != before
    }

    /// Make a window's pinned row the new source of truth for ordering.
    ///
    /// `window_urls` is the row in position order. Duplicates keep their
    /// first occurrence; desired URLs absent from the row keep their prior
    /// relative order after it. Returns whether the order changed.
    pub fn adopt_window_order<S: AsRef<str>>(&mut self, window_urls: &[S]) -> bool {
        let mut seen = HashSet::new();
        let mut next: Vec<String> = Vec::with_capacity(self.urls.len() + window_urls.len());
        for url in window_urls.iter().map(AsRef::as_ref) {
            if !url.is_empty() && seen.insert(url.to_string()) {
                next.push(url.to_string());
            }
        }
        for url in &self.urls {
            if !seen.contains(url) {
                next.push(url.clone());
            }
        }
        if next == self.urls {
            return false;
        }
        self.urls = next;
        true
    }
}
