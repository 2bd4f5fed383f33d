/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Address classification for managed entities.

use url::Url;

use crate::config::RepinConfig;

/// Scheme-based rules deciding which addresses may be recreated and which
/// may receive an in-page notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPolicy {
    privileged_schemes: Vec<String>,
    notice_schemes: Vec<String>,
}

impl AddressPolicy {
    pub fn new<P, N>(privileged_schemes: P, notice_schemes: N) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        N: IntoIterator,
        N::Item: AsRef<str>,
    {
        Self {
            privileged_schemes: privileged_schemes
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
            notice_schemes: notice_schemes
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &RepinConfig) -> Self {
        Self::new(&config.privileged_schemes, &config.notice_schemes)
    }

    /// Internal runtime pages cannot be relaunched reliably and are never
    /// recreated.
    pub fn is_privileged(&self, address: &str) -> bool {
        scheme_of(address).is_some_and(|scheme| self.privileged_schemes.contains(&scheme))
    }

    pub fn can_host_notice(&self, address: &str) -> bool {
        scheme_of(address).is_some_and(|scheme| self.notice_schemes.contains(&scheme))
    }
}

impl Default for AddressPolicy {
    fn default() -> Self {
        Self::from_config(&RepinConfig::default())
    }
}

fn scheme_of(address: &str) -> Option<String> {
    Url::parse(address.trim())
        .ok()
        .map(|url| url.scheme().to_string())
}
