//! # Site Configuration
//!
//! URL and front-page settings consulted by the builder, resolver and
//! dispatcher. The app layer loads these from TOML; the core only reads them.

use crate::NodeId;
use serde::{Deserialize, Serialize};

/// Site-wide routing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Absolute URL of the site root, without trailing slash.
    pub absolute_url: String,
    /// Path prefix stripped from inbound URIs (e.g. `/site`).
    pub base_path: String,
    /// Search-engine-friendly URLs (aliases instead of `?m=`).
    pub sef: bool,
    /// Suffix appended to SEF URLs and stripped on a failed match.
    pub url_suffix: String,
    /// Front page for anonymous requesters.
    pub front_page: NodeId,
    /// Front page for authenticated requesters.
    pub member_front_page: NodeId,
    /// Role used when a request carries none.
    pub guest_role: String,
    /// Where unauthenticated requesters are sent.
    pub login_path: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            absolute_url: "http://localhost:8080".to_string(),
            base_path: String::new(),
            sef: true,
            url_suffix: String::new(),
            front_page: NodeId(1),
            member_front_page: NodeId(1),
            guest_role: "guest".to_string(),
            login_path: "/login".to_string(),
        }
    }
}

impl SiteConfig {
    /// Front page for the requester's authentication state.
    #[must_use]
    pub fn front_page_for(&self, authenticated: bool) -> NodeId {
        if authenticated {
            self.member_front_page
        } else {
            self.front_page
        }
    }

    /// Absolute URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.absolute_url.trim_end_matches('/')
    }

    /// Login URL carrying the node to return to after authentication.
    #[must_use]
    pub fn login_url(&self, return_to: NodeId) -> String {
        format!("{}{}?return={}", self.base_url(), self.login_path, return_to)
    }
}
