//! # Phishing Controller
//!
//! Checks dapp origins against allow/block lists and a fuzzy list of
//! look-alike domains.
//!
//! Matching rules, in order:
//! 1. a user bypass (whitelist) always wins;
//! 2. allowlist entries match the host or any parent domain;
//! 3. blocklist entries match the host or any parent domain;
//! 4. the host (minus its subdomains) is within `tolerance` edits of a
//!    fuzzylist entry without being equal to it.

use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{
    actions, ActionResponse, ControllerAction, ControllerMessenger, ControllerName, StateSlice,
};
use crate::ports::PhishingListSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_bus::{ActionHandler, BusAction};
use shared_types::now_millis;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Lists older than this are refreshed by `maybe_update_state`.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhishingLists {
    pub allowlist: Vec<String>,
    pub blocklist: Vec<String>,
    pub fuzzylist: Vec<String>,
    pub tolerance: usize,
}

impl Default for PhishingLists {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            blocklist: Vec::new(),
            fuzzylist: Vec::new(),
            tolerance: 2,
        }
    }
}

/// Phishing state slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhishingState {
    pub lists: PhishingLists,
    pub whitelist: Vec<String>,
    pub last_fetched: u64,
}

impl ControllerState for PhishingState {
    const NAME: ControllerName = ControllerName::Phishing;

    fn into_slice(self) -> StateSlice {
        StateSlice::Phishing(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    All,
    Whitelist,
    Allowlist,
    Blocklist,
    Fuzzy,
}

/// Outcome of testing one origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhishingCheck {
    /// True when the origin should be blocked.
    pub result: bool,
    #[serde(rename = "type")]
    pub kind: MatchKind,
}

pub struct PhishingController {
    base: BaseController<PhishingState>,
    source: Arc<dyn PhishingListSource>,
}

impl PhishingController {
    /// Create the controller and register `PhishingController:testOrigin`.
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        source: Arc<dyn PhishingListSource>,
        initial: PhishingState,
    ) -> ControllerResult<Arc<Self>> {
        let controller = Arc::new(Self {
            base: BaseController::new(Arc::clone(&messenger), initial),
            source,
        });
        messenger.register_action_handler(
            actions::PHISHING_TEST_ORIGIN,
            Arc::new(PhishingActions {
                controller: Arc::downgrade(&controller),
            }),
        )?;
        Ok(controller)
    }

    #[must_use]
    pub fn state(&self) -> PhishingState {
        self.base.state()
    }

    #[must_use]
    pub fn is_outdated(&self) -> bool {
        let last = self.base.read(|s| s.last_fetched);
        now_millis().saturating_sub(last) >= REFRESH_INTERVAL.as_millis() as u64
    }

    /// Refresh the lists if they are stale. Failures keep the old lists.
    pub async fn maybe_update_state(&self) {
        if !self.is_outdated() {
            return;
        }
        match self.source.fetch().await {
            Ok(lists) => {
                debug!(
                    blocked = lists.blocklist.len(),
                    fuzzy = lists.fuzzylist.len(),
                    "Phishing lists updated"
                );
                self.base.update(|state| {
                    state.lists = lists;
                    state.last_fetched = now_millis();
                });
            }
            Err(e) => warn!(error = %e, "Phishing list update failed"),
        }
    }

    /// Test an origin (URL or bare host).
    #[must_use]
    pub fn test(&self, origin: &str) -> PhishingCheck {
        let host = hostname_of(origin);
        self.base.read(|state| {
            if state.whitelist.iter().any(|w| w == &host) {
                return PhishingCheck {
                    result: false,
                    kind: MatchKind::Whitelist,
                };
            }
            check_lists(&state.lists, &host)
        })
    }

    /// Let the user proceed to a blocked origin.
    pub fn bypass(&self, origin: &str) {
        let host = hostname_of(origin);
        self.base.update(|state| {
            if !state.whitelist.contains(&host) {
                state.whitelist.push(host);
            }
        });
    }
}

fn check_lists(lists: &PhishingLists, host: &str) -> PhishingCheck {
    let verdict = |result, kind| PhishingCheck { result, kind };
    if lists.allowlist.iter().any(|d| domain_matches(host, d)) {
        return verdict(false, MatchKind::Allowlist);
    }
    if lists.blocklist.iter().any(|d| domain_matches(host, d)) {
        return verdict(true, MatchKind::Blocklist);
    }
    let registrable = registrable_domain(host);
    let fuzzy_hit = lists.fuzzylist.iter().any(|target| {
        let target = target.to_ascii_lowercase();
        registrable != target && levenshtein(&registrable, &target) <= lists.tolerance
    });
    if fuzzy_hit {
        return verdict(true, MatchKind::Fuzzy);
    }
    verdict(false, MatchKind::All)
}

/// Host of a URL or bare origin, lowercased, without port or credentials.
///
/// Parsed with WHATWG rules, so `\` separates the path in special schemes
/// and percent-encoded hosts are decoded.
#[must_use]
pub fn hostname_of(origin: &str) -> String {
    let origin = origin.trim();
    Url::parse(origin)
        .ok()
        .filter(|url| url.host_str().is_some())
        .or_else(|| Url::parse(&format!("https://{origin}")).ok())
        .and_then(|url| url.host_str().map(|host| host.trim_end_matches('.').to_ascii_lowercase()))
        .unwrap_or_default()
}

fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Last two labels of a host.
fn registrable_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host.to_string();
    }
    labels[labels.len() - 2..].join(".")
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            current[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(current[j] + 1);
        }
        prev = current;
    }
    prev[b.len()]
}

struct PhishingActions {
    controller: Weak<PhishingController>,
}

#[async_trait]
impl ActionHandler<ControllerAction> for PhishingActions {
    async fn handle(&self, action: ControllerAction) -> Result<ActionResponse, ControllerError> {
        let controller = self
            .controller
            .upgrade()
            .ok_or_else(|| ControllerError::NotFound(ControllerName::Phishing.as_str().into()))?;
        match action {
            ControllerAction::TestOrigin { origin } => Ok(ActionResponse::Phishing(controller.test(&origin))),
            other => Err(ControllerError::UnexpectedResponse(other.action_type())),
        }
    }
}
