//! # Subject Metadata Controller
//!
//! Remembers the name and icon of origins that talked to the wallet.
//! Subjects without permissions are cached up to a limit; the oldest such
//! subject is evicted when a new one arrives at the limit.

use crate::base::{BaseController, ControllerState};
use crate::errors::ControllerResult;
use crate::messaging::{ControllerAction, ControllerMessenger, ControllerName, StateSlice};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_SUBJECT_CACHE_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    #[default]
    Website,
    Snap,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMetadata {
    pub origin: String,
    pub name: Option<String>,
    pub icon_url: Option<String>,
    #[serde(default)]
    pub subject_type: SubjectType,
}

/// Subject metadata state slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMetadataState {
    pub subject_metadata: BTreeMap<String, SubjectMetadata>,
}

impl ControllerState for SubjectMetadataState {
    const NAME: ControllerName = ControllerName::SubjectMetadata;

    fn into_slice(self) -> StateSlice {
        StateSlice::SubjectMetadata(self)
    }
}

pub struct SubjectMetadataController {
    base: BaseController<SubjectMetadataState>,
    limit: usize,
    /// Origins in arrival order.
    order: Mutex<VecDeque<String>>,
}

impl SubjectMetadataController {
    /// The messenger must allow `PermissionController:hasPermissions`.
    pub fn new(messenger: Arc<ControllerMessenger>, limit: usize, initial: SubjectMetadataState) -> Arc<Self> {
        let order = initial.subject_metadata.keys().cloned().collect();
        Arc::new(Self {
            base: BaseController::new(messenger, initial),
            limit,
            order: Mutex::new(order),
        })
    }

    #[must_use]
    pub fn state(&self) -> SubjectMetadataState {
        self.base.state()
    }

    /// Store metadata for an origin, evicting the oldest permissionless
    /// subject when the cache is full.
    pub async fn add_subject_metadata(&self, metadata: SubjectMetadata) -> ControllerResult<()> {
        let known = self.base.read(|s| s.subject_metadata.contains_key(&metadata.origin));
        if !known && self.base.read(|s| s.subject_metadata.len()) >= self.limit {
            self.evict_one().await?;
        }

        if !known {
            self.order.lock().push_back(metadata.origin.clone());
        }
        self.base.update(|state| {
            state.subject_metadata.insert(metadata.origin.clone(), metadata);
        });
        Ok(())
    }

    async fn evict_one(&self) -> ControllerResult<()> {
        let candidates: Vec<String> = self.order.lock().iter().cloned().collect();
        for origin in candidates {
            let has_permissions = self
                .base
                .messenger()
                .call(ControllerAction::HasPermissions { origin: origin.clone() })
                .await?
                .into_bool()?;
            if has_permissions {
                continue;
            }
            debug!(origin = %origin, "Evicting subject metadata");
            self.order.lock().retain(|o| o != &origin);
            self.base.update(|state| {
                state.subject_metadata.remove(&origin);
            });
            return Ok(());
        }
        Ok(())
    }

    pub fn clear(&self) {
        self.order.lock().clear();
        self.base.reset();
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: SubjectMetadataState) {
        *self.order.lock() = next.subject_metadata.keys().cloned().collect();
        self.base.replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalConfig, ApprovalController};
    use crate::messaging::{actions, events};
    use crate::permission::{PermissionController, PermissionState};
    use crate::test_support::{messenger_for, messenger_on};
    use shared_types::Address;

    fn website(origin: &str) -> SubjectMetadata {
        SubjectMetadata {
            origin: origin.to_string(),
            name: Some(origin.to_uppercase()),
            icon_url: None,
            subject_type: SubjectType::Website,
        }
    }

    #[tokio::test]
    async fn test_eviction_skips_subjects_with_permissions() {
        // Arrange
        let (bus, approval_messenger) = messenger_for(ControllerName::Approval, &[], &[]);
        let _approvals = ApprovalController::new(approval_messenger, ApprovalConfig::default()).unwrap();
        let permissions = PermissionController::new(
            messenger_on(
                &bus,
                ControllerName::Permission,
                &[actions::APPROVAL_ADD_REQUEST],
                &[events::KEYRING_ACCOUNT_REMOVED],
            ),
            PermissionState::default(),
        )
        .unwrap();
        let metadata = SubjectMetadataController::new(
            messenger_on(
                &bus,
                ControllerName::SubjectMetadata,
                &[actions::PERMISSION_HAS_PERMISSIONS],
                &[],
            ),
            2,
            SubjectMetadataState::default(),
        );
        permissions.grant_permissions("a.io", vec![Address::from_bytes([1; 20])]);

        // Act
        metadata.add_subject_metadata(website("a.io")).await.unwrap();
        metadata.add_subject_metadata(website("b.io")).await.unwrap();
        metadata.add_subject_metadata(website("c.io")).await.unwrap();

        // Assert
        let origins: Vec<String> = metadata.state().subject_metadata.into_keys().collect();
        assert_eq!(origins, vec!["a.io".to_string(), "c.io".to_string()]);
    }
}
