// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Privacy relationship resolution.
//!
//! Pure functions, no I/O. Routes call these before returning any profile
//! data. Blocking is symmetric: if either side blocks the other, the pair is
//! blocked.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrivacySettings {
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub show_email: bool,
    #[serde(default = "default_allow_messages")]
    pub allow_messages: bool,
    #[serde(default)]
    pub blocked_users: HashSet<String>,
}

fn default_allow_messages() -> bool {
    true
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            visibility: Visibility::Public,
            show_email: false,
            allow_messages: true,
            blocked_users: HashSet::new(),
        }
    }
}

impl PrivacySettings {
    pub fn blocks(&self, user_id: &str) -> bool {
        self.blocked_users.contains(user_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockState {
    pub viewer_blocks_target: bool,
    pub target_blocks_viewer: bool,
    pub blocked_either_way: bool,
}

pub fn resolve_block_state(
    viewer_id: &str,
    viewer_privacy: &PrivacySettings,
    target_id: &str,
    target_privacy: &PrivacySettings,
) -> BlockState {
    let viewer_blocks_target = viewer_privacy.blocks(target_id);
    let target_blocks_viewer = target_privacy.blocks(viewer_id);
    BlockState {
        viewer_blocks_target,
        target_blocks_viewer,
        blocked_either_way: viewer_blocks_target || target_blocks_viewer,
    }
}

/// Self is always visible, public profiles always, private ones only to
/// followers.
pub fn can_view(
    viewer_id: &str,
    target_id: &str,
    target_privacy: &PrivacySettings,
    is_following: bool,
) -> bool {
    viewer_id == target_id || target_privacy.visibility == Visibility::Public || is_following
}

/// Messaging needs the pair unblocked and the target accepting messages.
pub fn can_message(
    viewer_id: &str,
    viewer_privacy: &PrivacySettings,
    target_id: &str,
    target_privacy: &PrivacySettings,
) -> bool {
    if viewer_id == target_id {
        return false;
    }
    let blocks = resolve_block_state(viewer_id, viewer_privacy, target_id, target_privacy);
    !blocks.blocked_either_way && target_privacy.allow_messages
}

pub fn can_see_email(viewer_id: &str, target_id: &str, target_privacy: &PrivacySettings) -> bool {
    viewer_id == target_id || target_privacy.show_email
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocking(ids: &[&str]) -> PrivacySettings {
        PrivacySettings {
            blocked_users: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn block_state_is_symmetric() {
        let open = PrivacySettings::default();
        let alice_blocks_bob = blocking(&["bob"]);

        let from_alice = resolve_block_state("alice", &alice_blocks_bob, "bob", &open);
        assert!(from_alice.viewer_blocks_target);
        assert!(!from_alice.target_blocks_viewer);
        assert!(from_alice.blocked_either_way);

        let from_bob = resolve_block_state("bob", &open, "alice", &alice_blocks_bob);
        assert!(!from_bob.viewer_blocks_target);
        assert!(from_bob.target_blocks_viewer);
        assert!(from_bob.blocked_either_way);

        let neither = resolve_block_state("bob", &open, "carol", &open);
        assert!(!neither.blocked_either_way);
    }

    #[test]
    fn visibility_rules() {
        let private = PrivacySettings {
            visibility: Visibility::Private,
            ..Default::default()
        };
        assert!(can_view("alice", "alice", &private, false));
        assert!(!can_view("bob", "alice", &private, false));
        assert!(can_view("bob", "alice", &private, true));
        assert!(can_view("bob", "alice", &PrivacySettings::default(), false));
    }

    #[test]
    fn messaging_respects_blocks_and_preference() {
        let open = PrivacySettings::default();
        assert!(can_message("bob", &open, "alice", &open));
        assert!(!can_message("bob", &open, "alice", &blocking(&["bob"])));
        assert!(!can_message("bob", &blocking(&["alice"]), "alice", &open));

        let closed = PrivacySettings {
            allow_messages: false,
            ..Default::default()
        };
        assert!(!can_message("bob", &open, "alice", &closed));
    }

    #[test]
    fn email_visibility() {
        let shown = PrivacySettings {
            show_email: true,
            ..Default::default()
        };
        assert!(can_see_email("alice", "alice", &PrivacySettings::default()));
        assert!(!can_see_email("bob", "alice", &PrivacySettings::default()));
        assert!(can_see_email("bob", "alice", &shown));
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: PrivacySettings =
            serde_json::from_str(r#"{"visibility":"private","blockedUsers":["x"]}"#).unwrap();
        assert_eq!(settings.visibility, Visibility::Private);
        assert!(settings.allow_messages);
        assert!(settings.blocks("x"));
    }
}
