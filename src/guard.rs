//! Capability guard.
//!
//! Every protected view and the dashboard aggregator ask here before
//! exposing a feature; nothing else decides access from a role directly.
use crate::roles::{capabilities, Feature, Role};

/// Whether `role` grants `feature`. No role (no session) grants nothing.
pub fn can_access(role: Option<Role>, feature: Feature) -> bool {
    match role {
        Some(role) => capabilities(role).contains(&feature),
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavEntry {
    pub feature: Feature,
    pub label: &'static str,
    pub path: &'static str,
}

const NAVIGATION: [NavEntry; 6] = [
    NavEntry {
        feature: Feature::Dashboard,
        label: "Dashboard",
        path: "/dashboard",
    },
    NavEntry {
        feature: Feature::Planning,
        label: "Planning",
        path: "/planning",
    },
    NavEntry {
        feature: Feature::Documents,
        label: "Documents",
        path: "/documents",
    },
    NavEntry {
        feature: Feature::Notes,
        label: "Notes",
        path: "/notes",
    },
    NavEntry {
        feature: Feature::Messages,
        label: "Messages",
        path: "/messages",
    },
    NavEntry {
        feature: Feature::Admin,
        label: "Admin",
        path: "/admin",
    },
];

/// Navigation entries visible to `role`, in display order.
pub fn navigation(role: Option<Role>) -> Vec<NavEntry> {
    NAVIGATION
        .into_iter()
        .filter(|entry| can_access(role, entry.feature))
        .collect()
}
