//! User, sector and permission-bundle models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub sector_id: String,
    #[serde(default)]
    pub group_ids: Vec<String>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub last_access: DateTime<Utc>,
}

impl User {
    pub fn is_in_group(&self, group_id: &str) -> bool {
        self.group_ids.iter().any(|g| g == group_id)
    }
}

/// Organizational department (e.g. Production, Quality).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub id: String,
    pub name: String,
    pub initials: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Named capability bundle. Group membership is a sum of capabilities:
/// a user holding several bundles gets the union of their flags.
///
/// `is_system_admin` replaces the old special-casing of admin/PCP group ids;
/// admin bypasses are decided on this flag, never on the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPermissions {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub can_create: bool,
    pub can_view_all: bool,
    pub can_update_status: bool,
    pub can_comment: bool,
    pub can_attach: bool,
    pub can_finish: bool,
    pub can_view_dashboards: bool,
    /// System bundles cannot be deleted from settings.
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_system_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn user_group_membership() {
        let user = User {
            id: "u-1".to_string(),
            name: "Maria".to_string(),
            email: "maria@plant.example".to_string(),
            sector_id: "s-1".to_string(),
            group_ids: vec!["g-a".to_string(), "g-b".to_string()],
            active: true,
            avatar: None,
            last_access: Utc::now(),
        };
        assert!(user.is_in_group("g-a"));
        assert!(user.is_in_group("g-b"));
        assert!(!user.is_in_group("g-c"));
    }

    #[test]
    fn group_permissions_serde_roundtrip() {
        let group = GroupPermissions {
            id: "g-quality".to_string(),
            name: "Quality".to_string(),
            description: Some("Quality inspectors".to_string()),
            can_create: true,
            can_view_all: false,
            can_update_status: true,
            can_comment: true,
            can_attach: true,
            can_finish: false,
            can_view_dashboards: true,
            is_system: false,
            is_system_admin: false,
        };
        let serialized = serde_json::to_string(&group).unwrap();
        let deserialized: GroupPermissions = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, group);
    }

    #[test]
    fn admin_flag_defaults_to_false() {
        // Older records serialized before the flag existed must load.
        let json = r#"{
            "id": "g-old", "name": "Legacy", "can_create": false,
            "can_view_all": false, "can_update_status": false,
            "can_comment": false, "can_attach": false, "can_finish": false,
            "can_view_dashboards": false
        }"#;
        let group: GroupPermissions = serde_json::from_str(json).unwrap();
        assert!(!group.is_system_admin);
        assert!(!group.is_system);
    }
}
