//! Notification data models

use serde::{Deserialize, Serialize};

/// Who a task notification goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTarget {
    None,
    Individual,
    Group,
    Global,
}

impl NotificationTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationTarget::None => "none",
            NotificationTarget::Individual => "individual",
            NotificationTarget::Group => "group",
            NotificationTarget::Global => "global",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(NotificationTarget::None),
            "individual" => Some(NotificationTarget::Individual),
            "group" => Some(NotificationTarget::Group),
            "global" => Some(NotificationTarget::Global),
            _ => None,
        }
    }
}

/// A drafted email notification, ready to hand to a mail transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftedNotification {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_roundtrip() {
        for target in [
            NotificationTarget::None,
            NotificationTarget::Individual,
            NotificationTarget::Group,
            NotificationTarget::Global,
        ] {
            assert_eq!(NotificationTarget::from_str(target.as_str()), Some(target));
        }
        assert_eq!(NotificationTarget::from_str("carrier-pigeon"), None);
    }

    #[test]
    fn target_serializes_snake_case() {
        let serialized = serde_json::to_string(&NotificationTarget::Individual).unwrap();
        assert_eq!(serialized, "\"individual\"");

        let deserialized: NotificationTarget = serde_json::from_str("\"global\"").unwrap();
        assert_eq!(deserialized, NotificationTarget::Global);
    }
}
