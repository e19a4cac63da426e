//! Task visibility resolver.
//!
//! Visibility is decided by an explicit ordered rule table, first match
//! wins. Keeping the rules as named entries avoids the ambiguity of ad-hoc
//! "first matching group" checks when a user holds several bundles with
//! conflicting flags.

use crate::user::models::{GroupPermissions, User};
use crate::workorder::models::{Task, TaskVisibility};

/// Outcome of a single rule: `None` means "no opinion, ask the next rule".
type RuleFn = fn(&User, &Task, &[&GroupPermissions]) -> Option<bool>;

const VISIBILITY_RULES: &[(&str, RuleFn)] = &[
    ("inactive_user", |user, _, _| {
        if !user.active {
            Some(false)
        } else {
            None
        }
    }),
    ("view_all_capability", |_, _, groups| {
        if groups.iter().any(|g| g.can_view_all) {
            Some(true)
        } else {
            None
        }
    }),
    ("global_visibility", |_, task, _| {
        if task.visibility == TaskVisibility::Global {
            Some(true)
        } else {
            None
        }
    }),
    ("requestor_or_responsible", |user, task, _| {
        if task.requestor_id == user.id || task.responsible_id.as_deref() == Some(&user.id) {
            Some(true)
        } else {
            None
        }
    }),
    ("executor_group_member", |user, task, _| {
        if user.is_in_group(&task.executor_group_id) {
            Some(true)
        } else {
            None
        }
    }),
    ("follower", |user, task, _| {
        if task.follower_ids.iter().any(|f| f == &user.id) {
            Some(true)
        } else {
            None
        }
    }),
    ("sector_visibility", |user, task, _| {
        if task.visibility == TaskVisibility::Sector
            && task.visible_sector_ids.iter().any(|s| s == &user.sector_id)
        {
            Some(true)
        } else {
            None
        }
    }),
    ("group_visibility", |user, task, _| {
        if task.visibility == TaskVisibility::Group
            && user
                .group_ids
                .iter()
                .any(|gid| task.visible_group_ids.iter().any(|v| v == gid))
        {
            Some(true)
        } else {
            None
        }
    }),
    ("private_visibility", |user, task, _| {
        if task.visibility == TaskVisibility::Private
            && task.visible_user_ids.iter().any(|u| u == &user.id)
        {
            Some(true)
        } else {
            None
        }
    }),
];

/// Pure predicate: may `user` see `task`? Fails closed.
pub fn can_view(user: &User, task: &Task, groups: &[GroupPermissions]) -> bool {
    let held: Vec<&GroupPermissions> = groups
        .iter()
        .filter(|g| user.is_in_group(&g.id))
        .collect();

    for (_name, rule) in VISIBILITY_RULES {
        if let Some(decision) = rule(user, task, &held) {
            return decision;
        }
    }
    false
}
