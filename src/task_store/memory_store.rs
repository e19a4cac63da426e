//! In-memory task store.
//!
//! Used as the degraded fallback when the SQLite database cannot be opened,
//! and by tests that don't care about persistence. `seeded()` loads a small
//! demo plant so the server is usable out of the box.

use super::trait_def::{StoreError, TaskStore};
use crate::user::models::{GroupPermissions, Sector};
use crate::workorder::models::{
    StepStatus, Task, TaskPriority, TaskStatus, TaskStep, TaskType, TaskVisibility,
};
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    tasks: BTreeMap<String, Task>,
    sectors: BTreeMap<String, Sector>,
    groups: BTreeMap<String, GroupPermissions>,
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    inner: Mutex<Inner>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-loaded with demo sectors, groups and a couple of tasks.
    pub fn seeded() -> Self {
        let store = Self::new();
        for sector in seed_sectors() {
            store.upsert_sector(&sector).expect("in-memory upsert");
        }
        for group in seed_groups() {
            store.upsert_group(&group).expect("in-memory upsert");
        }
        for task in seed_tasks() {
            store.upsert_task(&task).expect("in-memory upsert");
        }
        store
    }
}

impl TaskStore for InMemoryTaskStore {
    fn fetch_all_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut tasks: Vec<Task> = inner.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tasks.get(task_id).cloned())
    }

    fn upsert_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut task = task.clone();
        task.sort_steps();
        inner.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    fn fetch_sectors(&self) -> Result<Vec<Sector>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut sectors: Vec<Sector> = inner.sectors.values().cloned().collect();
        sectors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sectors)
    }

    fn upsert_sector(&self, sector: &Sector) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.sectors.insert(sector.id.clone(), sector.clone());
        Ok(())
    }

    fn fetch_groups(&self) -> Result<Vec<GroupPermissions>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut groups: Vec<GroupPermissions> = inner.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    fn upsert_group(&self, group: &GroupPermissions) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.groups.insert(group.id.clone(), group.clone());
        Ok(())
    }
}

fn seed_sectors() -> Vec<Sector> {
    [
        ("s-pcp", "Planning", "PCP"),
        ("s-production", "Production", "PRD"),
        ("s-quality", "Quality", "QLT"),
        ("s-shipping", "Shipping", "SHP"),
        ("s-maintenance", "Maintenance", "MNT"),
    ]
    .into_iter()
    .map(|(id, name, initials)| Sector {
        id: id.to_string(),
        name: name.to_string(),
        initials: initials.to_string(),
        active: true,
        color: None,
    })
    .collect()
}

fn seed_groups() -> Vec<GroupPermissions> {
    fn base(id: &str, name: &str) -> GroupPermissions {
        GroupPermissions {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            can_create: false,
            can_view_all: false,
            can_update_status: false,
            can_comment: true,
            can_attach: false,
            can_finish: false,
            can_view_dashboards: false,
            is_system: false,
            is_system_admin: false,
        }
    }

    let mut admin = base("g-admin", "Administration");
    admin.can_create = true;
    admin.can_view_all = true;
    admin.can_update_status = true;
    admin.can_attach = true;
    admin.can_finish = true;
    admin.can_view_dashboards = true;
    admin.is_system = true;
    admin.is_system_admin = true;

    let mut pcp = base("g-pcp", "Planning");
    pcp.can_create = true;
    pcp.can_view_all = true;
    pcp.can_update_status = true;
    pcp.can_view_dashboards = true;
    pcp.is_system = true;
    pcp.is_system_admin = true;

    let mut production = base("g-production", "Production");
    production.can_update_status = true;
    production.can_attach = true;
    production.can_finish = true;

    let mut quality = base("g-quality", "Quality");
    quality.can_create = true;
    quality.can_update_status = true;
    quality.can_attach = true;

    vec![admin, pcp, production, quality]
}

fn seed_tasks() -> Vec<Task> {
    let now = Utc::now();
    let step = |order: u32, title: &str, status: StepStatus| TaskStep {
        id: format!("seed-st-{}", order),
        title: title.to_string(),
        description: None,
        responsible_group_id: "g-production".to_string(),
        responsible_user_id: None,
        deadline: None,
        status,
        order,
        completed_at: None,
        completed_by: None,
    };

    vec![
        Task {
            id: "seed-t-1".to_string(),
            task_type: TaskType::ProductionPriority,
            requesting_sector: "s-pcp".to_string(),
            responsible_sector: "s-production".to_string(),
            priority: TaskPriority::High,
            description: "Prioritize extrusion of profile batch 1180".to_string(),
            product_profile: "AL-6063-T5".to_string(),
            op_number: Some("OP-1180".to_string()),
            quantity: Some(500),
            open_date: now - Duration::days(1),
            created_at: now - Duration::days(1),
            created_by: "Seed".to_string(),
            started_at: None,
            completed_at: None,
            deadline: now + Duration::days(3),
            responsible_id: None,
            executor_group_id: "g-production".to_string(),
            requestor_id: "seed-u-planner".to_string(),
            follower_ids: vec![],
            status: TaskStatus::Open,
            visibility: TaskVisibility::Global,
            visible_group_ids: vec![],
            visible_user_ids: vec![],
            visible_sector_ids: vec![],
            history: vec![],
            attachments: vec![],
            steps: vec![
                step(1, "Set up press", StepStatus::Pending),
                step(2, "Extrude", StepStatus::Pending),
                step(3, "Quality check", StepStatus::Pending),
            ],
            notification_target: Some(crate::notifications::NotificationTarget::Global),
        },
        Task {
            id: "seed-t-2".to_string(),
            task_type: TaskType::QualityTest,
            requesting_sector: "s-quality".to_string(),
            responsible_sector: "s-quality".to_string(),
            priority: TaskPriority::Medium,
            description: "Tensile test for alloy lot 77".to_string(),
            product_profile: "AL-6061-T6".to_string(),
            op_number: None,
            quantity: None,
            open_date: now - Duration::hours(4),
            created_at: now - Duration::hours(4),
            created_by: "Seed".to_string(),
            started_at: None,
            completed_at: None,
            deadline: now + Duration::days(1),
            responsible_id: None,
            executor_group_id: "g-quality".to_string(),
            requestor_id: "seed-u-inspector".to_string(),
            follower_ids: vec![],
            status: TaskStatus::Open,
            visibility: TaskVisibility::Sector,
            visible_group_ids: vec![],
            visible_user_ids: vec![],
            visible_sector_ids: vec!["s-quality".to_string(), "s-production".to_string()],
            history: vec![],
            attachments: vec![],
            steps: vec![],
            notification_target: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workorder::fixtures::task_with_steps;

    #[test]
    fn upsert_and_get() {
        let store = InMemoryTaskStore::new();
        let task = task_with_steps(&[StepStatus::Pending]);
        store.upsert_task(&task).unwrap();
        assert_eq!(store.get_task("t-1").unwrap().unwrap().id, "t-1");
        assert!(store.get_task("t-2").unwrap().is_none());
    }

    #[test]
    fn upsert_sorts_steps() {
        let store = InMemoryTaskStore::new();
        let mut task = task_with_steps(&[StepStatus::Pending, StepStatus::Pending]);
        task.steps.reverse();
        store.upsert_task(&task).unwrap();
        let loaded = store.get_task("t-1").unwrap().unwrap();
        assert_eq!(loaded.steps[0].order, 1);
    }

    #[test]
    fn seeded_store_has_demo_plant() {
        let store = InMemoryTaskStore::seeded();
        assert!(!store.fetch_all_tasks().unwrap().is_empty());
        assert!(!store.fetch_sectors().unwrap().is_empty());

        let groups = store.fetch_groups().unwrap();
        let admin = groups.iter().find(|g| g.id == "g-admin").unwrap();
        assert!(admin.is_system_admin);
        assert!(admin.is_system);
    }

    #[test]
    fn fetch_all_newest_first() {
        let store = InMemoryTaskStore::seeded();
        let tasks = store.fetch_all_tasks().unwrap();
        for pair in tasks.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }
}
