//! SQLite-backed task store (`tasks.db`).

use super::schema::TASK_SCHEMAS;
use super::trait_def::{StoreError, TaskStore};
use crate::notifications::NotificationTarget;
use crate::sqlite_persistence::migrate;
use crate::user::models::{GroupPermissions, Sector};
use crate::workorder::models::{
    Attachment, HistoryEntry, HistoryKind, StepStatus, Task, TaskPriority, TaskStatus, TaskStep,
    TaskType, TaskVisibility,
};
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

fn dt_to_sql(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn dt_from_sql(s: &str) -> Result<DateTime<Utc>, StoreError> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp {:?}", s))
        .map_err(StoreError::Data)?;
    Ok(parsed.with_timezone(&Utc))
}

fn opt_dt_from_sql(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.as_deref().map(dt_from_sql).transpose()
}

fn bad_value(what: &str, value: &str) -> StoreError {
    StoreError::Data(anyhow!("Unknown {} {:?}", what, value))
}

fn int_to_u32(what: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Data(anyhow!("Out-of-range {} {}", what, value)))
}

#[derive(Clone)]
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open task db at {:?}", db_path.as_ref()))
            .map_err(StoreError::Data)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn, TASK_SCHEMAS)
            .context("Failed to migrate task schema")
            .map_err(StoreError::Data)?;
        info!("Task store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn load_steps(conn: &Connection, task_id: &str) -> Result<Vec<TaskStep>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, title, description, responsible_group_id, responsible_user_id,
                    deadline, status, step_order, completed_at, completed_by
             FROM task_step WHERE task_id = ?1 ORDER BY step_order",
        )?;
        let mut rows = stmt.query(params![task_id])?;
        let mut steps = Vec::new();
        while let Some(row) = rows.next()? {
            let status: String = row.get(6)?;
            steps.push(TaskStep {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                responsible_group_id: row.get(3)?,
                responsible_user_id: row.get(4)?,
                deadline: opt_dt_from_sql(row.get(5)?)?,
                status: StepStatus::from_str(&status)
                    .ok_or_else(|| bad_value("step status", &status))?,
                order: int_to_u32("step order", row.get(7)?)?,
                completed_at: opt_dt_from_sql(row.get(8)?)?,
                completed_by: row.get(9)?,
            });
        }
        Ok(steps)
    }

    fn load_history(conn: &Connection, task_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, user_name, action, timestamp, details, comment, kind
             FROM task_history WHERE task_id = ?1 ORDER BY timestamp DESC",
        )?;
        let mut rows = stmt.query(params![task_id])?;
        let mut history = Vec::new();
        while let Some(row) = rows.next()? {
            let timestamp: String = row.get(4)?;
            let kind: String = row.get(7)?;
            history.push(HistoryEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                user_name: row.get(2)?,
                action: row.get(3)?,
                timestamp: dt_from_sql(&timestamp)?,
                details: row.get(5)?,
                comment: row.get(6)?,
                kind: HistoryKind::from_str(&kind)
                    .ok_or_else(|| bad_value("history kind", &kind))?,
            });
        }
        Ok(history)
    }

    fn load_attachments(conn: &Connection, task_id: &str) -> Result<Vec<Attachment>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, name, mime_type, url, uploaded_by, date
             FROM task_attachment WHERE task_id = ?1 ORDER BY date",
        )?;
        let mut rows = stmt.query(params![task_id])?;
        let mut attachments = Vec::new();
        while let Some(row) = rows.next()? {
            let date: String = row.get(5)?;
            attachments.push(Attachment {
                id: row.get(0)?,
                name: row.get(1)?,
                mime_type: row.get(2)?,
                url: row.get(3)?,
                uploaded_by: row.get(4)?,
                date: dt_from_sql(&date)?,
            });
        }
        Ok(attachments)
    }

    fn load_string_list(
        conn: &Connection,
        sql: &str,
        task_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let list = stmt
            .query_map(params![task_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(list)
    }

    fn load_visibility_list(
        conn: &Connection,
        task_id: &str,
        kind: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT ref_id FROM task_visibility_entry
             WHERE task_id = ?1 AND kind = ?2 ORDER BY ref_id",
        )?;
        let list = stmt
            .query_map(params![task_id, kind], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(list)
    }

    fn task_from_row(conn: &Connection, row: &rusqlite::Row) -> Result<Task, StoreError> {
        let id: String = row.get(0)?;
        let task_type: String = row.get(1)?;
        let priority: String = row.get(4)?;
        let open_date: String = row.get(9)?;
        let created_at: String = row.get(10)?;
        let deadline: String = row.get(14)?;
        let status: String = row.get(18)?;
        let visibility: String = row.get(19)?;
        let notification_target: Option<String> = row.get(20)?;

        let steps = Self::load_steps(conn, &id)?;
        let history = Self::load_history(conn, &id)?;
        let attachments = Self::load_attachments(conn, &id)?;
        let follower_ids = Self::load_string_list(
            conn,
            "SELECT user_id FROM task_follower WHERE task_id = ?1 ORDER BY user_id",
            &id,
        )?;
        let visible_group_ids = Self::load_visibility_list(conn, &id, "group")?;
        let visible_user_ids = Self::load_visibility_list(conn, &id, "user")?;
        let visible_sector_ids = Self::load_visibility_list(conn, &id, "sector")?;

        Ok(Task {
            task_type: TaskType::from_str(&task_type)
                .ok_or_else(|| bad_value("task type", &task_type))?,
            requesting_sector: row.get(2)?,
            responsible_sector: row.get(3)?,
            priority: TaskPriority::from_str(&priority)
                .ok_or_else(|| bad_value("priority", &priority))?,
            description: row.get(5)?,
            product_profile: row.get(6)?,
            op_number: row.get(7)?,
            quantity: row
                .get::<_, Option<i64>>(8)?
                .map(|q| int_to_u32("quantity", q))
                .transpose()?,
            open_date: dt_from_sql(&open_date)?,
            created_at: dt_from_sql(&created_at)?,
            created_by: row.get(11)?,
            started_at: opt_dt_from_sql(row.get(12)?)?,
            completed_at: opt_dt_from_sql(row.get(13)?)?,
            deadline: dt_from_sql(&deadline)?,
            responsible_id: row.get(15)?,
            executor_group_id: row.get(16)?,
            requestor_id: row.get(17)?,
            status: TaskStatus::from_str(&status).ok_or_else(|| bad_value("status", &status))?,
            visibility: TaskVisibility::from_str(&visibility)
                .ok_or_else(|| bad_value("visibility", &visibility))?,
            notification_target: notification_target
                .as_deref()
                .map(|t| {
                    NotificationTarget::from_str(t)
                        .ok_or_else(|| bad_value("notification target", t))
                })
                .transpose()?,
            follower_ids,
            visible_group_ids,
            visible_user_ids,
            visible_sector_ids,
            history,
            attachments,
            steps,
            id,
        })
    }
}

const TASK_COLUMNS: &str = "id, task_type, requesting_sector, responsible_sector, priority,
    description, product_profile, op_number, quantity, open_date, created_at, created_by,
    started_at, completed_at, deadline, responsible_id, executor_group_id, requestor_id,
    status, visibility, notification_target";

impl TaskStore for SqliteTaskStore {
    fn fetch_all_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM task ORDER BY created_at DESC",
            TASK_COLUMNS
        ))?;
        let mut rows = stmt.query([])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(Self::task_from_row(&conn, row)?);
        }
        Ok(tasks)
    }

    fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM task WHERE id = ?1", TASK_COLUMNS))?;
        let mut rows = stmt.query(params![task_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::task_from_row(&conn, row)?)),
            None => Ok(None),
        }
    }

    fn upsert_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(StoreError::from)?;

        tx.execute(
            &format!(
                "INSERT INTO task ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
                 ON CONFLICT(id) DO UPDATE SET
                    task_type = excluded.task_type,
                    requesting_sector = excluded.requesting_sector,
                    responsible_sector = excluded.responsible_sector,
                    priority = excluded.priority,
                    description = excluded.description,
                    product_profile = excluded.product_profile,
                    op_number = excluded.op_number,
                    quantity = excluded.quantity,
                    open_date = excluded.open_date,
                    created_at = excluded.created_at,
                    created_by = excluded.created_by,
                    started_at = excluded.started_at,
                    completed_at = excluded.completed_at,
                    deadline = excluded.deadline,
                    responsible_id = excluded.responsible_id,
                    executor_group_id = excluded.executor_group_id,
                    requestor_id = excluded.requestor_id,
                    status = excluded.status,
                    visibility = excluded.visibility,
                    notification_target = excluded.notification_target",
                TASK_COLUMNS
            ),
            params![
                task.id,
                task.task_type.as_str(),
                task.requesting_sector,
                task.responsible_sector,
                task.priority.as_str(),
                task.description,
                task.product_profile,
                task.op_number,
                task.quantity.map(|q| q as i64),
                dt_to_sql(&task.open_date),
                dt_to_sql(&task.created_at),
                task.created_by,
                task.started_at.as_ref().map(dt_to_sql),
                task.completed_at.as_ref().map(dt_to_sql),
                dt_to_sql(&task.deadline),
                task.responsible_id,
                task.executor_group_id,
                task.requestor_id,
                task.status.as_str(),
                task.visibility.as_str(),
                task.notification_target.map(|t| t.as_str()),
            ],
        )?;

        // Children are replaced wholesale, the task is the aggregate root.
        for table in [
            "task_step",
            "task_history",
            "task_attachment",
            "task_follower",
            "task_visibility_entry",
        ] {
            tx.execute(
                &format!("DELETE FROM {} WHERE task_id = ?1", table),
                params![task.id],
            )?;
        }

        for step in &task.steps {
            tx.execute(
                "INSERT INTO task_step
                 (id, task_id, title, description, responsible_group_id, responsible_user_id,
                  deadline, status, step_order, completed_at, completed_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    step.id,
                    task.id,
                    step.title,
                    step.description,
                    step.responsible_group_id,
                    step.responsible_user_id,
                    step.deadline.as_ref().map(dt_to_sql),
                    step.status.as_str(),
                    step.order as i64,
                    step.completed_at.as_ref().map(dt_to_sql),
                    step.completed_by,
                ],
            )?;
        }

        for entry in &task.history {
            tx.execute(
                "INSERT INTO task_history
                 (id, task_id, user_id, user_name, action, timestamp, details, comment, kind)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.id,
                    task.id,
                    entry.user_id,
                    entry.user_name,
                    entry.action,
                    dt_to_sql(&entry.timestamp),
                    entry.details,
                    entry.comment,
                    entry.kind.as_str(),
                ],
            )?;
        }

        for attachment in &task.attachments {
            tx.execute(
                "INSERT INTO task_attachment (id, task_id, name, mime_type, url, uploaded_by, date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    attachment.id,
                    task.id,
                    attachment.name,
                    attachment.mime_type,
                    attachment.url,
                    attachment.uploaded_by,
                    dt_to_sql(&attachment.date),
                ],
            )?;
        }

        for follower in &task.follower_ids {
            tx.execute(
                "INSERT OR IGNORE INTO task_follower (task_id, user_id) VALUES (?1, ?2)",
                params![task.id, follower],
            )?;
        }

        let visibility_lists = [
            ("group", &task.visible_group_ids),
            ("user", &task.visible_user_ids),
            ("sector", &task.visible_sector_ids),
        ];
        for (kind, list) in visibility_lists {
            for ref_id in list.iter() {
                tx.execute(
                    "INSERT OR IGNORE INTO task_visibility_entry (task_id, kind, ref_id)
                     VALUES (?1, ?2, ?3)",
                    params![task.id, kind, ref_id],
                )?;
            }
        }

        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    fn fetch_sectors(&self) -> Result<Vec<Sector>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, name, initials, active, color FROM sector ORDER BY name")?;
        let sectors = stmt
            .query_map([], |row| {
                Ok(Sector {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    initials: row.get(2)?,
                    active: row.get::<_, i64>(3)? != 0,
                    color: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sectors)
    }

    fn upsert_sector(&self, sector: &Sector) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO sector (id, name, initials, active, color)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sector.id,
                sector.name,
                sector.initials,
                sector.active as i64,
                sector.color,
            ],
        )?;
        Ok(())
    }

    fn fetch_groups(&self) -> Result<Vec<GroupPermissions>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, can_create, can_view_all, can_update_status,
                    can_comment, can_attach, can_finish, can_view_dashboards,
                    is_system, is_system_admin
             FROM permission_group ORDER BY name",
        )?;
        let groups = stmt
            .query_map([], |row| {
                Ok(GroupPermissions {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    can_create: row.get::<_, i64>(3)? != 0,
                    can_view_all: row.get::<_, i64>(4)? != 0,
                    can_update_status: row.get::<_, i64>(5)? != 0,
                    can_comment: row.get::<_, i64>(6)? != 0,
                    can_attach: row.get::<_, i64>(7)? != 0,
                    can_finish: row.get::<_, i64>(8)? != 0,
                    can_view_dashboards: row.get::<_, i64>(9)? != 0,
                    is_system: row.get::<_, i64>(10)? != 0,
                    is_system_admin: row.get::<_, i64>(11)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    fn upsert_group(&self, group: &GroupPermissions) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO permission_group
             (id, name, description, can_create, can_view_all, can_update_status,
              can_comment, can_attach, can_finish, can_view_dashboards, is_system, is_system_admin)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                group.id,
                group.name,
                group.description,
                group.can_create as i64,
                group.can_view_all as i64,
                group.can_update_status as i64,
                group.can_comment as i64,
                group.can_attach as i64,
                group.can_finish as i64,
                group.can_view_dashboards as i64,
                group.is_system as i64,
                group.is_system_admin as i64,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workorder::fixtures::{sector, task_with_steps};
    use chrono::Duration;

    fn full_task() -> Task {
        let mut task = task_with_steps(&[StepStatus::Completed, StepStatus::InProgress]);
        task.op_number = Some("OP-1234".to_string());
        task.quantity = Some(250);
        task.responsible_id = Some("u-resp".to_string());
        task.follower_ids = vec!["u-f1".to_string(), "u-f2".to_string()];
        task.visibility = TaskVisibility::Group;
        task.visible_group_ids = vec!["g-quality".to_string()];
        task.visible_user_ids = vec!["u-guest".to_string()];
        task.visible_sector_ids = vec!["s-quality".to_string()];
        task.notification_target = Some(NotificationTarget::Group);
        task.history = vec![
            HistoryEntry {
                id: "h-2".to_string(),
                user_id: "u-1".to_string(),
                user_name: "Maria".to_string(),
                action: "step_completed".to_string(),
                timestamp: Utc::now(),
                details: "Step \"Step 1\" completed.".to_string(),
                comment: None,
                kind: HistoryKind::Step,
            },
            HistoryEntry {
                id: "h-1".to_string(),
                user_id: "u-1".to_string(),
                user_name: "Maria".to_string(),
                action: "created".to_string(),
                timestamp: Utc::now() - Duration::hours(2),
                details: "Task created.".to_string(),
                comment: Some("initial".to_string()),
                kind: HistoryKind::System,
            },
        ];
        task.attachments = vec![Attachment {
            id: "a-1".to_string(),
            name: "drawing.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            url: "/files/drawing.pdf".to_string(),
            uploaded_by: "u-1".to_string(),
            date: Utc::now(),
        }];
        task
    }

    #[test]
    fn task_aggregate_roundtrip() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let task = full_task();
        store.upsert_task(&task).unwrap();

        let loaded = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(loaded.id, task.id);
        assert_eq!(loaded.steps.len(), 2);
        assert_eq!(loaded.steps[0].status, StepStatus::Completed);
        assert_eq!(loaded.history.len(), 2);
        assert_eq!(loaded.attachments.len(), 1);
        assert_eq!(loaded.follower_ids, task.follower_ids);
        assert_eq!(loaded.visible_group_ids, vec!["g-quality".to_string()]);
        assert_eq!(loaded.visible_user_ids, vec!["u-guest".to_string()]);
        assert_eq!(loaded.visible_sector_ids, vec!["s-quality".to_string()]);
        assert_eq!(loaded.op_number.as_deref(), Some("OP-1234"));
        assert_eq!(loaded.quantity, Some(250));
        assert_eq!(loaded.notification_target, Some(NotificationTarget::Group));
    }

    #[test]
    fn history_loads_newest_first() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let task = full_task();
        store.upsert_task(&task).unwrap();

        let loaded = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(loaded.history[0].id, "h-2");
        assert_eq!(loaded.history[1].id, "h-1");
    }

    #[test]
    fn steps_load_in_order() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let mut task = full_task();
        task.steps.reverse();
        store.upsert_task(&task).unwrap();

        let loaded = store.get_task(&task.id).unwrap().unwrap();
        let orders: Vec<u32> = loaded.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[test]
    fn upsert_replaces_children() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let mut task = full_task();
        store.upsert_task(&task).unwrap();

        task.steps.remove(0);
        task.follower_ids = vec!["u-only".to_string()];
        store.upsert_task(&task).unwrap();

        let loaded = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(loaded.steps.len(), 1);
        assert_eq!(loaded.follower_ids, vec!["u-only".to_string()]);
    }

    #[test]
    fn negative_step_order_is_a_data_error() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let task = full_task();
        store.upsert_task(&task).unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute("UPDATE task_step SET step_order = -1", [])
            .unwrap();

        assert!(matches!(store.get_task(&task.id), Err(StoreError::Data(_))));
    }

    #[test]
    fn negative_quantity_is_a_data_error() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let task = full_task();
        store.upsert_task(&task).unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute("UPDATE task SET quantity = -5", [])
            .unwrap();

        assert!(matches!(store.get_task(&task.id), Err(StoreError::Data(_))));
    }

    #[test]
    fn missing_task_is_none() {
        let store = SqliteTaskStore::in_memory().unwrap();
        assert!(store.get_task("t-missing").unwrap().is_none());
    }

    #[test]
    fn sectors_and_groups_roundtrip() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let s = sector("s-quality", "Quality", "QA");
        store.upsert_sector(&s).unwrap();

        let mut g = crate::workorder::fixtures::group("g-quality");
        g.can_finish = true;
        g.is_system_admin = true;
        store.upsert_group(&g).unwrap();

        let sectors = store.fetch_sectors().unwrap();
        assert_eq!(sectors, vec![s]);

        let groups = store.fetch_groups().unwrap();
        assert_eq!(groups, vec![g]);
    }

    #[test]
    fn fetch_all_returns_every_task() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let mut a = full_task();
        a.id = "t-a".to_string();
        let mut b = full_task();
        b.id = "t-b".to_string();
        store.upsert_task(&a).unwrap();
        store.upsert_task(&b).unwrap();

        let all = store.fetch_all_tasks().unwrap();
        assert_eq!(all.len(), 2);
    }
}
