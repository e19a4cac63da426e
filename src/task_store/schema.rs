//! Schema for the task database (`tasks.db`).

use crate::sqlite_persistence::VersionedSchema;

pub const TASK_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    up: r#"
        CREATE TABLE IF NOT EXISTS task (
            id TEXT PRIMARY KEY,
            task_type TEXT NOT NULL,
            requesting_sector TEXT NOT NULL,
            responsible_sector TEXT NOT NULL,
            priority TEXT NOT NULL,
            description TEXT NOT NULL,
            product_profile TEXT NOT NULL,
            op_number TEXT,
            quantity INTEGER,
            open_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            created_by TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            deadline TEXT NOT NULL,
            responsible_id TEXT,
            executor_group_id TEXT NOT NULL,
            requestor_id TEXT NOT NULL,
            status TEXT NOT NULL,
            visibility TEXT NOT NULL,
            notification_target TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_task_status ON task(status);

        CREATE TABLE IF NOT EXISTS task_step (
            id TEXT NOT NULL,
            task_id TEXT NOT NULL REFERENCES task(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT,
            responsible_group_id TEXT NOT NULL,
            responsible_user_id TEXT,
            deadline TEXT,
            status TEXT NOT NULL,
            step_order INTEGER NOT NULL,
            completed_at TEXT,
            completed_by TEXT,
            UNIQUE(task_id, id)
        );
        CREATE INDEX IF NOT EXISTS idx_task_step_task ON task_step(task_id);

        CREATE TABLE IF NOT EXISTS task_history (
            id TEXT NOT NULL,
            task_id TEXT NOT NULL REFERENCES task(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            user_name TEXT NOT NULL,
            action TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            details TEXT NOT NULL,
            comment TEXT,
            kind TEXT NOT NULL,
            UNIQUE(task_id, id)
        );
        CREATE INDEX IF NOT EXISTS idx_task_history_task ON task_history(task_id);

        CREATE TABLE IF NOT EXISTS task_attachment (
            id TEXT NOT NULL,
            task_id TEXT NOT NULL REFERENCES task(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            url TEXT NOT NULL,
            uploaded_by TEXT NOT NULL,
            date TEXT NOT NULL,
            UNIQUE(task_id, id)
        );

        CREATE TABLE IF NOT EXISTS task_follower (
            task_id TEXT NOT NULL REFERENCES task(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            UNIQUE(task_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS task_visibility_entry (
            task_id TEXT NOT NULL REFERENCES task(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            ref_id TEXT NOT NULL,
            UNIQUE(task_id, kind, ref_id)
        );

        CREATE TABLE IF NOT EXISTS sector (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            initials TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            color TEXT
        );

        CREATE TABLE IF NOT EXISTS permission_group (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            can_create INTEGER NOT NULL DEFAULT 0,
            can_view_all INTEGER NOT NULL DEFAULT 0,
            can_update_status INTEGER NOT NULL DEFAULT 0,
            can_comment INTEGER NOT NULL DEFAULT 0,
            can_attach INTEGER NOT NULL DEFAULT 0,
            can_finish INTEGER NOT NULL DEFAULT 0,
            can_view_dashboards INTEGER NOT NULL DEFAULT 0,
            is_system INTEGER NOT NULL DEFAULT 0,
            is_system_admin INTEGER NOT NULL DEFAULT 0
        );
    "#,
}];
