//! CRUD operations for cached [`Task`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use taskcomm_shared::{InstructionId, Task, TaskId, TaskStatus, UserId};

use crate::database::{parse_enum, parse_timestamp, Database};
use crate::error::Result;

const SELECT_COLUMNS: &str = "SELECT id, instruction_id, admin_id, title, description, status, \
                              created_at, completed_at FROM tasks";

impl Database {
    pub fn upsert_task(&self, task: &Task) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO tasks
                (id, instruction_id, admin_id, title, description, status, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.id.as_str(),
                task.instruction_id.as_str(),
                task.admin_id.as_str(),
                task.title,
                task.description,
                task.status.as_str(),
                task.created_at.to_rfc3339(),
                task.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id.as_str()], row_to_task)
            .optional()?)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY created_at DESC");
        self.collect_tasks(&sql, "")
    }

    pub fn list_tasks_for_instruction(&self, instruction_id: &InstructionId) -> Result<Vec<Task>> {
        let sql = format!("{SELECT_COLUMNS} WHERE instruction_id = ?1 ORDER BY created_at DESC");
        self.collect_tasks(&sql, instruction_id.as_str())
    }

    pub fn list_tasks_for_admin(&self, admin_id: &UserId) -> Result<Vec<Task>> {
        let sql = format!("{SELECT_COLUMNS} WHERE admin_id = ?1 ORDER BY created_at DESC");
        self.collect_tasks(&sql, admin_id.as_str())
    }

    pub fn update_task_status(&self, id: &TaskId, status: TaskStatus) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn set_task_completed_at(
        &self,
        id: &TaskId,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE tasks SET completed_at = ?1 WHERE id = ?2",
            params![completed_at.map(|t| t.to_rfc3339()), id.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_task(&self, id: &TaskId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }

    /// Run a task query with zero or one bound parameter.
    fn collect_tasks(&self, sql: &str, param: &str) -> Result<Vec<Task>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = if stmt.parameter_count() == 0 {
            stmt.query_map([], row_to_task)?
        } else {
            stmt.query_map(params![param], row_to_task)?
        };

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status_str: String = row.get(5)?;
    let created_str: String = row.get(6)?;
    let completed_str: Option<String> = row.get(7)?;

    let completed_at = completed_str
        .map(|s| parse_timestamp(7, &s))
        .transpose()?;

    Ok(Task {
        id: TaskId(row.get(0)?),
        instruction_id: InstructionId(row.get(1)?),
        admin_id: UserId(row.get(2)?),
        title: row.get(3)?,
        description: row.get(4)?,
        status: parse_enum(5, &status_str)?,
        created_at: parse_timestamp(6, &created_str)?,
        completed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, instruction: &str, admin: &str) -> Task {
        Task {
            id: TaskId::new(id),
            instruction_id: InstructionId::new(instruction),
            admin_id: UserId::new(admin),
            title: "Inspect site".into(),
            description: "Bring a ladder".into(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_lookups_by_parent_and_admin() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("cache.db")).unwrap();

        db.upsert_task(&task("t1", "i1", "a1")).unwrap();
        db.upsert_task(&task("t2", "i1", "a2")).unwrap();
        db.upsert_task(&task("t3", "i2", "a1")).unwrap();

        assert_eq!(db.list_tasks().unwrap().len(), 3);
        assert_eq!(
            db.list_tasks_for_instruction(&InstructionId::new("i1")).unwrap().len(),
            2
        );
        assert_eq!(db.list_tasks_for_admin(&UserId::new("a1")).unwrap().len(), 2);
    }

    #[test]
    fn test_completion_fields() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("cache.db")).unwrap();
        let t = task("t1", "i1", "a1");
        db.upsert_task(&t).unwrap();

        let done_at = Utc::now();
        assert!(db.update_task_status(&t.id, TaskStatus::Completed).unwrap());
        assert!(db.set_task_completed_at(&t.id, Some(done_at)).unwrap());

        let cached = db.get_task(&t.id).unwrap().unwrap();
        assert_eq!(cached.status, TaskStatus::Completed);
        assert_eq!(
            cached.completed_at.map(|c| c.timestamp_millis()),
            Some(done_at.timestamp_millis())
        );

        assert!(db.delete_task(&t.id).unwrap());
        assert!(!db.update_task_status(&t.id, TaskStatus::Pending).unwrap());
    }
}
