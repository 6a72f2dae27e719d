//! Tasks.  Reads and creation go through the relational `tasks` table;
//! edits are written to the `tasks/{id}` document.

use chrono::Utc;
use taskcomm_remote::{Direction, Query};
use taskcomm_shared::constants::{COLLECTION_TASKS, TABLE_TASKS};
use taskcomm_shared::{InstructionId, NewTask, Task, TaskId, TaskStatus};
use tracing::{info, warn};

use super::rows::{decode_rows, to_value, TaskDocument, TaskRow};
use super::Repository;
use crate::error::{ClientError, Result};

impl Repository {
    pub async fn create_task(&self, new: &NewTask) -> Result<Task> {
        let rows = self
            .backends
            .relational
            .insert(TABLE_TASKS, to_value(&TaskRow::from(new))?)
            .await?;
        let task = decode_rows::<TaskRow>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Verification("task insert returned no row".into()))?
            .into_task()?;
        self.mirror("task", |db| db.upsert_task(&task));
        info!(task_id = %task.id, instruction_id = %task.instruction_id, "task created");
        Ok(task)
    }

    /// Write the task document, then the cache.
    pub async fn update_task(&self, task: &Task) -> Result<()> {
        let fields = to_value(&TaskDocument::from(task))?;
        self.backends
            .documents
            .set(COLLECTION_TASKS, task.id.as_str(), fields)
            .await?;
        self.mirror("task", |db| db.upsert_task(task));
        Ok(())
    }

    /// Tasks of one instruction, newest first.  Empty on failure.
    pub async fn tasks_for_instruction(&self, instruction_id: &InstructionId) -> Vec<Task> {
        let query = Query::new()
            .eq("instruction_id", instruction_id.as_str())
            .order("created_at", Direction::Descending);
        let rows = match self.backends.relational.select(TABLE_TASKS, &query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(instruction_id = %instruction_id, error = %e, "task load failed");
                return Vec::new();
            }
        };
        let tasks: Vec<Task> = match decode_rows::<TaskRow>(rows) {
            Ok(rows) => rows.into_iter().filter_map(|r| r.into_task().ok()).collect(),
            Err(e) => {
                warn!(error = %e, "task rows undecodable");
                return Vec::new();
            }
        };
        for task in &tasks {
            self.mirror("task", |db| db.upsert_task(task));
        }
        tasks
    }

    /// The task row, falling back to the cache when the table is unreachable.
    pub async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        let query = Query::new().eq("id", id.as_str()).limit(1);
        match self.backends.relational.select(TABLE_TASKS, &query).await {
            Ok(rows) => {
                let Some(row) = decode_rows::<TaskRow>(rows)?.into_iter().next() else {
                    return Ok(None);
                };
                let task = row.into_task()?;
                self.mirror("task", |db| db.upsert_task(&task));
                Ok(Some(task))
            }
            Err(e) => {
                warn!(task_id = %id, error = %e, "task fetch failed, using cache");
                self.with_cache(|db| db.get_task(id))
            }
        }
    }

    /// Change the status of a cached task and write it through
    /// [`update_task`](Self::update_task).  Completing a task stamps its
    /// completion time; reopening clears it.
    pub async fn update_task_status(&self, id: &TaskId, status: TaskStatus) -> Result<Task> {
        let mut task = self
            .with_cache(|db| db.get_task(id))?
            .ok_or_else(|| ClientError::NotFound(format!("task {id}")))?;
        task.status = status;
        task.completed_at = match status {
            TaskStatus::Completed => task.completed_at.or_else(|| Some(Utc::now())),
            TaskStatus::Pending => None,
        };
        self.update_task(&task).await?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use taskcomm_remote::DocumentBackend;

    use super::*;
    use crate::repository::test_support::harness;

    fn new_task(instruction: &str, title: &str) -> NewTask {
        NewTask {
            instruction_id: InstructionId::new(instruction),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let h = harness();
        let created = h.repo.create_task(&new_task("i1", "Survey")).await.unwrap();
        h.repo.create_task(&new_task("i2", "Other")).await.unwrap();

        let tasks = h.repo.tasks_for_instruction(&InstructionId::new("i1")).await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, created.id);
        assert_eq!(tasks[0].admin_id.as_str(), "");
    }

    #[tokio::test]
    async fn test_list_failure_is_empty() {
        let h = harness();
        h.repo.create_task(&new_task("i1", "Survey")).await.unwrap();
        h.relational.set_fail_select(true);
        assert!(h.repo.tasks_for_instruction(&InstructionId::new("i1")).await.is_empty());
    }

    #[tokio::test]
    async fn test_get_task_falls_back_to_cache() {
        let h = harness();
        let created = h.repo.create_task(&new_task("i1", "Survey")).await.unwrap();
        assert!(h.repo.get_task(&created.id).await.unwrap().is_some());

        h.relational.set_fail_select(true);
        let cached = h.repo.get_task(&created.id).await.unwrap().unwrap();
        assert_eq!(cached.title, "Survey");
    }

    #[tokio::test]
    async fn test_status_update_writes_document() {
        let h = harness();
        let created = h.repo.create_task(&new_task("i1", "Survey")).await.unwrap();

        let done = h
            .repo
            .update_task_status(&created.id, TaskStatus::Completed)
            .await
            .unwrap();
        assert!(done.completed_at.is_some());

        let doc = h
            .documents
            .get(COLLECTION_TASKS, created.id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.fields["status"], "completed");
        assert_eq!(doc.fields["instructionId"], "i1");
    }

    #[tokio::test]
    async fn test_status_update_of_uncached_task_fails() {
        let h = harness();
        let err = h
            .repo
            .update_task_status(&TaskId::new("ghost"), TaskStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }
}
