//! Instructions, held in the relational `instructions` table.

use taskcomm_remote::{Direction, Query};
use taskcomm_shared::constants::TABLE_INSTRUCTIONS;
use taskcomm_shared::{Instruction, InstructionId, NewInstruction, UserId};
use tracing::{info, warn};

use super::rows::{decode_rows, to_value, InstructionRow};
use super::Repository;
use crate::error::{ClientError, Result};

impl Repository {
    /// Insert an instruction and return it as stored (server-assigned id and
    /// creation time).
    pub async fn create_instruction(&self, new: &NewInstruction) -> Result<Instruction> {
        let rows = self
            .backends
            .relational
            .insert(TABLE_INSTRUCTIONS, to_value(&InstructionRow::from(new))?)
            .await?;
        let instruction = first_instruction(rows)?;
        self.mirror("instruction", |db| db.upsert_instruction(&instruction));
        info!(instruction_id = %instruction.id, user_id = %new.user_id, "instruction created");
        Ok(instruction)
    }

    pub async fn update_instruction(&self, instruction: &Instruction) -> Result<Instruction> {
        let rows = self
            .backends
            .relational
            .upsert(TABLE_INSTRUCTIONS, to_value(&InstructionRow::from(instruction))?)
            .await?;
        // Row-level security may hide the row; fall back to what was sent.
        let stored = first_instruction(rows).unwrap_or_else(|_| instruction.clone());
        self.mirror("instruction", |db| db.upsert_instruction(&stored));
        Ok(stored)
    }

    /// The user's instructions, newest first.  Empty on failure.
    pub async fn instructions_for_user(&self, user_id: &UserId) -> Vec<Instruction> {
        let query = Query::new()
            .eq("user_id", user_id.as_str())
            .order("created_at", Direction::Descending);
        self.load_instructions(query).await
    }

    /// Every instruction visible to the caller, newest first.  Empty on
    /// failure.
    pub async fn all_instructions(&self) -> Vec<Instruction> {
        self.load_instructions(Query::new().order("created_at", Direction::Descending))
            .await
    }

    /// Cached instruction, or the table row on a miss.
    pub async fn get_instruction(&self, id: &InstructionId) -> Result<Option<Instruction>> {
        if let Some(cached) = self.with_cache(|db| db.get_instruction(id))? {
            return Ok(Some(cached));
        }
        let query = Query::new().eq("id", id.as_str()).limit(1);
        let rows = self.backends.relational.select(TABLE_INSTRUCTIONS, &query).await?;
        let Some(row) = decode_rows::<InstructionRow>(rows)?.into_iter().next() else {
            return Ok(None);
        };
        let instruction = row.into_instruction()?;
        self.mirror("instruction", |db| db.upsert_instruction(&instruction));
        Ok(Some(instruction))
    }

    async fn load_instructions(&self, query: Query) -> Vec<Instruction> {
        let rows = match self.backends.relational.select(TABLE_INSTRUCTIONS, &query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "instruction load failed");
                return Vec::new();
            }
        };
        let instructions: Vec<Instruction> = match decode_rows::<InstructionRow>(rows) {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| row.into_instruction().ok())
                .collect(),
            Err(e) => {
                warn!(error = %e, "instruction rows undecodable");
                return Vec::new();
            }
        };
        for instruction in &instructions {
            self.mirror("instruction", |db| db.upsert_instruction(instruction));
        }
        instructions
    }
}

fn first_instruction(rows: Vec<serde_json::Value>) -> Result<Instruction> {
    decode_rows::<InstructionRow>(rows)?
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::Verification("instruction write returned no row".into()))?
        .into_instruction()
}

#[cfg(test)]
mod tests {
    use taskcomm_shared::InstructionStatus;

    use super::*;
    use crate::repository::test_support::harness;

    #[tokio::test]
    async fn test_create_returns_stored_row_and_caches() {
        let h = harness();
        let created = h
            .repo
            .create_instruction(&NewInstruction::new(UserId::new("u1"), "Paint", "Blue"))
            .await
            .unwrap();
        assert!(!created.id.as_str().is_empty());
        assert_eq!(created.status, InstructionStatus::Pending);

        h.relational.set_fail_select(true);
        let cached = h.repo.get_instruction(&created.id).await.unwrap().unwrap();
        assert_eq!(cached.title, "Paint");
    }

    #[tokio::test]
    async fn test_lists_newest_first_and_empty_on_failure() {
        let h = harness();
        let user = UserId::new("u1");
        for title in ["first", "second"] {
            h.repo
                .create_instruction(&NewInstruction::new(user.clone(), title, ""))
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        h.repo
            .create_instruction(&NewInstruction::new(UserId::new("u2"), "other", ""))
            .await
            .unwrap();

        let mine = h.repo.instructions_for_user(&user).await;
        let titles: Vec<_> = mine.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);
        assert_eq!(h.repo.all_instructions().await.len(), 3);

        h.relational.set_fail_select(true);
        assert!(h.repo.instructions_for_user(&user).await.is_empty());
    }

    #[tokio::test]
    async fn test_update_changes_status() {
        let h = harness();
        let mut created = h
            .repo
            .create_instruction(&NewInstruction::new(UserId::new("u1"), "Paint", ""))
            .await
            .unwrap();
        created.status = InstructionStatus::InProgress;
        let stored = h.repo.update_instruction(&created).await.unwrap();
        assert_eq!(stored.status, InstructionStatus::InProgress);
        assert_eq!(h.relational.rows(TABLE_INSTRUCTIONS).len(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_instruction() {
        let h = harness();
        assert!(h
            .repo
            .get_instruction(&InstructionId::new("missing"))
            .await
            .unwrap()
            .is_none());
    }
}
