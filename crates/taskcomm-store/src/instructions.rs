//! CRUD operations for cached [`Instruction`] records.

use rusqlite::{params, OptionalExtension};
use taskcomm_shared::{Instruction, InstructionId, InstructionStatus, UserId};

use crate::database::{parse_enum, parse_timestamp, Database};
use crate::error::Result;

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, title, description, created_at, status FROM instructions";

impl Database {
    pub fn upsert_instruction(&self, instruction: &Instruction) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO instructions
                (id, user_id, title, description, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                instruction.id.as_str(),
                instruction.user_id.as_str(),
                instruction.title,
                instruction.description,
                instruction.created_at.to_rfc3339(),
                instruction.status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_instruction(&self, id: &InstructionId) -> Result<Option<Instruction>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id.as_str()], row_to_instruction)
            .optional()?)
    }

    /// All cached instructions, newest first.
    pub fn list_instructions(&self) -> Result<Vec<Instruction>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY created_at DESC");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], row_to_instruction)?;

        let mut instructions = Vec::new();
        for row in rows {
            instructions.push(row?);
        }
        Ok(instructions)
    }

    /// Instructions owned by `user_id`, newest first.
    pub fn list_instructions_for_user(&self, user_id: &UserId) -> Result<Vec<Instruction>> {
        let sql = format!("{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY created_at DESC");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![user_id.as_str()], row_to_instruction)?;

        let mut instructions = Vec::new();
        for row in rows {
            instructions.push(row?);
        }
        Ok(instructions)
    }

    /// Returns `true` if the instruction was cached.
    pub fn update_instruction_status(
        &self,
        id: &InstructionId,
        status: InstructionStatus,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE instructions SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_instruction(&self, id: &InstructionId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM instructions WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }
}

fn row_to_instruction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Instruction> {
    let created_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    Ok(Instruction {
        id: InstructionId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        created_at: parse_timestamp(4, &created_str)?,
        status: parse_enum(5, &status_str)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn instruction(id: &str, user: &str, age_mins: i64) -> Instruction {
        Instruction {
            id: InstructionId::new(id),
            user_id: UserId::new(user),
            title: format!("title {id}"),
            description: String::new(),
            created_at: Utc::now() - Duration::minutes(age_mins),
            status: InstructionStatus::Pending,
        }
    }

    #[test]
    fn test_list_for_user_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("cache.db")).unwrap();

        db.upsert_instruction(&instruction("old", "u1", 30)).unwrap();
        db.upsert_instruction(&instruction("new", "u1", 1)).unwrap();
        db.upsert_instruction(&instruction("other", "u2", 5)).unwrap();

        let mine = db.list_instructions_for_user(&UserId::new("u1")).unwrap();
        let ids: Vec<_> = mine.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(db.list_instructions().unwrap().len(), 3);
    }

    #[test]
    fn test_status_update_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("cache.db")).unwrap();
        let inst = instruction("i1", "u1", 0);
        db.upsert_instruction(&inst).unwrap();

        assert!(db
            .update_instruction_status(&inst.id, InstructionStatus::InProgress)
            .unwrap());
        let cached = db.get_instruction(&inst.id).unwrap().unwrap();
        assert_eq!(cached.status, InstructionStatus::InProgress);

        assert!(db.delete_instruction(&inst.id).unwrap());
        assert!(db.get_instruction(&inst.id).unwrap().is_none());
    }
}
