//! CRUD operations for cached [`UserProfile`] records.

use rusqlite::{params, OptionalExtension};
use taskcomm_shared::{UserId, UserProfile};

use crate::database::{not_found, parse_timestamp, Database};
use crate::error::Result;

const SELECT_COLUMNS: &str =
    "SELECT id, name, address, business_field, created_at, email, is_admin FROM user_profiles";

impl Database {
    /// Insert or replace a profile.
    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO user_profiles
                (id, name, address, business_field, created_at, email, is_admin)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                profile.id.as_str(),
                profile.name,
                profile.address,
                profile.business_field,
                profile.created_at.to_rfc3339(),
                profile.email,
                profile.is_admin,
            ],
        )?;
        Ok(())
    }

    /// Fetch a profile by id, `None` on a cache miss.
    pub fn get_profile(&self, id: &UserId) -> Result<Option<UserProfile>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id.as_str()], row_to_profile)
            .optional()?)
    }

    pub fn get_profile_by_email(&self, email: &str) -> Result<UserProfile> {
        let sql = format!("{SELECT_COLUMNS} WHERE email = ?1 LIMIT 1");
        self.conn()
            .query_row(&sql, params![email], row_to_profile)
            .map_err(not_found)
    }

    pub fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY name ASC");
        self.collect_profiles(&sql)
    }

    pub fn list_admins(&self) -> Result<Vec<UserProfile>> {
        let sql = format!("{SELECT_COLUMNS} WHERE is_admin = 1 ORDER BY name ASC");
        self.collect_profiles(&sql)
    }

    /// Returns `true` if a row was deleted.
    pub fn delete_profile(&self, id: &UserId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM user_profiles WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }

    fn collect_profiles(&self, sql: &str) -> Result<Vec<UserProfile>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map([], row_to_profile)?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    let created_str: String = row.get(4)?;
    Ok(UserProfile {
        id: UserId(row.get(0)?),
        name: row.get(1)?,
        address: row.get(2)?,
        business_field: row.get(3)?,
        created_at: parse_timestamp(4, &created_str)?,
        email: row.get(5)?,
        is_admin: row.get(6)?,
    })
}
