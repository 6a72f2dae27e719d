//! Permission diagnostics for the chat table.
//!
//! Produces a plain-text report of what the current session can read and
//! write.  Every probe is best-effort and reported inline.  The target
//! message is never modified: the update probe writes back its current text,
//! and the insert/delete probe uses a throwaway row in a throwaway task.

use std::fmt::Write;

use serde_json::json;
use taskcomm_remote::Query;
use taskcomm_shared::constants::{PROBE_MESSAGE_TEXT, TABLE_CHAT_MESSAGES};
use taskcomm_shared::{ChatMessage, OutgoingMessage, Role, TaskId, UserId};
use tracing::{debug, warn};
use uuid::Uuid;

use super::rows::{decode_messages, to_value, MessageInsert};
use super::Repository;

impl Repository {
    pub async fn diagnose_permissions(&self, message_id: &str) -> String {
        let mut report = String::new();
        let session = self.backends.auth.session().await;

        let _ = writeln!(report, "=== AUTHENTICATION DIAGNOSTICS ===");
        match &session {
            Some(s) => {
                let _ = writeln!(report, "User ID: {}", s.user.id);
                let _ = writeln!(report, "User Email: {}", s.user.email.as_deref().unwrap_or("-"));
                let _ = writeln!(report, "User Role: {}", s.user.role.as_deref().unwrap_or("-"));
                let _ = writeln!(report, "Session Valid: true");
            }
            None => {
                let _ = writeln!(report, "Session Valid: false");
            }
        }
        let _ = writeln!(report);

        let _ = writeln!(report, "=== MESSAGE ACCESS DIAGNOSTICS ===");
        let target = match self.find_message(message_id).await {
            Ok(Some(msg)) => {
                let _ = writeln!(report, "Message found: YES");
                let _ = writeln!(report, "Task ID: {}", msg.task_id);
                let _ = writeln!(report, "Sender ID: {}", msg.sender_id);
                let _ = writeln!(report, "Sender Role: {}", msg.sender_role.as_str());
                let _ = writeln!(report, "Text: {}", msg.text);
                let _ = writeln!(report, "Created: {}", msg.timestamp.to_rfc3339());
                Some(msg)
            }
            Ok(None) => {
                let _ = writeln!(report, "Message found: NO");
                None
            }
            Err(e) => {
                let _ = writeln!(report, "Message read error: {e}");
                None
            }
        };
        let _ = writeln!(report);

        let _ = writeln!(report, "=== RLS POLICY DIAGNOSTICS ===");
        self.probe_read(&mut report, "all messages", Query::new().limit(10))
            .await;
        if let Some(msg) = &target {
            self.probe_read(
                &mut report,
                "task messages",
                Query::new().eq("task_id", msg.task_id.as_str()),
            )
            .await;
            self.probe_read(
                &mut report,
                "sender messages",
                Query::new().eq("sender_id", msg.sender_id.as_str()),
            )
            .await;
        }
        let _ = writeln!(report);

        let _ = writeln!(report, "=== WRITE PERMISSION DIAGNOSTICS ===");
        let sender = session
            .as_ref()
            .map(|s| s.user.id.clone())
            .unwrap_or_else(|| "diagnostic-sender".to_string());
        self.probe_insert_delete(&mut report, &sender).await;
        match &target {
            Some(msg) => self.probe_update(&mut report, msg).await,
            None => {
                let _ = writeln!(report, "Can update specific message: SKIPPED (not readable)");
            }
        }

        debug!(message_id, "permission diagnostics complete");
        report
    }

    async fn probe_read(&self, report: &mut String, label: &str, query: Query) {
        match self.backends.relational.select(TABLE_CHAT_MESSAGES, &query).await {
            Ok(rows) => {
                let _ = writeln!(report, "Can read {label}: YES ({} messages)", rows.len());
            }
            Err(e) => {
                let _ = writeln!(report, "Can read {label}: NO - {e}");
            }
        }
    }

    async fn probe_insert_delete(&self, report: &mut String, sender: &str) {
        let probe = OutgoingMessage::text(
            TaskId::new(format!("diagnostic-{}", Uuid::new_v4().simple())),
            UserId::new(sender),
            Role::User,
            PROBE_MESSAGE_TEXT,
        );
        let row = match to_value(&MessageInsert::from(&probe)) {
            Ok(row) => row,
            Err(e) => {
                let _ = writeln!(report, "Can insert messages: NO - {e}");
                return;
            }
        };

        let inserted = match self.backends.relational.insert(TABLE_CHAT_MESSAGES, row).await {
            Ok(rows) => rows,
            Err(e) => {
                let _ = writeln!(report, "Can insert messages: NO - {e}");
                return;
            }
        };
        let _ = writeln!(report, "Can insert messages: YES");

        // Clean up by id when the insert echoed the row, otherwise by the
        // probe's unique task id.
        let probe_id = decode_messages(inserted)
            .ok()
            .and_then(|rows| rows.into_iter().next())
            .and_then(|m| m.id.confirmed_id().map(str::to_string));
        let cleanup = match &probe_id {
            Some(id) => Query::new().eq("id", id.as_str()),
            None => Query::new().eq("task_id", probe.task_id.as_str()),
        };
        match self.backends.relational.delete(TABLE_CHAT_MESSAGES, &cleanup).await {
            Ok(rows) if !rows.is_empty() => {
                let _ = writeln!(report, "Can delete test messages: YES");
            }
            Ok(_) => {
                warn!(probe_id = ?probe_id, "probe row may have been left behind");
                let _ = writeln!(report, "Can delete test messages: NO - no rows affected");
            }
            Err(e) => {
                let _ = writeln!(report, "Can delete test messages: NO - {e}");
            }
        }
    }

    async fn probe_update(&self, report: &mut String, target: &ChatMessage) {
        let Some(id) = target.id.confirmed_id() else {
            return;
        };
        let result = self
            .backends
            .relational
            .update(
                TABLE_CHAT_MESSAGES,
                json!({ "text": target.text }),
                &Query::new().eq("id", id),
            )
            .await;
        match result {
            Ok(rows) if !rows.is_empty() => {
                let _ = writeln!(report, "Can update specific message: YES");
            }
            Ok(_) => {
                let _ = writeln!(report, "Can update specific message: NO - no rows affected");
            }
            Err(e) => {
                let _ = writeln!(report, "Can update specific message: NO - {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::harness;

    #[tokio::test]
    async fn test_report_leaves_target_untouched() {
        let h = harness();
        let out = OutgoingMessage::text(TaskId::new("t1"), UserId::new("u1"), Role::User, "keep me");
        let sent = h.repo.send_message(&out).await.unwrap();

        let report = h.repo.diagnose_permissions(sent.id.as_str()).await;
        assert!(report.contains("Message found: YES"));
        assert!(report.contains("Can read task messages: YES (1 messages)"));
        assert!(report.contains("Can insert messages: YES"));
        assert!(report.contains("Can delete test messages: YES"));
        assert!(report.contains("Can update specific message: YES"));

        let rows = h.relational.rows(TABLE_CHAT_MESSAGES);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["text"], "keep me");
    }

    #[tokio::test]
    async fn test_report_under_denied_writes() {
        let h = harness();
        h.relational.set_fail_writes(true);
        let report = h.repo.diagnose_permissions("ghost").await;
        assert!(report.contains("Session Valid: false"));
        assert!(report.contains("Message found: NO"));
        assert!(report.contains("Can insert messages: NO"));
        assert!(report.contains("SKIPPED"));
    }
}
