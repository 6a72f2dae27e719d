//! Merge of a locally held chat view with a freshly fetched server view.

use std::collections::{HashMap, HashSet};

use crate::models::ChatMessage;
use crate::types::MessageId;

/// Reconcile the local message view with the server's rows for the same task.
///
/// For every identity present on the server the server copy wins, unless the
/// local copy carries the edited marker and the server has not caught up with
/// that text yet.  Messages known only locally (unconfirmed sends) are kept
/// as-is.  The result holds exactly one entry per distinct identity, ordered
/// ascending by timestamp; ties keep server order first, then local order.
///
/// When an identity repeats inside one input, its first occurrence is used.
pub fn reconcile(local: &[ChatMessage], server: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut local_by_id: HashMap<&MessageId, &ChatMessage> = HashMap::with_capacity(local.len());
    for msg in local {
        local_by_id.entry(&msg.id).or_insert(msg);
    }

    let mut seen: HashSet<&MessageId> = HashSet::with_capacity(local.len() + server.len());
    let mut merged = Vec::with_capacity(local.len() + server.len());

    for server_msg in server {
        if !seen.insert(&server_msg.id) {
            continue;
        }
        let chosen = match local_by_id.get(&server_msg.id) {
            Some(local_msg) if has_unconfirmed_edit(local_msg, server_msg) => *local_msg,
            _ => server_msg,
        };
        merged.push(chosen.clone());
    }

    for local_msg in local {
        if seen.insert(&local_msg.id) {
            merged.push(local_msg.clone());
        }
    }

    merged.sort_by_key(|m| m.timestamp);
    merged
}

/// The local copy was edited and the server does not yet show the edited text.
fn has_unconfirmed_edit(local: &ChatMessage, server: &ChatMessage) -> bool {
    local.is_edited() && local.text != server.text
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::models::mark_edited;
    use crate::types::{FileType, Role, TaskId, UserId};

    fn base_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()
    }

    fn msg(id: MessageId, text: &str, offset_secs: i64) -> ChatMessage {
        ChatMessage {
            id,
            task_id: TaskId::new("task-1"),
            sender_role: Role::User,
            sender_id: UserId::new("user-1"),
            text: text.to_string(),
            media_url: None,
            file_type: FileType::Text,
            file_name: None,
            file_size: None,
            timestamp: base_time() + Duration::seconds(offset_secs),
        }
    }

    fn confirmed(id: &str, text: &str, offset_secs: i64) -> ChatMessage {
        msg(MessageId::confirmed(id), text, offset_secs)
    }

    fn ids(messages: &[ChatMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_optimistic_send_preserved_when_server_empty() {
        let local = vec![msg(MessageId::Pending("local-1700000000".into()), "hi", 0)];
        let out = reconcile(&local, &[]);
        assert_eq!(out, local);
    }

    #[test]
    fn test_unconfirmed_edit_keeps_local_copy() {
        let local = vec![confirmed("abc", "hello (edited)", 0)];
        let server = vec![confirmed("abc", "hello", 0)];
        let out = reconcile(&local, &server);
        assert_eq!(out, local);
    }

    #[test]
    fn test_server_copy_wins_without_edit_marker() {
        let mut local_abc = confirmed("abc", "hello", 0);
        local_abc.file_name = Some("stale".into());
        let server = vec![confirmed("abc", "hello", 0), confirmed("def", "new", 5)];
        let out = reconcile(&[local_abc], &server);
        assert_eq!(out, server);
    }

    #[test]
    fn test_confirmed_edit_resolves_to_server_copy() {
        let mut local = confirmed("abc", &mark_edited("hello"), 0);
        local.media_url = Some("local-only".into());
        let server = confirmed("abc", &mark_edited("hello"), 0);
        let out = reconcile(&[local], &[server.clone()]);
        assert_eq!(out, vec![server]);
    }

    #[test]
    fn test_disjoint_inputs_keep_every_identity() {
        let local = vec![
            msg(MessageId::Pending("local-1".into()), "a", 3),
            confirmed("x", "b", 1),
        ];
        let server = vec![confirmed("y", "c", 2), confirmed("z", "d", 4)];
        let out = reconcile(&local, &server);
        assert_eq!(out.len(), 4);
        for l in &local {
            assert!(out.contains(l));
        }
    }

    #[test]
    fn test_output_sorted_by_timestamp() {
        let local = vec![
            msg(MessageId::Pending("local-late".into()), "late", 10),
            msg(MessageId::Pending("local-early".into()), "early", -10),
        ];
        let server = vec![confirmed("b", "b", 5), confirmed("a", "a", 0)];
        let out = reconcile(&local, &server);
        assert_eq!(ids(&out), vec!["local-early", "a", "b", "local-late"]);
        assert!(out.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_ties_are_stable() {
        let server = vec![confirmed("s1", "one", 0), confirmed("s2", "two", 0)];
        let local = vec![msg(MessageId::Pending("local-1".into()), "three", 0)];
        let out = reconcile(&local, &server);
        assert_eq!(ids(&out), vec!["s1", "s2", "local-1"]);
    }

    #[test]
    fn test_duplicate_identities_collapse() {
        let local = vec![confirmed("abc", "first", 0), confirmed("abc", "second", 1)];
        let server = vec![confirmed("abc", "server", 0), confirmed("abc", "again", 2)];
        let out = reconcile(&local, &server);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "server");
    }

    #[test]
    fn test_pending_and_confirmed_with_same_token_are_distinct() {
        let local = vec![msg(MessageId::Pending("abc".into()), "pending", 0)];
        let server = vec![confirmed("abc", "confirmed", 1)];
        let out = reconcile(&local, &server);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let local = vec![
            confirmed("abc", "hello (edited)", 0),
            confirmed("gone", "removed on server", 1),
            msg(MessageId::Pending("local-9".into()), "in flight", 9),
        ];
        let server = vec![
            confirmed("abc", "hello", 0),
            confirmed("def", "new", 2),
        ];
        let once = reconcile(&local, &server);
        let twice = reconcile(&once, &server);
        assert_eq!(once, twice);
    }
}
