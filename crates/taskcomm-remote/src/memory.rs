//! In-process backends.
//!
//! Each type implements one backend trait over plain collections behind a
//! `std::sync::Mutex` (never held across an await).  They assign ids and
//! timestamps the way the hosted services do and expose switches that make
//! individual operations fail or be silently ignored, which is how
//! row-level-security denials look from the client side.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::blob::BlobBackend;
use crate::document::{Document, DocumentBackend};
use crate::error::{RemoteError, Result};
use crate::query::Query;
use crate::relational::{AuthBackend, AuthUser, RelationalBackend, Session};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A panic while holding one of these locks leaves plain data behind.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unavailable(what: &str) -> RemoteError {
    RemoteError::Unavailable(format!("{what} disabled"))
}

fn unordered_limit() -> RemoteError {
    RemoteError::Status {
        status: 400,
        message: "PGRST109: limit on update or delete requires an order".into(),
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Shallow-merge `patch` into `row`.
fn merge(row: &mut Value, patch: &Value) {
    if let (Value::Object(row), Value::Object(patch)) = (row, patch) {
        for (k, v) in patch {
            row.insert(k.clone(), v.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Relational
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Faults {
    fail_select: AtomicBool,
    fail_writes: AtomicBool,
    fail_probe: AtomicBool,
    ignore_updates: AtomicBool,
    ignore_deletes: AtomicBool,
    write_delay_ms: AtomicU64,
}

/// Tables of JSON rows.  Inserted rows get a uuid `id` and an RFC-3339
/// `created_at` unless the caller supplied them.
#[derive(Default)]
pub struct MemoryRelational {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    faults: Faults,
    selects: AtomicUsize,
}

impl MemoryRelational {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `select` fails.
    pub fn set_fail_select(&self, on: bool) {
        self.faults.fail_select.store(on, Ordering::SeqCst);
    }

    /// Every write (`insert`, `upsert`, `update`, `delete`) fails.
    pub fn set_fail_writes(&self, on: bool) {
        self.faults.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Unfiltered one-row selects fail; other selects are unaffected.
    pub fn set_fail_probe(&self, on: bool) {
        self.faults.fail_probe.store(on, Ordering::SeqCst);
    }

    /// Updates report success but change nothing.
    pub fn set_ignore_updates(&self, on: bool) {
        self.faults.ignore_updates.store(on, Ordering::SeqCst);
    }

    /// Deletes report success but remove nothing.
    pub fn set_ignore_deletes(&self, on: bool) {
        self.faults.ignore_deletes.store(on, Ordering::SeqCst);
    }

    /// Hold every `update` and `delete` for `delay` before it touches the
    /// table, like a slow network round trip.
    pub fn set_write_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.faults.write_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of `select` calls served so far, failed ones included.
    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    /// Current contents of `table`.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    async fn write_latency(&self) {
        let ms = self.faults.write_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn check_writes(&self) -> Result<()> {
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable("writes"));
        }
        Ok(())
    }

    fn stamp(row: Value) -> Result<Value> {
        let Value::Object(mut map) = row else {
            return Err(RemoteError::Malformed("row must be an object".into()));
        };
        map.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        map.entry("created_at")
            .or_insert_with(|| Value::String(now_rfc3339()));
        Ok(Value::Object(map))
    }
}

#[async_trait]
impl RelationalBackend for MemoryRelational {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_select.load(Ordering::SeqCst) {
            return Err(unavailable("select"));
        }
        let is_probe = query.filters().is_empty() && query.row_limit() == Some(1);
        if is_probe && self.faults.fail_probe.load(Ordering::SeqCst) {
            return Err(unavailable("probe"));
        }
        Ok(query.apply(self.rows(table)))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>> {
        self.check_writes()?;
        let row = Self::stamp(row)?;
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        debug!(table, id = %row["id"], "row inserted");
        Ok(vec![row])
    }

    async fn upsert(&self, table: &str, row: Value) -> Result<Vec<Value>> {
        self.check_writes()?;
        let mut tables = lock(&self.tables);
        let rows = tables.entry(table.to_string()).or_default();

        let existing = row
            .get("id")
            .and_then(|id| rows.iter_mut().find(|r| r.get("id") == Some(id)));
        match existing {
            Some(current) => {
                merge(current, &row);
                Ok(vec![current.clone()])
            }
            None => {
                let row = Self::stamp(row)?;
                rows.push(row.clone());
                Ok(vec![row])
            }
        }
    }

    async fn update(&self, table: &str, patch: Value, query: &Query) -> Result<Vec<Value>> {
        self.write_latency().await;
        self.check_writes()?;
        if query.has_unordered_limit() {
            return Err(unordered_limit());
        }
        if self.faults.ignore_updates.load(Ordering::SeqCst) {
            debug!(table, "update ignored");
            return Ok(Vec::new());
        }
        let mut tables = lock(&self.tables);
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|r| query.matches(r)) {
            merge(row, &patch);
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        self.write_latency().await;
        self.check_writes()?;
        if query.has_unordered_limit() {
            return Err(unordered_limit());
        }
        if self.faults.ignore_deletes.load(Ordering::SeqCst) {
            debug!(table, "delete ignored");
            return Ok(Vec::new());
        }
        let mut tables = lock(&self.tables);
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };
        let (removed, kept): (Vec<Value>, Vec<Value>) =
            rows.drain(..).partition(|r| query.matches(r));
        *rows = kept;
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

struct Account {
    id: String,
    password: String,
    confirmed: bool,
}

/// Email/password accounts.  With confirmation required, sign-up issues no
/// session and sign-in is refused until [`confirm`](Self::confirm) is called.
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    session: Mutex<Option<Session>>,
    require_confirmation: bool,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new(false)
    }
}

impl MemoryAuth {
    pub fn new(require_confirmation: bool) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            require_confirmation,
        }
    }

    pub fn confirm(&self, email: &str) -> bool {
        match lock(&self.accounts).get_mut(email) {
            Some(account) => {
                account.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// The account id registered for `email`.
    pub fn user_id(&self, email: &str) -> Option<String> {
        lock(&self.accounts).get(email).map(|a| a.id.clone())
    }

    fn issue(&self, id: &str, email: &str) -> Session {
        let session = Session {
            access_token: Uuid::new_v4().simple().to_string(),
            refresh_token: None,
            user: AuthUser {
                id: id.to_string(),
                email: Some(email.to_string()),
                role: None,
            },
        };
        *lock(&self.session) = Some(session.clone());
        session
    }
}

#[async_trait]
impl AuthBackend for MemoryAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let id = {
            let mut accounts = lock(&self.accounts);
            if accounts.contains_key(email) {
                return Err(RemoteError::Status {
                    status: 422,
                    message: "User already registered".into(),
                });
            }
            let id = Uuid::new_v4().to_string();
            accounts.insert(
                email.to_string(),
                Account {
                    id: id.clone(),
                    password: password.to_string(),
                    confirmed: !self.require_confirmation,
                },
            );
            id
        };

        if self.require_confirmation {
            return Ok(None);
        }
        Ok(Some(self.issue(&id, email)))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let id = {
            let accounts = lock(&self.accounts);
            let account = accounts
                .get(email)
                .filter(|a| a.password == password)
                .ok_or_else(|| RemoteError::Status {
                    status: 400,
                    message: "Invalid login credentials".into(),
                })?;
            if !account.confirmed {
                return Err(RemoteError::Status {
                    status: 400,
                    message: "Email not confirmed".into(),
                });
            }
            account.id.clone()
        };
        Ok(self.issue(&id, email))
    }

    async fn sign_out(&self) -> Result<()> {
        lock(&self.session).take();
        Ok(())
    }

    async fn session(&self) -> Option<Session> {
        lock(&self.session).clone()
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryDocuments {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    failing: AtomicBool,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails while set.
    pub fn set_failing(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("document store"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentBackend for MemoryDocuments {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.check()?;
        Ok(lock(&self.collections)
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn set(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        self.check()?;
        if !fields.is_object() {
            return Err(RemoteError::Malformed("document fields must be an object".into()));
        }
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Value) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        self.set(collection, &id, fields).await?;
        Ok(id)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        self.check()?;
        let docs: Vec<Document> = lock(&self.collections)
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(query.apply_by(docs, |doc| &doc.fields))
    }
}

// ---------------------------------------------------------------------------
// Blobs
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBlobs {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    failing: AtomicBool,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    /// Stored bytes and content type at `path`.
    pub fn object(&self, path: &str) -> Option<(Bytes, String)> {
        lock(&self.objects).get(path).cloned()
    }
}

#[async_trait]
impl BlobBackend for MemoryBlobs {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("blob storage"));
        }
        lock(&self.objects).insert(path.to_string(), (data, content_type.to_string()));
        debug!(path, "blob stored");
        Ok(format!("memory://blobs/{path}"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::query::Direction;

    #[tokio::test]
    async fn test_insert_assigns_id_and_timestamp() {
        let db = MemoryRelational::new();
        let rows = db
            .insert("chat_messages", json!({"task_id": "t1", "text": "hi"}))
            .await
            .unwrap();
        assert!(rows[0]["id"].is_string());
        assert!(rows[0]["created_at"].is_string());

        let fetched = db
            .select("chat_messages", &Query::new().eq("task_id", "t1"))
            .await
            .unwrap();
        assert_eq!(fetched, rows);
    }

    #[tokio::test]
    async fn test_upsert_merges_existing_row() {
        let db = MemoryRelational::new();
        db.upsert("profiles", json!({"id": "u1", "role": "user"})).await.unwrap();
        db.upsert("profiles", json!({"id": "u1", "name": "Ada"})).await.unwrap();

        let rows = db.rows("profiles");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["role"], "user");
        assert_eq!(rows[0]["name"], "Ada");
    }

    #[tokio::test]
    async fn test_update_and_delete_by_filter() {
        let db = MemoryRelational::new();
        db.insert("t", json!({"id": "a", "text": "x"})).await.unwrap();
        db.insert("t", json!({"id": "b", "text": "y"})).await.unwrap();

        let updated = db
            .update("t", json!({"text": "z"}), &Query::new().eq("id", "a"))
            .await
            .unwrap();
        assert_eq!(updated[0]["text"], "z");

        let removed = db.delete("t", &Query::new().eq("id", "b")).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(db.rows("t").len(), 1);
    }

    #[tokio::test]
    async fn test_unordered_limit_on_write_is_rejected() {
        let db = MemoryRelational::new();
        db.insert("t", json!({"id": "a", "text": "x"})).await.unwrap();
        let limited = Query::new().eq("id", "a").limit(1);

        let err = db
            .update("t", json!({"text": "z"}), &limited)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(db.delete("t", &limited).await.is_err());
        assert_eq!(db.rows("t")[0]["text"], "x");
    }

    #[tokio::test]
    async fn test_write_delay_holds_the_write() {
        let db = MemoryRelational::new();
        db.insert("t", json!({"id": "a"})).await.unwrap();
        db.set_write_delay(Duration::from_millis(20));

        let started = std::time::Instant::now();
        db.delete("t", &Query::new().eq("id", "a")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(db.rows("t").is_empty());
    }

    #[tokio::test]
    async fn test_ignored_writes_report_success() {
        let db = MemoryRelational::new();
        db.insert("t", json!({"id": "a", "text": "x"})).await.unwrap();
        db.set_ignore_updates(true);
        db.set_ignore_deletes(true);

        let q = Query::new().eq("id", "a");
        assert!(db.update("t", json!({"text": "z"}), &q).await.unwrap().is_empty());
        assert!(db.delete("t", &q).await.unwrap().is_empty());
        assert_eq!(db.rows("t")[0]["text"], "x");
    }

    #[tokio::test]
    async fn test_fault_switches() {
        let db = MemoryRelational::new();
        db.set_fail_probe(true);
        assert!(db.select("t", &Query::new().limit(1)).await.is_err());
        assert!(db.select("t", &Query::new()).await.is_ok());

        db.set_fail_writes(true);
        assert!(db.insert("t", json!({})).await.is_err());
        db.set_fail_select(true);
        assert!(db.select("t", &Query::new()).await.is_err());
        assert_eq!(db.select_count(), 3);
    }

    #[tokio::test]
    async fn test_auth_confirmation_flow() {
        let auth = MemoryAuth::new(true);
        assert!(auth.sign_up("a@b.c", "pw").await.unwrap().is_none());

        let err = auth.sign_in("a@b.c", "pw").await.unwrap_err();
        assert!(err.to_string().contains("Email not confirmed"));

        assert!(auth.confirm("a@b.c"));
        let session = auth.sign_in("a@b.c", "pw").await.unwrap();
        assert_eq!(Some(session.user.id.clone()), auth.user_id("a@b.c"));
        assert!(auth.session().await.is_some());

        auth.sign_out().await.unwrap();
        assert!(auth.session().await.is_none());
    }

    #[tokio::test]
    async fn test_auth_rejects_bad_password_and_duplicates() {
        let auth = MemoryAuth::default();
        assert!(auth.sign_up("a@b.c", "pw").await.unwrap().is_some());
        assert!(auth.sign_up("a@b.c", "pw").await.is_err());
        let err = auth.sign_in("a@b.c", "nope").await.unwrap_err();
        assert!(err.to_string().contains("Invalid login credentials"));
    }

    #[tokio::test]
    async fn test_document_query_orders_by_field() {
        let docs = MemoryDocuments::new();
        docs.set("users", "u1", json!({"name": "B", "createdAt": 2})).await.unwrap();
        docs.set("users", "u2", json!({"name": "A", "createdAt": 1})).await.unwrap();
        let id = docs.add("users", json!({"name": "C", "createdAt": 3})).await.unwrap();

        let listed = docs
            .query("users", &Query::new().order("createdAt", Direction::Descending))
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![id.as_str(), "u1", "u2"]);
        assert!(docs.get("users", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blob_upload_and_failure() {
        let blobs = MemoryBlobs::new();
        let url = blobs
            .upload("uploads/a.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
        assert_eq!(url, "memory://blobs/uploads/a.png");
        assert_eq!(blobs.object("uploads/a.png").unwrap().1, "image/png");

        blobs.set_failing(true);
        assert!(blobs
            .upload("uploads/b.png", Bytes::new(), "image/png")
            .await
            .is_err());
    }
}
