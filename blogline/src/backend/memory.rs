use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::{
    AuthApi, AuthEvent, BlobStorage, Filter, OrderBy, RecordCommand, RecordStore, SessionListener, SessionListeners,
    SortOrder, Subscription,
};
use crate::{
    errors::BackendError,
    models::{Session, User, UserId},
};

/// What the store does with replies when a comment is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentDeletePolicy {
    /// Replies stay, still pointing at the vanished parent.
    #[default]
    Detach,
    /// Every descendant is deleted with the comment.
    Cascade,
}

struct Account {
    id: UserId,
    email: String,
    password: String,
    confirmed: bool,
}

#[derive(Default)]
struct MemoryTable {
    next_id: i64,
    rows: Vec<Map<String, Value>>,
}

struct StoredObject {
    content_type: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct MemoryState {
    accounts: Vec<Account>,
    session: Option<Session>,
    tables: HashMap<String, MemoryTable>,
    objects: HashMap<(String, String), StoredObject>,
    offline: bool,
    requests: usize,
    require_confirmation: bool,
    comment_delete_policy: CommentDeletePolicy,
}

/// In-process backend with the same row-level rules as the hosted service.
///
/// - inserts must carry the signed-in user's id in `user_id`
/// - posts may only be updated or deleted by their owner
/// - comments are never updated; they may be deleted by their author or by
///   the owner of the post they belong to
/// - a reply's parent must exist on the same post
///
/// Update and delete silently skip rows the caller may not touch, exactly like
/// row-level security does, so an unauthorised mutation returns no rows.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    listeners: SessionListeners,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comment_delete_policy(self, policy: CommentDeletePolicy) -> Self {
        self.lock().comment_delete_policy = policy;
        self
    }

    /// Sign-ups wait for [`MemoryBackend::confirm_email`] before a session is issued.
    pub fn with_email_confirmation(self) -> Self {
        self.lock().require_confirmation = true;
        self
    }

    /// Simulates a transport failure on every subsequent call.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Number of calls made against this backend so far.
    pub fn request_count(&self) -> usize {
        self.lock().requests
    }

    /// Creates a confirmed account without touching the session.
    pub fn register_user(&self, email: &str, password: &str) -> UserId {
        let id = UserId::new(Uuid::new_v4().to_string());
        self.lock().accounts.push(Account {
            id: id.clone(),
            email: email.to_string(),
            password: password.to_string(),
            confirmed: true,
        });
        id
    }

    pub fn confirm_email(&self, email: &str) -> bool {
        let mut state = self.lock();
        match state.accounts.iter_mut().find(|account| account.email == email) {
            Some(account) => {
                account.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Inserts a row directly, bypassing row-level rules. Returns the stored row.
    pub fn seed_row(&self, table: &str, row: Value) -> Value {
        let mut state = self.lock();
        let Value::Object(row) = row else {
            return Value::Null;
        };
        Value::Object(insert_row(state.tables.entry(table.to_string()).or_default(), row))
    }

    /// Snapshot of a table in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<(String, Vec<u8>)> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .map(|object| (object.content_type.clone(), object.bytes.clone()))
    }

    /// Issues a fresh access token for the current session and notifies listeners.
    pub fn refresh_session(&self) -> Option<Session> {
        let refreshed = {
            let mut state = self.lock();
            let session = state.session.as_mut()?;
            session.access_token = new_token();
            session.clone()
        };
        self.listeners.notify(AuthEvent::TokenRefreshed, Some(&refreshed));
        Some(refreshed)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the call and fails it when offline.
    fn begin(&self) -> Result<MutexGuard<'_, MemoryState>, BackendError> {
        let mut state = self.lock();
        state.requests += 1;
        if state.offline {
            return Err(BackendError::transport("network unreachable"));
        }
        Ok(state)
    }

    fn start_session(&self, mut state: MutexGuard<'_, MemoryState>, user: User) -> Session {
        let session = Session {
            access_token: new_token(),
            refresh_token: Some(new_token()),
            expires_at: Some(Utc::now().timestamp() + 3600),
            user,
        };
        state.session = Some(session.clone());
        drop(state);
        self.listeners.notify(AuthEvent::SignedIn, Some(&session));
        session
    }
}

fn new_token() -> String {
    format!("mem-{}", Uuid::new_v4())
}

fn rls_violation() -> BackendError {
    BackendError::forbidden("new row violates row-level security policy").with_code("42501")
}

fn insert_row(table: &mut MemoryTable, mut row: Map<String, Value>) -> Map<String, Value> {
    let id = match row.get("id").and_then(Value::as_i64) {
        Some(id) => id,
        None => {
            table.next_id += 1;
            row.insert("id".to_string(), json!(table.next_id));
            table.next_id
        }
    };
    table.next_id = table.next_id.max(id);
    row.entry("created_at")
        .or_insert_with(|| json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)));
    table.rows.push(row.clone());
    row
}

fn matches_all(filters: &[Filter], row: &Map<String, Value>) -> bool {
    filters.iter().all(|filter| filter.matches(row))
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn project(row: &Map<String, Value>, columns: &str) -> Map<String, Value> {
    if columns.trim() == "*" {
        return row.clone();
    }
    columns
        .split(',')
        .map(str::trim)
        .filter_map(|column| row.get(column).map(|value| (column.to_string(), value.clone())))
        .collect()
}

fn row_user(row: &Map<String, Value>) -> Option<&str> {
    row.get("user_id").and_then(Value::as_str)
}

fn row_id(row: &Map<String, Value>) -> Option<i64> {
    row.get("id").and_then(Value::as_i64)
}

impl MemoryState {
    fn rows_of(&self, table: &str) -> &[Map<String, Value>] {
        self.tables.get(table).map(|t| t.rows.as_slice()).unwrap_or(&[])
    }

    fn post_owner(&self, post_id: &Value) -> Option<String> {
        self.rows_of("posts")
            .iter()
            .find(|row| row.get("id") == Some(post_id))
            .and_then(|row| row_user(row).map(str::to_string))
    }

    fn may_touch(&self, table: &str, verb: &str, row: &Map<String, Value>, user: &str) -> bool {
        match (table, verb) {
            ("comments", "update") => false,
            ("comments", "delete") => {
                row_user(row) == Some(user)
                    || row
                        .get("post_id")
                        .and_then(|post_id| self.post_owner(post_id))
                        .is_some_and(|owner| owner == user)
            }
            _ => row_user(row) == Some(user),
        }
    }

    fn check_comment_insert(&self, row: &Map<String, Value>) -> Result<(), BackendError> {
        let post_id = row.get("post_id").cloned().unwrap_or(Value::Null);
        if self.post_owner(&post_id).is_none() {
            return Err(BackendError::conflict("insert or update on table \"comments\" violates foreign key constraint")
                .with_code("23503"));
        }
        match row.get("parent_comment_id") {
            None | Some(Value::Null) => Ok(()),
            Some(parent) => {
                let parent_ok = self
                    .rows_of("comments")
                    .iter()
                    .any(|comment| comment.get("id") == Some(parent) && comment.get("post_id") == Some(&post_id));
                if parent_ok {
                    Ok(())
                } else {
                    Err(BackendError::conflict("parent comment does not exist on this post").with_code("23503"))
                }
            }
        }
    }

    /// Ids of every comment below `roots`, following parent links.
    fn comment_descendants(&self, roots: &[i64]) -> Vec<i64> {
        let mut by_parent: HashMap<i64, Vec<i64>> = HashMap::new();
        for row in self.rows_of("comments") {
            if let (Some(id), Some(parent)) = (row_id(row), row.get("parent_comment_id").and_then(Value::as_i64)) {
                by_parent.entry(parent).or_default().push(id);
            }
        }
        let mut found = Vec::new();
        let mut stack: Vec<i64> = roots.to_vec();
        while let Some(id) = stack.pop() {
            for child in by_parent.remove(&id).unwrap_or_default() {
                found.push(child);
                stack.push(child);
            }
        }
        found
    }

    fn remove_rows(&mut self, table: &str, ids: &[i64]) {
        if let Some(t) = self.tables.get_mut(table) {
            t.rows.retain(|row| row_id(row).is_none_or(|id| !ids.contains(&id)));
        }
    }

    fn execute(&mut self, command: RecordCommand) -> Result<Vec<Value>, BackendError> {
        let user = self.session.as_ref().map(|session| session.user.id.0.clone());
        match command {
            RecordCommand::Select {
                table,
                columns,
                filters,
                order,
            } => {
                let mut rows: Vec<&Map<String, Value>> =
                    self.rows_of(&table).iter().filter(|row| matches_all(&filters, row)).collect();
                if let Some(OrderBy { field, order }) = order {
                    rows.sort_by(|a, b| {
                        let ordering = compare_values(a.get(&field), b.get(&field));
                        match order {
                            SortOrder::Asc => ordering,
                            SortOrder::Desc => ordering.reverse(),
                        }
                    });
                }
                Ok(rows.into_iter().map(|row| Value::Object(project(row, &columns))).collect())
            }
            RecordCommand::Insert { table, rows } => {
                let user = user.ok_or_else(|| BackendError::unauthorized("not authenticated"))?;
                let mut prepared = Vec::with_capacity(rows.len());
                for row in rows {
                    let Value::Object(row) = row else {
                        return Err(BackendError::new(Some(400), "row must be a JSON object"));
                    };
                    if row_user(&row) != Some(user.as_str()) {
                        return Err(rls_violation());
                    }
                    if table == "comments" {
                        self.check_comment_insert(&row)?;
                    }
                    prepared.push(row);
                }
                let target = self.tables.entry(table).or_default();
                Ok(prepared
                    .into_iter()
                    .map(|row| Value::Object(insert_row(target, row)))
                    .collect())
            }
            RecordCommand::Update {
                table,
                changes,
                filters,
            } => {
                let user = user.ok_or_else(|| BackendError::unauthorized("not authenticated"))?;
                if changes.contains_key("id") || changes.contains_key("user_id") {
                    return Err(BackendError::new(Some(400), "id and owner columns are immutable"));
                }
                let allowed: Vec<i64> = self
                    .rows_of(&table)
                    .iter()
                    .filter(|row| matches_all(&filters, row) && self.may_touch(&table, "update", row, &user))
                    .filter_map(row_id)
                    .collect();
                let mut updated = Vec::new();
                if let Some(t) = self.tables.get_mut(&table) {
                    for row in t.rows.iter_mut().filter(|row| row_id(row).is_some_and(|id| allowed.contains(&id))) {
                        for (key, value) in &changes {
                            row.insert(key.clone(), value.clone());
                        }
                        updated.push(Value::Object(row.clone()));
                    }
                }
                Ok(updated)
            }
            RecordCommand::Delete { table, filters } => {
                let user = user.ok_or_else(|| BackendError::unauthorized("not authenticated"))?;
                let removed: Vec<Map<String, Value>> = self
                    .rows_of(&table)
                    .iter()
                    .filter(|row| matches_all(&filters, row) && self.may_touch(&table, "delete", row, &user))
                    .cloned()
                    .collect();
                let ids: Vec<i64> = removed.iter().filter_map(row_id).collect();
                match table.as_str() {
                    "comments" if self.comment_delete_policy == CommentDeletePolicy::Cascade => {
                        let descendants = self.comment_descendants(&ids);
                        self.remove_rows("comments", &descendants);
                    }
                    "posts" => {
                        let orphaned: Vec<i64> = self
                            .rows_of("comments")
                            .iter()
                            .filter(|row| row.get("post_id").and_then(Value::as_i64).is_some_and(|p| ids.contains(&p)))
                            .filter_map(row_id)
                            .collect();
                        self.remove_rows("comments", &orphaned);
                    }
                    _ => {}
                }
                self.remove_rows(&table, &ids);
                Ok(removed.into_iter().map(Value::Object).collect())
            }
        }
    }
}

impl AuthApi for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.begin()?.session.clone())
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, BackendError> {
        let mut state = self.begin()?;
        if state.accounts.iter().any(|account| account.email == email) {
            return Err(BackendError::new(Some(422), "User already registered").with_code("user_already_exists"));
        }
        let user = User {
            id: UserId::new(Uuid::new_v4().to_string()),
            email: Some(email.to_string()),
        };
        let confirmed = !state.require_confirmation;
        state.accounts.push(Account {
            id: user.id.clone(),
            email: email.to_string(),
            password: password.to_string(),
            confirmed,
        });
        if !confirmed {
            return Ok(None);
        }
        Ok(Some(self.start_session(state, user)))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let state = self.begin()?;
        let account = state
            .accounts
            .iter()
            .find(|account| account.email == email && account.password == password)
            .ok_or_else(|| BackendError::new(Some(400), "Invalid login credentials").with_code("invalid_credentials"))?;
        if !account.confirmed {
            return Err(BackendError::new(Some(400), "Email not confirmed").with_code("email_not_confirmed"));
        }
        let user = User {
            id: account.id.clone(),
            email: Some(account.email.clone()),
        };
        Ok(self.start_session(state, user))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let mut state = self.begin()?;
        state.session = None;
        drop(state);
        self.listeners.notify(AuthEvent::SignedOut, None);
        Ok(())
    }

    fn on_session_change(&self, listener: SessionListener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}

impl RecordStore for MemoryBackend {
    async fn execute(&self, command: RecordCommand) -> Result<Vec<Value>, BackendError> {
        self.begin()?.execute(command)
    }
}

impl BlobStorage for MemoryBackend {
    async fn upload(&self, bucket: &str, path: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), BackendError> {
        let mut state = self.begin()?;
        if state.session.is_none() {
            return Err(BackendError::unauthorized("not authenticated"));
        }
        let key = (bucket.to_string(), path.to_string());
        if state.objects.contains_key(&key) {
            return Err(BackendError::conflict("The resource already exists").with_code("Duplicate"));
        }
        state.objects.insert(
            key,
            StoredObject {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> Option<String> {
        Some(format!("memory://{bucket}/{path}"))
    }
}
