//! Capability surface of the hosted backend.
//!
//! Three traits cover the services the application consumes:
//! - [`AuthApi`] - session based authentication plus change notifications
//! - [`RecordStore`] - filtered CRUD over named tables
//! - [`BlobStorage`] - file uploads with public URLs
//!
//! [`Backend`] is implemented for anything providing all three. Two adapters ship
//! with the crate: [`MemoryBackend`] (in-process, used by tests) and
//! [`HostedBackend`] (REST over `reqwest`).
//!
//! # Example
//! ```ignore
//! let rows = backend
//!     .table("comments")
//!     .select(COMMENT_COLUMNS)
//!     .eq("post_id", 3)
//!     .order("id", SortOrder::Asc)
//!     .run()
//!     .await?;
//! ```

mod hosted;
mod listeners;
mod memory;

pub use hosted::{HostedBackend, HostedConfig};
pub use listeners::{SessionListener, SessionListeners, Subscription};
pub use memory::{CommentDeletePolicy, MemoryBackend};

use std::fmt;

use serde_json::{Map, Value};

use crate::{errors::BackendError, models::Session};

/// Why the backend pushed a session change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthEvent::InitialSession => "INITIAL_SESSION",
            AuthEvent::SignedIn => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed => "TOKEN_REFRESHED",
        };
        f.write_str(name)
    }
}

#[allow(async_fn_in_trait)]
pub trait AuthApi {
    /// The session the backend currently holds, if any.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Registers a new account. Returns `None` when the account still needs
    /// confirmation before a session is issued.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, BackendError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Calls `listener` on every session change until the returned handle is dropped.
    fn on_session_change(&self, listener: SessionListener) -> Subscription;
}

#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Runs one command and returns the selected or affected rows.
    async fn execute(&self, command: RecordCommand) -> Result<Vec<Value>, BackendError>;

    fn table(&self, name: &str) -> TableRef<'_, Self>
    where
        Self: Sized,
    {
        TableRef {
            store: self,
            table: name.to_string(),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait BlobStorage {
    /// Stores `bytes` under `bucket/path`. Fails if the object already exists.
    async fn upload(&self, bucket: &str, path: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), BackendError>;

    /// Public URL of a stored object, when the backend can produce one.
    fn public_url(&self, bucket: &str, path: &str) -> Option<String>;
}

/// Everything the application needs from its backend.
pub trait Backend: AuthApi + RecordStore + BlobStorage {}

impl<T> Backend for T where T: AuthApi + RecordStore + BlobStorage {}

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        row.get(&self.field).is_some_and(|value| value == &self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

/// A single request against the record store.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordCommand {
    Select {
        table: String,
        columns: String,
        filters: Vec<Filter>,
        order: Option<OrderBy>,
    },
    Insert {
        table: String,
        rows: Vec<Value>,
    },
    Update {
        table: String,
        changes: Map<String, Value>,
        filters: Vec<Filter>,
    },
    Delete {
        table: String,
        filters: Vec<Filter>,
    },
}

impl RecordCommand {
    pub fn table(&self) -> &str {
        match self {
            RecordCommand::Select { table, .. }
            | RecordCommand::Insert { table, .. }
            | RecordCommand::Update { table, .. }
            | RecordCommand::Delete { table, .. } => table,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            RecordCommand::Select { .. } => "select",
            RecordCommand::Insert { .. } => "insert",
            RecordCommand::Update { .. } => "update",
            RecordCommand::Delete { .. } => "delete",
        }
    }

    pub fn filters(&self) -> &[Filter] {
        match self {
            RecordCommand::Select { filters, .. }
            | RecordCommand::Update { filters, .. }
            | RecordCommand::Delete { filters, .. } => filters,
            RecordCommand::Insert { .. } => &[],
        }
    }

    fn filters_mut(&mut self) -> Option<&mut Vec<Filter>> {
        match self {
            RecordCommand::Select { filters, .. }
            | RecordCommand::Update { filters, .. }
            | RecordCommand::Delete { filters, .. } => Some(filters),
            RecordCommand::Insert { .. } => None,
        }
    }
}

/// Entry point of the fluent query builder, bound to one table.
pub struct TableRef<'a, S> {
    store: &'a S,
    table: String,
}

impl<'a, S: RecordStore> TableRef<'a, S> {
    pub fn select(self, columns: &str) -> QueryBuilder<'a, S> {
        self.build(RecordCommand::Select {
            table: self.table.clone(),
            columns: columns.to_string(),
            filters: Vec::new(),
            order: None,
        })
    }

    pub fn insert(self, rows: Vec<Value>) -> QueryBuilder<'a, S> {
        self.build(RecordCommand::Insert {
            table: self.table.clone(),
            rows,
        })
    }

    pub fn update(self, changes: Map<String, Value>) -> QueryBuilder<'a, S> {
        self.build(RecordCommand::Update {
            table: self.table.clone(),
            changes,
            filters: Vec::new(),
        })
    }

    pub fn delete(self) -> QueryBuilder<'a, S> {
        self.build(RecordCommand::Delete {
            table: self.table.clone(),
            filters: Vec::new(),
        })
    }

    fn build(&self, command: RecordCommand) -> QueryBuilder<'a, S> {
        QueryBuilder {
            store: self.store,
            command,
        }
    }
}

pub struct QueryBuilder<'a, S> {
    store: &'a S,
    command: RecordCommand,
}

impl<S: RecordStore> QueryBuilder<'_, S> {
    /// Restricts the command to rows whose `field` equals `value`. Ignored for inserts.
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        match self.command.filters_mut() {
            Some(filters) => filters.push(Filter {
                field: field.to_string(),
                value: value.into(),
            }),
            None => log::warn!("eq({field}) ignored on {} {}", self.command.verb(), self.command.table()),
        }
        self
    }

    /// Orders selected rows. Ignored for mutations.
    pub fn order(mut self, field: &str, sort: SortOrder) -> Self {
        if let RecordCommand::Select { order, .. } = &mut self.command {
            *order = Some(OrderBy {
                field: field.to_string(),
                order: sort,
            });
        }
        self
    }

    pub fn command(&self) -> &RecordCommand {
        &self.command
    }

    pub async fn run(self) -> Result<Vec<Value>, BackendError> {
        log::debug!("{} {}", self.command.verb(), self.command.table());
        self.store.execute(self.command).await
    }
}
