//! The storage layer: one `Store` per process, shared through `AppState`.
//!
//! Every entity gets the same five operations (`get`, `list` with a filter,
//! `create`, `update` as a shallow merge, `delete`). Ids come from SQLite
//! `AUTOINCREMENT` and are never reused. Nothing here checks permissions or
//! cross-entity references; handlers do that before calling in.

mod plans;
mod progress;
mod students;
mod suggestions;
mod users;

use super::DbPool;

#[derive(Debug, Clone)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
