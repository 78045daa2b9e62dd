//! Postgres implementation of the persistence collaborator.
//!
//! Query-per-function modules over a shared `PgPool`; `PgStore` wires them
//! into the store traits the engine components consume.

pub mod connections;
pub mod orders;
pub mod snapshots;
pub mod tasks;

use sqlx::PgPool;

/// Postgres-backed implementation of all store traits
#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
