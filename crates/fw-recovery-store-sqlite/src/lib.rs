// crates/fw-recovery-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Device Store
// Description: Durable device stores backed by SQLite WAL.
// Purpose: Provide production-grade persistence for firmware recovery state.
// Dependencies: fw-recovery-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides [`SqliteDeviceStore`], one SQLite database that backs
//! every collaborator the workflow persists through: retry records, attribute
//! snapshots, group membership, and the live attribute registry. Records are
//! stored as canonical JSON with an integrity hash and loads fail closed on
//! corruption.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_RECORD_BYTES;
pub use store::SqliteDeviceStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
