// crates/fw-recovery-config/src/lib.rs
// ============================================================================
// Module: Firmware Recovery Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for fw-recovery.toml semantics.
// Dependencies: fw-recovery-core, fw-recovery-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `fw-recovery-config` defines the configuration model for the firmware
//! recovery workflow. It provides strict, fail-closed validation and a
//! deterministic example generator that round-trips through the loader.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
