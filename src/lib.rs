//! Library exports for the simbatch binary and tests.
/// Collection scanning into an immutable job catalog.
pub mod catalog;
/// Pull-model dispatch protocol between the coordinator and workers.
pub mod dispatch;
/// Single-job subprocess execution with output capture.
pub mod executor;
/// Validated in-memory form of one job directory.
pub mod job;
/// Logging setup for the application.
pub mod logging;
/// Manifest parsing and shape normalization.
pub mod manifest;
/// Consolidated-store merge engine.
pub mod merge;
/// End-to-end run orchestration.
pub mod run;
