//! MediaBackup Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core of the local backup
//! engine:
//! - **Domain entities** - `BackupFolder`, `BackupFile`, `BackupDuplicate`,
//!   `BackupConfiguration`, `BackupError`, derived `BackupStatus`
//! - **Use cases** - folder scanning, duplicate resolution, upload
//!   scheduling, cleanup, status aggregation and backup control
//! - **Port definitions** - Traits for adapters: `IBackupRepository`,
//!   `ILocalEnumerator`, `IDuplicateService`, `IUploadSubsystem`, ...
//! - **State machine** - per-file backup lifecycle
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! Use cases orchestrate domain entities through port interfaces and
//! commit every step to the state store, so an interrupted pipeline can
//! always be resumed.

pub mod config;
pub mod domain;
pub mod hashing;
pub mod ports;
pub mod usecases;
