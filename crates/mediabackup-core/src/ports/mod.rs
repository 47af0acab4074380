//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IBackupRepository`] - File State Store (folders, files, duplicates, errors)
//! - [`ILocalEnumerator`] - Device media index and file content
//! - [`IDuplicateService`] - Remote name-hash duplicate lookup
//! - [`IUploadSubsystem`] - External upload transport
//! - [`IDeviceInfo`], [`IHashKeyProvider`], [`IEnvironmentSignals`] - Platform capabilities
//! - [`IEventAnnouncer`] - UI-facing event delivery

pub mod announcer;
pub mod backup_repository;
pub mod device;
pub mod duplicate_service;
pub mod local_enumerator;
pub mod upload;

pub use announcer::IEventAnnouncer;
pub use backup_repository::IBackupRepository;
pub use device::{IDeviceInfo, IEnvironmentSignals, IHashKeyProvider};
pub use duplicate_service::IDuplicateService;
pub use local_enumerator::{IContentStream, ILocalEnumerator, LocalFileDescriptor};
pub use upload::{CacheOption, IUploadSubsystem, UploadFileDescriptor};
