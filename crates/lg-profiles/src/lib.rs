//! ListGuard Profiles
//!
//! Filter list subscriptions on top of `lg-core` and `lg-compiler`: download,
//! integrity checks, local caching, scheduled updates and the
//! [`ContentBlockingManager`] that answers block/allow queries across every
//! enabled profile.

pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod integrity;
pub mod manager;
pub mod profile;
pub mod store;
pub mod updater;

pub use config::{ConfigError, EngineConfig, FetchConfig, LoggingConfig};
pub use error::{ConfigurationError, ManagerError, ProfileError};
pub use events::{EventBus, ProfileEvent, ProfileEventKind};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use integrity::{compute_checksum, verify_checksum, IntegrityError};
pub use manager::ContentBlockingManager;
pub use profile::{
    FilterProfile, ProfileCategory, ProfileInfo, ProfileMetadata, ProfileSettings, ProfileState, STALE_AFTER,
};
pub use store::{ProfileStore, StoreError};
pub use updater::{ProfileUpdater, ScheduleHandle, UpdateOutcome};
