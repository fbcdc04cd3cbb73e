//! Filter profiles
//!
//! A [`FilterProfile`] is one subscription: its persisted metadata, its
//! lifecycle state and the rule index currently serving matches. The index
//! sits behind `RwLock<Arc<_>>`; matching clones the `Arc` under a short read
//! lock, so an update swapping in a new index is seen as entirely old or
//! entirely new.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use lg_core::{MatchResult, RequestContext, RuleIndex};

use crate::error::{ConfigurationError, ProfileError};
use crate::store::{ProfileStore, StoreError};
use crate::updater::UpdateOutcome;

/// A profile not updated for this long is reported as stale.
pub const STALE_AFTER: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const MAX_UPDATE_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// =============================================================================
// Lock Helpers
// =============================================================================

// A panic while holding one of these locks cannot leave the data half
// written (every write is a single assignment), so poisoning is ignored.

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Metadata
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileCategory {
    Advertisements,
    Annoyance,
    Privacy,
    Social,
    /// Language-specific lists; see [`ProfileMetadata::languages`]
    Regional,
    #[default]
    Other,
}

impl ProfileCategory {
    pub const ALL: [ProfileCategory; 6] = [
        Self::Advertisements,
        Self::Annoyance,
        Self::Privacy,
        Self::Social,
        Self::Regional,
        Self::Other,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Advertisements => "advertisements",
            Self::Annoyance => "annoyance",
            Self::Privacy => "privacy",
            Self::Social => "social",
            Self::Regional => "regional",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ProfileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProfileCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown category {s:?}"))
    }
}

/// Persisted record of a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub name: String,
    pub title: String,
    /// Replace `title` with the list's own `! Title:` after each load
    #[serde(default)]
    pub title_from_list: bool,
    /// `! Title:` of the last installed list
    #[serde(default)]
    pub list_title: Option<String>,
    pub source_url: String,
    #[serde(default)]
    pub category: ProfileCategory,
    #[serde(default)]
    pub languages: Vec<String>,
    /// Zero means never update automatically
    pub update_interval: Duration,
    /// Last successful update (including "unchanged" results)
    #[serde(default)]
    pub last_update: Option<SystemTime>,
    /// `sha256:<hex>` of the cached list bytes
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub expires: Option<Duration>,
}

fn default_enabled() -> bool {
    true
}

/// Input for adding a profile.
#[derive(Debug, Clone)]
pub struct ProfileSettings {
    pub name: String,
    pub source_url: String,
    pub title: Option<String>,
    pub category: ProfileCategory,
    pub languages: Vec<String>,
    pub update_interval: Option<Duration>,
    pub enabled: bool,
}

impl ProfileSettings {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            title: None,
            category: ProfileCategory::default(),
            languages: Vec::new(),
            update_interval: None,
            enabled: true,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_category(mut self, category: ProfileCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = Some(interval);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_name(&self.name)?;
        validate_source_url(&self.source_url)?;
        if let Some(interval) = self.update_interval {
            validate_update_interval(interval)?;
        }
        Ok(())
    }

    pub fn into_metadata(self, default_interval: Duration) -> ProfileMetadata {
        let title_from_list = self.title.is_none();
        ProfileMetadata {
            title: self.title.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            title_from_list,
            list_title: None,
            source_url: self.source_url,
            category: self.category,
            languages: self.languages,
            update_interval: self.update_interval.unwrap_or(default_interval),
            last_update: None,
            checksum: None,
            enabled: self.enabled,
            homepage: None,
            expires: None,
        }
    }
}

/// Names become file names, so only `[A-Za-z0-9_-]` is allowed.
pub fn validate_name(name: &str) -> Result<(), ConfigurationError> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidName(name.to_string()))
    }
}

pub fn validate_update_interval(interval: Duration) -> Result<(), ConfigurationError> {
    if interval.is_zero() || (MIN_UPDATE_INTERVAL..=MAX_UPDATE_INTERVAL).contains(&interval) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidInterval(interval))
    }
}

pub fn validate_source_url(url: &str) -> Result<(), ConfigurationError> {
    let rest = ["https://", "http://", "file://"]
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme));
    match rest {
        Some(rest) if !rest.is_empty() && !rest.contains(char::is_whitespace) => Ok(()),
        _ => Err(ConfigurationError::InvalidUrl(url.to_string())),
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileState {
    NotLoaded,
    /// First load in progress; no index yet
    Loading,
    Loaded,
    /// Refresh in progress; the current index keeps serving
    Updating,
    /// Last load or update failed. A previously loaded index keeps serving.
    Error(ProfileError),
}

impl ProfileState {
    pub fn error(&self) -> Option<&ProfileError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ProfileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoaded => f.write_str("not loaded"),
            Self::Loading => f.write_str("loading"),
            Self::Loaded => f.write_str("loaded"),
            Self::Updating => f.write_str("updating"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Read-only snapshot of a profile for UI consumers.
#[derive(Debug, Clone)]
pub struct ProfileInfo {
    pub name: String,
    pub title: String,
    pub source_url: String,
    pub category: ProfileCategory,
    pub languages: Vec<String>,
    pub update_interval: Duration,
    pub last_update: Option<SystemTime>,
    pub checksum: Option<String>,
    pub homepage: Option<String>,
    pub expires: Option<Duration>,
    pub enabled: bool,
    pub state: ProfileState,
    pub is_updating: bool,
    pub is_stale: bool,
    pub rules: usize,
    pub cosmetic_rules: usize,
    pub consecutive_failures: u32,
}

// =============================================================================
// Filter Profile
// =============================================================================

pub(crate) type InFlight = watch::Receiver<Option<UpdateOutcome>>;

/// Handle for writing a profile's files off the async runtime.
///
/// Writes hold one lock per profile and snapshot the metadata under it, so a
/// record on disk is never older than one written before it. Nothing is
/// written once the profile is retired.
#[derive(Clone)]
pub(crate) struct ProfileRecord {
    metadata: Arc<RwLock<ProfileMetadata>>,
    persist_lock: Arc<Mutex<()>>,
    retired: Arc<AtomicBool>,
}

impl ProfileRecord {
    pub(crate) fn persist(&self, store: &ProfileStore, list: Option<&[u8]>) -> Result<(), StoreError> {
        let _guard = lock(&self.persist_lock);
        if self.retired.load(Ordering::Acquire) {
            return Ok(());
        }
        let metadata = read(&self.metadata).clone();
        if let Some(list) = list {
            store.write_list(&metadata.name, list)?;
        }
        store.save_metadata(&metadata)
    }
}

pub struct FilterProfile {
    name: String,
    metadata: Arc<RwLock<ProfileMetadata>>,
    persist_lock: Arc<Mutex<()>>,
    state: RwLock<ProfileState>,
    index: RwLock<Arc<RuleIndex>>,
    enabled: AtomicBool,
    has_index: AtomicBool,
    retired: Arc<AtomicBool>,
    consecutive_failures: AtomicU32,
    /// Outcome channel of the running load/update, if any
    pub(crate) in_flight: Mutex<Option<InFlight>>,
}

impl FilterProfile {
    pub fn new(metadata: ProfileMetadata) -> Self {
        Self {
            name: metadata.name.clone(),
            enabled: AtomicBool::new(metadata.enabled),
            metadata: Arc::new(RwLock::new(metadata)),
            persist_lock: Arc::new(Mutex::new(())),
            state: RwLock::new(ProfileState::NotLoaded),
            index: RwLock::new(Arc::new(RuleIndex::empty())),
            has_index: AtomicBool::new(false),
            retired: Arc::new(AtomicBool::new(false)),
            consecutive_failures: AtomicU32::new(0),
            in_flight: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> ProfileMetadata {
        read(&self.metadata).clone()
    }

    pub(crate) fn record(&self) -> ProfileRecord {
        ProfileRecord {
            metadata: Arc::clone(&self.metadata),
            persist_lock: Arc::clone(&self.persist_lock),
            retired: Arc::clone(&self.retired),
        }
    }

    /// Write the current metadata record.
    pub(crate) fn save_metadata(&self, store: &ProfileStore) -> Result<(), StoreError> {
        self.record().persist(store, None)
    }

    /// Apply `f` to the metadata and return the updated record.
    pub fn update_metadata(&self, f: impl FnOnce(&mut ProfileMetadata)) -> ProfileMetadata {
        let mut metadata = write(&self.metadata);
        f(&mut metadata);
        metadata.clone()
    }

    pub fn state(&self) -> ProfileState {
        read(&self.state).clone()
    }

    pub(crate) fn set_state(&self, state: ProfileState) {
        *write(&self.state) = state;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) -> ProfileMetadata {
        self.enabled.store(enabled, Ordering::Release);
        self.update_metadata(|m| m.enabled = enabled)
    }

    /// The index currently serving matches.
    pub fn index(&self) -> Arc<RuleIndex> {
        Arc::clone(&read(&self.index))
    }

    /// True once any index (from cache or download) has been installed.
    pub fn has_index(&self) -> bool {
        self.has_index.load(Ordering::Acquire)
    }

    /// Replace the index, returning the old one.
    pub(crate) fn swap_index(&self, index: RuleIndex) -> Arc<RuleIndex> {
        let old = std::mem::replace(&mut *write(&self.index), Arc::new(index));
        self.has_index.store(true, Ordering::Release);
        old
    }

    pub fn is_updating(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub(crate) fn record_failure(&self, error: ProfileError) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.set_state(ProfileState::Error(error));
    }

    pub(crate) fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.set_state(ProfileState::Loaded);
    }

    /// Mark the profile as removed; pending updates stop persisting it.
    /// Waits for a write already in progress.
    pub(crate) fn retire(&self) {
        let _guard = lock(&self.persist_lock);
        self.retired.store(true, Ordering::Release);
    }

    /// Enabled, auto-updating and not refreshed within its interval.
    pub fn is_due(&self, now: SystemTime) -> bool {
        let metadata = read(&self.metadata);
        if !metadata.enabled || metadata.update_interval.is_zero() {
            return false;
        }
        match metadata.last_update {
            None => true,
            // A last update in the future means the clock moved back.
            Some(last) => now
                .duration_since(last)
                .map_or(true, |elapsed| elapsed >= metadata.update_interval),
        }
    }

    /// Never updated, or last updated more than [`STALE_AFTER`] ago.
    pub fn is_stale(&self, now: SystemTime) -> bool {
        match read(&self.metadata).last_update {
            None => true,
            Some(last) => now.duration_since(last).map_or(false, |elapsed| elapsed > STALE_AFTER),
        }
    }

    pub fn match_request(&self, ctx: &RequestContext<'_>) -> MatchResult {
        self.index().match_request(ctx)
    }

    pub fn info(&self, now: SystemTime) -> ProfileInfo {
        let metadata = self.metadata();
        let stats = self.index().stats();
        ProfileInfo {
            is_stale: self.is_stale(now),
            is_updating: self.is_updating(),
            state: self.state(),
            rules: stats.network(),
            cosmetic_rules: stats.cosmetic,
            consecutive_failures: self.consecutive_failures(),
            name: metadata.name,
            title: metadata.title,
            source_url: metadata.source_url,
            category: metadata.category,
            languages: metadata.languages,
            update_interval: metadata.update_interval,
            last_update: metadata.last_update,
            checksum: metadata.checksum,
            homepage: metadata.homepage,
            expires: metadata.expires,
            enabled: metadata.enabled,
        }
    }
}

impl fmt::Debug for FilterProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterProfile")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("enabled", &self.is_enabled())
            .field("rules", &self.index().len())
            .finish()
    }
}
