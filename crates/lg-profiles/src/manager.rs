//! Content blocking manager
//!
//! Owns every profile, answers block/allow queries across the enabled ones
//! and is the single entry point for adding, editing and refreshing
//! subscriptions. Constructed explicitly by the application and shared by
//! reference; there is no global instance.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use futures::{stream, StreamExt};
use tokio::sync::broadcast;

use lg_core::{MatchDecision, MatchResult, RequestContext, RequestType};

use crate::config::EngineConfig;
use crate::error::{ConfigurationError, ManagerError};
use crate::events::{EventBus, ProfileEvent, ProfileEventKind};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::profile::{
    read, validate_name, validate_update_interval, write, FilterProfile, ProfileInfo, ProfileSettings,
};
use crate::store::ProfileStore;
use crate::updater::{ProfileUpdater, ScheduleHandle, UpdateOutcome};

/// Profiles loaded concurrently by [`ContentBlockingManager::activate_all`].
const CONCURRENT_LOADS: usize = 4;

type ProfileMap = BTreeMap<String, Arc<FilterProfile>>;

pub struct ContentBlockingManager {
    profiles: Arc<RwLock<ProfileMap>>,
    updater: Arc<ProfileUpdater>,
    store: Arc<ProfileStore>,
    events: EventBus,
    default_update_interval: Duration,
    check_interval: Duration,
}

impl ContentBlockingManager {
    /// A manager with no profiles, storing under `config.storage_dir`.
    pub fn new(config: &EngineConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, ManagerError> {
        let default_update_interval = config.default_update_interval();
        validate_update_interval(default_update_interval)?;

        let store = Arc::new(ProfileStore::new(&config.storage_dir)?);
        let events = EventBus::new();
        let updater = Arc::new(ProfileUpdater::new(fetcher, Arc::clone(&store), events.clone()));

        Ok(Self {
            profiles: Arc::new(RwLock::new(BTreeMap::new())),
            updater,
            store,
            events,
            default_update_interval,
            check_interval: config.check_interval(),
        })
    }

    /// A manager restoring every profile recorded in `config.storage_dir`.
    /// Profiles start as not loaded; call [`activate_all`](Self::activate_all).
    pub fn open(config: &EngineConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, ManagerError> {
        let manager = Self::new(config, fetcher)?;
        let records = manager.store.load_all_metadata()?;

        {
            let mut profiles = write(&manager.profiles);
            for metadata in records {
                if let Err(e) = validate_name(&metadata.name) {
                    log::warn!("Skipping stored profile: {}", e);
                    continue;
                }
                profiles.insert(metadata.name.clone(), Arc::new(FilterProfile::new(metadata)));
            }
            log::info!("Restored {} profiles from {}", profiles.len(), manager.store.dir().display());
        }

        Ok(manager)
    }

    /// [`open`](Self::open) with the HTTP fetcher built from `config.fetch`.
    pub fn open_with_http(config: &EngineConfig) -> Result<Self, ManagerError> {
        let fetcher = HttpFetcher::new(&config.fetch)?;
        Self::open(config, Arc::new(fetcher))
    }

    // =========================================================================
    // Matching
    // =========================================================================

    /// Aggregate verdict across enabled profiles. An exception in any profile
    /// overrides a block from any other.
    pub fn match_request(&self, ctx: &RequestContext<'_>) -> MatchResult {
        let profiles = read(&self.profiles);
        let mut blocked: Option<MatchResult> = None;

        for profile in profiles.values().filter(|p| p.is_enabled()) {
            let result = profile.match_request(ctx);
            match result.decision {
                MatchDecision::Exception => return result,
                MatchDecision::Block if blocked.is_none() => blocked = Some(result),
                _ => {}
            }
        }

        blocked.unwrap_or_default()
    }

    /// Should the request be cancelled? Never touches the network or disk.
    pub fn is_blocked(&self, url: &str, origin_url: Option<&str>, request_type: RequestType) -> bool {
        let ctx = RequestContext::new(url, origin_url, request_type);
        self.match_request(&ctx).decision.is_blocked()
    }

    // =========================================================================
    // Administration
    // =========================================================================

    pub fn add_profile(&self, settings: ProfileSettings) -> Result<ProfileInfo, ManagerError> {
        settings.validate()?;
        let metadata = settings.into_metadata(self.default_update_interval);
        let name = metadata.name.clone();

        let profile = {
            let mut profiles = write(&self.profiles);
            if profiles.contains_key(&name) {
                return Err(ConfigurationError::DuplicateName(name).into());
            }
            self.store.save_metadata(&metadata)?;
            let profile = Arc::new(FilterProfile::new(metadata));
            profiles.insert(name.clone(), Arc::clone(&profile));
            profile
        };

        log::info!("Added profile '{}'", name);
        self.events.emit(&name, ProfileEventKind::Added);
        Ok(profile.info(SystemTime::now()))
    }

    /// Remove a profile and delete its cache and metadata files.
    pub fn remove_profile(&self, name: &str) -> Result<(), ManagerError> {
        let profile = write(&self.profiles)
            .remove(name)
            .ok_or_else(|| ConfigurationError::UnknownProfile(name.to_string()))?;
        profile.retire();
        self.store.remove(name)?;

        log::info!("Removed profile '{}'", name);
        self.events.emit(name, ProfileEventKind::Removed);
        Ok(())
    }

    /// Include or exclude a profile from matching. Its index is kept.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), ManagerError> {
        let profile = self.profile(name)?;
        profile.set_enabled(enabled);
        self.save_modified(&profile)
    }

    pub fn set_update_interval(&self, name: &str, interval: Duration) -> Result<(), ManagerError> {
        validate_update_interval(interval)?;
        let profile = self.profile(name)?;
        profile.update_metadata(|m| m.update_interval = interval);
        self.save_modified(&profile)
    }

    /// Set a fixed title, or `None` to follow the list's own title.
    pub fn set_title(&self, name: &str, title: Option<String>) -> Result<(), ManagerError> {
        let profile = self.profile(name)?;
        profile.update_metadata(|m| match title {
            Some(title) => {
                m.title = title;
                m.title_from_list = false;
            }
            None => {
                m.title = m.list_title.clone().unwrap_or_else(|| m.name.clone());
                m.title_from_list = true;
            }
        });
        self.save_modified(&profile)
    }

    fn save_modified(&self, profile: &FilterProfile) -> Result<(), ManagerError> {
        profile.save_metadata(&self.store)?;
        self.events.emit(profile.name(), ProfileEventKind::Modified);
        Ok(())
    }

    fn profile(&self, name: &str) -> Result<Arc<FilterProfile>, ConfigurationError> {
        read(&self.profiles)
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownProfile(name.to_string()))
    }

    pub fn profile_info(&self, name: &str) -> Option<ProfileInfo> {
        read(&self.profiles).get(name).map(|p| p.info(SystemTime::now()))
    }

    /// Identity, metadata and status of every profile, sorted by name.
    pub fn list_profiles(&self) -> Vec<ProfileInfo> {
        let now = SystemTime::now();
        read(&self.profiles).values().map(|p| p.info(now)).collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProfileEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Manual "update now". Joins an update already running for the profile.
    pub async fn refresh_profile(&self, name: &str) -> Result<UpdateOutcome, ManagerError> {
        let profile = self.profile(name)?;
        Ok(self.updater.update_now(&profile).await)
    }

    /// Load every enabled profile from its cache or source.
    pub async fn activate_all(&self) -> Vec<(String, UpdateOutcome)> {
        let profiles: Vec<Arc<FilterProfile>> = read(&self.profiles)
            .values()
            .filter(|p| p.is_enabled())
            .cloned()
            .collect();

        let updater = &self.updater;
        stream::iter(profiles)
            .map(|profile| async move {
                let outcome = updater.activate(&profile).await;
                (profile.name().to_string(), outcome)
            })
            .buffer_unordered(CONCURRENT_LOADS)
            .collect()
            .await
    }

    /// Start periodic update checks. Stops when the handle is dropped.
    pub fn start_scheduler(&self) -> ScheduleHandle {
        let profiles = Arc::clone(&self.profiles);
        self.updater.schedule_all(
            move || read(&profiles).values().cloned().collect(),
            self.check_interval,
        )
    }
}
