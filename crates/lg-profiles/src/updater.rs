//! Profile loading, updating and scheduling
//!
//! All loads and updates of a profile run one at a time: a request arriving
//! while another is in flight waits for that one's outcome instead of
//! starting its own download. Failures stay on the profile they happened to
//! and never replace a working index.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use lg_compiler::{build_index, has_list_header, CompiledList};

use crate::error::ProfileError;
use crate::events::{EventBus, ProfileEventKind};
use crate::fetch::Fetcher;
use crate::integrity::{compute_checksum, verify_checksum, verify_declared_checksum};
use crate::profile::{lock, FilterProfile, ProfileState};
use crate::store::ProfileStore;

/// Result of one load or update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new index was installed
    Updated { rules: usize },
    /// Downloaded bytes matched the current list
    Unchanged,
    Failed(ProfileError),
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, Copy)]
enum Job {
    /// Load from the local cache, falling back to a download
    Activate,
    /// Download and replace
    Update,
}

/// Clears the in-flight slot when the leading task finishes or is dropped.
struct InFlightGuard<'a> {
    profile: &'a FilterProfile,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.profile.in_flight) = None;
        // Cancelled mid-update: leave a state that reflects what is serving.
        match self.profile.state() {
            ProfileState::Updating => self.profile.set_state(ProfileState::Loaded),
            ProfileState::Loading => self.profile.set_state(ProfileState::NotLoaded),
            _ => {}
        }
    }
}

pub struct ProfileUpdater {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<ProfileStore>,
    events: EventBus,
}

impl ProfileUpdater {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<ProfileStore>, events: EventBus) -> Self {
        Self { fetcher, store, events }
    }

    /// Download the profile's list and install it if it changed.
    ///
    /// Manual refreshes and scheduled updates both come through here.
    pub async fn update_now(&self, profile: &FilterProfile) -> UpdateOutcome {
        self.run_exclusive(profile, Job::Update).await
    }

    /// Install the cached list if it is intact, otherwise download it.
    pub async fn activate(&self, profile: &FilterProfile) -> UpdateOutcome {
        self.run_exclusive(profile, Job::Activate).await
    }

    async fn run_exclusive(&self, profile: &FilterProfile, job: Job) -> UpdateOutcome {
        let sender = {
            let mut slot = lock(&profile.in_flight);
            match slot.as_ref() {
                Some(receiver) => Err(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    *slot = Some(receiver);
                    Ok(sender)
                }
            }
        };

        let sender = match sender {
            Ok(sender) => sender,
            Err(mut receiver) => {
                log::debug!("Profile '{}' already updating, waiting for it", profile.name());
                return match receiver.wait_for(Option::is_some).await {
                    Ok(outcome) => outcome.clone().unwrap_or(UpdateOutcome::Unchanged),
                    Err(_) => UpdateOutcome::Failed(ProfileError::Network("update cancelled".into())),
                };
            }
        };

        let guard = InFlightGuard { profile };
        let outcome = match job {
            Job::Activate => self.load_cached_or_fetch(profile).await,
            Job::Update => self.fetch_and_install(profile).await,
        };
        drop(guard);

        let _ = sender.send(Some(outcome.clone()));
        outcome
    }

    async fn load_cached_or_fetch(&self, profile: &FilterProfile) -> UpdateOutcome {
        if profile.has_index() {
            return UpdateOutcome::Unchanged;
        }
        profile.set_state(ProfileState::Loading);

        let name = profile.name().to_string();
        let store = Arc::clone(&self.store);
        let cached = tokio::task::spawn_blocking(move || store.read_list(&name)).await;

        let data = match cached {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                log::info!("No cached list for '{}', downloading", profile.name());
                return self.fetch_and_install(profile).await;
            }
            Ok(Err(e)) => {
                log::warn!("Failed to read cached list for '{}': {}", profile.name(), e);
                return self.fetch_and_install(profile).await;
            }
            Err(e) => {
                log::warn!("Cache read task for '{}' failed: {}", profile.name(), e);
                return self.fetch_and_install(profile).await;
            }
        };

        match self.compile_cached(profile, data).await {
            Ok(compiled) => {
                let rules = compiled.index.len();
                self.install(profile, compiled);
                profile.record_success();
                log::info!("Loaded '{}' from cache ({} rules)", profile.name(), rules);
                self.events.emit(profile.name(), ProfileEventKind::Modified);
                UpdateOutcome::Updated { rules }
            }
            Err(e) => {
                log::warn!("Discarding cached list for '{}': {}", profile.name(), e);
                let name = profile.name().to_string();
                let store = Arc::clone(&self.store);
                if let Ok(Err(e)) = tokio::task::spawn_blocking(move || store.remove_list(&name)).await {
                    log::warn!("Failed to delete cached list for '{}': {}", profile.name(), e);
                }
                profile.update_metadata(|m| m.checksum = None);
                self.fetch_and_install(profile).await
            }
        }
    }

    /// The cache must match the checksum recorded when it was written.
    async fn compile_cached(&self, profile: &FilterProfile, data: Vec<u8>) -> Result<CompiledList, ProfileError> {
        let expected = profile
            .metadata()
            .checksum
            .ok_or_else(|| ProfileError::Integrity("no checksum recorded for cache".into()))?;
        verify_checksum(&data, &expected)?;

        let text = String::from_utf8(data).map_err(|_| ProfileError::Integrity("cache is not UTF-8".into()))?;
        compile(text).await
    }

    async fn fetch_and_install(&self, profile: &FilterProfile) -> UpdateOutcome {
        let name = profile.name().to_string();
        let had_index = profile.has_index();
        profile.set_state(if had_index {
            ProfileState::Updating
        } else {
            ProfileState::Loading
        });
        self.events.emit(&name, ProfileEventKind::UpdateStarted);

        let source_url = profile.metadata().source_url;
        log::info!("Updating '{}' from {}", name, source_url);

        let data = match self.fetcher.fetch(&source_url).await {
            Ok(data) => data,
            Err(e) => return self.fail(profile, e.into()),
        };

        let text = match std::str::from_utf8(&data) {
            Ok(text) => text,
            Err(_) => return self.fail(profile, ProfileError::Format("list is not UTF-8 text".into())),
        };
        if !has_list_header(text) {
            return self.fail(profile, ProfileError::Format("no filter list header".into()));
        }

        let checksum = compute_checksum(&data);
        if had_index && profile.metadata().checksum.as_deref() == Some(checksum.as_str()) {
            profile.update_metadata(|m| m.last_update = Some(SystemTime::now()));
            profile.record_success();
            self.persist(profile, None).await;
            log::info!("'{}' is unchanged", name);
            self.events.emit(&name, ProfileEventKind::Unchanged);
            return UpdateOutcome::Unchanged;
        }

        if let Err(e) = verify_declared_checksum(text) {
            return self.fail(profile, e.into());
        }

        let compiled = match compile(text.to_string()).await {
            Ok(compiled) => compiled,
            Err(e) => return self.fail(profile, e),
        };

        let rules = compiled.index.len();
        let errors = compiled.report.errors;
        self.install(profile, compiled);
        profile.update_metadata(|m| {
            m.last_update = Some(SystemTime::now());
            m.checksum = Some(checksum);
        });
        profile.record_success();
        self.persist(profile, Some(data)).await;

        log::info!("Updated '{}': {} rules, {} unparseable lines", name, rules, errors);
        self.events.emit(&name, ProfileEventKind::Updated { rules });
        UpdateOutcome::Updated { rules }
    }

    /// Swap in a compiled list and adopt its header metadata.
    fn install(&self, profile: &FilterProfile, compiled: CompiledList) {
        let list_metadata = compiled.metadata;
        profile.swap_index(compiled.index);
        profile.update_metadata(|m| {
            if m.title_from_list {
                if let Some(title) = &list_metadata.title {
                    m.title = title.clone();
                }
            }
            m.list_title = list_metadata.title.clone();
            m.homepage = list_metadata.homepage.clone();
            m.expires = list_metadata.expires;
        });
    }

    /// Write the list (if given) and metadata. Failure keeps the new index.
    async fn persist(&self, profile: &FilterProfile, data: Option<Vec<u8>>) {
        let record = profile.record();
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || record.persist(&store, data.as_deref())).await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Failed to persist '{}': {}", profile.name(), e),
            Err(e) => log::warn!("Persist task for '{}' failed: {}", profile.name(), e),
        }
    }

    fn fail(&self, profile: &FilterProfile, error: ProfileError) -> UpdateOutcome {
        if profile.has_index() {
            log::warn!("Update of '{}' failed, keeping previous rules: {}", profile.name(), error);
        } else {
            log::warn!("Loading '{}' failed: {}", profile.name(), error);
        }
        profile.record_failure(error.clone());
        self.events
            .emit(profile.name(), ProfileEventKind::UpdateFailed(error.clone()));
        UpdateOutcome::Failed(error)
    }

    /// Start the periodic check. Each tick activates enabled profiles that
    /// were never loaded and updates the ones that are due. `profiles` is
    /// called on every tick, so profiles added later are picked up.
    pub fn schedule_all<F>(self: &Arc<Self>, profiles: F, tick: Duration) -> ScheduleHandle
    where
        F: Fn() -> Vec<Arc<FilterProfile>> + Send + Sync + 'static,
    {
        let updater = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let now = SystemTime::now();

                for profile in profiles() {
                    if !profile.is_enabled() || profile.is_updating() {
                        continue;
                    }
                    let job = if !profile.has_index() && profile.state() == ProfileState::NotLoaded {
                        Job::Activate
                    } else if profile.is_due(now) {
                        Job::Update
                    } else {
                        continue;
                    };

                    log::debug!("Scheduling {:?} for '{}'", job, profile.name());
                    let updater = Arc::clone(&updater);
                    tokio::spawn(async move {
                        updater.run_exclusive(&profile, job).await;
                    });
                }
            }
        });

        ScheduleHandle { task }
    }
}

/// Build off the async runtime; parsing a large list takes a while.
async fn compile(text: String) -> Result<CompiledList, ProfileError> {
    tokio::task::spawn_blocking(move || build_index(&text))
        .await
        .map_err(|e| ProfileError::Format(format!("parser task failed: {e}")))?
        .map_err(|e| ProfileError::Format(e.to_string()))
}

/// Running scheduler. Dropping the handle stops it.
pub struct ScheduleHandle {
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
