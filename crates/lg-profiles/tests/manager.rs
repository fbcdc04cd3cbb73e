mod common;

use std::sync::Arc;
use std::time::Duration;

use lg_core::{MatchDecision, RequestContext, RequestType};
use lg_profiles::{
    ProfileCategory, ProfileError, ProfileEventKind, ProfileSettings, ProfileState, UpdateOutcome,
};
use tempfile::TempDir;

use common::{manager, StubFetcher, ADS_LIST, ADS_URL, ALLOW_LIST, ALLOW_URL};

#[tokio::test]
async fn test_profile_lifecycle() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::new();
    fetcher.serve(ADS_URL, ADS_LIST);
    let m = manager(&dir, &fetcher);

    let info = m
        .add_profile(ProfileSettings::new("ads", ADS_URL).with_category(ProfileCategory::Advertisements))
        .unwrap();
    assert_eq!(info.state, ProfileState::NotLoaded);
    assert_eq!(info.rules, 0);
    assert!(info.is_stale);

    let results = m.activate_all().await;
    assert_eq!(results, vec![("ads".to_string(), UpdateOutcome::Updated { rules: 4 })]);

    let info = m.profile_info("ads").unwrap();
    assert_eq!(info.state, ProfileState::Loaded);
    assert_eq!(info.title, "Test Ads");
    assert_eq!(info.homepage.as_deref(), Some("https://lists.test/"));
    assert_eq!(info.expires, Some(Duration::from_secs(2 * 24 * 60 * 60)));
    assert_eq!(info.cosmetic_rules, 1);
    assert!(info.checksum.as_deref().unwrap().starts_with("sha256:"));
    assert!(info.last_update.is_some());
    assert!(!info.is_stale);

    assert!(m.is_blocked("https://ads.example/a.js", None, RequestType::SCRIPT));
    assert!(m.is_blocked("https://site.test/banner/top.png", None, RequestType::IMAGE));
    assert!(!m.is_blocked("https://site.test/content.png", None, RequestType::IMAGE));

    m.remove_profile("ads").unwrap();
    assert!(m.list_profiles().is_empty());
    assert!(!m.is_blocked("https://ads.example/a.js", None, RequestType::SCRIPT));
}

#[tokio::test]
async fn test_exception_in_one_profile_overrides_block_in_another() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::new();
    fetcher.serve(ADS_URL, ADS_LIST);
    fetcher.serve(ALLOW_URL, ALLOW_LIST);
    let m = manager(&dir, &fetcher);

    m.add_profile(ProfileSettings::new("ads", ADS_URL)).unwrap();
    m.add_profile(ProfileSettings::new("allow", ALLOW_URL)).unwrap();
    m.activate_all().await;

    let ctx = RequestContext::new("https://ads.example/allowed/x.js", None, RequestType::SCRIPT);
    let result = m.match_request(&ctx);
    assert_eq!(result.decision, MatchDecision::Exception);
    assert!(result.filter().unwrap().starts_with("@@"));
    assert!(m.is_blocked("https://ads.example/other/x.js", None, RequestType::SCRIPT));

    m.set_enabled("allow", false).unwrap();
    assert!(m.is_blocked("https://ads.example/allowed/x.js", None, RequestType::SCRIPT));
}

#[tokio::test]
async fn test_domain_type_and_party_scoping() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::new();
    fetcher.serve(ADS_URL, ADS_LIST);
    let m = manager(&dir, &fetcher);
    m.add_profile(ProfileSettings::new("ads", ADS_URL)).unwrap();
    m.refresh_profile("ads").await.unwrap();

    let tracker = "https://tracker.test/t.js";
    assert!(m.is_blocked(tracker, Some("https://www.news.test/story"), RequestType::SCRIPT));
    assert!(!m.is_blocked(tracker, Some("https://sports.news.test/"), RequestType::SCRIPT));
    assert!(!m.is_blocked(tracker, Some("https://www.news.test/"), RequestType::IMAGE));
    assert!(!m.is_blocked(tracker, Some("https://blog.test/"), RequestType::SCRIPT));
    assert!(!m.is_blocked(tracker, None, RequestType::SCRIPT));

    let lib = "https://static.cdn.test/lib.js";
    assert!(!m.is_blocked(lib, Some("https://cdn.test/"), RequestType::SCRIPT));
    assert!(m.is_blocked(lib, Some("https://site.test/"), RequestType::SCRIPT));
}

#[tokio::test]
async fn test_identical_download_is_unchanged() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::new();
    fetcher.serve(ADS_URL, ADS_LIST);
    let m = manager(&dir, &fetcher);
    m.add_profile(ProfileSettings::new("ads", ADS_URL)).unwrap();

    assert_eq!(m.refresh_profile("ads").await.unwrap(), UpdateOutcome::Updated { rules: 4 });
    let first = m.profile_info("ads").unwrap();

    assert_eq!(m.refresh_profile("ads").await.unwrap(), UpdateOutcome::Unchanged);
    let second = m.profile_info("ads").unwrap();
    assert_eq!(second.checksum, first.checksum);
    assert!(second.last_update >= first.last_update);
    assert_eq!(second.state, ProfileState::Loaded);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_failed_update_keeps_previous_rules() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::new();
    fetcher.serve(ADS_URL, ADS_LIST);
    let m = manager(&dir, &fetcher);
    m.add_profile(ProfileSettings::new("ads", ADS_URL)).unwrap();
    m.refresh_profile("ads").await.unwrap();

    fetcher.fail(ADS_URL, 503);
    let outcome = m.refresh_profile("ads").await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Failed(ProfileError::Network("HTTP error: 503".into())));

    let info = m.profile_info("ads").unwrap();
    assert!(matches!(info.state, ProfileState::Error(ProfileError::Network(_))));
    assert_eq!(info.consecutive_failures, 1);
    assert_eq!(info.rules, 4);
    assert!(m.is_blocked("https://ads.example/a.js", None, RequestType::SCRIPT));

    m.refresh_profile("ads").await.unwrap();
    assert_eq!(m.profile_info("ads").unwrap().consecutive_failures, 2);

    fetcher.serve(ADS_URL, ADS_LIST);
    m.refresh_profile("ads").await.unwrap();
    let info = m.profile_info("ads").unwrap();
    assert_eq!(info.state, ProfileState::Loaded);
    assert_eq!(info.consecutive_failures, 0);
}

#[tokio::test]
async fn test_unparseable_update_keeps_previous_rules() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::new();
    fetcher.serve(ADS_URL, ADS_LIST);
    let m = manager(&dir, &fetcher);
    m.add_profile(ProfileSettings::new("ads", ADS_URL)).unwrap();
    m.refresh_profile("ads").await.unwrap();
    let checksum = m.profile_info("ads").unwrap().checksum;

    for body in ["<html><body>Maintenance</body></html>", "[Adblock Plus 2.0]\n! Title: Empty\n"] {
        fetcher.serve(ADS_URL, body);
        let outcome = m.refresh_profile("ads").await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Failed(ProfileError::Format(_))));

        let info = m.profile_info("ads").unwrap();
        assert!(matches!(info.state, ProfileState::Error(ProfileError::Format(_))));
        assert_eq!(info.rules, 4);
        assert_eq!(info.checksum, checksum);
        assert!(m.is_blocked("https://ads.example/a.js", None, RequestType::SCRIPT));
        assert!(!m.is_blocked("https://site.test/content.png", None, RequestType::IMAGE));
    }
    assert_eq!(m.profile_info("ads").unwrap().consecutive_failures, 2);
}

#[tokio::test]
async fn test_non_list_content_is_rejected() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::new();
    fetcher.serve(ADS_URL, "<html><body>Not found</body></html>");
    let m = manager(&dir, &fetcher);
    m.add_profile(ProfileSettings::new("ads", ADS_URL)).unwrap();

    let outcome = m.refresh_profile("ads").await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Failed(ProfileError::Format(_))));
    assert!(m.profile_info("ads").unwrap().checksum.is_none());
}

#[tokio::test]
async fn test_declared_checksum_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::new();
    let list = format!("[Adblock Plus 2.0]\n! Checksum: sha256:{}\n||ads.example^\n", "0".repeat(64));
    fetcher.serve(ADS_URL, &list);
    let m = manager(&dir, &fetcher);
    m.add_profile(ProfileSettings::new("ads", ADS_URL)).unwrap();

    let outcome = m.refresh_profile("ads").await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Failed(ProfileError::Integrity(_))));
    assert!(!m.is_blocked("https://ads.example/a.js", None, RequestType::SCRIPT));
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_download() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::with_delay(Duration::from_millis(200));
    fetcher.serve(ADS_URL, ADS_LIST);
    let m = manager(&dir, &fetcher);
    m.add_profile(ProfileSettings::new("ads", ADS_URL)).unwrap();

    let (a, b, c) = tokio::join!(
        m.refresh_profile("ads"),
        m.refresh_profile("ads"),
        m.refresh_profile("ads"),
    );
    assert_eq!(fetcher.calls(), 1);
    for outcome in [a, b, c] {
        assert_eq!(outcome.unwrap(), UpdateOutcome::Updated { rules: 4 });
    }
    assert!(!m.profile_info("ads").unwrap().is_updating);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queries_during_index_swap() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::with_delay(Duration::from_millis(20));
    fetcher.serve(ADS_URL, ADS_LIST);
    let m = Arc::new(manager(&dir, &fetcher));
    m.add_profile(ProfileSettings::new("ads", ADS_URL)).unwrap();
    m.refresh_profile("ads").await.unwrap();

    // The replacement still blocks ads.example
    fetcher.serve(ADS_URL, "[Adblock Plus 2.0]\n||ads.example^\n||more-ads.test^\n");

    let updater = {
        let m = Arc::clone(&m);
        tokio::spawn(async move { m.refresh_profile("ads").await })
    };
    let queries: Vec<_> = (0..1000)
        .map(|i| {
            let m = Arc::clone(&m);
            tokio::spawn(async move {
                let url = format!("https://ads.example/{i}.js");
                m.is_blocked(&url, Some("https://site.test/"), RequestType::SCRIPT)
            })
        })
        .collect();

    for query in queries {
        assert!(query.await.unwrap());
    }
    assert_eq!(updater.await.unwrap().unwrap(), UpdateOutcome::Updated { rules: 2 });
    assert!(m.is_blocked("https://more-ads.test/x", None, RequestType::SCRIPT));
}

#[tokio::test]
async fn test_events_follow_profile_changes() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::new();
    fetcher.serve(ADS_URL, ADS_LIST);
    let m = manager(&dir, &fetcher);
    let mut events = m.subscribe();

    m.add_profile(ProfileSettings::new("ads", ADS_URL)).unwrap();
    m.refresh_profile("ads").await.unwrap();
    m.set_update_interval("ads", Duration::from_secs(24 * 3600)).unwrap();
    m.remove_profile("ads").unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.name, "ads");
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            ProfileEventKind::Added,
            ProfileEventKind::UpdateStarted,
            ProfileEventKind::Updated { rules: 4 },
            ProfileEventKind::Modified,
            ProfileEventKind::Removed,
        ]
    );
}

#[tokio::test]
async fn test_scheduler_loads_new_profiles() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::new();
    fetcher.serve(ADS_URL, ADS_LIST);
    let m = manager(&dir, &fetcher);
    m.add_profile(ProfileSettings::new("ads", ADS_URL)).unwrap();
    m.add_profile(ProfileSettings::new("manual", ALLOW_URL).disabled()).unwrap();
    let mut events = m.subscribe();

    let handle = m.start_scheduler();
    assert!(handle.is_running());

    let loaded = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(event) = events.recv().await {
                if matches!(event.kind, ProfileEventKind::Updated { .. }) {
                    return event.name;
                }
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(loaded, "ads");
    assert!(m.is_blocked("https://ads.example/a.js", None, RequestType::SCRIPT));

    handle.stop();
    // Disabled profiles are never fetched
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(m.profile_info("manual").unwrap().state, ProfileState::NotLoaded);
}
