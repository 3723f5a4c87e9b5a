#![allow(clippy::unwrap_used, clippy::expect_used)]
use std::{sync::Arc, time::Duration};

use {
    browseros_config::{ExtensionsConfig, FeatureFlags},
    browseros_extensions::{
        CycleOutcome, CycleReport, ExtensionLoader, HttpConfigFetcher,
        bundled::BUNDLED_MANIFEST_FILE, memory_host::InMemoryHost,
    },
    url::Url,
};

const CONFIG_V1: &str = r#"{
    "aaa": {"update_url": "https://cdn.example.com/aaa/update.xml"},
    "bbb": {"external_update_url": "https://cdn.example.com/bbb/update.xml", "channel": "stable"}
}"#;

const CONFIG_V2: &str = r#"{
    "bbb": {"update_url": "https://cdn.example.com/bbb/update.xml"},
    "ccc": {"update_url": "https://cdn.example.com/ccc/update.xml"},
    "broken": {"channel": "stable"}
}"#;

fn fetcher() -> Arc<HttpConfigFetcher> {
    Arc::new(HttpConfigFetcher::new(Duration::from_secs(5), "browseros-extensions-test").unwrap())
}

fn extensions_config(
    server: &mockito::ServerGuard,
    bundled: &tempfile::TempDir,
) -> ExtensionsConfig {
    ExtensionsConfig {
        config_url: format!("{}/extensions.json", server.url()),
        bundled_dir: Some(bundled.path().to_path_buf()),
        // Tests drive the trigger by hand.
        immediate_install_delay_secs: 3600,
        ..ExtensionsConfig::default()
    }
}

async fn cycle(loader: &ExtensionLoader) -> CycleReport {
    match loader.maintainer().unwrap().run_maintenance_cycle().await {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {other:?}"),
    }
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[tokio::test]
async fn remote_bootstrap_then_reconcile_config_changes() {
    let mut server = mockito::Server::new_async().await;
    let v1 = server
        .mock("GET", "/extensions.json")
        .with_status(200)
        .with_body(CONFIG_V1)
        .create_async()
        .await;

    let empty_bundle = tempfile::tempdir().unwrap();
    let host = InMemoryHost::new();
    let loader = ExtensionLoader::new(
        host.host(),
        fetcher(),
        &extensions_config(&server, &empty_bundle),
        &FeatureFlags::default(),
    )
    .unwrap();

    loader.start_loading().unwrap().await.unwrap();

    let loads = host.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].0.keys().cloned().collect::<Vec<_>>(), ids(&["aaa", "bbb"]));
    assert!(loads[0].1.is_none());
    assert_eq!(loader.tracked_ids(), ids(&["aaa", "bbb"]));

    assert_eq!(loader.trigger_immediate_installation(), 2);
    assert_eq!(loader.trigger_immediate_installation(), 0);
    host.apply_pending();

    // Nothing to do while the config is unchanged.
    let report = cycle(&loader).await;
    assert!(report.fetched);
    assert!(report.uninstalled.is_empty() && report.reinstalled.is_empty());
    assert!(report.health.iter().all(|h| h.installed && h.enabled));

    v1.remove_async().await;
    let v2 = server
        .mock("GET", "/extensions.json")
        .with_status(200)
        .with_body(CONFIG_V2)
        .create_async()
        .await;

    let report = cycle(&loader).await;
    assert_eq!(report.uninstalled, ids(&["aaa"]));
    assert_eq!(report.reinstalled, ids(&["ccc"]));

    let report = cycle(&loader).await;
    assert!(report.uninstalled.is_empty() && report.reinstalled.is_empty());
    assert_eq!(host.uninstalled(), ids(&["aaa"]));
    assert_eq!(
        host.enqueued().iter().map(|p| p.id.clone()).collect::<Vec<_>>(),
        ids(&["aaa", "bbb", "ccc"])
    );

    // An outage keeps reconciling against the last good config.
    v2.remove_async().await;
    let _outage = server
        .mock("GET", "/extensions.json")
        .with_status(503)
        .create_async()
        .await;

    let report = cycle(&loader).await;
    assert!(!report.fetched);
    assert!(report.uninstalled.is_empty());
    let snapshot = loader.maintainer().unwrap().snapshot();
    assert_eq!(snapshot.cached_entries, 2);
    assert_eq!(snapshot.tracked, ids(&["bbb", "ccc"]));

    loader.shutdown();
}

#[tokio::test]
async fn bundled_bootstrap_never_touches_the_network() {
    let mut server = mockito::Server::new_async().await;
    let remote = server
        .mock("GET", "/extensions.json")
        .with_status(200)
        .with_body(CONFIG_V1)
        .expect(0)
        .create_async()
        .await;

    let bundle = tempfile::tempdir().unwrap();
    std::fs::write(bundle.path().join("aaa.crx"), b"crx").unwrap();
    std::fs::write(
        bundle.path().join(BUNDLED_MANIFEST_FILE),
        r#"{
            "aaa": {"external_crx": "aaa.crx", "external_version": "2.0.1"},
            "bbb": {"external_crx": "bbb.crx", "external_version": "1.0.0"}
        }"#,
    )
    .unwrap();

    let host = InMemoryHost::new();
    let loader = ExtensionLoader::new(
        host.host(),
        fetcher(),
        &extensions_config(&server, &bundle),
        &FeatureFlags::default(),
    )
    .unwrap();
    loader.start_loading().unwrap().await.unwrap();

    let loads = host.loads();
    assert_eq!(loads.len(), 1);
    let prefs = &loads[0].0;
    assert_eq!(prefs.keys().cloned().collect::<Vec<_>>(), ids(&["aaa"]));
    assert_eq!(prefs["aaa"].version.as_deref(), Some("2.0.1"));
    assert_eq!(loader.bundled_crx_base_path().as_deref(), Some(bundle.path()));
    assert!(loader.maintainer().unwrap().snapshot().running);

    loader.shutdown();
    remote.assert_async().await;
}

#[tokio::test]
async fn unreachable_source_still_starts_maintenance() {
    let empty_bundle = tempfile::tempdir().unwrap();
    let config = ExtensionsConfig {
        config_url: "http://127.0.0.1:9/extensions.json".into(),
        bundled_dir: Some(empty_bundle.path().to_path_buf()),
        seed_ids: ids(&["seed"]),
        ..ExtensionsConfig::default()
    };
    let host = InMemoryHost::new();
    let loader =
        ExtensionLoader::new(host.host(), fetcher(), &config, &FeatureFlags::default()).unwrap();
    assert_eq!(
        loader.config_url(),
        Url::parse("http://127.0.0.1:9/extensions.json").unwrap()
    );

    loader.start_loading().unwrap().await.unwrap();

    let loads = host.loads();
    assert_eq!(loads.len(), 1);
    assert!(loads[0].0.is_empty());
    assert_eq!(loader.trigger_immediate_installation(), 0);
    assert_eq!(loader.tracked_ids(), ids(&["seed"]));

    let snapshot = loader.maintainer().unwrap().snapshot();
    assert!(snapshot.running);
    assert_eq!(snapshot.tracked, ids(&["seed"]));
    loader.shutdown();
}
