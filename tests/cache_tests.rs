mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use common::{FakeClient, SYSTEM};
use infinity_zones::{CacheHandle, CacheHealth, Error};

#[tokio::test]
async fn start_publishes_first_snapshot() {
    let client = FakeClient::new("heat", "F");
    let cache = CacheHandle::start(client.clone(), SYSTEM).await.unwrap();

    let snapshot = cache.get_latest();
    assert_eq!(snapshot.system_id, SYSTEM);
    assert_eq!(snapshot.zone_ids(), vec![1, 2]);
    assert_eq!(client.fetches(), 1);
    assert_eq!(cache.health(), CacheHealth::Fresh);
    cache.shutdown();
}

#[tokio::test]
async fn start_fails_when_first_fetch_fails() {
    let client = FakeClient::new("heat", "F");
    client.fail_fetches(true);

    let err = CacheHandle::start(client.clone(), SYSTEM).await.err().unwrap();
    match err {
        Error::Fetch { system, reason } => {
            assert_eq!(system, SYSTEM);
            assert!(reason.contains("unreachable"), "reason: {reason}");
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_fetch_keeps_previous_snapshot() {
    let client = FakeClient::new("heat", "F");
    let cache = CacheHandle::start(client.clone(), SYSTEM).await.unwrap();
    let before = cache.get_latest();
    let mut rx = cache.subscribe();
    rx.borrow_and_update();

    client.fail_fetches(true);
    client.edit_status(|s| s["outside_temperature"] = 12.0.into());
    assert!(matches!(cache.force_refresh().await, Err(Error::Fetch { .. })));
    assert!(matches!(cache.force_refresh().await, Err(Error::Fetch { .. })));

    let after = cache.get_latest();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(*before, *after);
    assert!(!rx.has_changed().unwrap(), "failures must not notify subscribers");
    match cache.health() {
        CacheHealth::Stale { failures, last_error, .. } => {
            assert_eq!(failures, 2);
            assert!(last_error.contains("unreachable"));
        }
        CacheHealth::Fresh => panic!("cache should be stale"),
    }

    client.fail_fetches(false);
    let recovered = cache.force_refresh().await.unwrap();
    assert_eq!(recovered.status.outside_temperature, 12.0);
    assert!(!cache.is_stale());
    assert!(rx.has_changed().unwrap());
    cache.shutdown();
}

#[tokio::test]
async fn every_subscriber_sees_the_same_snapshot() {
    let client = FakeClient::new("cool", "F");
    let cache = CacheHandle::start(client.clone(), SYSTEM).await.unwrap();
    let mut first = cache.subscribe();
    let mut second = cache.subscribe();
    first.borrow_and_update();
    second.borrow_and_update();

    client.edit_status(|s| s["zones"]["1"]["temperature"] = 73.0.into());
    let published = cache.force_refresh().await.unwrap();

    assert!(first.has_changed().unwrap());
    assert!(second.has_changed().unwrap());
    assert!(Arc::ptr_eq(&*first.borrow_and_update(), &published));
    assert!(Arc::ptr_eq(&*second.borrow_and_update(), &published));
    assert_eq!(published.zone_status(1).unwrap().temperature, 73.0);
    cache.shutdown();
}

#[tokio::test]
async fn snapshot_callbacks_fire_on_success_only() {
    let client = FakeClient::new("heat", "F");
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let cache = CacheHandle::builder(client.clone(), SYSTEM)
        .on_snapshot(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .start()
        .await
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    cache.force_refresh().await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    client.fail_fetches(true);
    let _ = cache.force_refresh().await;
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    cache.shutdown();
}

#[tokio::test]
async fn fetched_at_moves_forward() {
    let client = FakeClient::new("heat", "F");
    let cache = CacheHandle::start(client.clone(), SYSTEM).await.unwrap();
    let first = cache.get_latest();
    let second = cache.force_refresh().await.unwrap();
    assert!(second.fetched_at >= first.fetched_at);
    cache.shutdown();
}

#[tokio::test(start_paused = true)]
async fn concurrent_refreshes_share_one_fetch() {
    let client = FakeClient::new("heat", "F");
    let cache = CacheHandle::start(client.clone(), SYSTEM).await.unwrap();
    client.fetch_delay(Duration::from_secs(1));

    let (a, b, c) = tokio::join!(
        cache.force_refresh(),
        cache.force_refresh(),
        cache.force_refresh()
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert_eq!(client.fetches(), 2);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&b, &c));
    cache.shutdown();
}

#[tokio::test(start_paused = true)]
async fn joined_refresh_reports_the_shared_failure() {
    let client = FakeClient::new("heat", "F");
    let cache = CacheHandle::start(client.clone(), SYSTEM).await.unwrap();
    client.fetch_delay(Duration::from_secs(1));
    client.fail_fetches(true);

    let (a, b) = tokio::join!(cache.force_refresh(), cache.force_refresh());
    assert!(matches!(a, Err(Error::Fetch { .. })));
    assert!(matches!(b, Err(Error::Fetch { .. })));
    assert_eq!(client.fetches(), 2);
    cache.shutdown();
}

#[tokio::test(start_paused = true)]
async fn refresh_since_now_waits_out_older_fetch() {
    let client = FakeClient::new("heat", "F");
    let cache = CacheHandle::start(client.clone(), SYSTEM).await.unwrap();
    client.fetch_delay(Duration::from_secs(10));

    let older = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.force_refresh().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    client.edit_status(|s| s["outside_temperature"] = 12.0.into());

    let (joined, fresh) = tokio::join!(cache.force_refresh(), cache.force_refresh_since_now());
    let older = older.await.unwrap().unwrap();
    let (joined, fresh) = (joined.unwrap(), fresh.unwrap());

    assert_eq!(older.status.outside_temperature, 41.0);
    assert!(Arc::ptr_eq(&older, &joined));
    assert_eq!(fresh.status.outside_temperature, 12.0);
    assert_eq!(client.fetches(), 3);
    assert!(Arc::ptr_eq(&fresh, &cache.get_latest()));
    cache.shutdown();
}

#[tokio::test(start_paused = true)]
async fn polls_on_interval() {
    let client = FakeClient::new("heat", "F");
    let cache = CacheHandle::builder(client.clone(), SYSTEM)
        .interval(Duration::from_secs(60))
        .start()
        .await
        .unwrap();
    assert_eq!(client.fetches(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(client.fetches(), 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.fetches(), 3);
    cache.shutdown();
}

#[tokio::test(start_paused = true)]
async fn polling_survives_repeated_failures() {
    let client = FakeClient::new("heat", "F");
    let cache = CacheHandle::builder(client.clone(), SYSTEM)
        .interval(Duration::from_secs(60))
        .start()
        .await
        .unwrap();
    let before = cache.get_latest();

    client.fail_fetches(true);
    tokio::time::sleep(Duration::from_secs(185)).await;
    assert_eq!(client.fetches(), 4);
    assert!(matches!(cache.health(), CacheHealth::Stale { failures: 3, .. }));
    assert!(Arc::ptr_eq(&before, &cache.get_latest()));

    client.fail_fetches(false);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(cache.health(), CacheHealth::Fresh);
    assert!(!Arc::ptr_eq(&before, &cache.get_latest()));
    cache.shutdown();
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_polling() {
    let client = FakeClient::new("heat", "F");
    let cache = CacheHandle::builder(client.clone(), SYSTEM)
        .interval(Duration::from_secs(60))
        .start()
        .await
        .unwrap();

    cache.shutdown();
    assert!(cache.is_stopped());
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(client.fetches(), 1);
    assert!(matches!(cache.force_refresh().await, Err(Error::Stopped)));
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_stops_polling() {
    let client = FakeClient::new("heat", "F");
    let cache = CacheHandle::builder(client.clone(), SYSTEM)
        .interval(Duration::from_secs(60))
        .start()
        .await
        .unwrap();
    drop(cache);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(client.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_finishing_after_shutdown_is_discarded() {
    let client = FakeClient::new("heat", "F");
    let cache = CacheHandle::start(client.clone(), SYSTEM).await.unwrap();
    let before = cache.get_latest();
    let mut rx = cache.subscribe();
    rx.borrow_and_update();

    client.fetch_delay(Duration::from_secs(10));
    client.edit_status(|s| s["outside_temperature"] = 99.0.into());
    let pending = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.force_refresh().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    cache.shutdown();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(Error::Stopped)));
    assert!(Arc::ptr_eq(&before, &cache.get_latest()));
    assert_eq!(cache.get_latest().status.outside_temperature, 41.0);
    assert!(!rx.has_changed().unwrap());
}

fn hold_for(client: &FakeClient, seconds: i64) {
    let until = Utc::now() + chrono::Duration::seconds(seconds);
    client.edit_config(|c| {
        c["zones"]["1"]["hold_activity"] = "manual".into();
        c["zones"]["1"]["hold_until"] = until.to_rfc3339().into();
    });
}

#[tokio::test(start_paused = true)]
async fn refreshes_after_timed_hold_expires() {
    let client = FakeClient::new("heat", "F");
    hold_for(&client, 10);
    let cache = CacheHandle::builder(client.clone(), SYSTEM)
        .interval(Duration::from_secs(3600))
        .refresh_at_hold_expiry(true)
        .start()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(client.fetches(), 2);
    cache.shutdown();
}

#[tokio::test(start_paused = true)]
async fn hold_expiry_refresh_is_opt_in() {
    let client = FakeClient::new("heat", "F");
    hold_for(&client, 10);
    let cache = CacheHandle::builder(client.clone(), SYSTEM)
        .interval(Duration::from_secs(3600))
        .start()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(client.fetches(), 1);
    cache.shutdown();
}
