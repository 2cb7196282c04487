//! Single-flight and expiry behaviour of the shared cache

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pkgmeta::version::cache::{Load, SharedCache};

const TTL: Duration = Duration::from_secs(60);

type Cache = SharedCache<String, String>;

/// Loader that counts invocations and settles after `delay`
fn counting_loader(
    counter: &Arc<AtomicUsize>,
    delay: Duration,
    load: Load<String, String>,
) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Load<String, String>> + Send>> + use<> {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            load
        })
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_load() {
    let cache = Cache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let waiters: Vec<_> = (0..32)
        .map(|_| {
            let cache = cache.clone();
            let loader = counting_loader(
                &calls,
                Duration::from_millis(20),
                Load::Fresh("value".to_string()),
            );
            tokio::spawn(async move { cache.get("key", loader, TTL).await })
        })
        .collect();

    for waiter in futures::future::join_all(waiters).await {
        assert_eq!(waiter.unwrap(), Ok("value".to_string()));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn success_expires_after_default_max_age() {
    let cache = Cache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let fresh = || Load::Fresh("v".to_string());

    cache
        .get("key", counting_loader(&calls, Duration::ZERO, fresh()), TTL)
        .await
        .unwrap();
    tokio::time::advance(TTL - Duration::from_secs(1)).await;
    cache
        .get("key", counting_loader(&calls, Duration::ZERO, fresh()), TTL)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    cache
        .get("key", counting_loader(&calls, Duration::ZERO, fresh()), TTL)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn settled_failure_is_served_until_its_own_max_age() {
    let cache = Cache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let negative = || Load::Settled {
        result: Err("not found".to_string()),
        max_age: TTL * 2,
    };

    for _ in 0..3 {
        let result = cache
            .get("key", counting_loader(&calls, Duration::ZERO, negative()), TTL)
            .await;
        assert_eq!(result, Err("not found".to_string()));
        tokio::time::advance(TTL / 2).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(TTL).await;
    let _ = cache
        .get("key", counting_loader(&calls, Duration::ZERO, negative()), TTL)
        .await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failure_reaches_every_waiter_and_is_not_kept() {
    let cache = Cache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            let loader = counting_loader(
                &calls,
                Duration::from_millis(5),
                Load::Failed("boom".to_string()),
            );
            tokio::spawn(async move { cache.get("key", loader, TTL).await })
        })
        .collect();

    for waiter in futures::future::join_all(waiters).await {
        assert_eq!(waiter.unwrap(), Err("boom".to_string()));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.is_empty());

    let retried = cache
        .get(
            "key",
            counting_loader(&calls, Duration::ZERO, Load::Fresh("ok".to_string())),
            TTL,
        )
        .await;
    assert_eq!(retried, Ok("ok".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn abandoned_wait_does_not_cancel_the_load() {
    let cache = Cache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let impatient = tokio::time::timeout(
        Duration::from_millis(10),
        cache.get(
            "key",
            counting_loader(
                &calls,
                Duration::from_millis(100),
                Load::Fresh("late".to_string()),
            ),
            TTL,
        ),
    )
    .await;
    assert!(impatient.is_err());

    // A later caller joins the load that is still running
    let result = cache
        .get(
            "key",
            counting_loader(&calls, Duration::ZERO, Load::Fresh("other".to_string())),
            TTL,
        )
        .await;

    assert_eq!(result, Ok("late".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
