mod support;

use std::{sync::Arc, time::Duration};

use caqti_pool::{NoopAlarm, PoolConfig};
use support::{TestManager, wait_until};
use tokio::{sync::Barrier, time::sleep};

/// Eight users hold the whole pool at once, release together, and the idle
/// cap keeps four resources alive. The 100 ms idle age then reaps those
/// four from the alarm.
#[tokio::test]
async fn idle_resources_expire_on_the_alarm() -> anyhow::Result<()> {
    let manager = TestManager::new();
    let counters = manager.counters();
    let pool = PoolConfig::new()
        .max_size(8)
        .max_idle_size(4)
        .max_idle_age(Duration::from_millis(100))
        .open(manager);

    let barrier = Arc::new(Barrier::new(8));
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            let got = pool.acquire().await.unwrap();
            barrier.wait().await;
            got.release().await;
        }));
    }
    for task in tasks {
        task.await?;
    }
    assert_eq!(pool.size(), 4);

    assert!(wait_until(Duration::from_secs(5), || pool.size() == 0).await);
    assert!(wait_until(Duration::from_secs(1), || counters.freed() == counters.created()).await);
    Ok(())
}

#[tokio::test]
async fn staggered_idle_resources_all_expire() -> anyhow::Result<()> {
    let manager = TestManager::new();
    let counters = manager.counters();
    let pool = PoolConfig::new()
        .max_size(2)
        .max_idle_age(Duration::from_millis(80))
        .open(manager);

    let first = pool.acquire().await?;
    let second = pool.acquire().await?;
    first.release().await;
    sleep(Duration::from_millis(40)).await;
    second.release().await;

    // The alarm fires for the first entry, then re-arms for the second.
    assert!(wait_until(Duration::from_secs(2), || pool.size() == 0).await);
    assert!(wait_until(Duration::from_secs(1), || counters.freed() == 2).await);
    Ok(())
}

/// With a timerless alarm installed, expiry still happens, but only when a
/// release next looks at the idle queue.
#[tokio::test]
async fn expiry_is_opportunistic_with_the_noop_alarm() -> anyhow::Result<()> {
    let manager = TestManager::new();
    let counters = manager.counters();
    let pool = PoolConfig::new()
        .max_size(2)
        .max_idle_age(Duration::from_millis(50))
        .alarm(Arc::new(NoopAlarm))
        .open(manager);

    let first = pool.acquire().await?;
    let second = pool.acquire().await?;
    first.release().await;

    sleep(Duration::from_millis(120)).await;
    // Nothing fires on its own.
    assert_eq!(pool.size(), 2);
    assert_eq!(counters.freed(), 0);

    // Returning the second resource sweeps the expired first one out.
    second.release().await;
    assert!(wait_until(Duration::from_secs(1), || counters.freed() == 1).await);
    assert_eq!(pool.size(), 1);
    Ok(())
}

#[tokio::test]
async fn idle_resources_live_forever_without_an_idle_age() -> anyhow::Result<()> {
    let pool = PoolConfig::new().max_size(2).open(TestManager::new());

    let got = pool.acquire().await?;
    got.release().await;

    sleep(Duration::from_millis(150)).await;
    assert_eq!(pool.size(), 1);
    assert_eq!(pool.num_idle(), 1);
    Ok(())
}
