//! Ready-group poller - 準備完了グループの定期クレーム
//!
//! Polls `claim_ready_groups` on a fixed interval. Every replica may run one;
//! the claim itself is atomic, so each group id is emitted by exactly one
//! poller system-wide.
//!
//! Delivery after the claim is at-most-once: a claimed group that cannot be
//! handed to the consumer (cancelled, receiver dropped) is logged and lost.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReadyGroupsConfig;
use crate::domain::GroupId;
use crate::ports::DependencyStore;

/// Start the poll-and-claim loop. The stream closes on cancellation.
pub fn ready_groups(
    store: Arc<dyn DependencyStore>,
    config: ReadyGroupsConfig,
    cancel: CancellationToken,
) -> mpsc::Receiver<GroupId> {
    let (tx, rx) = mpsc::channel(config.batch_size.max(1));
    tokio::spawn(poll_ready_groups(store, config, tx, cancel));
    rx
}

async fn poll_ready_groups(
    store: Arc<dyn DependencyStore>,
    config: ReadyGroupsConfig,
    tx: mpsc::Sender<GroupId>,
    cancel: CancellationToken,
) {
    let batch_size = config.batch_size.max(1);
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        interval_ms = config.poll_interval_ms,
        batch_size, "polling ready groups"
    );

    'poll: loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let claimed = match store.claim_ready_groups(batch_size).await {
            Ok(claimed) => claimed,
            Err(err) => {
                error!(error = %err, "failed to claim ready groups");
                continue;
            }
        };
        if claimed.is_empty() {
            continue;
        }
        debug!(count = claimed.len(), "claimed ready groups");

        let full_batch = claimed.len() == batch_size;
        let mut claimed = claimed.into_iter();
        while let Some(group) = claimed.next() {
            let sent = tokio::select! {
                _ = cancel.cancelled() => false,
                sent = tx.send(group.clone()) => sent.is_ok(),
            };
            if !sent {
                let lost = 1 + claimed.len();
                warn!(group_id = %group, lost, "claimed groups dropped before delivery");
                break 'poll;
            }
        }

        // more may be waiting
        if full_batch {
            ticker.reset_immediately();
        }
    }

    debug!("ready group poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Dependency;
    use crate::impls::InMemoryDependencyStore;
    use std::collections::HashSet;
    use std::time::Duration;

    fn fast(batch_size: usize) -> ReadyGroupsConfig {
        ReadyGroupsConfig {
            poll_interval_ms: 10,
            batch_size,
        }
    }

    async fn recv(rx: &mut mpsc::Receiver<GroupId>) -> Option<GroupId> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a ready group")
    }

    #[tokio::test]
    async fn group_is_emitted_once_after_its_last_dependency() {
        let store = Arc::new(InMemoryDependencyStore::new());
        let deps = store.new_dependencies(3).await.unwrap();
        let ids: Vec<_> = deps.iter().map(|d| d.id.clone()).collect();
        let g1 = store.new_group().await.unwrap();
        store.initialize_group(&g1, &ids).await.unwrap();

        let cancel = CancellationToken::new();
        let mut rx = ready_groups(store.clone(), fast(16), cancel.clone());

        store.resolve(&[Dependency::ok(ids[1].clone())]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());

        store
            .resolve(&[Dependency::ok(ids[0].clone()), Dependency::failed(ids[2].clone())])
            .await
            .unwrap();
        assert_eq!(recv(&mut rx).await, Some(g1));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        assert_eq!(recv(&mut rx).await, None);
    }

    #[tokio::test]
    async fn two_pollers_never_emit_the_same_group() {
        let store = Arc::new(InMemoryDependencyStore::new());
        for _ in 0..50 {
            let group = store.new_group().await.unwrap();
            store.initialize_group(&group, &[]).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let mut a = ready_groups(store.clone(), fast(4), cancel.clone());
        let mut b = ready_groups(store.clone(), fast(4), cancel.clone());

        let mut seen = Vec::new();
        while seen.len() < 50 {
            tokio::select! {
                Some(group) = a.recv() => seen.push(group),
                Some(group) = b.recv() => seen.push(group),
                _ = tokio::time::sleep(Duration::from_secs(2)) => panic!("pollers stalled"),
            }
        }
        cancel.cancel();

        let unique: HashSet<_> = seen.iter().cloned().collect();
        assert_eq!(unique.len(), 50);
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
    }
}
