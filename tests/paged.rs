//! Paged client and cache mirror tests.

mod common;

use common::{random_bytes, temp_test_dir};
use messagevault::client::log::{AppendLog, InMemoryAppendLog};
use messagevault::client::mirror::CacheMirror;
use messagevault::client::paged::{PagedClient, ReceivedMessage};
use messagevault::core::error::VaultError;
use messagevault::storage::cache::{CacheWriter, CheckpointedCacheReader};
use messagevault::storage::frame::{FrameCodec, LogicalMessage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn client(log: &Arc<InMemoryAppendLog>, stream: &str, frame_size: usize) -> PagedClient {
    PagedClient::new(
        log.clone(),
        stream,
        FrameCodec::new(frame_size).unwrap(),
    )
}

fn messages(count: usize, seed: u64) -> Vec<LogicalMessage> {
    (0..count)
        .map(|i| {
            let len = 10 + (i * 37) % 400;
            LogicalMessage::new(format!("key-{}", i), random_bytes(seed + i as u64, len))
        })
        .collect()
}

/// Chase from `start` until `count` messages arrived.
async fn collect(client: &PagedClient, start: u64, count: usize) -> Vec<ReceivedMessage> {
    let cancel = CancellationToken::new();
    let mut received = Vec::new();
    tokio::time::timeout(
        Duration::from_secs(30),
        client.chase(&cancel, start, |message, _| {
            received.push(message.clone());
            if received.len() == count {
                cancel.cancel();
            }
            Ok(())
        }),
    )
    .await
    .expect("chase timed out")
    .unwrap();
    received
}

// ============================================================================
// Publish and chase
// ============================================================================

#[tokio::test]
async fn messages_arrive_in_publish_order() {
    let log = Arc::new(InMemoryAppendLog::new());
    let client = client(&log, "orders", 128).with_buffers(7, 512);
    let batch = messages(50, 100);
    let published = client.publish(&batch).await.unwrap();
    assert_eq!(published.offsets.len(), 50);
    assert_eq!(published.offsets[0], 0);

    let received = collect(&client, 0, 50).await;
    assert_eq!(received.len(), 50);
    for (i, (got, sent)) in received.iter().zip(&batch).enumerate() {
        assert_eq!(got.key, sent.key);
        assert_eq!(got.value, sent.value);
        // id is the offset of the chain's last frame
        assert!(got.id >= published.offsets[i]);
        if let Some(next) = published.offsets.get(i + 1) {
            assert!(got.id < *next);
        }
    }
    assert!(received.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn chase_can_start_mid_stream() {
    let log = Arc::new(InMemoryAppendLog::new());
    let client = client(&log, "orders", 128);
    let batch = messages(3, 200);
    let published = client.publish(&batch).await.unwrap();

    let received = collect(&client, published.offsets[1], 2).await;
    assert_eq!(received[0].key, "key-1");
    assert_eq!(received[1].key, "key-2");
}

#[tokio::test]
async fn publish_rejects_whole_batch_on_bad_message() {
    let log = Arc::new(InMemoryAppendLog::new());
    let client = client(&log, "orders", 128);
    let mut batch = messages(2, 300);
    batch.push(LogicalMessage::new("k".repeat(300), vec![1u8]));

    assert!(client.publish(&batch).await.is_err());
    assert_eq!(log.end_position("orders").await.unwrap(), 0);
}

#[tokio::test]
async fn live_publish_reaches_running_chaser() {
    let log = Arc::new(InMemoryAppendLog::new());
    let publisher = client(&log, "live", 256);
    let chaser = publisher.clone();

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let chase_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        chaser
            .chase(&chase_cancel, 0, move |message, _| {
                let _ = tx.send(message.clone());
                Ok(())
            })
            .await
    });

    // let the chaser go idle first
    tokio::time::sleep(Duration::from_millis(150)).await;
    let batch = messages(5, 400);
    publisher.publish(&batch).await.unwrap();

    for sent in &batch {
        let got = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("message not delivered")
            .unwrap();
        assert_eq!(got.key, sent.key);
        assert_eq!(got.value, sent.value);
    }

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

// ============================================================================
// Consumer faults and idling
// ============================================================================

#[tokio::test]
async fn consumer_fault_stops_only_this_subscription() {
    let log = Arc::new(InMemoryAppendLog::new());
    let client = client(&log, "orders", 128);
    client.publish(&messages(5, 500)).await.unwrap();

    let cancel = CancellationToken::new();
    let mut seen = 0;
    let err = client
        .chase(&cancel, 0, |_, _| {
            seen += 1;
            if seen == 2 {
                anyhow::bail!("projection rejected message");
            }
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, VaultError::Consumer(_)));
    assert_eq!(seen, 2);
    assert!(!cancel.is_cancelled());

    // the stream is still readable by a fresh chaser
    assert_eq!(collect(&client, 0, 5).await.len(), 5);
}

#[tokio::test]
async fn idle_callback_runs_on_empty_stream() {
    let log = Arc::new(InMemoryAppendLog::new());
    let client = client(&log, "empty", 128);

    let cancel = CancellationToken::new();
    let idles = AtomicUsize::new(0);
    client
        .chase_forever(
            &cancel,
            0,
            |_, _| panic!("nothing was published"),
            Some(|subscription: &messagevault::client::log::Subscription| {
                assert_eq!(subscription.position(), 0);
                if idles.fetch_add(1, Ordering::SeqCst) == 2 {
                    cancel.cancel();
                }
            }),
        )
        .await
        .unwrap();
    assert_eq!(idles.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cancelled_token_returns_immediately() {
    let log = Arc::new(InMemoryAppendLog::new());
    let client = client(&log, "orders", 128);
    client.publish(&messages(3, 600)).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    client
        .chase(&cancel, 0, |_, _| panic!("cancelled before start"))
        .await
        .unwrap();
}

// ============================================================================
// Cache mirror
// ============================================================================

/// Poll the durable checkpoint until the cache caught up with `origin`.
async fn wait_for_cache(folder: &Path, stream: &str, origin: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let reader = CheckpointedCacheReader::open_standalone(folder, stream).unwrap();
        let durable = reader.durable_checkpoint().unwrap();
        if durable.origin_cached >= origin {
            assert_eq!(durable.origin_cached, origin);
            assert!(durable.origin_max >= origin);
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "cache never caught up");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn spawn_mirror(
    log: &Arc<InMemoryAppendLog>,
    folder: &Path,
    stream: &str,
    cancel: &CancellationToken,
) -> tokio::task::JoinHandle<messagevault::core::error::VaultResult<()>> {
    let writer = CacheWriter::open(folder, stream).unwrap();
    let mut mirror = CacheMirror::new(log.clone(), stream, writer, 4, 4096);
    let cancel = cancel.clone();
    tokio::spawn(async move { mirror.run(&cancel).await })
}

#[tokio::test]
async fn mirror_copies_stream_into_cache_and_resumes() {
    let dir = temp_test_dir();
    let log = Arc::new(InMemoryAppendLog::new());
    let client = client(&log, "orders", 128);

    let first = client.publish(&messages(6, 700)).await.unwrap();
    let cancel = CancellationToken::new();
    let handle = spawn_mirror(&log, dir.path(), "orders", &cancel);
    wait_for_cache(dir.path(), "orders", first.position).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    // restart picks up where the checkpoint left off
    let second = client.publish(&messages(4, 800)).await.unwrap();
    let cancel = CancellationToken::new();
    let handle = spawn_mirror(&log, dir.path(), "orders", &cancel);
    wait_for_cache(dir.path(), "orders", second.position).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let mut reader = CheckpointedCacheReader::open_standalone(dir.path(), "orders").unwrap();
    let bulk = reader.read_all_bulk(0, usize::MAX).unwrap();
    let cached: Vec<_> = bulk.records.into_iter().map(|r| r.frame).collect();
    let origin: Vec<_> = log.frames("orders").into_iter().map(|s| s.frame).collect();
    assert_eq!(cached, origin);
}
