#![warn(rust_2018_idioms)]

use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use task_group::with_task_group;
use tokio::sync::oneshot;
use tokio_test::assert_pending;

#[tokio::test]
async fn delivers_every_child_once() {
    let results = with_task_group::<u32, _, _>(|group| {
        Box::pin(async move {
            group.spawn(async { 1 });
            group.spawn(async { 2 });
            assert_eq!(group.len(), 2);

            let mut results = vec![
                group.next().await.expect("first child"),
                group.next().await.expect("second child"),
            ];
            assert!(group.next().await.is_none());
            assert!(group.is_empty());

            results.sort_unstable();
            results
        })
    })
    .await;

    // Either completion order is legal; the multiset is fixed.
    assert_eq!(results, vec![1, 2]);
}

#[tokio::test]
async fn next_on_empty_group_resolves_immediately() {
    with_task_group::<u32, _, _>(|group| {
        Box::pin(async move {
            // No suspension: the very first poll reports end-of-stream.
            assert_eq!(group.next().now_or_never(), Some(None));
        })
    })
    .await;
}

#[tokio::test]
async fn next_suspends_while_children_in_flight() {
    with_task_group::<u32, _, _>(|group| {
        Box::pin(async move {
            let (tx, rx) = oneshot::channel();
            group.spawn(async move {
                rx.await.unwrap();
                5
            });

            {
                let mut next = tokio_test::task::spawn(group.next());
                assert_pending!(next.poll());
            }

            tx.send(()).unwrap();
            assert_eq!(group.next().await, Some(5));
            assert!(group.next().await.is_none());
        })
    })
    .await;
}

#[tokio::test]
async fn delivery_order_is_completion_order() {
    with_task_group::<u32, _, _>(|group| {
        Box::pin(async move {
            let (tx_a, rx_a) = oneshot::channel();
            let (tx_b, rx_b) = oneshot::channel();
            group.spawn(async move {
                rx_a.await.unwrap();
                1
            });
            group.spawn(async move {
                rx_b.await.unwrap();
                2
            });

            // Release the second child first: it must be delivered first.
            tx_b.send(()).unwrap();
            assert_eq!(group.next().await, Some(2));
            tx_a.send(()).unwrap();
            assert_eq!(group.next().await, Some(1));
        })
    })
    .await;
}

#[tokio::test]
async fn try_next_never_suspends() {
    with_task_group::<u32, _, _>(|group| {
        Box::pin(async move {
            assert_eq!(group.try_next(), None);

            let (tx, rx) = oneshot::channel();
            group.spawn(async move {
                rx.await.unwrap();
                7
            });

            // Still in flight.
            assert_eq!(group.try_next(), None);
            assert!(!group.is_empty());

            tx.send(()).unwrap();
            while group.try_next().is_none() {
                tokio::task::yield_now().await;
            }
            assert!(group.is_empty());
        })
    })
    .await;
}

#[tokio::test]
async fn scope_drains_unconsumed_children() {
    let finished = Arc::new(AtomicUsize::new(0));

    let body_finished = finished.clone();
    with_task_group::<(), _, _>(|group| {
        let finished = body_finished;
        Box::pin(async move {
            for _ in 0..8 {
                let finished = finished.clone();
                group.spawn(async move {
                    tokio::task::yield_now().await;
                    finished.fetch_add(1, SeqCst);
                });
            }
            // Return without consuming anything; the scope waits.
        })
    })
    .await;

    assert_eq!(finished.load(SeqCst), 8);
}

#[tokio::test]
async fn spawning_after_drain_reopens_delivery() {
    with_task_group::<u32, _, _>(|group| {
        Box::pin(async move {
            group.spawn(async { 1 });
            assert_eq!(group.next().await, Some(1));
            assert!(group.next().await.is_none());

            // An exhausted group is not a closed group.
            assert!(group.spawn(async { 2 }));
            assert_eq!(group.next().await, Some(2));
        })
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn wait_for_all_discards_outputs() {
    with_task_group::<u32, _, _>(|group| {
        Box::pin(async move {
            for i in 0u64..4 {
                group.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10 * i)).await;
                    i as u32
                });
            }
            group.wait_for_all().await;
            assert!(group.is_empty());
            assert_eq!(group.len(), 0);
        })
    })
    .await;
}

#[tokio::test]
async fn scope_returns_body_value() {
    let value = with_task_group::<u32, _, _>(|group| {
        Box::pin(async move {
            group.spawn(async { 40 });
            group.next().await.unwrap() + 2
        })
    })
    .await;

    assert_eq!(value, 42);
}
