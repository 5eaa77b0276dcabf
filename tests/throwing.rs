#![warn(rust_2018_idioms)]

use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
use std::sync::Arc;
use std::time::Duration;

use task_group::with_throwing_task_group;
use tokio::sync::oneshot;

#[derive(Debug, PartialEq)]
enum TestError {
    Body,
    Child(&'static str),
}

#[tokio::test]
async fn child_errors_surface_per_next() {
    let result = with_throwing_task_group::<u32, TestError, _, _>(|group| {
        Box::pin(async move {
            let (tx_a, rx_a) = oneshot::channel();
            let (tx_b, rx_b) = oneshot::channel();
            let (tx_c, rx_c) = oneshot::channel();

            group.spawn(async move {
                rx_a.await.unwrap();
                Ok(7)
            });
            group.spawn(async move {
                rx_b.await.unwrap();
                Err(TestError::Child("boom"))
            });
            group.spawn(async move {
                rx_c.await.unwrap();
                Ok(9)
            });

            tx_a.send(()).unwrap();
            assert_eq!(group.next().await, Ok(Some(7)));

            tx_b.send(()).unwrap();
            assert_eq!(group.next().await, Err(TestError::Child("boom")));

            // The failure above did not disturb the remaining sibling.
            tx_c.send(()).unwrap();
            assert_eq!(group.next().await, Ok(Some(9)));
            assert_eq!(group.next().await, Ok(None));

            Ok(())
        })
    })
    .await;

    assert_eq!(result, Ok(()));
}

#[tokio::test(start_paused = true)]
async fn body_error_cancels_and_drains() {
    let finished = Arc::new(AtomicUsize::new(0));

    let body_finished = finished.clone();
    let result = with_throwing_task_group::<u32, TestError, (), _>(|group| {
        let finished = body_finished;
        Box::pin(async move {
            let token = group.cancellation_token().clone();
            for i in [10, 20, 30] {
                let token = token.clone();
                let finished = finished.clone();
                group.spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                    }
                    finished.fetch_add(1, SeqCst);
                    Ok(i)
                });
            }
            Err(TestError::Body)
        })
    })
    .await;

    // The body's error propagates; the children were cancelled, ran to
    // completion, and their outcomes were suppressed by the drain.
    assert_eq!(result, Err(TestError::Body));
    assert_eq!(finished.load(SeqCst), 3);
}

#[tokio::test]
async fn normal_return_suppresses_unobserved_errors() {
    let result = with_throwing_task_group::<u32, TestError, _, _>(|group| {
        Box::pin(async move {
            group.spawn(async { Err(TestError::Child("silent")) });
            // Return without consuming: the drain absorbs the error.
            Ok(11)
        })
    })
    .await;

    assert_eq!(result, Ok(11));
}

#[tokio::test]
async fn question_mark_in_body_propagates_child_error() {
    let result = with_throwing_task_group::<u32, TestError, _, _>(|group| {
        Box::pin(async move {
            group.spawn(async { Err(TestError::Child("fatal")) });
            group.spawn(async { Ok(1) });

            let mut total = 0;
            while let Some(n) = group.next().await? {
                total += n;
            }
            Ok(total)
        })
    })
    .await;

    assert_eq!(result, Err(TestError::Child("fatal")));
}

#[tokio::test]
async fn wait_for_all_returns_first_error_and_empties() {
    with_throwing_task_group::<u32, TestError, _, _>(|group| {
        Box::pin(async move {
            let (tx_ok, rx_ok) = oneshot::channel();
            let (tx_err, rx_err) = oneshot::channel();

            group.spawn(async move {
                rx_err.await.unwrap();
                Err(TestError::Child("first"))
            });
            group.spawn(async move {
                rx_ok.await.unwrap();
                Ok(1)
            });

            tx_err.send(()).unwrap();
            tx_ok.send(()).unwrap();

            assert_eq!(group.wait_for_all().await, Err(TestError::Child("first")));
            assert!(group.is_empty());
            assert!(group.is_cancelled());

            Ok(())
        })
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn wait_for_all_without_errors() {
    with_throwing_task_group::<u32, TestError, _, _>(|group| {
        Box::pin(async move {
            for i in 0..3 {
                group.spawn(async move { Ok(i) });
            }
            assert_eq!(group.wait_for_all().await, Ok(()));
            assert!(group.is_empty());
            Ok(())
        })
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn try_next_returns_raw_outcomes() {
    with_throwing_task_group::<u32, TestError, _, _>(|group| {
        Box::pin(async move {
            assert!(group.try_next().is_none());
            group.spawn(async { Err(TestError::Child("raw")) });

            let record = loop {
                match group.try_next() {
                    Some(record) => break record,
                    None => tokio::task::yield_now().await,
                }
            };
            assert_eq!(record, Err(TestError::Child("raw")));
            Ok(())
        })
    })
    .await
    .unwrap();
}
