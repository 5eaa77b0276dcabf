//! `Stream` views over a group, yielding child results in completion order.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_core::stream::{FusedStream, Stream};

use crate::group::TaskGroup;
use crate::throwing::ThrowingTaskGroup;

/// A [`Stream`] over a [`TaskGroup`], created by [`TaskGroup::as_stream`].
///
/// Yields child outputs as they complete and ends when the group is empty.
/// The stream borrows the group, so spawning resumes once it is dropped.
///
/// # Examples
///
/// ```
/// use futures::StreamExt;
/// use task_group::with_task_group;
///
/// #[tokio::main]
/// async fn main() {
///     let total = with_task_group::<u32, _, _>(|group| Box::pin(async move {
///         for i in 1..=3 {
///             group.spawn(async move { i });
///         }
///         group.as_stream().fold(0, |acc, n| async move { acc + n }).await
///     }))
///     .await;
///
///     assert_eq!(total, 6);
/// }
/// ```
#[must_use = "streams do nothing unless polled"]
pub struct GroupStream<'g, T> {
    group: &'g mut TaskGroup<T>,
    finished: bool,
}

impl<'g, T: Send + 'static> GroupStream<'g, T> {
    pub(crate) fn new(group: &'g mut TaskGroup<T>) -> Self {
        GroupStream {
            group,
            finished: false,
        }
    }

    /// Ends the stream and cancels the underlying group.
    pub fn cancel(&mut self) {
        self.finished = true;
        self.group.cancel_all();
    }
}

impl<T: Send + 'static> Stream for GroupStream<'_, T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match ready!(this.group.poll_next_record(cx)) {
            Some(value) => Poll::Ready(Some(value)),
            None => {
                this.finished = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<T: Send + 'static> FusedStream for GroupStream<'_, T> {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

impl<T> std::fmt::Debug for GroupStream<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupStream")
            .field("finished", &self.finished)
            .finish()
    }
}

/// A [`Stream`] over a [`ThrowingTaskGroup`], created by
/// [`ThrowingTaskGroup::as_stream`].
///
/// Yields `Result<T, E>` outcomes in completion order. The first `Err` is
/// yielded as the final item and ends the stream, even though sibling
/// children may still be running; those are drained by the scope wrapper on
/// exit. A consumer that wants to keep going after an error calls
/// [`ThrowingTaskGroup::next`] directly instead.
#[must_use = "streams do nothing unless polled"]
pub struct ThrowingGroupStream<'g, T, E> {
    group: &'g mut ThrowingTaskGroup<T, E>,
    finished: bool,
}

impl<'g, T, E> ThrowingGroupStream<'g, T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(group: &'g mut ThrowingTaskGroup<T, E>) -> Self {
        ThrowingGroupStream {
            group,
            finished: false,
        }
    }

    /// Ends the stream and cancels the underlying group.
    pub fn cancel(&mut self) {
        self.finished = true;
        self.group.cancel_all();
    }
}

impl<T, E> Stream for ThrowingGroupStream<'_, T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match ready!(this.group.poll_next_record(cx)) {
            Some(Ok(value)) => Poll::Ready(Some(Ok(value))),
            Some(Err(error)) => {
                this.finished = true;
                Poll::Ready(Some(Err(error)))
            }
            None => {
                this.finished = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<T, E> FusedStream for ThrowingGroupStream<'_, T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

impl<T, E> std::fmt::Debug for ThrowingGroupStream<'_, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrowingGroupStream")
            .field("finished", &self.finished)
            .finish()
    }
}
