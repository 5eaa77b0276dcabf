use std::future::{poll_fn, Future};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio_util::sync::CancellationToken;

use crate::core::{ChildTask, GroupCore};
use crate::stream::GroupStream;

/// A scoped collection of child tasks whose outputs are awaited in
/// completion order.
///
/// A `TaskGroup` is handed to the body of [`with_task_group`] as a mutable
/// borrow; it cannot be constructed directly and cannot escape its scope.
/// Child tasks run concurrently on the ambient tokio runtime, but only the
/// task that owns the borrow consumes their results.
///
/// This is the non-throwing flavor: children produce plain values, and a
/// failing child is unrepresentable in the types. For fallible children see
/// [`ThrowingTaskGroup`].
///
/// # Examples
///
/// ```
/// use task_group::with_task_group;
///
/// #[tokio::main]
/// async fn main() {
///     let total = with_task_group::<u32, _, _>(|group| Box::pin(async move {
///         for i in 1..=4 {
///             group.spawn(async move { i });
///         }
///
///         let mut total = 0;
///         while let Some(n) = group.next().await {
///             total += n;
///         }
///         total
///     }))
///     .await;
///
///     assert_eq!(total, 10);
/// }
/// ```
///
/// [`with_task_group`]: crate::with_task_group
/// [`ThrowingTaskGroup`]: crate::ThrowingTaskGroup
pub struct TaskGroup<T> {
    core: Arc<GroupCore<T>>,
}

impl<T> TaskGroup<T> {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        TaskGroup {
            core: Arc::new(GroupCore::new(cancel)),
        }
    }

    /// Returns the number of children spawned but not yet delivered.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Returns `true` if no child is pending.
    ///
    /// A group that reports empty accepts new spawns (unless cancelled),
    /// which re-open delivery.
    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// Returns `true` if this group was cancelled, either through
    /// [`cancel_all`] or because the scope it belongs to was cancelled.
    ///
    /// [`cancel_all`]: TaskGroup::cancel_all
    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    /// Cancels the group: every subsequent [`spawn`] is rejected and every
    /// running child is signalled through the group's cancellation token.
    ///
    /// Cancellation is cooperative. Children observe it at their own
    /// suspension points via [`cancellation_token`] and wind down on their
    /// own terms; nothing is preempted, and results already produced remain
    /// deliverable by [`next`].
    ///
    /// Idempotent. The token can also be cancelled from inside a child,
    /// which has the same effect.
    ///
    /// [`spawn`]: TaskGroup::spawn
    /// [`next`]: TaskGroup::next
    /// [`cancellation_token`]: TaskGroup::cancellation_token
    pub fn cancel_all(&self) {
        self.core.cancel_all();
    }

    /// The token children observe for cooperative cancellation.
    ///
    /// Clone it into a child before spawning:
    ///
    /// ```
    /// # use task_group::with_task_group;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # with_task_group::<bool, _, _>(|group| Box::pin(async move {
    /// let token = group.cancellation_token().clone();
    /// group.spawn(async move {
    ///     // ... do some work ...
    ///     token.is_cancelled()
    /// });
    /// # let _ = group.next().await;
    /// # })).await;
    /// # }
    /// ```
    pub fn cancellation_token(&self) -> &CancellationToken {
        self.core.cancellation_token()
    }
}

impl<T: Send + 'static> TaskGroup<T> {
    /// Spawns a child task into the group.
    ///
    /// Returns `false` without executing the task if the group is cancelled.
    /// Otherwise the child starts running on the ambient runtime immediately;
    /// its output becomes observable through exactly one later [`next`]
    /// delivery. `spawn` itself never suspends, and never reports the
    /// child's outcome.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime, as [`tokio::spawn`] does.
    ///
    /// [`next`]: TaskGroup::next
    #[track_caller]
    pub fn spawn<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = T> + Send + 'static,
    {
        if !self.core.try_add_child() {
            tracing::trace!(target: "task_group", "spawn rejected: group cancelled");
            return false;
        }
        let child = ChildTask::new(self.core.clone(), task);
        let handle = tokio::spawn(child);
        self.core.register_child(handle.abort_handle());
        true
    }

    /// Waits for the next child to complete and returns its output.
    ///
    /// Results are delivered in completion order, each exactly once.
    /// Returns `None` once every spawned child has been delivered. On an
    /// empty group this resolves immediately, without suspending; the only
    /// suspension point is waiting on children still in flight.
    pub async fn next(&mut self) -> Option<T> {
        poll_fn(|cx| self.core.poll_next(cx)).await
    }

    /// Returns the next output if a child has already completed.
    ///
    /// Never suspends. Returns `None` both when children are still running
    /// and when the group is empty; use [`is_empty`] to tell the two apart.
    ///
    /// [`is_empty`]: TaskGroup::is_empty
    pub fn try_next(&mut self) -> Option<T> {
        self.core.try_next()
    }

    /// Waits for all pending children to complete, discarding their outputs.
    pub async fn wait_for_all(&mut self) {
        while self.next().await.is_some() {}
    }

    /// A [`Stream`] view of this group, yielding child outputs in completion
    /// order until the group is empty.
    ///
    /// [`Stream`]: futures_core::Stream
    pub fn as_stream(&mut self) -> GroupStream<'_, T> {
        GroupStream::new(self)
    }

    pub(crate) fn poll_next_record(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.core.poll_next(cx)
    }
}

impl<T> Drop for TaskGroup<T> {
    fn drop(&mut self) {
        // Normal teardown is the scope wrapper's drain, which leaves nothing
        // running. If the scope future itself was dropped mid-flight, no one
        // is left to consume the group, so remaining children are aborted
        // rather than allowed to outlive the scope.
        self.core.abort_all_children();
    }
}

impl<T> std::fmt::Debug for TaskGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("len", &self.len())
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}
