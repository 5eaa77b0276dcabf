use std::future::{poll_fn, Future};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio_util::sync::CancellationToken;

use crate::core::{ChildTask, GroupCore};
use crate::stream::ThrowingGroupStream;

/// A scoped collection of fallible child tasks.
///
/// Like [`TaskGroup`], but children resolve to `Result<T, E>` and a child's
/// error surfaces as the failure of the [`next`] call that delivers it.
/// Sibling children keep running when one fails: whether an error stops the
/// group is the consumer's decision, either by propagating it out of the
/// scope body (which cancels and drains the rest, see
/// [`with_throwing_task_group`]) or by continuing to call [`next`].
///
/// Handed to the body of [`with_throwing_task_group`] as a mutable borrow;
/// cannot be constructed directly and cannot escape its scope.
///
/// # Examples
///
/// ```
/// use task_group::with_throwing_task_group;
///
/// #[derive(Debug, PartialEq)]
/// struct FetchError(&'static str);
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_throwing_task_group::<u32, FetchError, _, _>(|group| {
///         Box::pin(async move {
///             group.spawn(async { Ok(1) });
///             group.spawn(async { Err(FetchError("unreachable host")) });
///
///             let mut total = 0;
///             // The `?` propagates the first child error out of the body;
///             // the scope then cancels and drains the remaining children.
///             while let Some(n) = group.next().await? {
///                 total += n;
///             }
///             Ok(total)
///         })
///     })
///     .await;
///
///     assert_eq!(result, Err(FetchError("unreachable host")));
/// }
/// ```
///
/// [`TaskGroup`]: crate::TaskGroup
/// [`next`]: ThrowingTaskGroup::next
/// [`with_throwing_task_group`]: crate::with_throwing_task_group
pub struct ThrowingTaskGroup<T, E> {
    core: Arc<GroupCore<Result<T, E>>>,
}

impl<T, E> ThrowingTaskGroup<T, E> {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        ThrowingTaskGroup {
            core: Arc::new(GroupCore::new(cancel)),
        }
    }

    /// Returns the number of children spawned but not yet delivered.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Returns `true` if no child is pending.
    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// Returns `true` if this group was cancelled, either through
    /// [`cancel_all`] or because the scope it belongs to was cancelled.
    ///
    /// [`cancel_all`]: ThrowingTaskGroup::cancel_all
    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    /// Cancels the group: every subsequent [`spawn`] is rejected and every
    /// running child is signalled through the group's cancellation token.
    ///
    /// Cooperative and idempotent; see [`TaskGroup::cancel_all`] for the
    /// full contract. A child written to fail on cancellation will have its
    /// error delivered like any other.
    ///
    /// [`spawn`]: ThrowingTaskGroup::spawn
    /// [`TaskGroup::cancel_all`]: crate::TaskGroup::cancel_all
    pub fn cancel_all(&self) {
        self.core.cancel_all();
    }

    /// The token children observe for cooperative cancellation.
    pub fn cancellation_token(&self) -> &CancellationToken {
        self.core.cancellation_token()
    }
}

impl<T, E> ThrowingTaskGroup<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Spawns a fallible child task into the group.
    ///
    /// Returns `false` without executing the task if the group is cancelled.
    /// The child's outcome, value or error, becomes observable only through
    /// the matching [`next`] delivery; `spawn` never reports it.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime, as [`tokio::spawn`] does.
    ///
    /// [`next`]: ThrowingTaskGroup::next
    #[track_caller]
    pub fn spawn<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
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

    /// Waits for the next child to complete.
    ///
    /// Returns `Ok(Some(value))` for a successful child, `Err(error)` for a
    /// failed one, and `Ok(None)` once every spawned child has been
    /// delivered. Each child is delivered exactly once, in completion order.
    ///
    /// An `Err` here does not disturb the rest of the group: siblings keep
    /// running and stay deliverable by later calls. The idiomatic consumer
    /// loop propagates instead:
    ///
    /// ```text
    /// while let Some(value) = group.next().await? { ... }
    /// ```
    pub async fn next(&mut self) -> Result<Option<T>, E> {
        match self.next_record().await {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(error)) => Err(error),
            None => Ok(None),
        }
    }

    /// Returns the next outcome if a child has already completed.
    ///
    /// Never suspends. Returns `None` both when children are still running
    /// and when the group is empty; use [`is_empty`] to tell the two apart.
    ///
    /// [`is_empty`]: ThrowingTaskGroup::is_empty
    pub fn try_next(&mut self) -> Option<Result<T, E>> {
        self.core.try_next()
    }

    /// Waits for all pending children, discarding values.
    ///
    /// On the first child error, cancels the group, drains the remaining
    /// children (suppressing any further errors), and returns that error.
    pub async fn wait_for_all(&mut self) -> Result<(), E> {
        while let Some(record) = self.next_record().await {
            if let Err(error) = record {
                self.cancel_all();
                self.drain().await;
                return Err(error);
            }
        }
        Ok(())
    }

    /// A [`Stream`] view of this group, yielding outcomes in completion
    /// order and ending at the first error.
    ///
    /// [`Stream`]: futures_core::Stream
    pub fn as_stream(&mut self) -> ThrowingGroupStream<'_, T, E> {
        ThrowingGroupStream::new(self)
    }

    async fn next_record(&mut self) -> Option<Result<T, E>> {
        poll_fn(|cx| self.core.poll_next(cx)).await
    }

    /// Consumes everything still pending, discarding outcomes. Only errors
    /// observed through `next` or propagated out of a scope body are
    /// surfaced; this is the absorbing path for the rest.
    pub(crate) async fn drain(&mut self) {
        while let Some(record) = self.next_record().await {
            if record.is_err() {
                tracing::debug!(
                    target: "task_group",
                    "discarding unobserved child error during drain"
                );
            }
        }
    }

    pub(crate) fn poll_next_record(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T, E>>> {
        self.core.poll_next(cx)
    }
}

impl<T, E> Drop for ThrowingTaskGroup<T, E> {
    fn drop(&mut self) {
        // Same backstop as `TaskGroup`: only the dropped-scope-future path
        // reaches this with children still pending.
        self.core.abort_all_children();
    }
}

impl<T, E> std::fmt::Debug for ThrowingTaskGroup<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrowingTaskGroup")
            .field("len", &self.len())
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}
