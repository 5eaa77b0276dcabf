//! Scoped entry points: the only way a group is created, and the place its
//! teardown guarantee lives.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::group::TaskGroup;
use crate::throwing::ThrowingTaskGroup;

/// An owned, type-erased future, as returned by scope bodies.
///
/// Identical in shape to `futures::future::BoxFuture`, so bodies may be
/// written either as `Box::pin(async move { .. })` or with
/// `FutureExt::boxed`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs `body` with a new [`TaskGroup`], then waits for every child the body
/// spawned before returning the body's result.
///
/// The group is handed to the body as a mutable borrow, which makes the body
/// the group's only consumer and keeps the handle from escaping: a child
/// task needs `'static` work, so the borrow cannot be smuggled into one.
///
/// When the body returns, any children it did not consume are awaited and
/// their outputs discarded. On every exit path the group is empty before
/// this function returns: children never outlive the scope.
///
/// # Examples
///
/// ```
/// use task_group::with_task_group;
///
/// #[tokio::main]
/// async fn main() {
///     let first = with_task_group::<&str, _, _>(|group| Box::pin(async move {
///         group.spawn(async { "fast" });
///         group.spawn(async {
///             tokio::task::yield_now().await;
///             "slow"
///         });
///         // Unconsumed children are drained before the scope returns.
///         group.next().await
///     }))
///     .await;
///
///     assert!(first.is_some());
/// }
/// ```
pub async fn with_task_group<T, R, F>(body: F) -> R
where
    T: Send + 'static,
    F: for<'g> FnOnce(&'g mut TaskGroup<T>) -> BoxFuture<'g, R>,
{
    run_task_group(CancellationToken::new(), body).await
}

/// Like [`with_task_group`], but the group is scoped under `parent`:
/// cancelling the parent token cancels the group and signals its children,
/// exactly as [`TaskGroup::cancel_all`] would.
///
/// The group receives a child token, so cancelling the group does not
/// cancel `parent`.
///
/// [`TaskGroup::cancel_all`]: crate::TaskGroup::cancel_all
pub async fn with_task_group_in<T, R, F>(parent: &CancellationToken, body: F) -> R
where
    T: Send + 'static,
    F: for<'g> FnOnce(&'g mut TaskGroup<T>) -> BoxFuture<'g, R>,
{
    run_task_group(parent.child_token(), body).await
}

async fn run_task_group<T, R, F>(cancel: CancellationToken, body: F) -> R
where
    T: Send + 'static,
    F: for<'g> FnOnce(&'g mut TaskGroup<T>) -> BoxFuture<'g, R>,
{
    let mut group = TaskGroup::new(cancel);
    tracing::trace!(target: "task_group", "task group scope opened");

    let result = body(&mut group).await;

    group.wait_for_all().await;
    debug_assert!(group.is_empty());
    tracing::trace!(target: "task_group", "task group scope closed");
    result
}

/// Runs `body` with a new [`ThrowingTaskGroup`], then waits for every child
/// the body spawned.
///
/// On a normal return the remaining children are drained and their
/// outcomes, including errors, are discarded: only errors the body observed
/// through [`next`] or returned itself propagate out of the scope. A caller
/// that wants every child error surfaced must consume the group to the end
/// (`next` until `Ok(None)`, or [`wait_for_all`]) before returning.
///
/// If the body returns `Err`, the group is cancelled, the remaining
/// children are drained with their outcomes suppressed, and the body's
/// error is returned. The group is empty on every exit path.
///
/// [`next`]: crate::ThrowingTaskGroup::next
/// [`wait_for_all`]: crate::ThrowingTaskGroup::wait_for_all
pub async fn with_throwing_task_group<T, E, R, F>(body: F) -> Result<R, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: for<'g> FnOnce(&'g mut ThrowingTaskGroup<T, E>) -> BoxFuture<'g, Result<R, E>>,
{
    run_throwing_task_group(CancellationToken::new(), body).await
}

/// Like [`with_throwing_task_group`], but the group is scoped under
/// `parent`; see [`with_task_group_in`].
pub async fn with_throwing_task_group_in<T, E, R, F>(
    parent: &CancellationToken,
    body: F,
) -> Result<R, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: for<'g> FnOnce(&'g mut ThrowingTaskGroup<T, E>) -> BoxFuture<'g, Result<R, E>>,
{
    run_throwing_task_group(parent.child_token(), body).await
}

async fn run_throwing_task_group<T, E, R, F>(cancel: CancellationToken, body: F) -> Result<R, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: for<'g> FnOnce(&'g mut ThrowingTaskGroup<T, E>) -> BoxFuture<'g, Result<R, E>>,
{
    let mut group = ThrowingTaskGroup::new(cancel);
    tracing::trace!(target: "task_group", "throwing task group scope opened");

    match body(&mut group).await {
        Ok(value) => {
            group.drain().await;
            debug_assert!(group.is_empty());
            tracing::trace!(target: "task_group", "throwing task group scope closed");
            Ok(value)
        }
        Err(error) => {
            // The body failed: nothing may outlive the scope, so cancel the
            // children and absorb whatever they still produce.
            group.cancel_all();
            group.drain().await;
            debug_assert!(group.is_empty());
            tracing::debug!(
                target: "task_group",
                "throwing task group scope closed by body error"
            );
            Err(error)
        }
    }
}
