//! Shared state behind a task group handle.
//!
//! A group is an `Arc<GroupCore<R>>` shared between the parent's handle and
//! every in-flight child. `R` is the record type a child deposits on
//! completion: the plain output for [`TaskGroup`], a `Result` for
//! [`ThrowingTaskGroup`].
//!
//! [`TaskGroup`]: crate::TaskGroup
//! [`ThrowingTaskGroup`]: crate::ThrowingTaskGroup

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::{AcqRel, Acquire};
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll, Waker};

use pin_project_lite::pin_project;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// The group has been cancelled. Once set, never unset.
const CANCELLED: usize = 1 << (usize::BITS - 1);

/// Bits holding the count of spawned-but-undelivered children.
const PENDING_MASK: usize = CANCELLED - 1;

/// Pending-child count packed with the cancellation flag.
///
/// Keeping both in one word makes `try_increment` and the cancellation flip
/// a single modification order: once `cancel` returns, no later increment
/// can succeed.
///
/// All transitions are RMW operations.
struct GroupState {
    val: AtomicUsize,
}

impl GroupState {
    fn new() -> Self {
        GroupState {
            val: AtomicUsize::new(0),
        }
    }

    /// Reserves a slot for a new child. Fails iff the group is cancelled.
    fn try_increment(&self) -> bool {
        self.val
            .fetch_update(AcqRel, Acquire, |curr| {
                if curr & CANCELLED != 0 {
                    return None;
                }
                assert_ne!(curr & PENDING_MASK, PENDING_MASK, "pending child overflow");
                Some(curr + 1)
            })
            .is_ok()
    }

    /// Releases a slot. Called once per successful `try_increment`, at the
    /// moment the child's record is delivered or the child is abandoned.
    fn complete_one(&self) {
        let prev = self.val.fetch_sub(1, AcqRel);
        debug_assert_ne!(prev & PENDING_MASK, 0, "pending child underflow");
    }

    /// Sets the cancelled flag. Returns `true` on the first flip.
    fn cancel(&self) -> bool {
        self.val.fetch_or(CANCELLED, AcqRel) & CANCELLED == 0
    }

    fn pending(&self) -> usize {
        self.val.load(Acquire) & PENDING_MASK
    }

    fn is_cancelled(&self) -> bool {
        self.val.load(Acquire) & CANCELLED != 0
    }
}

/// State mutated from both sides of the group, guarded by one lock.
struct Inner<R> {
    /// Completed children awaiting delivery, in completion order.
    ready: VecDeque<R>,
    /// The parent, suspended in `next` while `ready` was empty.
    waiter: Option<Waker>,
    /// Abort handles for spawned children. Only used on the
    /// dropped-without-drain teardown path; normal teardown never aborts.
    children: Vec<AbortHandle>,
}

pub(crate) struct GroupCore<R> {
    state: GroupState,
    cancel: CancellationToken,
    inner: Mutex<Inner<R>>,
}

impl<R> GroupCore<R> {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        GroupCore {
            state: GroupState::new(),
            cancel,
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                waiter: None,
                children: Vec::new(),
            }),
        }
    }

    /// Reserves a slot for a child about to be spawned.
    ///
    /// Rejects when the group was cancelled, whether explicitly through
    /// [`cancel_all`] or implicitly through the enclosing scope's token.
    ///
    /// [`cancel_all`]: GroupCore::cancel_all
    pub(crate) fn try_add_child(&self) -> bool {
        if self.cancel.is_cancelled() {
            // Fold the ambient cancellation into the state word so the
            // spawn-rejection contract matches `is_cancelled`.
            self.state.cancel();
            return false;
        }
        self.state.try_increment()
    }

    pub(crate) fn register_child(&self, handle: AbortHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.children.retain(|child| !child.is_finished());
        inner.children.push(handle);
    }

    /// Deposits a completed child's record and wakes the parent if it is
    /// suspended in `next`.
    ///
    /// The pending slot is *not* released here; that happens when the record
    /// is handed to the consumer.
    pub(crate) fn offer(&self, record: R) {
        let waiter = {
            let mut inner = self.inner.lock().unwrap();
            inner.ready.push_back(record);
            inner.waiter.take()
        };
        if let Some(waker) = waiter {
            waker.wake();
        }
    }

    /// Releases a slot for a child that was dropped before completing, and
    /// wakes the parent so it re-evaluates emptiness.
    ///
    /// Reached when a child panics (its future is dropped mid-unwind) or is
    /// aborted by the teardown backstop. Without this, a parent suspended in
    /// `next` would wait forever on a record that will never arrive.
    pub(crate) fn abandon(&self) {
        let waiter = {
            let mut inner = self.inner.lock().unwrap();
            self.state.complete_one();
            inner.waiter.take()
        };
        tracing::trace!(target: "task_group", "child abandoned without a record");
        if let Some(waker) = waiter {
            waker.wake();
        }
    }

    /// Parent-side decision tree: deliver the front record, report the group
    /// empty, or park the caller until a child completes.
    pub(crate) fn poll_next(&self, cx: &mut Context<'_>) -> Poll<Option<R>> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(record) = inner.ready.pop_front() {
            inner.waiter = None;
            drop(inner);
            self.state.complete_one();
            return Poll::Ready(Some(record));
        }

        // `pending` is stable here: spawns and deliveries are parent-only and
        // abandonment takes the lock we are holding.
        if self.state.pending() == 0 {
            inner.waiter = None;
            // Everything spawned has been delivered; the registry holds only
            // finished tasks.
            inner.children.clear();
            return Poll::Ready(None);
        }

        match inner.waiter {
            Some(ref waker) if waker.will_wake(cx.waker()) => {}
            _ => inner.waiter = Some(cx.waker().clone()),
        }
        Poll::Pending
    }

    /// Non-suspending probe: the front record if one is ready.
    pub(crate) fn try_next(&self) -> Option<R> {
        let record = {
            let mut inner = self.inner.lock().unwrap();
            inner.ready.pop_front()?
        };
        self.state.complete_one();
        Some(record)
    }

    /// Cancels the group: rejects future spawns and signals every child
    /// through the group token. Idempotent; callable from any task.
    ///
    /// Records already produced stay deliverable, and a parked parent is not
    /// woken here: the children the token reaches still complete and wake it
    /// through `offer`.
    pub(crate) fn cancel_all(&self) {
        if self.state.cancel() {
            tracing::debug!(
                target: "task_group",
                pending = self.state.pending(),
                "task group cancelled"
            );
        }
        self.cancel.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.is_cancelled() || self.cancel.is_cancelled()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.pending() == 0
    }

    pub(crate) fn len(&self) -> usize {
        self.state.pending()
    }

    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Last-resort teardown: abort every still-running child.
    ///
    /// Only the handle's `Drop` calls this, and only the abnormal
    /// scope-future-dropped path reaches it with children still pending.
    pub(crate) fn abort_all_children(&self) {
        let mut inner = self.inner.lock().unwrap();
        for child in inner.children.drain(..) {
            child.abort();
        }
    }
}

pin_project! {
    /// Adapter a child runs under: polls the user's future and offers its
    /// output to the group on completion.
    pub(crate) struct ChildTask<F, R> {
        // Taken on completion; still present on drop means the child never
        // produced a record and its slot must be released.
        core: Option<Arc<GroupCore<R>>>,
        #[pin]
        future: F,
    }

    impl<F, R> PinnedDrop for ChildTask<F, R> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(core) = this.core.take() {
                core.abandon();
            }
        }
    }
}

impl<F, R> ChildTask<F, R> {
    pub(crate) fn new(core: Arc<GroupCore<R>>, future: F) -> Self {
        ChildTask {
            core: Some(core),
            future,
        }
    }
}

impl<F, R> Future for ChildTask<F, R>
where
    F: Future<Output = R>,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.project();
        let record = ready!(this.future.poll(cx));
        let core = this
            .core
            .take()
            .expect("child task polled after completion");
        core.offer(record);
        Poll::Ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_pairs_with_complete() {
        let state = GroupState::new();
        assert!(state.try_increment());
        assert!(state.try_increment());
        assert_eq!(state.pending(), 2);
        state.complete_one();
        assert_eq!(state.pending(), 1);
        state.complete_one();
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn no_increment_after_cancel() {
        let state = GroupState::new();
        assert!(state.try_increment());
        assert!(state.cancel());
        assert!(!state.try_increment());
        assert!(state.is_cancelled());
        // The slot reserved before the flip is still accounted for.
        assert_eq!(state.pending(), 1);
        state.complete_one();
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn cancel_is_idempotent() {
        let state = GroupState::new();
        assert!(state.cancel());
        assert!(!state.cancel());
        assert!(!state.cancel());
        assert!(state.is_cancelled());
    }

    #[test]
    fn ready_records_survive_cancellation() {
        let core = GroupCore::new(CancellationToken::new());
        assert!(core.try_add_child());
        core.offer(7u32);
        core.cancel_all();
        assert_eq!(core.try_next(), Some(7));
        assert!(core.is_empty());
    }

    #[test]
    fn try_add_child_observes_parent_token() {
        let parent = CancellationToken::new();
        let core: GroupCore<u32> = GroupCore::new(parent.child_token());
        assert!(core.try_add_child());
        parent.cancel();
        assert!(!core.try_add_child());
        assert!(core.is_cancelled());
        assert_eq!(core.len(), 1);
    }
}
