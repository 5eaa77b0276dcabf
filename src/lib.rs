#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Structured task groups for tokio.
//!
//! A task group lets a parent task spawn a dynamic number of child tasks,
//! await their results in the order they complete, and guarantees that no
//! child outlives the scope that spawned it, whichever way the scope exits.
//!
//! Groups come in two flavors:
//!
//! - [`TaskGroup<T>`]: children produce plain values. Entered with
//!   [`with_task_group`].
//! - [`ThrowingTaskGroup<T, E>`]: children produce `Result<T, E>`, and a
//!   child's error surfaces as the failure of the [`next`] call that
//!   delivers it. Entered with [`with_throwing_task_group`].
//!
//! The scope wrapper owns setup and teardown: it builds the group, runs
//! your body with a mutable borrow of it, and when the body finishes waits
//! for every child the body did not consume. The mutable borrow is what
//! makes the group *structured*: only the parent can spawn into or consume
//! the group, and the handle cannot escape the scope.
//!
//! ```
//! use task_group::with_task_group;
//!
//! #[tokio::main]
//! async fn main() {
//!     let results = with_task_group::<u32, _, _>(|group| Box::pin(async move {
//!         for i in 0..4 {
//!             group.spawn(async move { i * 10 });
//!         }
//!
//!         let mut results = Vec::new();
//!         // Completion order, not spawn order.
//!         while let Some(n) = group.next().await {
//!             results.push(n);
//!         }
//!         results
//!     }))
//!     .await;
//!
//!     assert_eq!(results.len(), 4);
//! }
//! ```
//!
//! # Cancellation
//!
//! Cancellation is cooperative. [`cancel_all`] rejects every later `spawn`
//! and cancels the group's [`CancellationToken`]; children observe the
//! token at their own suspension points and wind down on their own terms.
//! Nothing is preempted, and results already produced stay deliverable.
//!
//! Groups nest into larger cancellation hierarchies through
//! [`with_task_group_in`], which scopes the group's token under a parent
//! token: cancelling the parent cancels the group, while cancelling the
//! group leaves the parent untouched.
//!
//! # Errors
//!
//! A throwing group never reports a child failure from `spawn`; errors
//! travel only through [`next`]. When a scope body propagates an error (the
//! `?` in the body), the wrapper cancels the remaining children and drains
//! them, suppressing their outcomes, before returning the body's error.
//! Children that fail *after* the body returned normally are absorbed by
//! the implicit drain; consume the group to the end before returning if
//! every error matters.
//!
//! [`TaskGroup<T>`]: crate::TaskGroup
//! [`ThrowingTaskGroup<T, E>`]: crate::ThrowingTaskGroup
//! [`next`]: crate::ThrowingTaskGroup::next
//! [`cancel_all`]: crate::TaskGroup::cancel_all
//! [`CancellationToken`]: crate::CancellationToken

mod core;
mod group;
mod scope;
mod stream;
mod throwing;

pub use crate::group::TaskGroup;
pub use crate::scope::{
    with_task_group, with_task_group_in, with_throwing_task_group, with_throwing_task_group_in,
    BoxFuture,
};
pub use crate::stream::{GroupStream, ThrowingGroupStream};
pub use crate::throwing::ThrowingTaskGroup;

// Re-exported so downstream code can build parent tokens for the `_in`
// wrappers without naming tokio-util directly.
pub use tokio_util::sync::CancellationToken;
