//! Tracking of the local tasks a binder spawns.
//!
//! Every continuation and every `stop` a binder fires runs as a
//! [`tokio::task::spawn_local`] task. [`TaskSet`] counts them so owners can
//! wait for a binder to go quiet. [`TaskSet::idle`] registers its waiter
//! before checking the count to avoid lost wakeups.

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;

use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
	outstanding: Cell<usize>,
	idle: Notify,
}

/// How a binder drives the future returned by a `stop` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
	/// Spawned on the current `LocalSet` and tracked by a [`TaskSet`].
	Spawn,
	/// Polled once in place. Binders use this while being dropped, when no
	/// `LocalSet` may be running.
	Inline,
}

/// Counter of in-flight local tasks with an idle notification.
#[derive(Clone, Default)]
pub(crate) struct TaskSet {
	inner: Rc<Inner>,
}

/// Decrements the count when a task finishes or is dropped unfinished.
struct Finish(Rc<Inner>);

impl Drop for Finish {
	fn drop(&mut self) {
		let left = self.0.outstanding.get().saturating_sub(1);
		self.0.outstanding.set(left);
		if left == 0 {
			self.0.idle.notify_waiters();
		}
	}
}

impl TaskSet {
	/// Spawns `fut` on the current `LocalSet`.
	///
	/// # Panics
	///
	/// Panics when called outside a `LocalSet`, like `spawn_local` itself.
	pub(crate) fn spawn<F>(&self, fut: F)
	where
		F: Future<Output = ()> + 'static,
	{
		self.inner.outstanding.set(self.inner.outstanding.get() + 1);
		let finish = Finish(Rc::clone(&self.inner));
		tokio::task::spawn_local(async move {
			let _finish = finish;
			fut.await;
		});
	}

	/// Resolves once no tracked task is outstanding.
	pub(crate) async fn idle(&self) {
		loop {
			let notified = self.inner.idle.notified();
			if self.inner.outstanding.get() == 0 {
				return;
			}
			notified.await;
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use tokio::task::LocalSet;

	use super::*;

	#[tokio::test(flavor = "current_thread")]
	async fn idle_waits_for_nested_spawns() {
		LocalSet::new()
			.run_until(async {
				let tasks = TaskSet::default();
				let log = Rc::new(Cell::new(0));

				let nested = tasks.clone();
				let outer_log = Rc::clone(&log);
				tasks.spawn(async move {
					tokio::time::sleep(Duration::from_millis(5)).await;
					outer_log.set(outer_log.get() + 1);
					let inner_log = Rc::clone(&outer_log);
					nested.spawn(async move {
						tokio::time::sleep(Duration::from_millis(5)).await;
						inner_log.set(inner_log.get() + 1);
					});
				});

				tasks.idle().await;
				assert_eq!(log.get(), 2);
			})
			.await;
	}

	#[tokio::test(flavor = "current_thread")]
	async fn idle_returns_immediately_without_tasks() {
		let tasks = TaskSet::default();
		tasks.idle().await;
	}
}
