//! The collaborator boundary: something that can start and stop sessions.

use std::fmt::Debug;

use futures_util::future::LocalBoxFuture;
use serde::Serialize;

use crate::error::ServiceError;

/// Future returned by [`SessionService::start`].
pub type StartFuture<T> = LocalBoxFuture<'static, Result<T, ServiceError>>;

/// Future returned by [`SessionService::stop`].
pub type StopFuture = LocalBoxFuture<'static, Result<(), ServiceError>>;

/// A backend that keeps things fresh while a session for them is open.
///
/// Both methods are ordinary calls made during a synchronization pass; only
/// their completion is asynchronous. The returned futures are driven on the
/// caller's `LocalSet` and must not borrow from `self`.
pub trait SessionService: 'static {
	/// What a session is opened for.
	type Key: Serialize + Debug + 'static;
	/// Handle identifying one open session.
	type Token: Debug + 'static;

	/// Opens a session for `key`.
	fn start(&self, key: &Self::Key) -> StartFuture<Self::Token>;

	/// Closes the session identified by `token`.
	///
	/// Must accept any token `start` produced, including ones whose session
	/// already ended on the backend.
	fn stop(&self, token: Self::Token) -> StopFuture;
}
