//! Ledger of polling tokens per UI environment.
//!
//! Hosts with several UI surfaces record every token a surface obtains, so
//! that when a surface closes without tearing its binders down the host can
//! still find and stop its sessions. [`LedgeredService`] keeps the ledger in
//! step with a wrapped service.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::rc::Rc;

use futures_util::FutureExt;
use tracing::{debug, trace};

use crate::protocol::PollingEnvironment;
use crate::service::{SessionService, StartFuture, StopFuture};

/// Tokens recorded per environment, in the order they were obtained.
#[derive(Debug)]
pub struct TokenLedger<T> {
	buckets: HashMap<PollingEnvironment, Vec<T>>,
}

impl<T> Default for TokenLedger<T> {
	fn default() -> Self {
		Self { buckets: HashMap::new() }
	}
}

impl<T: Clone + PartialEq + Debug> TokenLedger<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records `token` under `environment`. Background tokens are ignored.
	pub fn record(&mut self, token: T, environment: PollingEnvironment) -> bool {
		if !environment.is_tracked() {
			trace!(target = "pollbind.ledger", ?token, "ignoring background token");
			return false;
		}
		self.buckets.entry(environment).or_default().push(token);
		true
	}

	/// Forgets every copy of `token` under `environment`.
	pub fn release(&mut self, token: &T, environment: PollingEnvironment) -> bool {
		let Some(bucket) = self.buckets.get_mut(&environment) else {
			return false;
		};
		let before = bucket.len();
		bucket.retain(|held| held != token);
		before != bucket.len()
	}

	/// Tokens currently recorded under `environment`.
	pub fn tokens(&self, environment: PollingEnvironment) -> &[T] {
		self.buckets.get(&environment).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Removes and returns every token recorded under `environment`.
	pub fn drain(&mut self, environment: PollingEnvironment) -> Vec<T> {
		self.buckets.remove(&environment).unwrap_or_default()
	}

	/// Forgets all tokens in every environment.
	pub fn clear(&mut self) {
		self.buckets.clear();
	}

	/// Total number of recorded tokens.
	pub fn len(&self) -> usize {
		self.buckets.values().map(Vec::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Shared handle to a ledger.
pub type SharedLedger<T> = Rc<RefCell<TokenLedger<T>>>;

/// Session service that records obtained tokens in a [`TokenLedger`].
///
/// The token is recorded once `start` resolves and released once `stop`
/// settles, whether or not the inner `stop` succeeded.
pub struct LedgeredService<S: SessionService> {
	inner: Rc<S>,
	ledger: SharedLedger<S::Token>,
	environment: PollingEnvironment,
}

impl<S: SessionService> LedgeredService<S>
where
	S::Token: Clone + PartialEq,
{
	pub fn new(inner: Rc<S>, ledger: SharedLedger<S::Token>, environment: PollingEnvironment) -> Self {
		Self { inner, ledger, environment }
	}

	pub fn environment(&self) -> PollingEnvironment {
		self.environment
	}

	pub fn ledger(&self) -> &SharedLedger<S::Token> {
		&self.ledger
	}

	pub fn inner(&self) -> &Rc<S> {
		&self.inner
	}
}

impl<S: SessionService> SessionService for LedgeredService<S>
where
	S::Token: Clone + PartialEq,
{
	type Key = S::Key;
	type Token = S::Token;

	fn start(&self, key: &S::Key) -> StartFuture<S::Token> {
		let starting = self.inner.start(key);
		let ledger = Rc::clone(&self.ledger);
		let environment = self.environment;
		async move {
			let token = starting.await?;
			if ledger.borrow_mut().record(token.clone(), environment) {
				debug!(target = "pollbind.ledger", %environment, ?token, "token recorded");
			}
			Ok(token)
		}
		.boxed_local()
	}

	fn stop(&self, token: S::Token) -> StopFuture {
		let stopping = self.inner.stop(token.clone());
		let ledger = Rc::clone(&self.ledger);
		let environment = self.environment;
		async move {
			let result = stopping.await;
			if ledger.borrow_mut().release(&token, environment) {
				debug!(target = "pollbind.ledger", %environment, ?token, "token released");
			}
			result
		}
		.boxed_local()
	}
}
