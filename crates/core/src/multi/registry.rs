//! Per-binder session registry.

use indexmap::IndexMap;

use crate::key::KeyFingerprint;

/// State of one key in the registry.
#[derive(Debug)]
pub(crate) enum Entry<T> {
	/// `start` was issued and has not resolved.
	Pending {
		/// Generation captured by the start continuation.
		generation: u64,
		/// Set when the key stopped being desired: the token is stopped on arrival.
		retiring: bool,
	},
	/// Session is open.
	Active(T),
}

/// What to do with a resolved start.
#[derive(Debug)]
pub(crate) enum Resolution<T> {
	/// Token was stored.
	Stored,
	/// Token must be stopped right away.
	Stale(T),
}

/// Mapping from canonical key to its entry, in first-desired order.
#[derive(Debug)]
pub(crate) struct Registry<T> {
	entries: IndexMap<KeyFingerprint, Entry<T>>,
	next_generation: u64,
}

impl<T> Default for Registry<T> {
	fn default() -> Self {
		Self {
			entries: IndexMap::new(),
			next_generation: 1,
		}
	}
}

impl<T> Registry<T> {
	pub(crate) fn get_mut(&mut self, key: &KeyFingerprint) -> Option<&mut Entry<T>> {
		self.entries.get_mut(key)
	}

	/// Inserts a fresh pending entry and returns its generation.
	pub(crate) fn begin(&mut self, key: KeyFingerprint) -> u64 {
		let generation = self.next_generation;
		self.next_generation += 1;
		let previous = self.entries.insert(
			key,
			Entry::Pending {
				generation,
				retiring: false,
			},
		);
		debug_assert!(previous.is_none(), "registry already held an entry for this key");
		generation
	}

	/// Retires every entry whose key fails `keep`.
	///
	/// Active entries are removed and their tokens returned for stopping.
	/// Pending entries stay in place with the retiring marker set. Returns the
	/// tokens plus the number of newly marked pending entries.
	pub(crate) fn retire_unless(&mut self, mut keep: impl FnMut(&KeyFingerprint) -> bool) -> (Vec<(KeyFingerprint, T)>, usize) {
		let mut marked = 0;
		let mut stopping = Vec::new();
		for (key, entry) in self.entries.iter_mut() {
			if keep(key) {
				continue;
			}
			if let Entry::Pending { retiring, .. } = entry {
				if !*retiring {
					*retiring = true;
					marked += 1;
				}
			}
		}

		let leaving: Vec<KeyFingerprint> = self
			.entries
			.iter()
			.filter(|(key, entry)| matches!(entry, Entry::Active(_)) && !keep(key))
			.map(|(key, _)| key.clone())
			.collect();
		for key in leaving {
			if let Some(Entry::Active(token)) = self.entries.shift_remove(&key) {
				stopping.push((key, token));
			}
		}
		(stopping, marked)
	}

	/// Applies a successful start for `key` at `generation`.
	pub(crate) fn resolve(&mut self, key: &KeyFingerprint, generation: u64, token: T) -> Resolution<T> {
		match self.pending_state(key, generation) {
			Some(false) => {
				self.entries.insert(key.clone(), Entry::Active(token));
				Resolution::Stored
			}
			Some(true) => {
				self.entries.shift_remove(key);
				Resolution::Stale(token)
			}
			None => Resolution::Stale(token),
		}
	}

	/// Drops the pending entry for a rejected start. Returns false if the
	/// entry had already moved on.
	pub(crate) fn reject(&mut self, key: &KeyFingerprint, generation: u64) -> bool {
		if self.pending_state(key, generation).is_none() {
			return false;
		}
		self.entries.shift_remove(key);
		true
	}

	/// Retiring marker of the pending entry for `key`, if it is still the one
	/// issued at `generation`.
	fn pending_state(&self, key: &KeyFingerprint, generation: u64) -> Option<bool> {
		match self.entries.get(key) {
			Some(Entry::Pending { generation: current, retiring }) if *current == generation => Some(*retiring),
			_ => None,
		}
	}

	pub(crate) fn active_keys(&self) -> impl Iterator<Item = &KeyFingerprint> {
		self.entries.iter().filter(|(_, entry)| matches!(entry, Entry::Active(_))).map(|(key, _)| key)
	}

	pub(crate) fn is_active(&self, key: &KeyFingerprint) -> bool {
		matches!(self.entries.get(key), Some(Entry::Active(_)))
	}

	pub(crate) fn pending_count(&self) -> usize {
		self.entries.values().filter(|entry| matches!(entry, Entry::Pending { .. })).count()
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}
}
