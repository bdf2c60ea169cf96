//! Canonical identities for session keys.
//!
//! Keys are compared by value. A key is serialized to a [`serde_json::Value`]
//! first, so map-shaped keys get sorted object keys, and the compact JSON text
//! of that value becomes its [`KeyFingerprint`]. Two keys with the same
//! fingerprint are the same key as far as a binder is concerned.
//!
//! Going through `serde_json::Value` is lossy in two places, and keys that
//! differ only there collide:
//!
//! - NaN and infinite floats serialize as `null`, so `f64::NAN`,
//!   `f64::INFINITY` and `()` share a fingerprint.
//! - Integer and bool map keys become JSON strings, so a map `{1: x}` and a
//!   map `{"1": x}` share a fingerprint.
//!
//! Map keys that are neither strings nor scalars fail to canonicalize.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use serde::Serialize;

use crate::error::{Error, Result};

/// Canonical, hashable identity of a session key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyFingerprint(Arc<str>);

impl KeyFingerprint {
	/// Canonicalizes `key`.
	pub fn of<K>(key: &K) -> Result<Self>
	where
		K: Serialize + fmt::Debug + ?Sized,
	{
		let canonical = serde_json::to_value(key)
			.and_then(|value| serde_json::to_string(&value))
			.map_err(|source| Error::KeySerialization {
				key: format!("{key:?}"),
				source,
			})?;
		Ok(Self(Arc::from(canonical)))
	}

	/// The canonical text.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for KeyFingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "KeyFingerprint({})", self.0)
	}
}

impl fmt::Display for KeyFingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Canonicalizes a key collection, dropping later duplicates.
///
/// Order of first appearance is preserved. Fails without partial output if
/// any key cannot be canonicalized.
pub fn canonicalize<K, I>(keys: I) -> Result<Vec<(KeyFingerprint, K)>>
where
	K: Serialize + fmt::Debug,
	I: IntoIterator<Item = K>,
{
	let mut seen = IndexSet::new();
	let mut out = Vec::new();
	for key in keys {
		let fingerprint = KeyFingerprint::of(&key)?;
		if seen.insert(fingerprint.clone()) {
			out.push((fingerprint, key));
		}
	}
	Ok(out)
}
