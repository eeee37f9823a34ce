//! Session-scoped approval cache.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tool_primitives::ToolArguments;

/// What a grant covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GrantScope {
    /// One exact argument set, identified by its hash.
    Call(String),
    /// Every call of the tool.
    Tool,
}

/// Key under which an approval is cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrantKey {
    tool: String,
    scope: GrantScope,
}

impl GrantKey {
    /// Key for one `(tool, arguments)` pair.
    ///
    /// Arguments are hashed in canonical form, so key order does not matter.
    #[must_use]
    pub fn for_call(tool: &str, arguments: &ToolArguments) -> Self {
        Self {
            tool: tool.to_owned(),
            scope: GrantScope::Call(hash_arguments(arguments)),
        }
    }

    /// Key covering every call of a tool.
    #[must_use]
    pub fn for_tool(tool: &str) -> Self {
        Self {
            tool: tool.to_owned(),
            scope: GrantScope::Tool,
        }
    }

    /// Tool name.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Scope of the key.
    #[must_use]
    pub fn scope(&self) -> &GrantScope {
        &self.scope
    }
}

impl fmt::Display for GrantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            GrantScope::Call(hash) => write!(f, "{}#{hash}", self.tool),
            GrantScope::Tool => write!(f, "{}#*", self.tool),
        }
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&fields[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn hash_arguments(arguments: &ToolArguments) -> String {
    let canonical = canonicalize(&Value::Object(arguments.clone())).to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().take(8).fold(String::with_capacity(16), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

/// A cached approval, as reported by [`GrantCache::grants`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    /// What the grant covers.
    pub key: GrantKey,
    /// Whether the cached answer was an approval.
    pub approved: bool,
}

/// Result of [`GrantCache::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Whether the call is approved.
    pub approved: bool,
    /// Whether the answer came from the cache rather than a fresh ask.
    pub cached: bool,
}

type Slot = Arc<tokio::sync::Mutex<Option<bool>>>;

/// Session grant cache with atomic check-then-ask per key.
///
/// Each key owns an async slot. While one caller is asking, concurrent callers
/// for the same key wait on the slot and then observe the stored answer
/// instead of asking again. Nothing is ever written to disk.
#[derive(Default)]
pub struct GrantCache {
    slots: Mutex<HashMap<GrantKey, Slot>>,
}

impl fmt::Debug for GrantCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantCache")
            .field("grants", &self.grants())
            .finish()
    }
}

impl GrantCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: GrantKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }

    /// Returns the cached answer for `key`, or runs `ask` to obtain one.
    ///
    /// `ask` yields `(approved, remember)`; the answer is stored only when
    /// `remember` is true.
    pub async fn resolve<F, Fut>(&self, key: GrantKey, ask: F) -> Resolution
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = (bool, bool)>,
    {
        let slot = self.slot(key.clone());
        let mut stored = slot.lock().await;
        if let Some(approved) = *stored {
            return Resolution {
                approved,
                cached: true,
            };
        }

        let (approved, remember) = ask().await;
        if remember {
            *stored = Some(approved);
        } else {
            drop(stored);
            self.release(&key, &slot);
        }
        Resolution {
            approved,
            cached: false,
        }
    }

    /// Removes an empty slot once no other caller is waiting on it.
    fn release(&self, key: &GrantKey, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let unused = slots.get(key).is_some_and(|current| {
            Arc::ptr_eq(current, slot)
                && Arc::strong_count(slot) == 2
                && current.try_lock().is_ok_and(|stored| stored.is_none())
        });
        if unused {
            slots.remove(key);
        }
    }

    /// Returns the stored answer without waiting on in-progress asks.
    #[must_use]
    pub fn lookup(&self, key: &GrantKey) -> Option<bool> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.get(key)?;
        slot.try_lock().ok().and_then(|stored| *stored)
    }

    /// Drops every grant for the named tool.
    pub fn revoke_tool(&self, tool: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|key, _| key.tool != tool);
    }

    /// Drops every grant.
    pub fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Lists settled grants, sorted by key.
    #[must_use]
    pub fn grants(&self) -> Vec<PermissionGrant> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut grants: Vec<PermissionGrant> = slots
            .iter()
            .filter_map(|(key, slot)| {
                let approved = (*slot.try_lock().ok()?)?;
                Some(PermissionGrant {
                    key: key.clone(),
                    approved,
                })
            })
            .collect();
        grants.sort_by(|a, b| a.key.cmp(&b.key));
        grants
    }
}
