//! Core data model.
//!
//! A work item is an opaque typed record: an entity type naming its schema,
//! a store-assigned identity, and a property map fixed at creation. The queue
//! never mutates an item in place; it only creates (enqueue) and destroys
//! (release) them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Property map for a work item. Field name to JSON value, set at creation.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Newtype for store-assigned work item identities.
///
/// Identities are allocated in insertion order, which is also the order
/// consumers receive items in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(pub i64);

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work held by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Store-assigned unique key, stable for the record's lifetime.
    pub identity: Identity,

    /// What kind of item this is. Names an [`EntityDef`] known to the store.
    pub entity_type: String,

    /// Arbitrary payload for the consumer. The queue doesn't interpret these.
    pub properties: Properties,

    pub created_at: DateTime<Utc>,
}

/// Schema for an entity type: a name and the set of fields it defines.
///
/// The store exposes these for lookup; inserts are validated against them
/// so a bad property surfaces at enqueue time instead of at the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    pub fields: BTreeSet<String>,
}

impl EntityDef {
    pub fn new<N, F, S>(name: N, fields: F) -> Self
    where
        N: Into<String>,
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Check a property map against this schema. Fields may be omitted;
    /// fields the schema doesn't define are rejected.
    pub fn validate(&self, properties: &Properties) -> Result<()> {
        for field in properties.keys() {
            if !self.fields.contains(field) {
                return Err(Error::UnknownField {
                    entity_type: self.name.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}
