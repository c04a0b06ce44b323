// nrbf-graph - A .NET Remoting Binary Format (NRBF) object-graph codec.
// Copyright (C) 2026  driedpampas@proton.me
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Object graph node types (C5) and the data store that holds them.
//!
//! Every composite value — a class instance, an array, a string — is
//! addressed uniformly by its stream-local [`ObjectId`] rather than by
//! embedding resolved copies. A reference and an inline instance are the
//! same representation: an `ObjectId` pointing into the arena. This lets
//! cyclic graphs resolve with a plain index lookup instead of a
//! clone-and-patch pass.

use crate::error::{Error, Result};
use crate::library::LibraryRegistry;
use crate::primitives::PrimitiveValue;
use crate::records::{BinaryArrayType, BinaryType, PrimitiveType};
use crate::schema::{ClassObject, ClassRegistry, ExtraInfo};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A stream-local object identity. Zero never appears here; it is the
/// wire's null sentinel and is represented as [`Value::Null`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub i32);

/// A slot in a class's member list or an array's element list: a
/// primitive, an explicit null, or a handle to a composite instance
/// (inline or by reference — the representation does not distinguish).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Primitive(PrimitiveValue),
    Null,
    Object(ObjectId),
}

/// Serialize-only: `class` is skipped (the interchange projection in
/// `interleaved.rs` renders the schema's name/members inline instead), and
/// `ClassObject` has no `Default` impl for `#[serde(skip)]` to fall back on
/// during deserialization.
#[derive(Debug, Clone, Serialize)]
pub struct ClassInstance {
    #[serde(skip)]
    pub class: Rc<ClassObject>,
    pub members: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveArrayInstance {
    pub element_kind: PrimitiveType,
    pub values: Vec<PrimitiveValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectArrayInstance {
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringArrayInstance {
    pub values: Vec<Option<String>>,
}

/// A multi-dimensional array per §4.4's `BinaryArray` record. `offsets` is
/// carried but not used to shift indices (§9 open question): both the raw
/// offsets and the logical `lengths` are exposed, and the consumer decides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryArrayInstance {
    pub rank: usize,
    pub array_type: BinaryArrayType,
    pub lengths: Vec<i32>,
    pub offsets: Option<Vec<i32>>,
    pub element_binary_type: BinaryType,
    pub extra_info: ExtraInfo,
    pub values: Vec<Value>,
}

/// Any object that bears a stream-local identity: a class instance, one of
/// the four array shapes, or a bare string. Serialize-only: see
/// `ClassInstance`.
#[derive(Debug, Clone, Serialize)]
pub enum Instance {
    Class(ClassInstance),
    PrimitiveArray(PrimitiveArrayInstance),
    ObjectArray(ObjectArrayInstance),
    StringArray(StringArrayInstance),
    BinaryArray(BinaryArrayInstance),
    String(String),
}

impl Instance {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Instance::String(s) => Some(s),
            _ => None,
        }
    }
}

/// The object-identity table (C5 arena) plus the library and class
/// registries it was populated alongside. One `DataStore` covers exactly
/// one message; `reset()` discards all of it (§3 Lifecycle).
#[derive(Debug, Default)]
pub struct DataStore {
    instances: HashMap<i32, Instance>,
    pub libraries: LibraryRegistry,
    pub classes: ClassRegistry,
    referenced_ids: Vec<i32>,
}

impl DataStore {
    pub fn new() -> Self {
        DataStore {
            instances: HashMap::new(),
            libraries: LibraryRegistry::new(),
            classes: ClassRegistry::new(),
            referenced_ids: Vec::new(),
        }
    }

    /// Registers a newly constructed instance under its stream-local ID.
    /// Errors if the ID is already present (invariant 2, §3).
    pub fn insert(&mut self, id: i32, instance: Instance) -> Result<()> {
        if self.instances.contains_key(&id) {
            return Err(Error::DuplicateObjectId(id));
        }
        self.instances.insert(id, instance);
        Ok(())
    }

    pub fn get(&self, id: i32) -> Option<&Instance> {
        self.instances.get(&id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.instances.contains_key(&id)
    }

    /// Records that `id` was referenced via `MemberReference`, for the
    /// end-of-message fix-up validation pass (C8).
    pub fn note_reference(&mut self, id: i32) {
        if id != 0 {
            self.referenced_ids.push(id);
        }
    }

    pub fn pending_references(&self) -> &[i32] {
        &self.referenced_ids
    }

    pub fn clear_pending_references(&mut self) {
        self.referenced_ids.clear();
    }

    /// Clears only the instance table and pending references, leaving the
    /// library and class registries intact. Used at the start of each
    /// message when a caller explicitly reuses one store across several
    /// reads (§5: registry mutation across messages is append-only).
    pub fn clear_instances(&mut self) {
        self.instances.clear();
        self.referenced_ids.clear();
    }

    /// Discards all accumulated state, including the library and class
    /// registries (§6 `reset()`).
    pub fn reset(&mut self) {
        self.instances.clear();
        self.libraries.reset();
        self.classes.reset();
        self.referenced_ids.clear();
    }
}

thread_local! {
    static DEFAULT_STORE: RefCell<DataStore> = RefCell::new(DataStore::new());
}

/// Runs `f` against the process-wide default store (§5, §9: "a target
/// language should prefer an explicit store... with the global available
/// only as an opt-in convenience").
pub fn with_default_store<T>(f: impl FnOnce(&mut DataStore) -> T) -> T {
    DEFAULT_STORE.with(|store| f(&mut store.borrow_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_duplicate_id() {
        let mut store = DataStore::new();
        store.insert(1, Instance::String("a".into())).unwrap();
        let err = store.insert(1, Instance::String("b".into()));
        assert!(matches!(err, Err(Error::DuplicateObjectId(1))));
    }

    #[test]
    fn zero_is_never_noted_as_a_pending_reference() {
        let mut store = DataStore::new();
        store.note_reference(0);
        store.note_reference(5);
        assert_eq!(store.pending_references(), &[5]);
    }

    #[test]
    fn reset_clears_instances_and_pending_references() {
        let mut store = DataStore::new();
        store.insert(1, Instance::String("a".into())).unwrap();
        store.note_reference(1);
        store.reset();
        assert!(store.get(1).is_none());
        assert!(store.pending_references().is_empty());
    }

    #[test]
    fn default_store_is_shared_across_calls_on_the_same_thread() {
        with_default_store(|store| {
            store.insert(42, Instance::String("shared".into())).unwrap();
        });
        with_default_store(|store| {
            assert_eq!(store.get(42).unwrap().as_string(), Some("shared"));
            store.reset();
        });
    }
}
