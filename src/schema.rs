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

//! Class/member schema (C4): `ClassObject`, `Member`, and the per-message
//! class registry that reconciles repeated and partial class records.

use crate::error::{Error, Result};
use crate::library::Library;
use crate::records::{BinaryType, PrimitiveType};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

/// `(class_name, library_id)`, the extra-info payload for a `Class`-typed
/// member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTypeInfo {
    pub class_name: String,
    pub library_id: i32,
}

/// The extra-info that accompanies a member's `BinaryType`, per the pairing
/// table in §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtraInfo {
    Primitive(PrimitiveType),
    PrimitiveArray(PrimitiveType),
    SystemClass(String),
    Class(ClassTypeInfo),
    None,
}

/// Validates that `extra_info` is the shape required for `binary_type`.
pub fn validate_extra_info(binary_type: BinaryType, extra_info: &ExtraInfo) -> Result<()> {
    let ok = matches!(
        (binary_type, extra_info),
        (BinaryType::Primitive, ExtraInfo::Primitive(_))
            | (BinaryType::PrimitiveArray, ExtraInfo::PrimitiveArray(_))
            | (BinaryType::SystemClass, ExtraInfo::SystemClass(_))
            | (BinaryType::Class, ExtraInfo::Class(_))
            | (BinaryType::String, ExtraInfo::None)
            | (BinaryType::Object, ExtraInfo::None)
            | (BinaryType::ObjectArray, ExtraInfo::None)
            | (BinaryType::StringArray, ExtraInfo::None)
    );
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidExtraInfo { binary_type })
    }
}

/// One named, typed slot in a class's member list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub index: usize,
    pub name: String,
    pub binary_type: BinaryType,
    pub extra_info: ExtraInfo,
}

impl Member {
    pub fn new(
        index: usize,
        name: String,
        binary_type: BinaryType,
        extra_info: ExtraInfo,
    ) -> Result<Self> {
        validate_extra_info(binary_type, &extra_info)?;
        Ok(Member {
            index,
            name,
            binary_type,
            extra_info,
        })
    }
}

/// A class schema: name, ordered members, whether it arrived as a partial
/// (type-erased) record, and whether instances are embedded by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassObject {
    pub name: String,
    pub members: Vec<Member>,
    pub partial: bool,
    pub library: Library,
    #[serde(skip)]
    value_type: Cell<bool>,
}

impl ClassObject {
    pub fn new(name: String, members: Vec<Member>, partial: bool, library: Library) -> Self {
        ClassObject {
            name,
            members,
            partial,
            library,
            value_type: Cell::new(false),
        }
    }

    pub fn is_value_type(&self) -> bool {
        self.value_type.get()
    }

    /// Marks this class as embedded-by-value, as happens when a
    /// `ClassInstance` of this schema is encountered inline in an array
    /// (§4.4, `BinaryArray`).
    pub fn promote_to_value_type(&self) {
        self.value_type.set(true);
    }

    pub fn key(&self) -> (String, Option<crate::library::Version>, String) {
        let (name, version) = self.library.identity();
        (name.to_string(), version, self.name.clone())
    }

    /// Schema equality per §4.3: matching library, name, and ordered member
    /// list (each `(name, binary_type, extra_info)` tuple), ignoring the
    /// mutable `value_type` flag.
    fn schema_eq(&self, other: &ClassObject) -> bool {
        self.library == other.library
            && self.name == other.name
            && self.members.len() == other.members.len()
            && self.members.iter().zip(other.members.iter()).all(|(a, b)| {
                a.name == b.name && a.binary_type == b.binary_type && a.extra_info == b.extra_info
            })
    }
}

/// Holds `ClassObject`s for the duration of one message, keyed by
/// `(library, name)` and, for back-reference resolution (`ClassWithId`),
/// by the stream object ID of the instance that first defined them.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    by_key: HashMap<(String, Option<crate::library::Version>, String), Rc<ClassObject>>,
    by_def_id: HashMap<i32, Rc<ClassObject>>,
    known_metadata: HashMap<(String, String), Vec<(BinaryType, ExtraInfo)>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        ClassRegistry::default()
    }

    /// Pre-registers member type info for a `(library_name, class_name)`
    /// pair so a later partial class record can be decoded (§6,
    /// "Injected known metadata").
    pub fn register_known_metadata(
        &mut self,
        library_name: &str,
        class_name: &str,
        members: Vec<(BinaryType, ExtraInfo)>,
    ) {
        self.known_metadata
            .insert((library_name.to_string(), class_name.to_string()), members);
    }

    pub fn lookup_known_metadata(
        &self,
        library_name: &str,
        class_name: &str,
    ) -> Option<&Vec<(BinaryType, ExtraInfo)>> {
        self.known_metadata
            .get(&(library_name.to_string(), class_name.to_string()))
    }

    /// Inserts or reconciles a freshly-constructed schema. Returns the
    /// canonical `Rc<ClassObject>` to use, which is the pre-existing one
    /// when the new schema is equal to it.
    pub fn insert(&mut self, def_id: i32, class: ClassObject) -> Result<Rc<ClassObject>> {
        let key = class.key();
        let canonical = if let Some(existing) = self.by_key.get(&key) {
            if !existing.schema_eq(&class) {
                return Err(Error::SchemaConflict {
                    library: class.library.name.clone(),
                    name: class.name.clone(),
                });
            }
            Rc::clone(existing)
        } else {
            let rc = Rc::new(class);
            self.by_key.insert(key, Rc::clone(&rc));
            rc
        };
        self.by_def_id.insert(def_id, Rc::clone(&canonical));
        Ok(canonical)
    }

    pub fn by_definition_id(&self, def_id: i32) -> Result<Rc<ClassObject>> {
        self.by_def_id
            .get(&def_id)
            .cloned()
            .ok_or(Error::UnknownClassDefinition(def_id))
    }

    pub fn reset(&mut self) {
        *self = ClassRegistry::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Library;

    fn member(index: usize, name: &str) -> Member {
        Member::new(
            index,
            name.to_string(),
            BinaryType::Primitive,
            ExtraInfo::Primitive(PrimitiveType::Int32),
        )
        .unwrap()
    }

    #[test]
    fn member_rejects_mismatched_extra_info() {
        let err = Member::new(
            0,
            "x".to_string(),
            BinaryType::Class,
            ExtraInfo::Primitive(PrimitiveType::Int32),
        );
        assert!(err.is_err());
    }

    #[test]
    fn registry_accepts_identical_redefinition() {
        let mut registry = ClassRegistry::new();
        let lib = Library::system();
        let class_a = ClassObject::new("Widget".into(), vec![member(0, "count")], false, lib.clone());
        let class_b = ClassObject::new("Widget".into(), vec![member(0, "count")], false, lib);
        registry.insert(1, class_a).unwrap();
        assert!(registry.insert(2, class_b).is_ok());
    }

    #[test]
    fn registry_rejects_conflicting_redefinition() {
        let mut registry = ClassRegistry::new();
        let lib = Library::system();
        let class_a = ClassObject::new("Widget".into(), vec![member(0, "count")], false, lib.clone());
        let class_b = ClassObject::new("Widget".into(), vec![member(0, "label")], false, lib);
        registry.insert(1, class_a).unwrap();
        assert!(registry.insert(2, class_b).is_err());
    }

    #[test]
    fn class_with_id_resolves_by_definition_id() {
        let mut registry = ClassRegistry::new();
        let lib = Library::system();
        let class = ClassObject::new("Widget".into(), vec![member(0, "count")], false, lib);
        let canonical = registry.insert(5, class).unwrap();
        let looked_up = registry.by_definition_id(5).unwrap();
        assert!(Rc::ptr_eq(&canonical, &looked_up));
    }

    #[test]
    fn unknown_definition_id_is_an_error() {
        let registry = ClassRegistry::new();
        assert!(registry.by_definition_id(99).is_err());
    }

    #[test]
    fn promote_to_value_type_is_visible_through_shared_rc() {
        let class = ClassObject::new("Widget".into(), vec![], false, Library::system());
        let rc = Rc::new(class);
        let alias = Rc::clone(&rc);
        alias.promote_to_value_type();
        assert!(rc.is_value_type());
    }
}
