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

//! The writer (C7): a depth-first traversal from a root instance that
//! emits the header, libraries, class metadata, object records,
//! references, and null runs, then `MessageEnd`.

use crate::error::{Error, Result};
use crate::graph::{BinaryArrayInstance, ClassInstance, DataStore, Instance, ObjectArrayInstance, ObjectId, PrimitiveArrayInstance, StringArrayInstance, Value};
use crate::library::{Library, Version};
use crate::primitives;
use crate::records::{BinaryType, RecordType};
use crate::schema::{ClassObject, ExtraInfo, Member};
use std::collections::HashMap;
use std::io::Write;

type SchemaKey = (String, Option<Version>, String);

/// Writes one message at a time against a borrowed [`DataStore`]. Object
/// IDs are assigned fresh during traversal rather than reused from the
/// arena's own keys (§8 property 1: round-trips are stable up to ID
/// renumbering and string-pool ordering, not byte-identical).
pub struct Encoder<'a, W: Write> {
    writer: W,
    store: &'a DataStore,
    next_id: i32,
    next_library_id: i32,
    emitted_instances: HashMap<i32, i32>,
    string_pool: HashMap<String, i32>,
    library_ids: HashMap<(String, Option<Version>), i32>,
    class_definition_ids: HashMap<SchemaKey, i32>,
}

impl<'a, W: Write> Encoder<'a, W> {
    pub fn new(writer: W, store: &'a DataStore) -> Self {
        Encoder {
            writer,
            store,
            next_id: 2,
            next_library_id: 1,
            emitted_instances: HashMap::new(),
            string_pool: HashMap::new(),
            library_ids: HashMap::new(),
            class_definition_ids: HashMap::new(),
        }
    }

    /// Writes a complete message rooted at `root_id`, an arena key into
    /// the encoder's store.
    pub fn encode(&mut self, root_id: i32) -> Result<()> {
        if !self.store.contains(root_id) {
            return Err(Error::MissingRoot(root_id));
        }
        self.write_header()?;
        self.emitted_instances.insert(root_id, 1);
        self.write_instance(root_id, 1)?;
        self.write_u8(RecordType::MessageEnd.as_u8())?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        self.write_u8(RecordType::SerializedStreamHeader.as_u8())?;
        self.write_i32(1)?;
        self.write_i32(-1)?;
        self.write_i32(1)?;
        self.write_i32(0)?;
        Ok(())
    }

    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.writer.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_all(&[value])?;
        Ok(())
    }

    fn write_length_prefixed_string(&mut self, s: &str) -> Result<()> {
        primitives::write_length_prefixed_string(&mut self.writer, s)
    }

    fn write_null_run(&mut self, n: u32) -> Result<()> {
        match n {
            0 => Ok(()),
            1 => self.write_u8(RecordType::ObjectNull.as_u8()),
            2..=255 => {
                self.write_u8(RecordType::ObjectNullMultiple256.as_u8())?;
                self.write_u8(n as u8)
            }
            _ => {
                self.write_u8(RecordType::ObjectNullMultiple.as_u8())?;
                self.write_i32(n as i32)
            }
        }
    }

    fn write_member_reference(&mut self, id: i32) -> Result<()> {
        self.write_u8(RecordType::MemberReference.as_u8())?;
        self.write_i32(id)
    }

    fn write_string_record(&mut self, id: i32, text: &str) -> Result<()> {
        self.write_u8(RecordType::BinaryObjectString.as_u8())?;
        self.write_i32(id)?;
        self.write_length_prefixed_string(text)
    }

    /// Writes one generic value slot (a class member whose `BinaryType` is
    /// not `Primitive`, or any array element): a null, a tagged primitive,
    /// or a reference/inline instance.
    fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.write_u8(RecordType::ObjectNull.as_u8()),
            Value::Primitive(p) => {
                self.write_u8(RecordType::MemberPrimitiveTyped.as_u8())?;
                self.write_u8(p.kind().as_u8())?;
                primitives::write_primitive(&mut self.writer, p)
            }
            Value::Object(ObjectId(id)) => self.write_object_ref(*id),
        }
    }

    /// Writes a run of values, collapsing consecutive nulls per §4.5's
    /// run-length policy.
    fn write_value_run(&mut self, values: &[Value]) -> Result<()> {
        let mut i = 0;
        while i < values.len() {
            if values[i] == Value::Null {
                let mut run = 1;
                while i + run < values.len() && values[i + run] == Value::Null {
                    run += 1;
                }
                self.write_null_run(run as u32)?;
                i += run;
            } else {
                self.write_value(&values[i])?;
                i += 1;
            }
        }
        Ok(())
    }

    fn write_object_ref(&mut self, arena_id: i32) -> Result<()> {
        if let Instance::String(text) = self
            .store
            .get(arena_id)
            .ok_or(Error::DanglingReference(arena_id))?
        {
            if let Some(&id) = self.string_pool.get(text) {
                return self.write_member_reference(id);
            }
            if let Some(&id) = self.emitted_instances.get(&arena_id) {
                return self.write_member_reference(id);
            }
            let id = self.next_id;
            self.next_id += 1;
            self.string_pool.insert(text.clone(), id);
            self.emitted_instances.insert(arena_id, id);
            let text = text.clone();
            return self.write_string_record(id, &text);
        }
        if let Some(&id) = self.emitted_instances.get(&arena_id) {
            return self.write_member_reference(id);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.emitted_instances.insert(arena_id, id);
        self.write_instance(arena_id, id)
    }

    fn write_instance(&mut self, arena_id: i32, assigned_id: i32) -> Result<()> {
        let instance = self.store.get(arena_id).ok_or(Error::DanglingReference(arena_id))?;
        match instance {
            Instance::String(text) => {
                let text = text.clone();
                self.string_pool.entry(text.clone()).or_insert(assigned_id);
                self.write_string_record(assigned_id, &text)
            }
            Instance::Class(ci) => self.write_class_instance(ci, assigned_id),
            Instance::PrimitiveArray(pa) => self.write_primitive_array(pa, assigned_id),
            Instance::ObjectArray(oa) => self.write_object_array(oa, assigned_id),
            Instance::StringArray(sa) => self.write_string_array(sa, assigned_id),
            Instance::BinaryArray(ba) => self.write_binary_array(ba, assigned_id),
        }
    }

    fn ensure_library_emitted(&mut self, library: &Library) -> Result<i32> {
        if library.is_system() {
            return Ok(crate::library::SYSTEM_LIBRARY_ID);
        }
        let key = library.identity();
        let key = (key.0.to_string(), key.1);
        if let Some(&id) = self.library_ids.get(&key) {
            return Ok(id);
        }
        let id = self.next_library_id;
        self.next_library_id += 1;
        self.library_ids.insert(key, id);
        self.write_u8(RecordType::BinaryLibrary.as_u8())?;
        self.write_i32(id)?;
        self.write_length_prefixed_string(&library.to_spec_string())?;
        Ok(id)
    }

    fn write_extra_info(&mut self, info: &ExtraInfo) -> Result<()> {
        match info {
            ExtraInfo::Primitive(pt) => self.write_u8(pt.as_u8()),
            ExtraInfo::PrimitiveArray(pt) => self.write_u8(pt.as_u8()),
            ExtraInfo::SystemClass(name) => self.write_length_prefixed_string(name),
            ExtraInfo::Class(c) => {
                self.write_length_prefixed_string(&c.class_name)?;
                self.write_i32(c.library_id)
            }
            ExtraInfo::None => Ok(()),
        }
    }

    fn write_class_info(&mut self, assigned_id: i32, class: &ClassObject) -> Result<()> {
        self.write_i32(assigned_id)?;
        self.write_length_prefixed_string(&class.name)?;
        self.write_i32(class.members.len() as i32)?;
        for member in &class.members {
            self.write_length_prefixed_string(&member.name)?;
        }
        Ok(())
    }

    fn write_member_type_info(&mut self, members: &[Member]) -> Result<()> {
        for member in members {
            self.write_u8(member.binary_type.as_u8())?;
        }
        for member in members {
            self.write_extra_info(&member.extra_info)?;
        }
        Ok(())
    }

    fn write_class_instance(&mut self, ci: &ClassInstance, assigned_id: i32) -> Result<()> {
        let library_id = self.ensure_library_emitted(&ci.class.library)?;
        let key = ci.class.key();

        if let Some(&def_id) = self.class_definition_ids.get(&key) {
            self.write_u8(RecordType::ClassWithId.as_u8())?;
            self.write_i32(assigned_id)?;
            self.write_i32(def_id)?;
        } else {
            self.class_definition_ids.insert(key, assigned_id);
            let is_system = ci.class.library.is_system();
            if ci.class.is_value_type() {
                if is_system {
                    self.write_u8(RecordType::SystemClassWithMembers.as_u8())?;
                    self.write_class_info(assigned_id, &ci.class)?;
                } else {
                    self.write_u8(RecordType::ClassWithMembers.as_u8())?;
                    self.write_class_info(assigned_id, &ci.class)?;
                    self.write_i32(library_id)?;
                }
            } else if is_system {
                self.write_u8(RecordType::SystemClassWithMembersAndTypes.as_u8())?;
                self.write_class_info(assigned_id, &ci.class)?;
                self.write_member_type_info(&ci.class.members)?;
            } else {
                self.write_u8(RecordType::ClassWithMembersAndTypes.as_u8())?;
                self.write_class_info(assigned_id, &ci.class)?;
                self.write_member_type_info(&ci.class.members)?;
                self.write_i32(library_id)?;
            }
        }

        self.write_class_body(&ci.class, &ci.members)
    }

    fn write_class_body(&mut self, class: &ClassObject, members: &[Value]) -> Result<()> {
        let mut i = 0;
        while i < members.len() {
            if members[i] == Value::Null {
                let mut run = 1;
                while i + run < members.len() && members[i + run] == Value::Null {
                    run += 1;
                }
                self.write_null_run(run as u32)?;
                i += run;
                continue;
            }
            if class.members[i].binary_type == BinaryType::Primitive {
                match &members[i] {
                    Value::Primitive(p) => primitives::write_primitive(&mut self.writer, p)?,
                    _ => {
                        return Err(Error::Custom(format!(
                            "member {:?} is declared Primitive but holds a non-primitive value",
                            class.members[i].name
                        )));
                    }
                }
            } else {
                self.write_value(&members[i])?;
            }
            i += 1;
        }
        Ok(())
    }

    fn write_primitive_array(&mut self, pa: &PrimitiveArrayInstance, assigned_id: i32) -> Result<()> {
        self.write_u8(RecordType::ArraySinglePrimitive.as_u8())?;
        self.write_i32(assigned_id)?;
        self.write_i32(pa.values.len() as i32)?;
        self.write_u8(pa.element_kind.as_u8())?;
        for value in &pa.values {
            primitives::write_primitive(&mut self.writer, value)?;
        }
        Ok(())
    }

    fn write_object_array(&mut self, oa: &ObjectArrayInstance, assigned_id: i32) -> Result<()> {
        self.write_u8(RecordType::ArraySingleObject.as_u8())?;
        self.write_i32(assigned_id)?;
        self.write_i32(oa.values.len() as i32)?;
        self.write_value_run(&oa.values)
    }

    fn write_string_array(&mut self, sa: &StringArrayInstance, assigned_id: i32) -> Result<()> {
        self.write_u8(RecordType::ArraySingleString.as_u8())?;
        self.write_i32(assigned_id)?;
        self.write_i32(sa.values.len() as i32)?;
        let mut i = 0;
        while i < sa.values.len() {
            if sa.values[i].is_none() {
                let mut run = 1;
                while i + run < sa.values.len() && sa.values[i + run].is_none() {
                    run += 1;
                }
                self.write_null_run(run as u32)?;
                i += run;
                continue;
            }
            let text = sa.values[i].clone().unwrap();
            if let Some(&id) = self.string_pool.get(&text) {
                self.write_member_reference(id)?;
            } else {
                let id = self.next_id;
                self.next_id += 1;
                self.string_pool.insert(text.clone(), id);
                self.write_string_record(id, &text)?;
            }
            i += 1;
        }
        Ok(())
    }

    fn write_binary_array(&mut self, ba: &BinaryArrayInstance, assigned_id: i32) -> Result<()> {
        self.write_u8(RecordType::BinaryArray.as_u8())?;
        self.write_i32(assigned_id)?;
        self.write_u8(ba.array_type.as_u8())?;
        self.write_i32(ba.rank as i32)?;
        for &len in &ba.lengths {
            self.write_i32(len)?;
        }
        if let Some(offsets) = &ba.offsets {
            for &off in offsets {
                self.write_i32(off)?;
            }
        }
        self.write_u8(ba.element_binary_type.as_u8())?;
        self.write_extra_info(&ba.extra_info)?;

        if ba.element_binary_type == BinaryType::Primitive {
            for value in &ba.values {
                match value {
                    Value::Primitive(p) => primitives::write_primitive(&mut self.writer, p)?,
                    _ => {
                        return Err(Error::Custom(
                            "BinaryArray declared Primitive elements but held a non-primitive value"
                                .into(),
                        ));
                    }
                }
            }
            Ok(())
        } else {
            self.write_value_run(&ba.values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::graph::{ClassInstance, DataStore, Instance};
    use crate::library::Library;
    use crate::records::{BinaryType, PrimitiveType};
    use crate::schema::{ClassObject, ExtraInfo, Member};

    #[test]
    fn round_trips_string_root_through_decoder() {
        let mut store = DataStore::new();
        store.insert(5, Instance::String("Hello World".into())).unwrap();

        let mut bytes = Vec::new();
        Encoder::new(&mut bytes, &store).encode(5).unwrap();

        let mut decoder = Decoder::new(bytes.as_slice());
        let root_id = decoder.decode().unwrap();
        assert_eq!(
            decoder.store().get(root_id).unwrap().as_string(),
            Some("Hello World")
        );
    }

    #[test]
    fn identical_strings_share_one_pool_entry() {
        let mut store = DataStore::new();
        let member = Member::new(0, "label".into(), BinaryType::String, ExtraInfo::None).unwrap();
        let class = ClassObject::new("Pair".into(), vec![member.clone(), member], false, Library::system());
        store.insert(10, Instance::String("shared".into())).unwrap();
        store.insert(11, Instance::String("shared".into())).unwrap();
        let class_rc = std::rc::Rc::new(class);
        store
            .insert(
                1,
                Instance::Class(ClassInstance {
                    class: class_rc,
                    members: vec![
                        Value::Object(ObjectId(10)),
                        Value::Object(ObjectId(11)),
                    ],
                }),
            )
            .unwrap();

        let mut bytes = Vec::new();
        Encoder::new(&mut bytes, &store).encode(1).unwrap();

        let string_record_count = bytes.iter().filter(|&&b| b == RecordType::BinaryObjectString.as_u8()).count();
        assert_eq!(string_record_count, 1);
    }

    #[test]
    fn primitive_array_round_trips() {
        let mut store = DataStore::new();
        store
            .insert(
                1,
                Instance::PrimitiveArray(PrimitiveArrayInstance {
                    element_kind: PrimitiveType::Int32,
                    values: vec![
                        crate::primitives::PrimitiveValue::Int32(1),
                        crate::primitives::PrimitiveValue::Int32(2),
                    ],
                }),
            )
            .unwrap();

        let mut bytes = Vec::new();
        Encoder::new(&mut bytes, &store).encode(1).unwrap();

        let mut decoder = Decoder::new(bytes.as_slice());
        let root_id = decoder.decode().unwrap();
        match decoder.store().get(root_id).unwrap() {
            Instance::PrimitiveArray(arr) => assert_eq!(arr.values.len(), 2),
            other => panic!("expected PrimitiveArray, got {other:?}"),
        }
    }

    #[test]
    fn missing_root_is_rejected() {
        let store = DataStore::new();
        let mut bytes = Vec::new();
        assert!(matches!(
            Encoder::new(&mut bytes, &store).encode(99),
            Err(Error::MissingRoot(99))
        ));
    }
}
