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

//! The record dispatcher (C6): reads the header, then loops over records,
//! building graph nodes and registering them in a [`DataStore`] until
//! `MessageEnd`, at which point the fix-up pass (C8) runs.

use crate::error::{Error, Result};
use crate::fixup;
use crate::graph::{
    BinaryArrayInstance, ClassInstance, DataStore, Instance, ObjectArrayInstance, ObjectId,
    PrimitiveArrayInstance, StringArrayInstance, Value,
};
use crate::library::SYSTEM_LIBRARY_ID;
use crate::primitives;
use crate::records::{BinaryArrayType, BinaryType, PrimitiveType, RecordType};
use crate::schema::{ClassObject, ClassTypeInfo, ExtraInfo, Member};
use std::io::Read;
use std::rc::Rc;

/// The four little-endian fields that open every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializationHeader {
    pub root_id: i32,
    pub header_id: i32,
    pub major_version: i32,
    pub minor_version: i32,
}

/// Construction options for a [`Decoder`] (§4.10, §6 "Construction
/// options").
#[derive(Debug, Clone, Copy)]
pub struct DecoderOptions {
    /// Relax strict checks: negative lengths become zero, header version is
    /// not enforced, dangling references are tolerated.
    pub permissive: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions { permissive: false }
    }
}

/// Outcome of reading a single record, shared between the top-level
/// message loop and nested element/member reads.
enum Step {
    /// An identity-bearing instance was constructed and registered; the
    /// stream-local object ID it now lives under.
    Instance(i32),
    /// An `ObjectNullMultiple*`/`ObjectNull` run; the caller expands it.
    NullRun(u32),
    /// A `MemberReference` or `MemberPrimitiveTyped`: a value that does not
    /// itself bear an identity.
    Reference(Value),
    /// A `BinaryLibrary` record was consumed and registered.
    Library,
    End,
}

/// A value or pending null run read from an instance body or array element
/// stream (§4.4 "Null run-length tokens").
enum BodyToken {
    Value(Value),
    NullRun(u32),
}

/// Reads MS-NRBF records from `R`, materializing an object graph into a
/// [`DataStore`].
pub struct Decoder<R: Read> {
    reader: R,
    store: DataStore,
    options: DecoderOptions,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Decoder {
            reader,
            store: DataStore::new(),
            options: DecoderOptions::default(),
        }
    }

    pub fn with_options(reader: R, options: DecoderOptions) -> Self {
        Decoder {
            reader,
            store: DataStore::new(),
            options,
        }
    }

    /// Decodes against a caller-supplied store, e.g. one pre-populated
    /// with known metadata for partial classes (§6 "Injected known
    /// metadata"), or reused across several messages.
    pub fn with_store(reader: R, store: DataStore, options: DecoderOptions) -> Self {
        Decoder {
            reader,
            store,
            options,
        }
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn into_store(self) -> DataStore {
        self.store
    }

    /// Reads one message and returns the stream-local ID of its root
    /// instance. Look the root up via `decoder.store().get(root_id)`.
    pub fn decode(&mut self) -> Result<i32> {
        self.store.clear_instances();
        let header = self.read_header()?;
        loop {
            let rt = self.read_record_tag()?;
            if let Step::End = self.read_one(rt)? {
                break;
            }
        }
        fixup::resolve(&mut self.store, self.options.permissive)?;
        fixup::resolve_root(&self.store, header.root_id)?;
        Ok(header.root_id)
    }

    fn read_header(&mut self) -> Result<SerializationHeader> {
        let rt = self.read_record_tag()?;
        if rt != RecordType::SerializedStreamHeader {
            return Err(Error::MissingHeader);
        }
        let root_id = self.read_i32()?;
        let header_id = self.read_i32()?;
        let major_version = self.read_i32()?;
        let minor_version = self.read_i32()?;
        if !self.options.permissive && (major_version != 1 || minor_version != 0) {
            return Err(Error::InvalidHeader {
                major: major_version,
                minor: minor_version,
            });
        }
        Ok(SerializationHeader {
            root_id,
            header_id,
            major_version,
            minor_version,
        })
    }

    fn read_record_tag(&mut self) -> Result<RecordType> {
        let byte = self.read_u8().map_err(|e| match e {
            Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::TruncatedRecord("stream ended before MessageEnd".into())
            }
            other => other,
        })?;
        RecordType::try_from(byte)
    }

    fn read_one(&mut self, rt: RecordType) -> Result<Step> {
        match rt {
            RecordType::SerializedStreamHeader => {
                Err(Error::Custom("unexpected second stream header".into()))
            }
            RecordType::BinaryLibrary => {
                self.read_binary_library_record()?;
                Ok(Step::Library)
            }
            RecordType::ClassWithMembersAndTypes => {
                Ok(Step::Instance(self.read_class_with_members_and_types(true)?))
            }
            RecordType::SystemClassWithMembersAndTypes => Ok(Step::Instance(
                self.read_class_with_members_and_types(false)?,
            )),
            RecordType::ClassWithMembers => Ok(Step::Instance(self.read_class_with_members(true)?)),
            RecordType::SystemClassWithMembers => {
                Ok(Step::Instance(self.read_class_with_members(false)?))
            }
            RecordType::ClassWithId => Ok(Step::Instance(self.read_class_with_id()?)),
            RecordType::BinaryObjectString => Ok(Step::Instance(self.read_binary_object_string()?)),
            RecordType::BinaryArray => Ok(Step::Instance(self.read_binary_array()?)),
            RecordType::ArraySinglePrimitive => {
                Ok(Step::Instance(self.read_array_single_primitive()?))
            }
            RecordType::ArraySingleObject => Ok(Step::Instance(self.read_array_single_object()?)),
            RecordType::ArraySingleString => Ok(Step::Instance(self.read_array_single_string()?)),
            RecordType::MemberPrimitiveTyped => {
                let pt = PrimitiveType::try_from(self.read_u8()?)?;
                let prim = primitives::read_primitive(&mut self.reader, pt)?;
                Ok(Step::Reference(Value::Primitive(prim)))
            }
            RecordType::MemberReference => {
                let id = self.read_i32()?;
                if id == 0 {
                    Ok(Step::Reference(Value::Null))
                } else {
                    self.store.note_reference(id);
                    Ok(Step::Reference(Value::Object(ObjectId(id))))
                }
            }
            RecordType::ObjectNull => Ok(Step::NullRun(1)),
            RecordType::ObjectNullMultiple256 => Ok(Step::NullRun(self.read_u8()? as u32)),
            RecordType::ObjectNullMultiple => {
                let raw = self.read_i32()?;
                Ok(Step::NullRun(self.clamp_length(raw, "ObjectNullMultiple count")?))
            }
            RecordType::MessageEnd => Ok(Step::End),
            RecordType::MethodCall => Err(Error::Unimplemented("MethodCall")),
            RecordType::MethodReturn => Err(Error::Unimplemented("MethodReturn")),
        }
    }

    /// Reads one tagged record in a position where a value (not a
    /// top-level record) is expected, e.g. a class member or array
    /// element whose `BinaryType` is not `Primitive`.
    fn read_tagged_value(&mut self) -> Result<BodyToken> {
        let rt = self.read_record_tag()?;
        match self.read_one(rt)? {
            Step::Instance(id) => Ok(BodyToken::Value(Value::Object(ObjectId(id)))),
            Step::NullRun(n) => Ok(BodyToken::NullRun(n)),
            Step::Reference(v) => Ok(BodyToken::Value(v)),
            Step::Library => Err(Error::Unimplemented("BinaryLibrary is not valid here")),
            Step::End => Err(Error::TruncatedRecord("unexpected MessageEnd".into())),
        }
    }

    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.reader.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn clamp_length(&self, raw: i32, context: &'static str) -> Result<u32> {
        if raw < 0 {
            if self.options.permissive {
                log::warn!("permissive mode: negative {context} ({raw}), treating as zero");
                Ok(0)
            } else {
                Err(Error::NegativeLength { context, value: raw })
            }
        } else {
            Ok(raw as u32)
        }
    }

    fn read_binary_library_record(&mut self) -> Result<()> {
        let stream_id = self.read_i32()?;
        let spec = primitives::read_length_prefixed_string(&mut self.reader)?;
        self.store.libraries.register(stream_id, &spec)
    }

    fn read_extra_info(&mut self, bt: BinaryType) -> Result<ExtraInfo> {
        Ok(match bt {
            BinaryType::Primitive => {
                ExtraInfo::Primitive(PrimitiveType::try_from(self.read_u8()?)?)
            }
            BinaryType::PrimitiveArray => {
                ExtraInfo::PrimitiveArray(PrimitiveType::try_from(self.read_u8()?)?)
            }
            BinaryType::SystemClass => {
                ExtraInfo::SystemClass(primitives::read_length_prefixed_string(&mut self.reader)?)
            }
            BinaryType::Class => ExtraInfo::Class(ClassTypeInfo {
                class_name: primitives::read_length_prefixed_string(&mut self.reader)?,
                library_id: self.read_i32()?,
            }),
            _ => ExtraInfo::None,
        })
    }

    fn read_class_with_members_and_types(&mut self, has_library: bool) -> Result<i32> {
        let object_id = self.read_i32()?;
        let name = primitives::read_length_prefixed_string(&mut self.reader)?;
        let raw_member_count = self.read_i32()?;
        let member_count = self.clamp_length(raw_member_count, "class member count")? as usize;

        let mut member_names = Vec::with_capacity(member_count);
        for _ in 0..member_count {
            member_names.push(primitives::read_length_prefixed_string(&mut self.reader)?);
        }
        let mut binary_types = Vec::with_capacity(member_count);
        for _ in 0..member_count {
            binary_types.push(BinaryType::try_from(self.read_u8()?)?);
        }
        let mut extra_infos = Vec::with_capacity(member_count);
        for &bt in &binary_types {
            extra_infos.push(self.read_extra_info(bt)?);
        }
        let library_id = if has_library {
            self.read_i32()?
        } else {
            SYSTEM_LIBRARY_ID
        };
        let library = self.library_by_id(library_id)?;

        let members = member_names
            .into_iter()
            .zip(binary_types)
            .zip(extra_infos)
            .enumerate()
            .map(|(i, ((member_name, bt), extra))| Member::new(i, member_name, bt, extra))
            .collect::<Result<Vec<_>>>()?;

        let class = ClassObject::new(name, members, false, library);
        let class_rc = self.store.classes.insert(object_id, class)?;
        let member_values = self.read_instance_body(&class_rc)?;
        self.store.insert(
            object_id,
            Instance::Class(ClassInstance {
                class: class_rc,
                members: member_values,
            }),
        )?;
        Ok(object_id)
    }

    fn read_class_with_members(&mut self, has_library: bool) -> Result<i32> {
        let object_id = self.read_i32()?;
        let name = primitives::read_length_prefixed_string(&mut self.reader)?;
        let raw_member_count = self.read_i32()?;
        let member_count = self.clamp_length(raw_member_count, "class member count")? as usize;
        let mut member_names = Vec::with_capacity(member_count);
        for _ in 0..member_count {
            member_names.push(primitives::read_length_prefixed_string(&mut self.reader)?);
        }
        let library_id = if has_library {
            self.read_i32()?
        } else {
            SYSTEM_LIBRARY_ID
        };
        let library = self.library_by_id(library_id)?;

        let known = self
            .store
            .classes
            .lookup_known_metadata(&library.name, &name)
            .cloned()
            .ok_or_else(|| Error::MissingSchema {
                library: library.name.clone(),
                name: name.clone(),
            })?;
        if known.len() != member_names.len() {
            return Err(Error::MissingSchema {
                library: library.name.clone(),
                name: name.clone(),
            });
        }
        let members = member_names
            .into_iter()
            .zip(known)
            .enumerate()
            .map(|(i, (member_name, (bt, extra)))| Member::new(i, member_name, bt, extra))
            .collect::<Result<Vec<_>>>()?;

        let class = ClassObject::new(name, members, true, library);
        let class_rc = self.store.classes.insert(object_id, class)?;
        let member_values = self.read_instance_body(&class_rc)?;
        self.store.insert(
            object_id,
            Instance::Class(ClassInstance {
                class: class_rc,
                members: member_values,
            }),
        )?;
        Ok(object_id)
    }

    fn read_class_with_id(&mut self) -> Result<i32> {
        let object_id = self.read_i32()?;
        let metadata_id = self.read_i32()?;
        let class_rc = self.store.classes.by_definition_id(metadata_id)?;
        let member_values = self.read_instance_body(&class_rc)?;
        self.store.insert(
            object_id,
            Instance::Class(ClassInstance {
                class: Rc::clone(&class_rc),
                members: member_values,
            }),
        )?;
        Ok(object_id)
    }

    fn library_by_id(&self, library_id: i32) -> Result<crate::library::Library> {
        self.store
            .libraries
            .get(library_id)
            .cloned()
            .ok_or_else(|| Error::InvalidLibrarySpec(format!("unregistered library id {library_id}")))
    }

    /// Reads a class instance's member values in order, expanding
    /// null-multiple runs across member boundaries (§4.4 "Instance body").
    fn read_instance_body(&mut self, class: &Rc<ClassObject>) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(class.members.len());
        let mut null_run: u32 = 0;
        for member in &class.members {
            if null_run > 0 {
                values.push(Value::Null);
                null_run -= 1;
                continue;
            }
            match member.binary_type {
                BinaryType::Primitive => {
                    let pt = match &member.extra_info {
                        ExtraInfo::Primitive(pt) => *pt,
                        _ => unreachable!("Member::new validated this pairing"),
                    };
                    let prim = primitives::read_primitive(&mut self.reader, pt)?;
                    values.push(Value::Primitive(prim));
                }
                _ => match self.read_tagged_value()? {
                    BodyToken::Value(v) => values.push(v),
                    BodyToken::NullRun(n) => {
                        if n > 0 {
                            values.push(Value::Null);
                            null_run = n - 1;
                        }
                    }
                },
            }
        }
        Ok(values)
    }

    fn read_binary_object_string(&mut self) -> Result<i32> {
        let object_id = self.read_i32()?;
        let text = primitives::read_length_prefixed_string(&mut self.reader)?;
        self.store.insert(object_id, Instance::String(text))?;
        Ok(object_id)
    }

    fn read_array_single_primitive(&mut self) -> Result<i32> {
        let object_id = self.read_i32()?;
        let raw_length = self.read_i32()?;
        let length = self.clamp_length(raw_length, "ArraySinglePrimitive length")?;
        let pt = PrimitiveType::try_from(self.read_u8()?)?;
        let mut values = Vec::with_capacity(length as usize);
        for _ in 0..length {
            values.push(primitives::read_primitive(&mut self.reader, pt)?);
        }
        self.store.insert(
            object_id,
            Instance::PrimitiveArray(PrimitiveArrayInstance {
                element_kind: pt,
                values,
            }),
        )?;
        Ok(object_id)
    }

    fn read_array_single_object(&mut self) -> Result<i32> {
        let object_id = self.read_i32()?;
        let raw_length = self.read_i32()?;
        let length = self.clamp_length(raw_length, "ArraySingleObject length")?;
        let mut values = Vec::with_capacity(length as usize);
        let mut remaining = length;
        while remaining > 0 {
            match self.read_tagged_value()? {
                BodyToken::Value(v) => {
                    values.push(v);
                    remaining -= 1;
                }
                BodyToken::NullRun(n) => {
                    let n = n.min(remaining);
                    for _ in 0..n {
                        values.push(Value::Null);
                    }
                    remaining -= n;
                }
            }
        }
        self.store
            .insert(object_id, Instance::ObjectArray(ObjectArrayInstance { values }))?;
        Ok(object_id)
    }

    /// `ArraySingleString` elements must each be a string, a null (single
    /// or run), or a reference that already resolves to a string (§4.4,
    /// the most permissive of the source's several revisions per §9).
    fn read_array_single_string(&mut self) -> Result<i32> {
        let object_id = self.read_i32()?;
        let raw_length = self.read_i32()?;
        let length = self.clamp_length(raw_length, "ArraySingleString length")?;
        let mut values: Vec<Option<String>> = Vec::with_capacity(length as usize);
        let mut remaining = length;
        while remaining > 0 {
            let rt = self.read_record_tag()?;
            match rt {
                RecordType::BinaryObjectString => {
                    let id = self.read_binary_object_string()?;
                    let text = self.store.get(id).and_then(Instance::as_string).map(str::to_string);
                    values.push(text);
                    remaining -= 1;
                }
                RecordType::ObjectNull => {
                    values.push(None);
                    remaining -= 1;
                }
                RecordType::ObjectNullMultiple256 => {
                    let n = (self.read_u8()? as u32).min(remaining);
                    for _ in 0..n {
                        values.push(None);
                    }
                    remaining -= n;
                }
                RecordType::ObjectNullMultiple => {
                    let raw = self.read_i32()?;
                    let n = self.clamp_length(raw, "ObjectNullMultiple count")?.min(remaining);
                    for _ in 0..n {
                        values.push(None);
                    }
                    remaining -= n;
                }
                RecordType::MemberReference => {
                    let id = self.read_i32()?;
                    let text = if id == 0 {
                        None
                    } else {
                        self.store.note_reference(id);
                        let resolved = self.store.get(id).and_then(Instance::as_string).map(str::to_string);
                        if resolved.is_none() && !self.options.permissive {
                            return Err(Error::InvalidPrimitive {
                                kind: "String",
                                detail: format!(
                                    "MemberReference {id} in ArraySingleString did not already resolve to a string"
                                ),
                            });
                        }
                        resolved
                    };
                    values.push(text);
                    remaining -= 1;
                }
                other => {
                    return Err(Error::InvalidRecord(other.as_u8()));
                }
            }
        }
        self.store
            .insert(object_id, Instance::StringArray(StringArrayInstance { values }))?;
        Ok(object_id)
    }

    fn read_binary_array(&mut self) -> Result<i32> {
        let object_id = self.read_i32()?;
        let array_type = BinaryArrayType::try_from(self.read_u8()?)?;
        let rank_raw = self.read_i32()?;
        if rank_raw <= 0 {
            return Err(Error::TruncatedRecord("BinaryArray rank must be positive".into()));
        }
        let rank = rank_raw as usize;

        let mut lengths = Vec::with_capacity(rank);
        for _ in 0..rank {
            lengths.push(self.read_i32()?);
        }
        let offsets = if array_type.has_offsets() {
            let mut v = Vec::with_capacity(rank);
            for _ in 0..rank {
                v.push(self.read_i32()?);
            }
            Some(v)
        } else {
            None
        };
        let element_binary_type = BinaryType::try_from(self.read_u8()?)?;
        let extra_info = self.read_extra_info(element_binary_type)?;

        let mut total: i64 = 1;
        for &len in &lengths {
            let len = if len < 0 {
                self.clamp_length(len, "BinaryArray length")? as i64
            } else {
                len as i64
            };
            total = total
                .checked_mul(len)
                .filter(|&v| v <= i32::MAX as i64)
                .ok_or(Error::ArraySizeOverflow)?;
        }
        let total = total as u32;

        let values = if element_binary_type == BinaryType::Primitive {
            let pt = match &extra_info {
                ExtraInfo::Primitive(pt) => *pt,
                _ => unreachable!("read_extra_info paired Primitive with ExtraInfo::Primitive"),
            };
            let mut vals = Vec::with_capacity(total as usize);
            for _ in 0..total {
                vals.push(Value::Primitive(primitives::read_primitive(&mut self.reader, pt)?));
            }
            vals
        } else {
            let mut vals = Vec::with_capacity(total as usize);
            let mut remaining = total;
            while remaining > 0 {
                match self.read_tagged_value()? {
                    BodyToken::Value(v) => {
                        if let Value::Object(ObjectId(id)) = v {
                            if let Some(Instance::Class(class_instance)) = self.store.get(id) {
                                class_instance.class.promote_to_value_type();
                            }
                        }
                        vals.push(v);
                        remaining -= 1;
                    }
                    BodyToken::NullRun(n) => {
                        let n = n.min(remaining);
                        for _ in 0..n {
                            vals.push(Value::Null);
                        }
                        remaining -= n;
                    }
                }
            }
            vals
        };

        self.store.insert(
            object_id,
            Instance::BinaryArray(BinaryArrayInstance {
                rank,
                array_type,
                lengths,
                offsets,
                element_binary_type,
                extra_info,
                values,
            }),
        )?;
        Ok(object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{encode_multi_byte_int, PrimitiveValue};

    fn header_bytes(root_id: i32) -> Vec<u8> {
        let mut bytes = vec![RecordType::SerializedStreamHeader.as_u8()];
        bytes.extend_from_slice(&root_id.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes
    }

    fn string_record(object_id: i32, text: &str) -> Vec<u8> {
        let mut bytes = vec![RecordType::BinaryObjectString.as_u8()];
        bytes.extend_from_slice(&object_id.to_le_bytes());
        bytes.extend(encode_multi_byte_int(text.len() as u32));
        bytes.extend_from_slice(text.as_bytes());
        bytes
    }

    #[test]
    fn decodes_string_root() {
        let mut bytes = header_bytes(1);
        bytes.extend(string_record(1, "Hello World"));
        bytes.push(RecordType::MessageEnd.as_u8());

        let mut decoder = Decoder::new(bytes.as_slice());
        let root_id = decoder.decode().unwrap();
        assert_eq!(root_id, 1);
        assert_eq!(
            decoder.store().get(1).unwrap().as_string(),
            Some("Hello World")
        );
    }

    #[test]
    fn missing_root_is_rejected() {
        let mut bytes = header_bytes(1);
        bytes.push(RecordType::MessageEnd.as_u8());
        let mut decoder = Decoder::new(bytes.as_slice());
        assert!(matches!(decoder.decode(), Err(Error::MissingRoot(1))));
    }

    #[test]
    fn non_header_first_record_is_rejected() {
        let bytes = vec![RecordType::ClassWithId.as_u8(), 0, 0, 0, 0, 0, 0, 0, 0];
        let mut decoder = Decoder::new(bytes.as_slice());
        assert!(matches!(decoder.decode(), Err(Error::MissingHeader)));
    }

    #[test]
    fn bad_version_is_rejected_in_strict_mode() {
        let mut bytes = vec![RecordType::SerializedStreamHeader.as_u8()];
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        let mut decoder = Decoder::new(bytes.as_slice());
        assert!(matches!(
            decoder.decode(),
            Err(Error::InvalidHeader { major: 2, minor: 0 })
        ));
    }

    #[test]
    fn bad_version_is_accepted_in_permissive_mode() {
        let mut bytes = vec![RecordType::SerializedStreamHeader.as_u8()];
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend(string_record(1, "hi"));
        bytes.push(RecordType::MessageEnd.as_u8());
        let mut decoder = Decoder::with_options(
            bytes.as_slice(),
            DecoderOptions { permissive: true },
        );
        assert!(decoder.decode().is_ok());
    }

    #[test]
    fn array_single_primitive_reads_declared_count_and_type() {
        let mut bytes = header_bytes(1);
        bytes.push(RecordType::ArraySinglePrimitive.as_u8());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&3i32.to_le_bytes());
        bytes.push(PrimitiveType::Int32.as_u8());
        for n in [10i32, 20, 30] {
            bytes.extend_from_slice(&n.to_le_bytes());
        }
        bytes.push(RecordType::MessageEnd.as_u8());

        let mut decoder = Decoder::new(bytes.as_slice());
        let root_id = decoder.decode().unwrap();
        match decoder.store().get(root_id).unwrap() {
            Instance::PrimitiveArray(arr) => {
                assert_eq!(arr.element_kind, PrimitiveType::Int32);
                assert_eq!(
                    arr.values,
                    vec![
                        PrimitiveValue::Int32(10),
                        PrimitiveValue::Int32(20),
                        PrimitiveValue::Int32(30)
                    ]
                );
            }
            other => panic!("expected PrimitiveArray, got {other:?}"),
        }
    }

    #[test]
    fn object_null_multiple_expands_to_exact_null_count() {
        let mut bytes = header_bytes(1);
        bytes.push(RecordType::ArraySingleObject.as_u8());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&4i32.to_le_bytes());
        bytes.push(RecordType::ObjectNullMultiple256.as_u8());
        bytes.push(3u8);
        bytes.extend(string_record(2, "x"));
        bytes.push(RecordType::MessageEnd.as_u8());

        let mut decoder = Decoder::new(bytes.as_slice());
        let root_id = decoder.decode().unwrap();
        match decoder.store().get(root_id).unwrap() {
            Instance::ObjectArray(arr) => {
                assert_eq!(arr.values.len(), 4);
                assert_eq!(arr.values[0], Value::Null);
                assert_eq!(arr.values[1], Value::Null);
                assert_eq!(arr.values[2], Value::Null);
                assert_eq!(arr.values[3], Value::Object(ObjectId(2)));
            }
            other => panic!("expected ObjectArray, got {other:?}"),
        }
    }

    #[test]
    fn dangling_reference_is_rejected_in_strict_mode() {
        let mut bytes = header_bytes(1);
        bytes.push(RecordType::ArraySingleObject.as_u8());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.push(RecordType::MemberReference.as_u8());
        bytes.extend_from_slice(&999i32.to_le_bytes());
        bytes.push(RecordType::MessageEnd.as_u8());

        let mut decoder = Decoder::new(bytes.as_slice());
        assert!(matches!(
            decoder.decode(),
            Err(Error::DanglingReference(999))
        ));
    }
}
