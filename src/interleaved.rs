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

//! A JSON interchange/debug projection of the object graph (C10), for
//! snapshot-style tests and ad-hoc inspection. Not used by the wire codec
//! itself — `Instance`/`Value` are the source of truth.

use crate::graph::{DataStore, Instance, ObjectId, Value};
use crate::primitives::{DateTimeKind, PrimitiveValue};
use serde_json::{json, Map, Value as Json};
use std::collections::HashSet;

/// Renders the instance at `root_id`, and everything it transitively
/// references, as a JSON tree. An object ID already on the path back to the
/// root is rendered as `{"$ref": id}` instead of re-expanded, so cyclic
/// graphs terminate.
pub fn store_to_json(store: &DataStore, root_id: i32) -> Json {
    let mut visiting = HashSet::new();
    value_to_json(store, &Value::Object(ObjectId(root_id)), &mut visiting)
}

fn value_to_json(store: &DataStore, value: &Value, visiting: &mut HashSet<i32>) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Primitive(p) => primitive_to_json(p),
        Value::Object(ObjectId(id)) => instance_to_json(store, *id, visiting),
    }
}

fn instance_to_json(store: &DataStore, id: i32, visiting: &mut HashSet<i32>) -> Json {
    if visiting.contains(&id) {
        return json!({ "$ref": id });
    }
    let Some(instance) = store.get(id) else {
        return json!({ "$dangling": id });
    };
    visiting.insert(id);
    let rendered = match instance {
        Instance::String(s) => json!({ "$id": id, "$type": "String", "value": s }),
        Instance::Class(ci) => {
            let mut map = Map::new();
            map.insert("$id".to_string(), json!(id));
            map.insert("$type".to_string(), json!(ci.class.name));
            for (member, value) in ci.class.members.iter().zip(ci.members.iter()) {
                map.insert(member.name.clone(), value_to_json(store, value, visiting));
            }
            Json::Object(map)
        }
        Instance::PrimitiveArray(arr) => json!({
            "$id": id,
            "$type": "PrimitiveArray",
            "element_kind": format!("{:?}", arr.element_kind),
            "values": arr.values.iter().map(primitive_to_json).collect::<Vec<_>>(),
        }),
        Instance::ObjectArray(arr) => json!({
            "$id": id,
            "$type": "ObjectArray",
            "values": arr.values.iter().map(|v| value_to_json(store, v, visiting)).collect::<Vec<_>>(),
        }),
        Instance::StringArray(arr) => json!({
            "$id": id,
            "$type": "StringArray",
            "values": arr.values,
        }),
        Instance::BinaryArray(arr) => json!({
            "$id": id,
            "$type": "BinaryArray",
            "rank": arr.rank,
            "lengths": arr.lengths,
            "offsets": arr.offsets,
            "values": arr.values.iter().map(|v| value_to_json(store, v, visiting)).collect::<Vec<_>>(),
        }),
    };
    visiting.remove(&id);
    rendered
}

fn primitive_to_json(value: &PrimitiveValue) -> Json {
    match value {
        PrimitiveValue::Boolean(b) => json!(b),
        PrimitiveValue::Byte(b) => json!(b),
        PrimitiveValue::SByte(b) => json!(b),
        PrimitiveValue::Char(c) => json!(c.to_string()),
        PrimitiveValue::Int16(v) => json!(v),
        PrimitiveValue::UInt16(v) => json!(v),
        PrimitiveValue::Int32(v) => json!(v),
        PrimitiveValue::UInt32(v) => json!(v),
        PrimitiveValue::Int64(v) => json!(v),
        PrimitiveValue::UInt64(v) => json!(v),
        PrimitiveValue::Single(v) => json!(v),
        PrimitiveValue::Double(v) => json!(v),
        PrimitiveValue::TimeSpan(v) => json!(v),
        PrimitiveValue::DateTime(dt) => json!({
            "ticks": dt.ticks,
            "kind": match dt.kind {
                DateTimeKind::Unspecified => "Unspecified",
                DateTimeKind::Utc => "Utc",
                DateTimeKind::Local => "Local",
            },
        }),
        PrimitiveValue::Decimal(d) => json!(d.as_str()),
        PrimitiveValue::String(s) => json!(s),
        PrimitiveValue::Null => Json::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ClassInstance;
    use crate::library::Library;
    use crate::records::BinaryType;
    use crate::schema::{ClassObject, ExtraInfo, Member};
    use std::rc::Rc;

    #[test]
    fn string_root_projects_to_a_tagged_object() {
        let mut store = DataStore::new();
        store.insert(1, Instance::String("hi".into())).unwrap();
        let json = store_to_json(&store, 1);
        assert_eq!(json["$type"], "String");
        assert_eq!(json["value"], "hi");
    }

    #[test]
    fn self_referential_class_terminates_with_a_ref_marker() {
        let mut store = DataStore::new();
        let member = Member::new(0, "self".into(), BinaryType::Object, ExtraInfo::None).unwrap();
        let class = Rc::new(ClassObject::new("Node".into(), vec![member], false, Library::system()));
        store
            .insert(
                1,
                Instance::Class(ClassInstance {
                    class,
                    members: vec![Value::Object(ObjectId(1))],
                }),
            )
            .unwrap();

        let json = store_to_json(&store, 1);
        assert_eq!(json["self"]["$ref"], 1);
    }
}
