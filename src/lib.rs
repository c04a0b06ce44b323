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

//! A .NET Remoting Binary Format (NRBF) object-graph codec.
//!
//! Reads and writes MS-NRBF streams into an arena-addressed object graph
//! ([`graph::DataStore`]) rather than a flat record list: every composite
//! value is a [`graph::Value::Object`] pointing at a stream-local
//! [`graph::ObjectId`], so references and inline instances share one
//! representation.

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod fixup;
pub mod graph;
pub mod interleaved;
pub mod library;
pub mod primitives;
pub mod records;
pub mod schema;

pub use decoder::{Decoder, DecoderOptions};
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use graph::{DataStore, Instance, ObjectId, Value};

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Reads one NRBF message from `reader` into a freshly created store.
/// Returns the root instance's stream-local ID; look it up via
/// `store.get(root_id)`.
pub fn read<R: Read>(reader: R) -> Result<(i32, DataStore)> {
    read_with_options(reader, DecoderOptions::default())
}

/// As [`read`], with explicit [`DecoderOptions`] (e.g. permissive mode).
pub fn read_with_options<R: Read>(reader: R, options: DecoderOptions) -> Result<(i32, DataStore)> {
    let mut decoder = Decoder::with_options(reader, options);
    let root_id = decoder.decode()?;
    Ok((root_id, decoder.into_store()))
}

/// Opens `path` and reads one NRBF message from it.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<(i32, DataStore)> {
    let file = File::open(path)?;
    read(BufReader::new(file))
}

/// Writes the instance at `root_id` in `store`, and everything it
/// transitively references, as one NRBF message.
pub fn write<W: Write>(writer: W, store: &DataStore, root_id: i32) -> Result<()> {
    Encoder::new(writer, store).encode(root_id)
}

/// Creates (or truncates) `path` and writes one NRBF message to it.
pub fn write_file<P: AsRef<Path>>(path: P, store: &DataStore, root_id: i32) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write(&mut writer, store, root_id)?;
    writer.flush()?;
    Ok(())
}

/// Discards all instances in the process-wide default store (§6 `reset()`).
/// Only meaningful alongside [`graph::with_default_store`]; callers holding
/// their own `DataStore` just drop it.
pub fn reset() {
    graph::with_default_store(|store| store.reset());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_a_string_root() {
        let mut store = DataStore::new();
        store.insert(1, Instance::String("round trip".into())).unwrap();

        let mut bytes = Vec::new();
        write(&mut bytes, &store, 1).unwrap();

        let (root_id, decoded_store) = read(bytes.as_slice()).unwrap();
        assert_eq!(decoded_store.get(root_id).unwrap().as_string(), Some("round trip"));
    }
}
