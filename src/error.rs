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

use std::io;
use thiserror::Error;

/// Result type used throughout the codec.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid UTF-8 in length-prefixed string")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid record discriminant: 0x{0:02x}")]
    InvalidRecord(u8),

    #[error("invalid binary type: {0}")]
    InvalidBinaryType(u8),

    #[error("invalid primitive type: {0}")]
    InvalidPrimitiveType(u8),

    #[error("invalid binary array type: {0}")]
    InvalidBinaryArrayType(u8),

    #[error("truncated record payload: {0}")]
    TruncatedRecord(String),

    #[error("malformed variable-length integer")]
    MalformedVarInt,

    #[error("negative length in {context}: {value}")]
    NegativeLength { context: &'static str, value: i32 },

    #[error("header version {major}.{minor} is not supported in strict mode")]
    InvalidHeader { major: i32, minor: i32 },

    #[error("first record was not a SerializedStreamHeader")]
    MissingHeader,

    #[error("binary type {binary_type:?} is incompatible with its extra info")]
    InvalidExtraInfo {
        binary_type: crate::records::BinaryType,
    },

    #[error("class {library}/{name} was redefined with a conflicting schema")]
    SchemaConflict { library: String, name: String },

    #[error("partial class {library}/{name} has no pre-registered metadata")]
    MissingSchema { library: String, name: String },

    #[error("metadata object id {0} does not refer to a known class definition")]
    UnknownClassDefinition(i32),

    #[error("object id {0} was registered more than once")]
    DuplicateObjectId(i32),

    #[error("reference to unregistered object id {0}")]
    DanglingReference(i32),

    #[error("primitive value out of range for {kind}: {detail}")]
    InvalidPrimitive { kind: &'static str, detail: String },

    #[error("record type {0} is recognized but not implemented")]
    Unimplemented(&'static str),

    #[error("invalid library specification string: {0}")]
    InvalidLibrarySpec(String),

    #[error("unknown library option {0:?}")]
    UnknownLibraryOption(String),

    #[error("root object id {0} was never registered")]
    MissingRoot(i32),

    #[error("array length product overflowed")]
    ArraySizeOverflow,

    #[error("{0}")]
    Custom(String),
}
