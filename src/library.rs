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

//! Library specification parsing and the per-message library registry (C3).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A four-component assembly version, each component a non-negative 16-bit
/// integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl Version {
    fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 4 {
            return Err(Error::InvalidLibrarySpec(format!(
                "version {s:?} does not have four dot-separated components"
            )));
        }
        let mut nums = [0u16; 4];
        for (i, part) in parts.iter().enumerate() {
            nums[i] = part.parse::<u16>().map_err(|_| {
                Error::InvalidLibrarySpec(format!("version component {part:?} is not u16"))
            })?;
        }
        Ok(Version {
            major: nums[0],
            minor: nums[1],
            build: nums[2],
            revision: nums[3],
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Whether a `PublicKeyToken` option was present, explicitly `null`, or a
/// 16-digit hex token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublicKeyToken {
    Null,
    Token([u8; 8]),
}

impl PublicKeyToken {
    fn parse(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("null") {
            return Ok(PublicKeyToken::Null);
        }
        let bytes = hex::decode(s)
            .map_err(|_| Error::InvalidLibrarySpec(format!("bad PublicKeyToken hex {s:?}")))?;
        let arr: [u8; 8] = bytes.try_into().map_err(|_| {
            Error::InvalidLibrarySpec("PublicKeyToken must be 16 hex digits".into())
        })?;
        Ok(PublicKeyToken::Token(arr))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Retargetable {
    Yes,
    No,
}

/// The parsed `Culture`, `PublicKeyToken`, and `Retargetable` options that
/// may trail a library's name/version in its specification string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryOptions {
    pub version: Option<Version>,
    pub culture: Option<String>,
    pub public_key_token: Option<PublicKeyToken>,
    pub retargetable: Option<Retargetable>,
}

fn valid_culture(token: &str) -> bool {
    !token.is_empty()
        && token
            .split('-')
            .all(|part| !part.is_empty() && part.len() <= 8 && part.chars().all(|c| c.is_ascii_alphabetic()))
}

/// A canonical library/assembly identity: a name plus its optional options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    pub options: LibraryOptions,
}

/// The sentinel ID reserved for the canonical `System` (mscorlib) library.
pub const SYSTEM_LIBRARY_ID: i32 = -1;

impl Library {
    pub fn system() -> Self {
        Library {
            name: "System".to_string(),
            options: LibraryOptions::default(),
        }
    }

    /// Parses a library specification string, e.g.
    /// `MyAssembly, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null`.
    /// Tolerant of whitespace around commas and `=`. Unknown option keys are
    /// rejected.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.split(',').map(str::trim);
        let name = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidLibrarySpec("empty library name".into()))?
            .to_string();

        let mut options = LibraryOptions::default();
        for part in parts {
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::InvalidLibrarySpec(format!("malformed option {part:?}")))?;
            let key = key.trim();
            let value = value.trim();
            match key {
                "Version" => options.version = Some(Version::parse(value)?),
                "Culture" => {
                    if !(value.eq_ignore_ascii_case("neutral") || valid_culture(value)) {
                        return Err(Error::InvalidLibrarySpec(format!(
                            "invalid Culture token {value:?}"
                        )));
                    }
                    options.culture = Some(value.to_string());
                }
                "PublicKeyToken" => options.public_key_token = Some(PublicKeyToken::parse(value)?),
                "Retargetable" => {
                    options.retargetable = Some(match value {
                        "Yes" => Retargetable::Yes,
                        "No" => Retargetable::No,
                        other => {
                            return Err(Error::InvalidLibrarySpec(format!(
                                "Retargetable must be Yes or No, got {other:?}"
                            )));
                        }
                    });
                }
                other => return Err(Error::UnknownLibraryOption(other.to_string())),
            }
        }
        Ok(Library { name, options })
    }

    /// Identity key for hashing/equality: `(name, version)`.
    pub fn identity(&self) -> (&str, Option<Version>) {
        (&self.name, self.options.version)
    }

    pub fn is_system(&self) -> bool {
        self.name == "System" && self.options == LibraryOptions::default()
    }

    /// Renders the canonical specification string a `BinaryLibrary` record
    /// carries, the inverse of [`Library::parse`].
    pub fn to_spec_string(&self) -> String {
        let mut out = self.name.clone();
        if let Some(version) = self.options.version {
            out.push_str(&format!(", Version={version}"));
        }
        if let Some(culture) = &self.options.culture {
            out.push_str(&format!(", Culture={culture}"));
        }
        if let Some(token) = &self.options.public_key_token {
            let rendered = match token {
                PublicKeyToken::Null => "null".to_string(),
                PublicKeyToken::Token(bytes) => hex::encode(bytes),
            };
            out.push_str(&format!(", PublicKeyToken={rendered}"));
        }
        if let Some(retargetable) = self.options.retargetable {
            let rendered = match retargetable {
                Retargetable::Yes => "Yes",
                Retargetable::No => "No",
            };
            out.push_str(&format!(", Retargetable={rendered}"));
        }
        out
    }
}

/// Maps stream-local library IDs to canonical `Library` identities for the
/// duration of one message.
#[derive(Debug, Default)]
pub struct LibraryRegistry {
    by_id: HashMap<i32, Library>,
    canonical: HashMap<(String, Option<Version>), i32>,
    next_id: i32,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        let mut registry = LibraryRegistry {
            by_id: HashMap::new(),
            canonical: HashMap::new(),
            next_id: 1,
        };
        registry.by_id.insert(SYSTEM_LIBRARY_ID, Library::system());
        registry
            .canonical
            .insert(Library::system().identity_owned(), SYSTEM_LIBRARY_ID);
        registry
    }

    /// Registers a library spec read from a `BinaryLibrary` record at
    /// `stream_id`. Identical specifications already known under a
    /// different stream ID are folded onto the same canonical `Library`
    /// value rather than duplicated.
    pub fn register(&mut self, stream_id: i32, spec: &str) -> Result<()> {
        let library = Library::parse(spec)?;
        log::debug!("registered library {stream_id} -> {}", library.name);
        if let Some(existing_id) = self.canonical.get(&library.identity_owned()) {
            log::debug!(
                "library spec {:?} already known under id {existing_id}; sharing identity",
                library.name
            );
        } else {
            self.canonical
                .insert(library.identity_owned(), self.next_id);
            self.next_id += 1;
        }
        self.by_id.insert(stream_id, library);
        Ok(())
    }

    pub fn get(&self, stream_id: i32) -> Option<&Library> {
        self.by_id.get(&stream_id)
    }

    pub fn reset(&mut self) {
        *self = LibraryRegistry::new();
    }
}

impl Library {
    fn identity_owned(&self) -> (String, Option<Version>) {
        (self.name.clone(), self.options.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_only() {
        let lib = Library::parse("MyAssembly").unwrap();
        assert_eq!(lib.name, "MyAssembly");
        assert_eq!(lib.options.version, None);
    }

    #[test]
    fn parses_full_spec_tolerating_whitespace() {
        let lib = Library::parse(
            "MyAssembly ,  Version = 1.2.3.4 , Culture=neutral, PublicKeyToken=null",
        )
        .unwrap();
        assert_eq!(
            lib.options.version,
            Some(Version {
                major: 1,
                minor: 2,
                build: 3,
                revision: 4
            })
        );
        assert_eq!(lib.options.culture.as_deref(), Some("neutral"));
        assert_eq!(lib.options.public_key_token, Some(PublicKeyToken::Null));
    }

    #[test]
    fn rejects_unknown_option() {
        assert!(Library::parse("MyAssembly, Bogus=1").is_err());
    }

    #[test]
    fn rejects_malformed_version() {
        assert!(Library::parse("MyAssembly, Version=1.2.3").is_err());
    }

    #[test]
    fn parses_hex_public_key_token() {
        let lib = Library::parse("MyAssembly, PublicKeyToken=b77a5c561934e089").unwrap();
        match lib.options.public_key_token {
            Some(PublicKeyToken::Token(bytes)) => assert_eq!(bytes.len(), 8),
            other => panic!("unexpected token {other:?}"),
        }
    }

    #[test]
    fn registry_shares_canonical_id_for_duplicate_spec() {
        let mut registry = LibraryRegistry::new();
        registry.register(3, "MyAssembly, Version=1.0.0.0").unwrap();
        registry.register(7, "MyAssembly, Version=1.0.0.0").unwrap();
        assert_eq!(
            registry.get(3).unwrap().identity_owned(),
            registry.get(7).unwrap().identity_owned()
        );
    }

    #[test]
    fn spec_string_round_trips_through_parse() {
        let original = "MyAssembly, Version=1.2.3.4, Culture=neutral, PublicKeyToken=b77a5c561934e089, Retargetable=No";
        let lib = Library::parse(original).unwrap();
        let rendered = lib.to_spec_string();
        let reparsed = Library::parse(&rendered).unwrap();
        assert_eq!(lib, reparsed);
    }

    #[test]
    fn system_library_has_sentinel_id() {
        let registry = LibraryRegistry::new();
        assert_eq!(registry.get(SYSTEM_LIBRARY_ID).unwrap().name, "System");
    }
}
