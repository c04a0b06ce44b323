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

//! Reference fix-up (C8): the end-of-message pass that validates every
//! recorded `MemberReference` resolves to a live instance.
//!
//! Because [`crate::graph::Value::Object`] already stores the target's
//! arena index rather than a back-pointer, "resolving" a reference is just
//! an existence check — there is nothing to rewrite in place. A
//! back-pointer design would instead need to walk every node that carried
//! an unresolved placeholder and mutate it; the index-based arena avoids
//! that walk entirely, per the source's own recommendation.

use crate::error::{Error, Result};
use crate::graph::DataStore;

/// Validates every pending reference against the arena and clears the
/// pending list. In strict mode, any reference to an ID that was never
/// registered is a [`Error::DanglingReference`]; in permissive mode such
/// references are logged and left dangling for the caller to notice via
/// `DataStore::get` returning `None`.
pub fn resolve(store: &mut DataStore, permissive: bool) -> Result<()> {
    for &id in store.pending_references() {
        if !store.contains(id) {
            if permissive {
                log::warn!("permissive mode: reference to unregistered object id {id}");
            } else {
                return Err(Error::DanglingReference(id));
            }
        }
    }
    store.clear_pending_references();
    Ok(())
}

/// Looks up the message's root instance by the header's `root_id`.
pub fn resolve_root(store: &DataStore, root_id: i32) -> Result<()> {
    if !store.contains(root_id) {
        return Err(Error::MissingRoot(root_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Instance;

    #[test]
    fn strict_mode_rejects_dangling_reference() {
        let mut store = DataStore::new();
        store.note_reference(99);
        assert!(matches!(
            resolve(&mut store, false),
            Err(Error::DanglingReference(99))
        ));
    }

    #[test]
    fn permissive_mode_tolerates_dangling_reference() {
        let mut store = DataStore::new();
        store.note_reference(99);
        assert!(resolve(&mut store, true).is_ok());
        assert!(store.pending_references().is_empty());
    }

    #[test]
    fn resolved_reference_passes_in_strict_mode() {
        let mut store = DataStore::new();
        store.insert(1, Instance::String("hi".into())).unwrap();
        store.note_reference(1);
        assert!(resolve(&mut store, false).is_ok());
    }

    #[test]
    fn missing_root_is_an_error() {
        let store = DataStore::new();
        assert!(matches!(resolve_root(&store, 1), Err(Error::MissingRoot(1))));
    }
}
