//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use futures::future::BoxFuture;
use holo_utils::Database;
use pickledb::{PickleDb, PickleDbDumpPolicy, SerializationMethod};

use crate::error::Error;
use crate::state::LinkMonitorState;

// The persistent configuration store, referenced without ownership (§3,
// §9 "raw back-pointers to external modules"). Its lifetime strictly
// exceeds the Link Monitor's. Kept concrete to `LinkMonitorState` (the
// only record this crate ever persists, §6 "Persistent store record")
// rather than generic, so it stays usable behind `Arc<dyn PersistentStore>`.
pub trait PersistentStore: Send + Sync {
    fn load<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<LinkMonitorState>, Error>>;

    fn save<'a>(
        &'a self,
        key: &'a str,
        value: &'a LinkMonitorState,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

// A `PersistentStore` backed by a local `pickledb` database, mirroring the
// way `holo-daemon` records its northbound rollback log.
pub struct PickleDbStore {
    db: Database,
}

impl PickleDbStore {
    pub fn new(db: Database) -> PickleDbStore {
        PickleDbStore { db }
    }

    pub fn open<P: AsRef<std::path::Path>>(
        path: P,
    ) -> Result<PickleDbStore, Error> {
        let dump_policy = PickleDbDumpPolicy::AutoDump;
        let serialization_method = SerializationMethod::Json;
        let db = if path.as_ref().exists() {
            PickleDb::load(path, dump_policy, serialization_method)
        } else {
            Ok(PickleDb::new(path, dump_policy, serialization_method))
        }
        .map_err(Error::PersistentStoreError)?;
        Ok(PickleDbStore::new(std::sync::Arc::new(std::sync::Mutex::new(
            db,
        ))))
    }
}

impl PersistentStore for PickleDbStore {
    fn load<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<LinkMonitorState>, Error>> {
        Box::pin(async move {
            let db = self.db.lock().unwrap();
            Ok(db.get::<LinkMonitorState>(key))
        })
    }

    fn save<'a>(
        &'a self,
        key: &'a str,
        value: &'a LinkMonitorState,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let mut db = self.db.lock().unwrap();
            db.set(key, value).map_err(Error::PersistentStoreError)
        })
    }
}

// An in-process `PersistentStore`, used by the test suite in place of a
// real `pickledb` file on disk.
#[derive(Default)]
pub struct InMemoryStore {
    entries: std::sync::Mutex<
        std::collections::HashMap<String, LinkMonitorState>,
    >,
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        InMemoryStore::default()
    }
}

impl PersistentStore for InMemoryStore {
    fn load<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<LinkMonitorState>, Error>> {
        Box::pin(async move {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        })
    }

    fn save<'a>(
        &'a self,
        key: &'a str,
        value: &'a LinkMonitorState,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_owned(), value.clone());
            Ok(())
        })
    }
}
