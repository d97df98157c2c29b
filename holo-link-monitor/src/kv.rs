//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::Error;

// The routing key-value store client, referenced without ownership (§6,
// §9 "raw back-pointers to external modules"). Keys are written "sticky"
// (persisted across KV disconnects) and refreshed at `ttl`.
pub trait KvStoreClient: Send + Sync {
    fn put<'a>(
        &'a self,
        key: &'a str,
        value: Vec<u8>,
        ttl: Duration,
        sticky: bool,
    ) -> BoxFuture<'a, Result<(), Error>>;

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>, Error>>;
}

// An in-process `KvStoreClient`, used by the test suite and as the
// reference implementation for the node-label allocator's probing
// protocol.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> InMemoryKvStore {
        InMemoryKvStore::default()
    }
}

impl KvStoreClient for InMemoryKvStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        value: Vec<u8>,
        _ttl: Duration,
        _sticky: bool,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.entries.lock().unwrap().insert(key.to_owned(), value);
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>, Error>> {
        Box::pin(async move { Ok(self.entries.lock().unwrap().get(key).cloned()) })
    }
}
