//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use holo_utils::DatabaseError;
use tracing::{error, warn};

use crate::adjacency::AdjacencyKey;

// Link Monitor errors.
#[derive(Debug)]
pub enum Error {
    // I/O errors
    IoError(IoError),
    // Persistent-store failure on a control-surface mutation.
    PersistentStoreError(DatabaseError),
    // Invalid input
    UnknownInterface(String),
    UnknownAdjacency(AdjacencyKey),
    // Fatal
    NoAreasConfigured,
    InvalidAreaConfig(String, String),
    // A control-surface request was still pending when the instance was
    // asked to stop (§5 "Cancellation").
    ShuttingDown,
}

// Link Monitor I/O errors.
#[derive(Debug)]
pub enum IoError {
    KvPublishError(String, std::io::Error),
    NetlinkRequestError(std::io::Error),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::IoError(error) => {
                error.log();
            }
            Error::PersistentStoreError(error) => {
                error!(%error, "{}", self);
            }
            Error::UnknownInterface(ifname) => {
                warn!(%ifname, "{}", self);
            }
            Error::UnknownAdjacency(key) => {
                warn!(?key, "{}", self);
            }
            Error::NoAreasConfigured => {
                error!("{}", self);
            }
            Error::InvalidAreaConfig(area, reason) => {
                error!(%area, %reason, "{}", self);
            }
            Error::ShuttingDown => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::PersistentStoreError(..) => {
                write!(f, "failed to write to persistent store")
            }
            Error::UnknownInterface(..) => {
                write!(f, "unknown interface")
            }
            Error::UnknownAdjacency(..) => {
                write!(f, "unknown adjacency")
            }
            Error::NoAreasConfigured => {
                write!(f, "no areas configured")
            }
            Error::InvalidAreaConfig(..) => {
                write!(f, "invalid area configuration")
            }
            Error::ShuttingDown => {
                write!(f, "link monitor is shutting down")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::PersistentStoreError(error) => Some(error),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        match self {
            IoError::KvPublishError(key, error) => {
                warn!(%key, %error, "{}", self);
            }
            IoError::NetlinkRequestError(error) => {
                warn!(%error, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::KvPublishError(..) => {
                write!(f, "failed to publish to the key-value store")
            }
            IoError::NetlinkRequestError(..) => {
                write!(f, "netlink request failed")
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::KvPublishError(_, error) => Some(error),
            IoError::NetlinkRequestError(error) => Some(error),
        }
    }
}
