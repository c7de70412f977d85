use std::fmt;
use std::fmt::Debug;

use serde::Serialize;

use crate::utils::crypto::hash;
use crate::utils::types::{Address, HashPos};

pub mod conversions;
pub mod finger_entry;
pub mod finger_table;
pub mod successor_list;

/// A participant of the ring. Node values are freely copied around the
/// network and only ever cached, never owned.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: HashPos,
    pub address: Address,
}

impl Node {
    /// Builds the node record for `address`, deriving its ring position
    /// from the address bytes.
    pub fn from_address(address: &Address) -> Self {
        Node {
            id: hash(address.as_bytes()),
            address: address.clone(),
        }
    }

    pub fn with_id(id: HashPos, address: &Address) -> Self {
        Node {
            id,
            address: address.clone(),
        }
    }

    pub fn port(&self) -> Option<u16> {
        self.address
            .rsplit(':')
            .next()
            .and_then(|raw| raw.parse().ok())
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish()
    }
}
