//! Network identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which ledger network the delegate forges on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Main,
    Test,
    #[default]
    Dev,
}

impl NetworkId {
    /// Address version prefix for this network.
    pub fn address_prefix(&self) -> char {
        match self {
            NetworkId::Main => 'M',
            NetworkId::Test => 'T',
            NetworkId::Dev => 'D',
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Main => f.write_str("main"),
            NetworkId::Test => f.write_str("test"),
            NetworkId::Dev => f.write_str("dev"),
        }
    }
}
