//! Service startup parameters
//!
//! Environment entries and file payloads handed to a service at start.
//! Client entrypoints only unpack variables carrying the `HIVE_UNPACK_`
//! prefix, which lets the rollup tooling keep its own namespaced flag names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix the client entrypoints strip before exporting a variable
pub const UNPACK_PREFIX: &str = "HIVE_UNPACK_";

/// Location of the engine API secret inside each client
pub const DEFAULT_JWT_PATH: &str = "/hive/input/jwt-secret.txt";

/// Environment entries for a service
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Merge `other` into this set; `other` wins on collision
    pub fn merge(&mut self, other: Params) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// Entries that still need the unpack prefix, keyed by their real names
/// (e.g. `OP_NODE_L1_ETH_RPC`)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpackParams(BTreeMap<String, String>);

impl UnpackParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Merge `other` into this set; `other` wins on collision
    pub fn merge(&mut self, other: UnpackParams) {
        self.0.extend(other.0);
    }

    /// Prefixed form passed to the service
    pub fn params(&self) -> Params {
        Params(
            self.0
                .iter()
                .map(|(k, v)| (format!("{UNPACK_PREFIX}{k}"), v.clone()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for UnpackParams {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// File injected into a service before it starts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartFile {
    pub path: String,
    pub contents: Vec<u8>,
}

impl StartFile {
    pub fn bytes(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn string(path: impl Into<String>, contents: impl AsRef<str>) -> Self {
        Self::bytes(path, contents.as_ref().as_bytes().to_vec())
    }

    pub fn json(path: impl Into<String>, value: &serde_json::Value) -> Self {
        Self::string(path, value.to_string())
    }
}

/// Shared engine API secret: a 32-byte hash whose first byte is 42
pub fn default_jwt_secret() -> String {
    let mut secret = [0u8; 32];
    secret[0] = 42;
    let hex: String = secret.iter().map(|b| format!("{b:02x}")).collect();
    format!("0x{hex}")
}

pub fn default_jwt_file() -> StartFile {
    StartFile::string(DEFAULT_JWT_PATH, default_jwt_secret())
}

/// Everything a service needs at start
#[derive(Clone, Debug, Default)]
pub struct StartOptions {
    pub params: Params,
    pub files: Vec<StartFile>,
}

impl StartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params.merge(params);
        self
    }

    pub fn file(mut self, file: StartFile) -> Self {
        self.files.push(file);
        self
    }
}
