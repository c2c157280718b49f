// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Caller-side operation descriptors

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared_types::OperationKind;

/// One request for data from a logical source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// What to fetch
    pub kind: OperationKind,
    /// Address or transaction hash the operation targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Lower bound as unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    /// Extra template parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl Operation {
    /// An operation with no target
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            address: None,
            since: None,
            params: BTreeMap::new(),
        }
    }

    /// An operation targeting `address`
    pub fn for_address(kind: OperationKind, address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::new(kind)
        }
    }

    /// Set the lower time bound
    #[must_use]
    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    /// Add a template parameter
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// `"{source}:{kind}:{address|-}:{since|all}"`
    ///
    /// Extra params are not part of the key.
    pub fn cache_key(&self, source: &str) -> String {
        let address = self.address.as_deref().unwrap_or("-");
        let since = self
            .since
            .map_or_else(|| "all".to_string(), |since| since.to_string());
        format!("{source}:{}:{address}:{since}", self.kind)
    }
}
