// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Operation kinds that providers declare as capabilities

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of data a caller asks a provider for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    /// Native-asset transactions touching an address
    GetAddressTransactions,
    /// Native-asset balance of an address
    GetAddressBalance,
    /// Token transfers touching an address
    GetTokenTransactions,
    /// Token balances held by an address
    GetTokenBalances,
    /// A single transaction by hash
    GetTransaction,
}

/// Error returned when an operation name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation kind: {0}")]
pub struct ParseOperationKindError(pub String);

impl OperationKind {
    /// Returns every operation kind, in declaration order
    pub const fn all() -> &'static [OperationKind] {
        &[
            Self::GetAddressTransactions,
            Self::GetAddressBalance,
            Self::GetTokenTransactions,
            Self::GetTokenBalances,
            Self::GetTransaction,
        ]
    }

    /// Returns the wire name used in cache keys, events and URLs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetAddressTransactions => "getAddressTransactions",
            Self::GetAddressBalance => "getAddressBalance",
            Self::GetTokenTransactions => "getTokenTransactions",
            Self::GetTokenBalances => "getTokenBalances",
            Self::GetTransaction => "getTransaction",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ParseOperationKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseOperationKindError(s.to_string()))
    }
}
