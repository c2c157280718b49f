// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Live provider status shown to observers

use std::fmt;

use serde::{Deserialize, Serialize};

/// Display status of a provider, ordered by priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// A rate-limit window is active
    RateLimited,
    /// The circuit breaker is open
    CircuitOpen,
    /// Serving traffic above the activity threshold
    Active,
    /// Nothing notable
    Idle,
}

impl ProviderStatus {
    /// Lower value wins when several conditions hold at once
    pub const fn priority(self) -> u8 {
        match self {
            Self::RateLimited => 1,
            Self::CircuitOpen => 2,
            Self::Active => 3,
            Self::Idle => 4,
        }
    }

    /// Snake-case label
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen => "circuit_open",
            Self::Active => "active",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_are_strictly_ordered() {
        let ordered = [
            ProviderStatus::RateLimited,
            ProviderStatus::CircuitOpen,
            ProviderStatus::Active,
            ProviderStatus::Idle,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].priority() < pair[1].priority());
        }
    }
}
