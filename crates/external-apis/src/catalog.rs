// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Builtin provider catalog
//!
//! | source   | provider           | declared limit            | key                 |
//! |----------|--------------------|---------------------------|---------------------|
//! | bitcoin  | `blockstream.info` | 4 req/s, burst 4          | none                |
//! | bitcoin  | `mempool.space`    | 2 req/s, burst 2, 60/min  | none                |
//! | bitcoin  | `blockchain.com`   | 0.1 req/s, burst 1        | none                |
//! | ethereum | `etherscan`        | 5 req/s, burst 5          | `ETHERSCAN_API_KEY` |
//! | ethereum | `routescan`        | 2 req/s, burst 2, 10k/h   | none                |

use std::{collections::BTreeMap, sync::Arc};

use http_client::ApiKeyPlacement;
use serde_json::Value;
use shared_types::{OperationKind, RateLimitConfig};

use crate::{
    HealthCheck, JsonRestProvider, JsonRestSpec, Provider, ProviderError, ProviderInit,
    ProviderMetadata, ProviderRegistry, RestRoute,
};

/// Bitcoin source name
pub const BITCOIN: &str = "bitcoin";
/// Ethereum source name
pub const ETHEREUM: &str = "ethereum";

/// Register every builtin provider
///
/// # Errors
///
/// Returns [`ProviderError::Configuration`] if one is already registered.
pub fn register_builtin_providers(registry: &mut ProviderRegistry) -> Result<(), ProviderError> {
    let builtins: [(fn() -> JsonRestSpec, crate::ProviderFactory); 5] = [
        (blockstream_spec, blockstream),
        (mempool_spec, mempool),
        (blockchain_com_spec, blockchain_com),
        (etherscan_spec, etherscan),
        (routescan_spec, routescan),
    ];
    for (spec, factory) in builtins {
        registry.register(spec().metadata, factory)?;
    }
    Ok(())
}

fn blockstream(init: ProviderInit) -> Result<Arc<dyn Provider>, ProviderError> {
    Ok(Arc::new(JsonRestProvider::new(blockstream_spec(), init)?))
}

fn mempool(init: ProviderInit) -> Result<Arc<dyn Provider>, ProviderError> {
    Ok(Arc::new(JsonRestProvider::new(mempool_spec(), init)?))
}

fn blockchain_com(init: ProviderInit) -> Result<Arc<dyn Provider>, ProviderError> {
    Ok(Arc::new(JsonRestProvider::new(blockchain_com_spec(), init)?))
}

fn etherscan(init: ProviderInit) -> Result<Arc<dyn Provider>, ProviderError> {
    Ok(Arc::new(JsonRestProvider::new(etherscan_spec(), init)?))
}

fn routescan(init: ProviderInit) -> Result<Arc<dyn Provider>, ProviderError> {
    Ok(Arc::new(JsonRestProvider::new(routescan_spec(), init)?))
}

fn metadata(
    source: &str,
    name: &str,
    priority: u32,
    base_url: &str,
    rate_limit: RateLimitConfig,
    health_check: HealthCheck,
) -> ProviderMetadata {
    ProviderMetadata {
        name: name.to_string(),
        source: source.to_string(),
        priority,
        rate_limit,
        capabilities: Default::default(),
        base_url: base_url.to_string(),
        api_key_env: None,
        requires_api_key: false,
        health_check,
    }
}

fn spec(mut metadata: ProviderMetadata, routes: Vec<(OperationKind, RestRoute)>) -> JsonRestSpec {
    let routes: BTreeMap<_, _> = routes.into_iter().collect();
    metadata.capabilities = routes.keys().copied().collect();
    JsonRestSpec {
        metadata,
        routes,
        api_key: None,
    }
}

fn tip_height_is_number(body: &Value) -> bool {
    body.as_u64().is_some()
}

fn esplora_routes() -> Vec<(OperationKind, RestRoute)> {
    vec![
        (OperationKind::GetAddressTransactions, RestRoute::get("address/{address}/txs")),
        (OperationKind::GetAddressBalance, RestRoute::get("address/{address}")),
        (OperationKind::GetTransaction, RestRoute::get("tx/{address}")),
    ]
}

fn blockstream_spec() -> JsonRestSpec {
    spec(
        metadata(
            BITCOIN,
            "blockstream.info",
            0,
            "https://blockstream.info/api",
            RateLimitConfig::per_second(4.0, 4),
            HealthCheck::new("blocks/tip/height", tip_height_is_number),
        ),
        esplora_routes(),
    )
}

fn mempool_spec() -> JsonRestSpec {
    spec(
        metadata(
            BITCOIN,
            "mempool.space",
            1,
            "https://mempool.space/api",
            RateLimitConfig::per_second(2.0, 2).with_per_minute(60),
            HealthCheck::new("blocks/tip/height", tip_height_is_number),
        ),
        esplora_routes(),
    )
}

fn blockchain_com_spec() -> JsonRestSpec {
    spec(
        metadata(
            BITCOIN,
            "blockchain.com",
            2,
            "https://blockchain.info",
            RateLimitConfig::per_second(0.1, 1),
            HealthCheck::new("latestblock", |body| {
                body.get("height").and_then(Value::as_u64).is_some()
            }),
        ),
        vec![
            (OperationKind::GetAddressTransactions, RestRoute::get("rawaddr/{address}")),
            (
                OperationKind::GetAddressBalance,
                RestRoute::get("balance").query("active", "{address}"),
            ),
            (OperationKind::GetTransaction, RestRoute::get("rawtx/{address}")),
        ],
    )
}

/// Etherscan-compatible account and proxy routes under `api`
///
/// Account lists filter by block number, so `startblock` comes from an explicit
/// `startblock` operation parameter rather than the unix-seconds `since`.
fn etherscan_routes() -> Vec<(OperationKind, RestRoute)> {
    let account = |action: &str| {
        RestRoute::get("api")
            .query("module", "account")
            .query("action", action)
            .query("address", "{address}")
    };
    vec![
        (
            OperationKind::GetAddressTransactions,
            account("txlist").query("startblock", "{startblock}").query("sort", "asc"),
        ),
        (OperationKind::GetAddressBalance, account("balance").query("tag", "latest")),
        (
            OperationKind::GetTokenTransactions,
            account("tokentx").query("startblock", "{startblock}").query("sort", "asc"),
        ),
        (
            OperationKind::GetTransaction,
            RestRoute::get("api")
                .query("module", "proxy")
                .query("action", "eth_getTransactionByHash")
                .query("txhash", "{address}"),
        ),
    ]
}

fn block_number_is_hex(body: &Value) -> bool {
    body.get("result")
        .and_then(Value::as_str)
        .is_some_and(|result| result.starts_with("0x"))
}

fn etherscan_spec() -> JsonRestSpec {
    let mut metadata = metadata(
        ETHEREUM,
        "etherscan",
        0,
        "https://api.etherscan.io",
        RateLimitConfig::per_second(5.0, 5),
        HealthCheck::new("api?module=proxy&action=eth_blockNumber", block_number_is_hex),
    );
    metadata.api_key_env = Some("ETHERSCAN_API_KEY".to_string());
    metadata.requires_api_key = true;

    let mut etherscan = spec(metadata, etherscan_routes());
    etherscan.api_key = Some(ApiKeyPlacement::Query {
        name: "apikey".to_string(),
    });
    etherscan
}

fn routescan_spec() -> JsonRestSpec {
    spec(
        metadata(
            ETHEREUM,
            "routescan",
            1,
            "https://api.routescan.io/v2/network/mainnet/evm/1/etherscan",
            RateLimitConfig::per_second(2.0, 2).with_per_hour(10_000),
            HealthCheck::new("api?module=proxy&action=eth_blockNumber", block_number_is_hex),
        ),
        etherscan_routes(),
    )
}
