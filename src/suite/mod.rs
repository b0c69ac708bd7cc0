//! RPC test suite
//!
//! The standard catalog run against the rollup's L2 engine. Most checks run
//! over both transports; subscriptions only make sense over WebSocket.

pub mod checks;

use crate::models::{Catalog, TestCaseSpec, Transport};

pub const SUITE_NAME: &str = "optimism rpc";

const SUITE_DESCRIPTION: &str = "Runs a set of RPC related tests against a running rollup node. \
Tests read chain state over HTTP and WebSocket and compare it with the devnet's genesis \
and rollup configuration.";

/// Checks run over every transport, in catalog order
fn shared_checks(transport: Transport) -> Vec<TestCaseSpec> {
    let name = |test: &str| format!("{}/{}", transport.prefix(), test);

    vec![
        TestCaseSpec::new(name("BalanceAndNonceAt"), checks::balance_and_nonce_at)
            .with_description("Genesis balance and nonce of a funded account"),
        TestCaseSpec::new(name("CanonicalChain"), checks::canonical_chain)
            .with_description("Recent blocks link to their parents"),
        TestCaseSpec::new(name("CodeAt"), checks::code_at)
            .with_description("Predeploy code matches the genesis allocation"),
        TestCaseSpec::new(name("EstimateGas"), checks::estimate_gas)
            .with_description("Gas estimate for a value transfer"),
        TestCaseSpec::new(name("GenesisBlockByHash"), checks::genesis_block_by_hash)
            .with_description("Full genesis block fetched by hash"),
        TestCaseSpec::new(name("GenesisBlockByNumber"), checks::genesis_block_by_number)
            .with_description("Full genesis block fetched by number"),
        TestCaseSpec::new(name("GenesisHeaderByHash"), checks::genesis_header_by_hash)
            .with_description("Genesis header fetched by hash"),
        TestCaseSpec::new(name("GenesisHeaderByNumber"), checks::genesis_header_by_number)
            .with_description("Genesis header fetched by number"),
        TestCaseSpec::new(name("SyncProgress"), checks::sync_progress)
            .with_description("Sync status is false or consistent"),
        TestCaseSpec::new(name("TransactionCount"), checks::transaction_count)
            .with_description("Transaction counts agree with block bodies"),
        TestCaseSpec::new(name("ABICall"), checks::abi_call)
            .with_description("Call the L1 attributes contract"),
    ]
}

/// The standard RPC catalog
pub fn rpc_catalog() -> Catalog {
    let mut entries = shared_checks(Transport::Http);
    entries.extend(shared_checks(Transport::Ws));
    entries.push(
        TestCaseSpec::new("ws/NewHeadSubscription", checks::new_head_subscription)
            .with_description("newHeads subscription delivers a head"),
    );

    Catalog::new(SUITE_NAME, SUITE_DESCRIPTION, entries)
}
