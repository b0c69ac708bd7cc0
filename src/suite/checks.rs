//! Read-only RPC checks
//!
//! Each check receives its own session and the shared devnet state, and
//! asserts on what the L2 engine reports.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::executor::ExecutionContext;
use crate::rpc::{parse_quantity, Session};

/// L1 attributes predeploy
pub const L1_BLOCK_ADDRESS: &str = "0x4200000000000000000000000000000000000015";

/// L2 to L1 message passer predeploy
pub const MESSAGE_PASSER_ADDRESS: &str = "0x4200000000000000000000000000000000000016";

/// Selector of `number()` on the L1 attributes contract
const L1_BLOCK_NUMBER_SELECTOR: &str = "0x8381f58a";

const ZERO_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Blocks walked back from head by the canonical chain check
const CANONICAL_DEPTH: u128 = 10;

const HEAD_WAIT: Duration = Duration::from_secs(60);

async fn block_by_number(session: &mut Session, number: &str, full: bool) -> Result<Value> {
    let block = session
        .call("eth_getBlockByNumber", json!([number, full]))
        .await?;
    if block.is_null() {
        anyhow::bail!("block {number} not found");
    }
    Ok(block)
}

async fn block_by_hash(session: &mut Session, hash: &str, full: bool) -> Result<Value> {
    let block = session.call("eth_getBlockByHash", json!([hash, full])).await?;
    if block.is_null() {
        anyhow::bail!("block {hash} not found");
    }
    Ok(block)
}

fn text<'a>(value: &'a Value, key: &str) -> Result<&'a str> {
    value[key]
        .as_str()
        .with_context(|| format!("response lacks string field '{key}'"))
}

fn quantity(value: &Value, key: &str) -> Result<u128> {
    parse_quantity(&value[key]).with_context(|| format!("field '{key}'"))
}

fn same_hex(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn expected_genesis_hash(ctx: &ExecutionContext) -> Result<String> {
    ctx.configs()
        .l2_genesis_hash()
        .map(str::to_string)
        .context("rollup config does not record the L2 genesis hash")
}

/// Genesis balance and nonce of a funded account match the allocation
pub async fn balance_and_nonce_at(mut ctx: ExecutionContext) -> Result<()> {
    let account = ctx
        .vault()
        .get(0)
        .cloned()
        .context("genesis allocation has no funded accounts")?;

    let balance = ctx
        .session
        .call("eth_getBalance", json!([account.address, "0x0"]))
        .await?;
    let balance = parse_quantity(&balance)?;
    anyhow::ensure!(
        balance == account.balance,
        "balance of {} at genesis is {}, allocation says {}",
        account.address,
        balance,
        account.balance
    );

    let nonce = ctx
        .session
        .call("eth_getTransactionCount", json!([account.address, "0x0"]))
        .await?;
    let nonce = parse_quantity(&nonce)?;
    anyhow::ensure!(
        nonce == u128::from(account.nonce),
        "nonce of {} at genesis is {}, expected {}",
        account.address,
        nonce,
        account.nonce
    );

    // latest state must still be queryable
    parse_quantity(
        &ctx.session
            .call("eth_getBalance", json!([account.address, "latest"]))
            .await?,
    )?;
    Ok(())
}

/// Recent blocks link to their parents and are retrievable by hash
pub async fn canonical_chain(mut ctx: ExecutionContext) -> Result<()> {
    let head = parse_quantity(&ctx.session.call("eth_blockNumber", json!([])).await?)?;
    let mut child = block_by_number(&mut ctx.session, &format!("{head:#x}"), false).await?;

    let by_hash = block_by_hash(&mut ctx.session, text(&child, "hash")?, false).await?;
    anyhow::ensure!(
        quantity(&by_hash, "number")? == head,
        "block fetched by hash has a different number"
    );

    let lowest = head.saturating_sub(CANONICAL_DEPTH);
    for number in (lowest..head).rev() {
        let parent = block_by_number(&mut ctx.session, &format!("{number:#x}"), false).await?;
        let (expected, actual) = (text(&child, "parentHash")?, text(&parent, "hash")?);
        anyhow::ensure!(
            same_hex(expected, actual),
            "block {} has parent {} but block {} is {}",
            number + 1,
            expected,
            number,
            actual
        );
        child = parent;
    }

    debug!("{}: verified {} links below head {}", ctx.test_name, head - lowest, head);
    Ok(())
}

/// Predeploy code is served and matches the genesis allocation
pub async fn code_at(mut ctx: ExecutionContext) -> Result<()> {
    let allocated = ctx
        .configs()
        .l2_alloc()
        .and_then(|alloc| {
            alloc
                .iter()
                .find(|(address, _)| same_hex(address, MESSAGE_PASSER_ADDRESS))
        })
        .and_then(|(_, entry)| entry["code"].as_str())
        .map(str::to_string);

    let code = ctx
        .session
        .call("eth_getCode", json!([MESSAGE_PASSER_ADDRESS, "latest"]))
        .await?;
    let code = code.as_str().context("eth_getCode returned a non-string")?;
    anyhow::ensure!(
        code.len() > 2,
        "no code at predeploy {MESSAGE_PASSER_ADDRESS}"
    );

    if let Some(allocated) = allocated {
        anyhow::ensure!(
            same_hex(code, &allocated),
            "code at {MESSAGE_PASSER_ADDRESS} differs from the genesis allocation"
        );
    }
    Ok(())
}

/// A plain value transfer estimates to at least the intrinsic gas
pub async fn estimate_gas(mut ctx: ExecutionContext) -> Result<()> {
    let from = ctx
        .vault()
        .get(0)
        .map(|a| a.address.clone())
        .context("genesis allocation has no funded accounts")?;
    let to = ctx
        .vault()
        .get(1)
        .map(|a| a.address.clone())
        .unwrap_or_else(|| MESSAGE_PASSER_ADDRESS.to_string());

    let gas = ctx
        .session
        .call(
            "eth_estimateGas",
            json!([{"from": from, "to": to, "value": "0x1"}]),
        )
        .await?;
    let gas = parse_quantity(&gas)?;
    anyhow::ensure!(gas >= 21_000, "estimated {gas} gas for a transfer");
    Ok(())
}

async fn check_genesis(ctx: &mut ExecutionContext, by_hash: bool, full: bool) -> Result<()> {
    let expected = expected_genesis_hash(ctx)?;
    let block = if by_hash {
        block_by_hash(&mut ctx.session, &expected, full).await?
    } else {
        block_by_number(&mut ctx.session, "0x0", full).await?
    };

    anyhow::ensure!(quantity(&block, "number")? == 0, "genesis number is not 0");
    let hash = text(&block, "hash")?;
    anyhow::ensure!(
        same_hex(hash, &expected),
        "genesis hash is {hash}, rollup config says {expected}"
    );
    anyhow::ensure!(
        same_hex(text(&block, "parentHash")?, ZERO_HASH),
        "genesis has a non-zero parent hash"
    );
    text(&block, "stateRoot")?;
    Ok(())
}

pub async fn genesis_block_by_hash(mut ctx: ExecutionContext) -> Result<()> {
    check_genesis(&mut ctx, true, true).await
}

pub async fn genesis_block_by_number(mut ctx: ExecutionContext) -> Result<()> {
    check_genesis(&mut ctx, false, true).await
}

pub async fn genesis_header_by_hash(mut ctx: ExecutionContext) -> Result<()> {
    check_genesis(&mut ctx, true, false).await
}

pub async fn genesis_header_by_number(mut ctx: ExecutionContext) -> Result<()> {
    check_genesis(&mut ctx, false, false).await
}

/// `eth_syncing` is either false or a consistent progress object
pub async fn sync_progress(mut ctx: ExecutionContext) -> Result<()> {
    let progress = ctx.session.call("eth_syncing", json!([])).await?;
    match progress {
        Value::Bool(false) => Ok(()),
        Value::Object(_) => {
            let current = quantity(&progress, "currentBlock")?;
            let highest = quantity(&progress, "highestBlock")?;
            anyhow::ensure!(
                current <= highest,
                "current block {current} is past highest block {highest}"
            );
            Ok(())
        }
        other => anyhow::bail!("unexpected eth_syncing result {other}"),
    }
}

/// Transaction counts agree with the block bodies
pub async fn transaction_count(mut ctx: ExecutionContext) -> Result<()> {
    let genesis = ctx
        .session
        .call("eth_getBlockTransactionCountByNumber", json!(["0x0"]))
        .await?;
    anyhow::ensure!(
        parse_quantity(&genesis)? == 0,
        "genesis block reports transactions"
    );

    let latest = block_by_number(&mut ctx.session, "latest", false).await?;
    let listed = latest["transactions"]
        .as_array()
        .map(Vec::len)
        .context("block lacks a transaction list")?;
    let counted = ctx
        .session
        .call(
            "eth_getBlockTransactionCountByHash",
            json!([text(&latest, "hash")?]),
        )
        .await?;
    let counted = parse_quantity(&counted)?;
    anyhow::ensure!(
        counted == listed as u128,
        "block lists {listed} transactions but count is {counted}"
    );
    Ok(())
}

/// Read the L1 block number through the L1 attributes contract ABI
pub async fn abi_call(mut ctx: ExecutionContext) -> Result<()> {
    let output = ctx
        .session
        .call(
            "eth_call",
            json!([{"to": L1_BLOCK_ADDRESS, "data": L1_BLOCK_NUMBER_SELECTOR}, "latest"]),
        )
        .await?;
    let output = output.as_str().context("eth_call returned a non-string")?;
    let word = output
        .strip_prefix("0x")
        .context("eth_call output lacks 0x prefix")?;
    anyhow::ensure!(
        word.len() == 64 && word.chars().all(|c| c.is_ascii_hexdigit()),
        "number() returned '{output}', expected one 32-byte word"
    );
    Ok(())
}

/// A `newHeads` subscription delivers a well-formed head
pub async fn new_head_subscription(mut ctx: ExecutionContext) -> Result<()> {
    let ws = ctx
        .session
        .as_ws()
        .context("subscriptions need a WebSocket session")?;

    let subscription = ws.subscribe("newHeads", None).await?;
    let head = ws.next_notification(&subscription, HEAD_WAIT).await?;
    let number = quantity(&head, "number")?;
    text(&head, "hash")?;
    text(&head, "parentHash")?;
    ws.unsubscribe(&subscription).await?;

    debug!("{}: received head {}", ctx.test_name, number);
    Ok(())
}
