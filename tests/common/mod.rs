//! Shared fixtures: a stateful in-process chain and ledger wiring.
//!
//! `FakeChain` understands the BNPL and ERC-20 calldata the gateway
//! produces, keeps balances, allowances and orders in memory, and emits
//! the same logs the real contract would. Knobs let a test make a given
//! method fail at estimation, submission, confirmation or mining.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, Log, U256, address};
use alloy::sol_types::{SolCall, SolEvent};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;

use bnpl_ledger::adapters::directory::StaticUserDirectory;
use bnpl_ledger::adapters::persistence::InMemoryLedgerStore;
use bnpl_ledger::domain::abi::{IBnpl, IErc20};
use bnpl_ledger::ports::{ChainCall, ChainClient, LedgerStore, ObservedLog, TxReceipt, UserDirectory};
use bnpl_ledger::usecases::{ContractGateway, LedgerSettings, ReconciliationLedger, TransactionExecutor};

pub const BNPL: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
pub const TOKEN: Address = address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512");
pub const SIGNER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cfFFb92266");
pub const OTHER_WALLET: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
pub const MERCHANT: Address = address!("3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

pub const GAS_ESTIMATE: u64 = 100_000;

/// Credit tiers served by `tiers(i)`: min score, collateral bps, fee bps, max loan.
pub const TIERS: [(u64, u16, u16, u64); 2] = [(0, 2_000, 500, tokens(5_000)), (700, 1_000, 300, tokens(50_000))];

/// One write that reached `send_transaction`.
#[derive(Debug, Clone)]
pub struct SentTx {
    pub method: &'static str,
    pub gas_limit: u64,
    pub calldata: Bytes,
}

#[derive(Debug, Clone)]
struct FakeOrder {
    buyer: Address,
    principal: U256,
    collateral: U256,
    fee: U256,
    due: U256,
}

#[derive(Default)]
struct State {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    orders: HashMap<U256, FakeOrder>,
    next_order_id: u64,
    next_tx: u64,
    receipts: HashMap<B256, TxReceipt>,
    hung: HashSet<B256>,
    logs: Vec<ObservedLog>,
    log_queries: Vec<(u64, u64)>,
    block: u64,

    estimates: Vec<&'static str>,
    sent: Vec<SentTx>,

    fail_estimate: HashSet<&'static str>,
    fail_send: HashSet<&'static str>,
    hang_receipt: HashSet<&'static str>,
    revert: HashSet<&'static str>,
    silent: HashSet<&'static str>,
    ignore_approvals: bool,
    fail_reads: HashSet<&'static str>,
}

pub struct FakeChain {
    signer: Address,
    state: Mutex<State>,
    /// Collateral and fee in basis points of the purchase amount.
    collateral_bps: u64,
    fee_bps: u64,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            signer: SIGNER,
            state: Mutex::new(State {
                next_order_id: 1,
                block: 100,
                ..State::default()
            }),
            collateral_bps: 2_000,
            fee_bps: 500,
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    pub fn set_balance(&self, owner: Address, amount: u64) {
        self.with_state(|s| s.balances.insert(owner, U256::from(amount)));
    }

    pub fn set_allowance(&self, owner: Address, spender: Address, amount: u64) {
        self.with_state(|s| s.allowances.insert((owner, spender), U256::from(amount)));
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.with_state(|s| s.allowances.get(&(owner, spender)).copied().unwrap_or_default())
    }

    pub fn fail_estimate(&self, method: &'static str) {
        self.with_state(|s| s.fail_estimate.insert(method));
    }

    pub fn fail_send(&self, method: &'static str) {
        self.with_state(|s| s.fail_send.insert(method));
    }

    /// The transaction is mined but `wait_for_receipt` never returns.
    pub fn hang_receipt(&self, method: &'static str) {
        self.with_state(|s| s.hang_receipt.insert(method));
    }

    pub fn revert(&self, method: &'static str) {
        self.with_state(|s| s.revert.insert(method));
    }

    /// Mine successfully but emit no logs.
    pub fn silence_events(&self, method: &'static str) {
        self.with_state(|s| s.silent.insert(method));
    }

    /// `approve` confirms without changing the allowance.
    pub fn ignore_approvals(&self) {
        self.with_state(|s| s.ignore_approvals = true);
    }

    pub fn fail_read(&self, method: &'static str) {
        self.with_state(|s| s.fail_reads.insert(method));
    }

    /// Move the head forward without mining anything.
    pub fn advance_blocks(&self, n: u64) {
        self.with_state(|s| s.block += n);
    }

    /// Every `(from, to)` range passed to `logs`, in call order.
    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.with_state(|s| s.log_queries.clone())
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.with_state(|s| s.sent.clone())
    }

    pub fn sent_methods(&self) -> Vec<&'static str> {
        self.sent().iter().map(|t| t.method).collect()
    }

    pub fn estimates(&self) -> Vec<&'static str> {
        self.with_state(|s| s.estimates.clone())
    }

    pub fn order_count(&self) -> usize {
        self.with_state(|s| s.orders.len())
    }

    pub fn quote_for(&self, purchase: U256) -> (U256, U256) {
        let collateral = purchase * U256::from(self.collateral_bps) / U256::from(10_000u64);
        let fee = purchase * U256::from(self.fee_bps) / U256::from(10_000u64);
        (collateral, fee)
    }

    fn read(&self, call: &ChainCall) -> Result<Vec<u8>> {
        let data = &call.calldata[..];
        let selector: [u8; 4] = data
            .get(..4)
            .ok_or_else(|| anyhow!("short calldata"))?
            .try_into()?;

        if self.with_state(|s| s.fail_reads.contains(call.method)) {
            bail!("connection reset by peer");
        }

        if selector == IErc20::balanceOfCall::SELECTOR {
            let c = IErc20::balanceOfCall::abi_decode(data, true)?;
            let bal = self.with_state(|s| s.balances.get(&c.account).copied().unwrap_or_default());
            return Ok(IErc20::balanceOfCall::abi_encode_returns(&(bal,)));
        }
        if selector == IErc20::allowanceCall::SELECTOR {
            let c = IErc20::allowanceCall::abi_decode(data, true)?;
            return Ok(IErc20::allowanceCall::abi_encode_returns(&(self.allowance(c.owner, c.spender),)));
        }
        if selector == IBnpl::quoteCall::SELECTOR {
            let c = IBnpl::quoteCall::abi_decode(data, true)?;
            let (collateral, fee) = self.quote_for(c.purchaseAmount);
            return Ok(IBnpl::quoteCall::abi_encode_returns(&(collateral, fee)));
        }
        if selector == IBnpl::totalDueCall::SELECTOR {
            let c = IBnpl::totalDueCall::abi_decode(data, true)?;
            let due = self.with_state(|s| s.orders.get(&c.id).map(|o| o.due).unwrap_or_default());
            return Ok(IBnpl::totalDueCall::abi_encode_returns(&(due,)));
        }
        if selector == IBnpl::getOrderCall::SELECTOR {
            let c = IBnpl::getOrderCall::abi_decode(data, true)?;
            let order = self
                .with_state(|s| s.orders.get(&c.id).cloned())
                .ok_or_else(|| anyhow!("execution reverted: unknown order"))?;
            let view = IBnpl::Order {
                buyer: order.buyer,
                merchant: MERCHANT,
                principal: order.principal,
                collateral: order.collateral,
                totalFee: order.fee,
                createdAt: U256::from(1_700_000_000u64),
                dueAt: U256::from(1_702_592_000u64),
                installments: U256::from(4u64),
                nominalPrincipal: order.principal,
                nominalFee: order.fee,
                paidPrincipal: U256::ZERO,
                paidFee: U256::ZERO,
                paidInstallments: U256::ZERO,
                closed: order.due.is_zero(),
            };
            return Ok(IBnpl::getOrderCall::abi_encode_returns(&(view,)));
        }
        if selector == IBnpl::nominalInstallmentCall::SELECTOR {
            let c = IBnpl::nominalInstallmentCall::abi_decode(data, true)?;
            let order = self
                .with_state(|s| s.orders.get(&c.id).cloned())
                .ok_or_else(|| anyhow!("execution reverted: unknown order"))?;
            let parts = U256::from(4u64);
            return Ok(IBnpl::nominalInstallmentCall::abi_encode_returns(&(
                order.principal / parts,
                order.fee / parts,
            )));
        }
        if selector == IBnpl::getTiersCountCall::SELECTOR {
            return Ok(IBnpl::getTiersCountCall::abi_encode_returns(&(U256::from(TIERS.len()),)));
        }
        if selector == IBnpl::tiersCall::SELECTOR {
            let c = IBnpl::tiersCall::abi_decode(data, true)?;
            let (min_score, collateral_bps, fee_bps, max_loan) = usize::try_from(c.index)
                .ok()
                .and_then(|i| TIERS.get(i).copied())
                .ok_or_else(|| anyhow!("execution reverted: tier out of range"))?;
            let tier = IBnpl::Tier {
                minScore: U256::from(min_score),
                collateralBps: collateral_bps,
                feeBps: fee_bps,
                maxLoan: U256::from(max_loan),
            };
            return Ok(IBnpl::tiersCall::abi_encode_returns(&(tier,)));
        }
        if selector == IErc20::nameCall::SELECTOR {
            return Ok(IErc20::nameCall::abi_encode_returns(&("USD Coin".to_string(),)));
        }
        if selector == IErc20::symbolCall::SELECTOR {
            return Ok(IErc20::symbolCall::abi_encode_returns(&("USDC".to_string(),)));
        }
        if selector == IErc20::decimalsCall::SELECTOR {
            return Ok(IErc20::decimalsCall::abi_encode_returns(&(6u8,)));
        }
        if selector == IErc20::totalSupplyCall::SELECTOR {
            return Ok(IErc20::totalSupplyCall::abi_encode_returns(&(U256::from(tokens(1_000_000)),)));
        }
        bail!("unsupported read {}", call.method)
    }

    /// Apply a write's effect and return the logs it emits.
    fn execute(&self, s: &mut State, call: &ChainCall) -> Result<Vec<Log>> {
        let data = &call.calldata[..];
        let selector: [u8; 4] = data
            .get(..4)
            .ok_or_else(|| anyhow!("short calldata"))?
            .try_into()?;

        let mut logs = Vec::new();
        if selector == IErc20::approveCall::SELECTOR {
            let c = IErc20::approveCall::abi_decode(data, true)?;
            if !s.ignore_approvals {
                s.allowances.insert((self.signer, c.spender), c.amount);
            }
            let ev = IErc20::Approval {
                owner: self.signer,
                spender: c.spender,
                value: c.amount,
            };
            logs.push(Log {
                address: TOKEN,
                data: ev.encode_log_data(),
            });
        } else if selector == IBnpl::createOrderCall::SELECTOR {
            let c = IBnpl::createOrderCall::abi_decode(data, true)?;
            let id = U256::from(s.next_order_id);
            s.next_order_id += 1;
            let (collateral, fee) = self.quote_for(c.purchaseAmount);
            s.orders.insert(
                id,
                FakeOrder {
                    buyer: self.signer,
                    principal: c.purchaseAmount,
                    collateral,
                    fee,
                    due: c.purchaseAmount + fee,
                },
            );
            let ev = IBnpl::OrderCreated {
                id,
                buyer: self.signer,
                merchant: c.merchant,
                principal: c.purchaseAmount,
                collateral,
                totalFee: fee,
                dueAt: c.dueAt,
                installments: c.installments,
            };
            logs.push(Log {
                address: BNPL,
                data: ev.encode_log_data(),
            });
        } else if selector == IBnpl::repayInstallmentCall::SELECTOR {
            let c = IBnpl::repayInstallmentCall::abi_decode(data, true)?;
            let order = s.orders.get_mut(&c.id).ok_or_else(|| anyhow!("unknown order"))?;
            order.due = order.due.saturating_sub(c.amount);
            let ev = IBnpl::InstallmentPaid {
                id: c.id,
                payer: self.signer,
                amount: c.amount,
                paidPrincipal: c.amount,
                paidFee: U256::ZERO,
            };
            logs.push(Log {
                address: BNPL,
                data: ev.encode_log_data(),
            });
        } else if selector == IBnpl::repayFullCall::SELECTOR {
            let c = IBnpl::repayFullCall::abi_decode(data, true)?;
            let order = s.orders.get_mut(&c.id).ok_or_else(|| anyhow!("unknown order"))?;
            let paid = order.due;
            order.due = U256::ZERO;
            let ev = IBnpl::OrderFullyRepaid {
                id: c.id,
                payer: self.signer,
                totalPaid: paid,
                feeDiscount: U256::ZERO,
            };
            logs.push(Log {
                address: BNPL,
                data: ev.encode_log_data(),
            });
        } else if selector == IBnpl::liquidateCall::SELECTOR {
            let c = IBnpl::liquidateCall::abi_decode(data, true)?;
            let order = s.orders.get_mut(&c.id).ok_or_else(|| anyhow!("unknown order"))?;
            order.due = U256::ZERO;
            let ev = IBnpl::OrderLiquidated {
                id: c.id,
                seizedCollateral: order.collateral,
            };
            logs.push(Log {
                address: BNPL,
                data: ev.encode_log_data(),
            });
        }
        Ok(logs)
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(31_337)
    }

    async fn call(&self, call: &ChainCall) -> Result<Bytes> {
        self.read(call).map(Bytes::from)
    }

    async fn estimate_gas(&self, call: &ChainCall) -> Result<u64> {
        self.with_state(|s| {
            s.estimates.push(call.method);
            if s.fail_estimate.contains(call.method) {
                bail!("execution reverted: {} not allowed", call.method);
            }
            Ok(GAS_ESTIMATE)
        })
    }

    async fn send_transaction(&self, call: &ChainCall, gas_limit: u64) -> Result<B256> {
        let mut s = self.state.lock().unwrap();
        if s.fail_send.contains(call.method) {
            bail!("nonce too low");
        }
        s.sent.push(SentTx {
            method: call.method,
            gas_limit,
            calldata: call.calldata.clone(),
        });
        s.next_tx += 1;
        s.block += 1;
        let tx_hash = B256::left_padding_from(&s.next_tx.to_be_bytes());

        let reverted = s.revert.contains(call.method);
        let mut logs = if reverted { Vec::new() } else { self.execute(&mut s, call)? };
        if s.silent.contains(call.method) {
            logs.clear();
        }
        let block = s.block;
        for log in &logs {
            s.logs.push(ObservedLog {
                log: log.clone(),
                block_number: Some(block),
                tx_hash: Some(tx_hash),
            });
        }
        s.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                status: !reverted,
                gas_used: GAS_ESTIMATE,
                block_number: Some(block),
                logs,
            },
        );
        if s.hang_receipt.contains(call.method) {
            s.hung.insert(tx_hash);
        }
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt> {
        let (hung, receipt) = self.with_state(|s| (s.hung.contains(&tx_hash), s.receipts.get(&tx_hash).cloned()));
        if hung {
            std::future::pending::<()>().await;
        }
        receipt.ok_or_else(|| anyhow!("unknown transaction {tx_hash}"))
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>> {
        Ok(self.with_state(|s| s.receipts.get(&tx_hash).cloned()))
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.with_state(|s| s.block))
    }

    async fn logs(&self, address: Address, from_block: u64, to_block: u64) -> Result<Vec<ObservedLog>> {
        Ok(self.with_state(|s| {
            s.log_queries.push((from_block, to_block));
            s.logs
                .iter()
                .filter(|l| l.log.address == address)
                .filter(|l| l.block_number.is_some_and(|b| b >= from_block && b <= to_block))
                .cloned()
                .collect()
        }))
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Everything a ledger test needs to inspect afterwards.
pub struct Harness {
    pub chain: Arc<FakeChain>,
    pub store: Arc<InMemoryLedgerStore>,
    pub ledger: ReconciliationLedger,
}

pub fn settings() -> LedgerSettings {
    LedgerSettings {
        token_decimals: 6,
        default_merchant: MERCHANT,
        default_due_in_seconds: 30 * 24 * 3600,
        default_installments: 4,
    }
}

/// Users: `alice` linked to the signer, `bob` without a wallet,
/// `carol` linked to a wallet the signer cannot approve for.
pub fn users() -> StaticUserDirectory {
    StaticUserDirectory::from_entries([
        ("alice".to_string(), Some(SIGNER)),
        ("bob".to_string(), None),
        ("carol".to_string(), Some(OTHER_WALLET)),
    ])
}

pub fn harness_with(chain: FakeChain, receipt_timeout: Duration) -> Harness {
    let chain = Arc::new(chain);
    let store = Arc::new(InMemoryLedgerStore::new());
    let client: Arc<dyn ChainClient> = chain.clone();
    let gateway = ContractGateway::new(Arc::clone(&client), BNPL, TOKEN);
    let executor = Arc::new(TransactionExecutor::new(client, 20, receipt_timeout));
    let store_port: Arc<dyn LedgerStore> = store.clone();
    let users: Arc<dyn UserDirectory> = Arc::new(users());
    let ledger = ReconciliationLedger::new(gateway, executor, store_port, users, settings());
    Harness { chain, store, ledger }
}

pub fn harness() -> Harness {
    harness_with(FakeChain::new(), Duration::from_secs(5))
}

/// 1 token = 1_000_000 units at 6 decimals.
pub const fn tokens(n: u64) -> u64 {
    n * 1_000_000
}
