//! Event Decoder - Receipt Logs to Typed Contract Events
//!
//! Matches each log's first topic against the BNPL contract's event
//! signature hashes and decodes the payload into a tagged
//! [`DecodedEvent`]. Unknown logs become `Other`; a known signature with
//! an undecodable payload becomes `DecodeFailed`. Nothing here raises,
//! so callers pattern-match instead of probing fields.

use std::fmt;

use alloy::primitives::{Address, B256, Log, LogData, U256};
use alloy::sol_types::SolEvent;
use serde::Serialize;

use crate::domain::abi::IBnpl;
use crate::ports::chain_client::TxReceipt;

/// Events the BNPL contract emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
  OrderCreated,
  InstallmentPaid,
  OrderFullyRepaid,
  OrderLiquidated,
  CreditScoreUpdated,
  LiquidityFunded,
  LiquidityWithdrawn,
}

impl EventKind {
  pub const ALL: [EventKind; 7] = [
    Self::OrderCreated,
    Self::InstallmentPaid,
    Self::OrderFullyRepaid,
    Self::OrderLiquidated,
    Self::CreditScoreUpdated,
    Self::LiquidityFunded,
    Self::LiquidityWithdrawn,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Self::OrderCreated => "OrderCreated",
      Self::InstallmentPaid => "InstallmentPaid",
      Self::OrderFullyRepaid => "OrderFullyRepaid",
      Self::OrderLiquidated => "OrderLiquidated",
      Self::CreditScoreUpdated => "CreditScoreUpdated",
      Self::LiquidityFunded => "LiquidityFunded",
      Self::LiquidityWithdrawn => "LiquidityWithdrawn",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|k| k.name() == name)
  }

  /// keccak256 of the canonical event signature (topic 0).
  pub fn signature_hash(self) -> B256 {
    match self {
      Self::OrderCreated => IBnpl::OrderCreated::SIGNATURE_HASH,
      Self::InstallmentPaid => IBnpl::InstallmentPaid::SIGNATURE_HASH,
      Self::OrderFullyRepaid => IBnpl::OrderFullyRepaid::SIGNATURE_HASH,
      Self::OrderLiquidated => IBnpl::OrderLiquidated::SIGNATURE_HASH,
      Self::CreditScoreUpdated => IBnpl::CreditScoreUpdated::SIGNATURE_HASH,
      Self::LiquidityFunded => IBnpl::LiquidityFunded::SIGNATURE_HASH,
      Self::LiquidityWithdrawn => IBnpl::LiquidityWithdrawn::SIGNATURE_HASH,
    }
  }

  pub fn from_topic(topic0: B256) -> Option<Self> {
    Self::ALL.into_iter().find(|k| k.signature_hash() == topic0)
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DecodedEvent {
  OrderCreated {
    id: U256,
    buyer: Address,
    merchant: Address,
    principal: U256,
    collateral: U256,
    total_fee: U256,
    due_at: U256,
    installments: U256,
  },
  InstallmentPaid {
    id: U256,
    payer: Address,
    amount: U256,
    paid_principal: U256,
    paid_fee: U256,
  },
  OrderFullyRepaid {
    id: U256,
    payer: Address,
    total_paid: U256,
    fee_discount: U256,
  },
  OrderLiquidated {
    id: U256,
    seized_collateral: U256,
  },
  CreditScoreUpdated {
    who: Address,
    old_score: u16,
    new_score: u16,
  },
  LiquidityFunded {
    funder: Address,
    amount: U256,
  },
  LiquidityWithdrawn {
    to: Address,
    amount: U256,
  },
  /// A log from another contract or with an unknown signature.
  Other { address: Address, topic0: Option<B256> },
  /// A known signature whose payload did not decode.
  DecodeFailed { kind: EventKind, reason: String },
}

impl DecodedEvent {
  pub fn kind(&self) -> Option<EventKind> {
    Some(match self {
      Self::OrderCreated { .. } => EventKind::OrderCreated,
      Self::InstallmentPaid { .. } => EventKind::InstallmentPaid,
      Self::OrderFullyRepaid { .. } => EventKind::OrderFullyRepaid,
      Self::OrderLiquidated { .. } => EventKind::OrderLiquidated,
      Self::CreditScoreUpdated { .. } => EventKind::CreditScoreUpdated,
      Self::LiquidityFunded { .. } => EventKind::LiquidityFunded,
      Self::LiquidityWithdrawn { .. } => EventKind::LiquidityWithdrawn,
      Self::Other { .. } | Self::DecodeFailed { .. } => return None,
    })
  }

  /// The order the event refers to, for order-scoped events.
  pub fn order_id(&self) -> Option<U256> {
    match self {
      Self::OrderCreated { id, .. }
      | Self::InstallmentPaid { id, .. }
      | Self::OrderFullyRepaid { id, .. }
      | Self::OrderLiquidated { id, .. } => Some(*id),
      _ => None,
    }
  }
}

/// Decodes logs emitted by one deployed BNPL contract.
#[derive(Debug, Clone, Copy)]
pub struct EventDecoder {
  contract: Address,
}

impl EventDecoder {
  pub fn new(contract: Address) -> Self {
    Self { contract }
  }

  pub fn contract(&self) -> Address {
    self.contract
  }

  pub fn decode_log(&self, log: &Log) -> DecodedEvent {
    let topic0 = log.data.topics().first().copied();
    if log.address != self.contract {
      return DecodedEvent::Other {
        address: log.address,
        topic0,
      };
    }
    let Some(kind) = topic0.and_then(EventKind::from_topic) else {
      return DecodedEvent::Other {
        address: log.address,
        topic0,
      };
    };
    decode_known(kind, &log.data).unwrap_or_else(|e| DecodedEvent::DecodeFailed {
      kind,
      reason: e.to_string(),
    })
  }

  pub fn decode_receipt(&self, receipt: &TxReceipt) -> Vec<DecodedEvent> {
    receipt.logs.iter().map(|log| self.decode_log(log)).collect()
  }

  /// First log in the receipt that decodes as `kind`.
  pub fn find_event(&self, receipt: &TxReceipt, kind: EventKind) -> Option<DecodedEvent> {
    receipt
      .logs
      .iter()
      .map(|log| self.decode_log(log))
      .find(|ev| ev.kind() == Some(kind))
  }

  /// Name-based lookup. Unknown names find nothing.
  pub fn find_event_by_name(&self, receipt: &TxReceipt, name: &str) -> Option<DecodedEvent> {
    EventKind::from_name(name).and_then(|kind| self.find_event(receipt, kind))
  }

  /// Order id assigned by a confirmed `createOrder`.
  pub fn created_order_id(&self, receipt: &TxReceipt) -> Option<U256> {
    self
      .find_event(receipt, EventKind::OrderCreated)
      .and_then(|ev| ev.order_id())
  }
}

fn decode_known(kind: EventKind, data: &LogData) -> Result<DecodedEvent, alloy::sol_types::Error> {
  let event = match kind {
    EventKind::OrderCreated => {
      let e = IBnpl::OrderCreated::decode_log_data(data, true)?;
      DecodedEvent::OrderCreated {
        id: e.id,
        buyer: e.buyer,
        merchant: e.merchant,
        principal: e.principal,
        collateral: e.collateral,
        total_fee: e.totalFee,
        due_at: e.dueAt,
        installments: e.installments,
      }
    }
    EventKind::InstallmentPaid => {
      let e = IBnpl::InstallmentPaid::decode_log_data(data, true)?;
      DecodedEvent::InstallmentPaid {
        id: e.id,
        payer: e.payer,
        amount: e.amount,
        paid_principal: e.paidPrincipal,
        paid_fee: e.paidFee,
      }
    }
    EventKind::OrderFullyRepaid => {
      let e = IBnpl::OrderFullyRepaid::decode_log_data(data, true)?;
      DecodedEvent::OrderFullyRepaid {
        id: e.id,
        payer: e.payer,
        total_paid: e.totalPaid,
        fee_discount: e.feeDiscount,
      }
    }
    EventKind::OrderLiquidated => {
      let e = IBnpl::OrderLiquidated::decode_log_data(data, true)?;
      DecodedEvent::OrderLiquidated {
        id: e.id,
        seized_collateral: e.seizedCollateral,
      }
    }
    EventKind::CreditScoreUpdated => {
      let e = IBnpl::CreditScoreUpdated::decode_log_data(data, true)?;
      DecodedEvent::CreditScoreUpdated {
        who: e.who,
        old_score: e.oldScore,
        new_score: e.newScore,
      }
    }
    EventKind::LiquidityFunded => {
      let e = IBnpl::LiquidityFunded::decode_log_data(data, true)?;
      DecodedEvent::LiquidityFunded {
        funder: e.funder,
        amount: e.amount,
      }
    }
    EventKind::LiquidityWithdrawn => {
      let e = IBnpl::LiquidityWithdrawn::decode_log_data(data, true)?;
      DecodedEvent::LiquidityWithdrawn {
        to: e.to,
        amount: e.amount,
      }
    }
  };
  Ok(event)
}

#[cfg(test)]
mod tests {
  use super::*;
  use alloy::primitives::{Bytes, address};

  const BNPL: Address = address!("00000000000000000000000000000000000000b1");

  fn receipt(logs: Vec<Log>) -> TxReceipt {
    TxReceipt {
      tx_hash: B256::repeat_byte(1),
      status: true,
      gas_used: 90_000,
      block_number: Some(10),
      logs,
    }
  }

  fn order_created(id: u64) -> Log {
    let ev = IBnpl::OrderCreated {
      id: U256::from(id),
      buyer: Address::repeat_byte(0xaa),
      merchant: Address::repeat_byte(0xbb),
      principal: U256::from(1_000_000_000u64),
      collateral: U256::from(400_000_000u64),
      totalFee: U256::from(100_000_000u64),
      dueAt: U256::from(1_800_000_000u64),
      installments: U256::from(3u64),
    };
    Log {
      address: BNPL,
      data: ev.encode_log_data(),
    }
  }

  #[test]
  fn test_finds_order_created_id() {
    let decoder = EventDecoder::new(BNPL);
    let r = receipt(vec![order_created(42)]);
    assert_eq!(decoder.created_order_id(&r), Some(U256::from(42u64)));
    assert!(decoder.find_event_by_name(&r, "OrderCreated").is_some());
  }

  #[test]
  fn test_missing_event_is_none() {
    let decoder = EventDecoder::new(BNPL);
    assert_eq!(decoder.created_order_id(&receipt(vec![])), None);
    assert!(decoder.find_event_by_name(&receipt(vec![order_created(1)]), "NoSuchEvent").is_none());
  }

  #[test]
  fn test_foreign_contract_log_is_other() {
    let decoder = EventDecoder::new(BNPL);
    let mut log = order_created(7);
    log.address = Address::repeat_byte(0x99);
    assert!(matches!(decoder.decode_log(&log), DecodedEvent::Other { .. }));
  }

  #[test]
  fn test_truncated_payload_is_decode_failed() {
    let decoder = EventDecoder::new(BNPL);
    let good = order_created(7);
    let data = LogData::new_unchecked(good.data.topics().to_vec(), Bytes::from(vec![0u8; 5]));
    let log = Log { address: BNPL, data };
    assert!(matches!(
      decoder.decode_log(&log),
      DecodedEvent::DecodeFailed {
        kind: EventKind::OrderCreated,
        ..
      }
    ));
  }

  #[test]
  fn test_kind_name_round_trip() {
    for kind in EventKind::ALL {
      assert_eq!(EventKind::from_name(kind.name()), Some(kind));
      assert_eq!(EventKind::from_topic(kind.signature_hash()), Some(kind));
    }
  }
}
