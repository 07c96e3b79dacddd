//! Balance-changing operations of one transaction.
//!
//! Fee operations come first, computed from the receipt. Trace operations
//! follow in pre-order over the call tree. A frame is reverted when it failed
//! itself, when any ancestor is reverted, or when the receipt reports failure.
//! Residual balances of accounts destroyed in the transaction are burned by
//! trailing `DESTRUCT` operations.

use alloy_primitives::{Address, U256};
use num_bigint::{BigInt, Sign};
use num_traits::{Signed, Zero};
use serde_json::{json, Map};
use tracing::warn;

use super::checksum;
use super::trace::{CallKind, CallTrace};
use crate::node::{RpcReceipt, RpcTransaction};
use crate::types::{
    AccountIdentifier, Amount, Currency, Metadata, Operation, OperationIdentifier,
    OperationStatus, OperationType,
};

/// Build the ordered operation list for one transaction.
///
/// `miner` is the block's fee recipient. Indices are contiguous from 0.
pub fn extract_operations(
    trace: &CallTrace,
    tx: &RpcTransaction,
    receipt: &RpcReceipt,
    miner: &Address,
    currency: &Currency,
) -> Vec<Operation> {
    let mut ops = OperationList::new(currency);

    let fee = to_bigint(fee_amount(tx, receipt));
    let debit = ops.push(
        OperationType::Fee,
        OperationStatus::Success,
        &tx.from,
        -fee.clone(),
        None,
        Map::new(),
    );
    ops.push(
        OperationType::Fee,
        OperationStatus::Success,
        miner,
        fee,
        Some(debit),
        Map::new(),
    );

    let receipt_error = receipt
        .failed()
        .then(|| trace.error.as_deref().unwrap_or("transaction failed"));
    let mut frames = Vec::new();
    flatten(trace, receipt_error, &mut frames);

    trace_operations(&mut ops, &frames);
    ops.into_inner()
}

/// Gas actually charged: receipt gas used times the effective price.
pub fn fee_amount(tx: &RpcTransaction, receipt: &RpcReceipt) -> U256 {
    let price = receipt
        .effective_gas_price
        .or(tx.gas_price)
        .unwrap_or_default();
    U256::from(receipt.gas_used.to::<u64>()).saturating_mul(price)
}

/// A call frame with its inherited revert state.
struct Frame<'a> {
    call: &'a CallTrace,
    kind: CallKind,
    /// Own error, else the error of the nearest failed ancestor.
    revert_error: Option<&'a str>,
}

fn flatten<'a>(call: &'a CallTrace, inherited: Option<&'a str>, out: &mut Vec<Frame<'a>>) {
    let revert_error = call.error.as_deref().or(inherited);
    out.push(Frame {
        call,
        kind: call.effective_kind(),
        revert_error,
    });
    for child in &call.calls {
        flatten(child, revert_error, out);
    }
}

fn trace_operations(ops: &mut OperationList<'_>, frames: &[Frame<'_>]) {
    // Accounts self-destructed so far, with value received since.
    let mut destroyed: Vec<(Address, BigInt)> = Vec::new();

    for frame in frames {
        let call = frame.call;
        let reverted = frame.revert_error.is_some();
        let (status, metadata) = match frame.revert_error {
            Some(err) => (OperationStatus::Reverted, error_metadata(err)),
            None => (OperationStatus::Success, Map::new()),
        };
        let op_type = frame.kind.operation_type();

        let value = if frame.kind.moves_value() {
            to_bigint(call.value())
        } else {
            BigInt::zero()
        };
        let self_transfer = call.to == Some(call.from);
        let emit = !value.is_zero() && (frame.kind == CallKind::SelfDestruct || !self_transfer);

        let mut debit = None;
        if emit {
            debit = Some(ops.push(
                op_type,
                status,
                &call.from,
                -value.clone(),
                None,
                metadata.clone(),
            ));
            if !reverted {
                adjust(&mut destroyed, &call.from, -value.clone());
            }
        }

        if frame.kind == CallKind::SelfDestruct && !reverted {
            match destroyed.iter_mut().find(|(a, _)| *a == call.from) {
                Some(entry) => entry.1 = BigInt::zero(),
                None => destroyed.push((call.from, BigInt::zero())),
            }
        }
        // Funds sent by a contract to itself on destruction are burned.
        if frame.kind == CallKind::SelfDestruct && self_transfer {
            continue;
        }

        let Some(to) = call.to else {
            continue;
        };
        if frame.kind.is_create() && !reverted {
            destroyed.retain(|(a, _)| *a != to);
        }

        if emit {
            ops.push(op_type, status, &to, value.clone(), debit, metadata);
            if !reverted {
                adjust(&mut destroyed, &to, value);
            }
        }
    }

    for (account, residual) in destroyed {
        if residual.is_zero() {
            continue;
        }
        if residual.is_negative() {
            warn!(
                "Negative residual {} for destroyed account {}",
                residual,
                checksum(&account)
            );
            continue;
        }
        ops.push(
            OperationType::Destruct,
            OperationStatus::Success,
            &account,
            -residual,
            None,
            Map::new(),
        );
    }
}

fn adjust(destroyed: &mut [(Address, BigInt)], account: &Address, delta: BigInt) {
    if let Some(entry) = destroyed.iter_mut().find(|(a, _)| a == account) {
        entry.1 += delta;
    }
}

fn error_metadata(err: &str) -> Metadata {
    let mut metadata = Map::new();
    metadata.insert("error".to_string(), json!(err));
    metadata
}

pub(crate) fn to_bigint(value: U256) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, &value.to_be_bytes::<32>())
}

/// Appends operations with gapless indices.
struct OperationList<'c> {
    currency: &'c Currency,
    ops: Vec<Operation>,
}

impl<'c> OperationList<'c> {
    fn new(currency: &'c Currency) -> Self {
        Self {
            currency,
            ops: Vec::new(),
        }
    }

    fn push(
        &mut self,
        op_type: OperationType,
        status: OperationStatus,
        account: &Address,
        amount: BigInt,
        related: Option<OperationIdentifier>,
        metadata: Metadata,
    ) -> OperationIdentifier {
        let identifier = OperationIdentifier {
            index: self.ops.len() as u64,
        };
        self.ops.push(Operation {
            operation_identifier: identifier,
            related_operations: related.into_iter().collect(),
            op_type,
            status,
            account: AccountIdentifier {
                address: checksum(account),
            },
            amount: Amount {
                value: amount.to_string(),
                currency: self.currency.clone(),
            },
            metadata,
        });
        identifier
    }

    fn into_inner(self) -> Vec<Operation> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::native_currency;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    const SENDER: &str = "0x1a4fc8eb73e2f7bc9e8a1e2e2b4bd3e35c1a7e4b";
    const MINER: &str = "0x0000000000000000000000000000000000000abc";
    const A: &str = "0x00000000000000000000000000000000000000a1";
    const B: &str = "0x00000000000000000000000000000000000000b2";
    const C: &str = "0x00000000000000000000000000000000000000c3";

    fn tx(value: u64) -> RpcTransaction {
        serde_json::from_value(json!({
            "hash": "0x47d4a3a76e13d96aa898e313ccb941966373dd9f9c668535e5a8f49c137af5b2",
            "from": SENDER,
            "to": A,
            "value": format!("0x{:x}", value),
            "gas": "0x30000",
            "gasPrice": "0x3b9aca00",
            "nonce": "0x1",
            "input": "0x"
        }))
        .unwrap()
    }

    fn receipt(status: &str, gas_used: u64) -> RpcReceipt {
        serde_json::from_value(json!({
            "transactionHash": "0x47d4a3a76e13d96aa898e313ccb941966373dd9f9c668535e5a8f49c137af5b2",
            "status": status,
            "gasUsed": format!("0x{:x}", gas_used)
        }))
        .unwrap()
    }

    fn trace(value: Value) -> CallTrace {
        serde_json::from_value(value).unwrap()
    }

    fn extract(trace_json: Value, status: &str) -> Vec<Operation> {
        let miner: Address = MINER.parse().unwrap();
        extract_operations(
            &trace(trace_json),
            &tx(0),
            &receipt(status, 21000),
            &miner,
            &native_currency(),
        )
    }

    fn summary(ops: &[Operation]) -> Vec<(u64, OperationType, OperationStatus, String, String)> {
        ops.iter()
            .map(|op| {
                (
                    op.operation_identifier.index,
                    op.op_type,
                    op.status,
                    op.account.address.to_lowercase(),
                    op.amount.value.clone(),
                )
            })
            .collect()
    }

    fn assert_contiguous(ops: &[Operation]) {
        for (i, op) in ops.iter().enumerate() {
            assert_eq!(op.operation_identifier.index, i as u64);
        }
    }

    #[test]
    fn test_plain_transfer() {
        let ops = extract(
            json!({ "type": "CALL", "from": SENDER, "to": A, "value": "0x64" }),
            "0x1",
        );

        assert_contiguous(&ops);
        assert_eq!(
            summary(&ops),
            vec![
                (0, OperationType::Fee, OperationStatus::Success, SENDER.to_string(), "-21000000000000".to_string()),
                (1, OperationType::Fee, OperationStatus::Success, MINER.to_string(), "21000000000000".to_string()),
                (2, OperationType::Call, OperationStatus::Success, SENDER.to_string(), "-100".to_string()),
                (3, OperationType::Call, OperationStatus::Success, A.to_string(), "100".to_string()),
            ]
        );
        assert_eq!(ops[1].related_operations, vec![OperationIdentifier { index: 0 }]);
        assert_eq!(ops[3].related_operations, vec![OperationIdentifier { index: 2 }]);
    }

    #[test]
    fn test_effective_gas_price_preferred() {
        let mut r = receipt("0x1", 100);
        r.effective_gas_price = Some(U256::from(7));
        assert_eq!(fee_amount(&tx(0), &r), U256::from(700));

        let r = receipt("0x1", 100);
        assert_eq!(fee_amount(&tx(0), &r), U256::from(100_000_000_000u64));
    }

    #[test]
    fn test_revert_propagates_to_descendants() {
        let ops = extract(
            json!({
                "type": "CALL", "from": SENDER, "to": A, "value": "0x5",
                "calls": [{
                    "type": "CALL", "from": A, "to": B, "value": "0x3",
                    "error": "execution reverted",
                    "calls": [{ "type": "CALL", "from": B, "to": C, "value": "0x1" }]
                }]
            }),
            "0x1",
        );

        assert_contiguous(&ops);
        let statuses: Vec<OperationStatus> = ops[2..].iter().map(|op| op.status).collect();
        assert_eq!(
            statuses,
            vec![
                OperationStatus::Success,
                OperationStatus::Success,
                OperationStatus::Reverted,
                OperationStatus::Reverted,
                OperationStatus::Reverted,
                OperationStatus::Reverted,
            ]
        );
        // The inner frame reported success but inherits its parent's error.
        assert_eq!(ops[6].metadata["error"], json!("execution reverted"));
        assert_eq!(ops[7].account.address.to_lowercase(), C);
    }

    #[test]
    fn test_failed_receipt_overrides_successful_trace() {
        let ops = extract(
            json!({
                "type": "CALL", "from": SENDER, "to": A, "value": "0x5",
                "calls": [{ "type": "CALL", "from": A, "to": B, "value": "0x2" }]
            }),
            "0x0",
        );

        assert_eq!(ops.len(), 6);
        assert_eq!(ops[0].status, OperationStatus::Success);
        assert_eq!(ops[1].status, OperationStatus::Success);
        assert!(ops[2..].iter().all(|op| op.status == OperationStatus::Reverted));
        assert_eq!(ops[2].metadata["error"], json!("transaction failed"));
    }

    #[test]
    fn test_non_value_frames_are_skipped() {
        let ops = extract(
            json!({
                "type": "CALL", "from": SENDER, "to": A, "value": "0x0",
                "calls": [
                    { "type": "DELEGATECALL", "from": A, "to": B, "value": "0x9" },
                    { "type": "STATICCALL", "from": A, "to": B },
                    { "type": "CALL", "from": A, "to": A, "value": "0x4" },
                    { "type": "CALL", "from": A, "to": C, "value": "0x2" }
                ]
            }),
            "0x1",
        );

        assert_contiguous(&ops);
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[2].account.address.to_lowercase(), A);
        assert_eq!(ops[3].account.address.to_lowercase(), C);
        assert_eq!(ops[3].amount.value, "2");
    }

    #[test]
    fn test_precompile_value_is_a_call() {
        let ops = extract(
            json!({
                "type": "CALL", "from": SENDER,
                "to": "0x0000000000000000000000000000000000000002", "value": "0x1"
            }),
            "0x1",
        );
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[3].op_type, OperationType::Call);
    }

    #[test]
    fn test_self_destruct_to_beneficiary() {
        let ops = extract(
            json!({
                "type": "CALL", "from": SENDER, "to": A, "value": "0x0",
                "calls": [{ "type": "SELFDESTRUCT", "from": A, "to": B, "value": "0x2a" }]
            }),
            "0x1",
        );

        assert_eq!(
            summary(&ops[2..]),
            vec![
                (2, OperationType::SelfDestruct, OperationStatus::Success, A.to_string(), "-42".to_string()),
                (3, OperationType::SelfDestruct, OperationStatus::Success, B.to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn test_self_destruct_to_self_burns() {
        let ops = extract(
            json!({
                "type": "CALL", "from": SENDER, "to": A, "value": "0x0",
                "calls": [{ "type": "SELFDESTRUCT", "from": A, "to": A, "value": "0x2a" }]
            }),
            "0x1",
        );

        assert_eq!(
            summary(&ops[2..]),
            vec![(2, OperationType::SelfDestruct, OperationStatus::Success, A.to_string(), "-42".to_string())]
        );
    }

    #[test]
    fn test_value_sent_to_destroyed_account_is_burned() {
        let ops = extract(
            json!({
                "type": "CALL", "from": SENDER, "to": B, "value": "0x0",
                "calls": [
                    { "type": "SELFDESTRUCT", "from": A, "to": C, "value": "0x5" },
                    { "type": "CALL", "from": B, "to": A, "value": "0x7" }
                ]
            }),
            "0x1",
        );

        assert_contiguous(&ops);
        assert_eq!(
            summary(&ops[2..]),
            vec![
                (2, OperationType::SelfDestruct, OperationStatus::Success, A.to_string(), "-5".to_string()),
                (3, OperationType::SelfDestruct, OperationStatus::Success, C.to_string(), "5".to_string()),
                (4, OperationType::Call, OperationStatus::Success, B.to_string(), "-7".to_string()),
                (5, OperationType::Call, OperationStatus::Success, A.to_string(), "7".to_string()),
                (6, OperationType::Destruct, OperationStatus::Success, A.to_string(), "-7".to_string()),
            ]
        );
    }

    #[test]
    fn test_create_resurrects_destroyed_account() {
        let ops = extract(
            json!({
                "type": "CALL", "from": SENDER, "to": B, "value": "0x0",
                "calls": [
                    { "type": "SELFDESTRUCT", "from": A, "to": C, "value": "0x0" },
                    { "type": "CREATE2", "from": B, "to": A, "value": "0x3" }
                ]
            }),
            "0x1",
        );

        assert_eq!(ops.len(), 4);
        assert_eq!(ops[3].op_type, OperationType::Create2);
        assert!(ops.iter().all(|op| op.op_type != OperationType::Destruct));
    }

    #[test]
    fn test_successful_value_is_conserved() {
        let ops = extract(
            json!({
                "type": "CALL", "from": SENDER, "to": A, "value": "0xde0b6b3a7640000",
                "calls": [
                    { "type": "CALL", "from": A, "to": B, "value": "0x1000",
                      "calls": [
                        { "type": "CREATE", "from": B, "to": C, "value": "0x10" },
                        { "type": "CALL", "from": B, "to": A, "value": "0x5", "error": "out of gas" }
                      ] },
                    { "type": "CALLCODE", "from": A, "to": C, "value": "0x20" }
                ]
            }),
            "0x1",
        );

        assert_contiguous(&ops);
        let total = ops[2..]
            .iter()
            .filter(|op| op.status == OperationStatus::Success)
            .map(|op| op.amount.value.parse::<BigInt>().unwrap())
            .fold(BigInt::zero(), |acc, v| acc + v);
        assert!(total.is_zero());
        assert_eq!(ops.iter().filter(|op| op.status == OperationStatus::Reverted).count(), 2);
    }
}
