//! The swap data model (§3): a tagged union over the three swap kinds,
//! sharing an `{id, status, type, createdAt}` prefix, plus the status sets
//! and action triggers from §4.4.

use crate::error::{Error, Result};
use bitcoin::secp256k1::XOnlyPublicKey;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwapKind {
    Submarine,
    Reverse,
    Chain,
}

impl SwapKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SwapKind::Submarine => "submarine",
            SwapKind::Reverse => "reverse",
            SwapKind::Chain => "chain",
        }
    }
}

/// Status tags shared verbatim with the provider (§4.4). Renamed field by
/// field because the wire format uses dotted identifiers that aren't valid
/// Rust idents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapStatus {
    #[serde(rename = "swap.created")]
    SwapCreated,
    #[serde(rename = "invoice.set")]
    InvoiceSet,
    #[serde(rename = "transaction.mempool")]
    TransactionMempool,
    #[serde(rename = "transaction.confirmed")]
    TransactionConfirmed,
    #[serde(rename = "transaction.server.mempool")]
    TransactionServerMempool,
    #[serde(rename = "transaction.server.confirmed")]
    TransactionServerConfirmed,
    #[serde(rename = "invoice.settled")]
    InvoiceSettled,
    #[serde(rename = "invoice.expired")]
    InvoiceExpired,
    #[serde(rename = "invoice.failedToPay")]
    InvoiceFailedToPay,
    #[serde(rename = "swap.expired")]
    SwapExpired,
    #[serde(rename = "transaction.claimed")]
    TransactionClaimed,
    #[serde(rename = "transaction.failed")]
    TransactionFailed,
    #[serde(rename = "transaction.refunded")]
    TransactionRefunded,
    #[serde(rename = "transaction.lockupFailed")]
    TransactionLockupFailed,
}

impl SwapStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SwapStatus::InvoiceSettled
                | SwapStatus::InvoiceExpired
                | SwapStatus::InvoiceFailedToPay
                | SwapStatus::SwapExpired
                | SwapStatus::TransactionClaimed
                | SwapStatus::TransactionFailed
                | SwapStatus::TransactionRefunded
                | SwapStatus::TransactionLockupFailed
        )
    }

    /// Returns the autonomous action this status triggers for a swap of the
    /// given kind, or `None` if the status is not actionable for that kind.
    pub fn actionable(self, kind: SwapKind) -> Option<ActionKind> {
        use SwapStatus::*;
        match (kind, self) {
            (SwapKind::Reverse, TransactionMempool)
            | (SwapKind::Reverse, TransactionConfirmed)
            | (SwapKind::Reverse, TransactionServerMempool)
            | (SwapKind::Reverse, TransactionServerConfirmed) => Some(ActionKind::ClaimArk),

            (SwapKind::Chain, TransactionMempool)
            | (SwapKind::Chain, TransactionConfirmed)
            | (SwapKind::Chain, TransactionServerMempool)
            | (SwapKind::Chain, TransactionServerConfirmed) => Some(ActionKind::ClaimArk),

            (SwapKind::Submarine, InvoiceFailedToPay) | (SwapKind::Submarine, SwapExpired) => {
                Some(ActionKind::RefundArk)
            }

            (SwapKind::Chain, TransactionLockupFailed) => Some(ActionKind::RefundArk),

            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    ClaimArk,
    ClaimBtc,
    RefundArk,
}

/// Fields common to every swap kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapCommon {
    pub id: String,
    pub status: SwapStatus,
    pub created_at: u64,
}

/// The VHTLC parameters and timeout tree returned by the provider for a
/// newly created swap, as raw wire fields (leaf scripts as hex) — C1
/// consumes this to rebuild the same VHTLC locally for I2 verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapTree {
    #[serde(rename = "claimLeaf")]
    pub claim_leaf: String,
    #[serde(rename = "refundLeaf")]
    pub refund_leaf: String,
    #[serde(rename = "refundWithoutReceiverLeaf")]
    pub refund_without_receiver_leaf: String,
    #[serde(rename = "unilateralClaimLeaf")]
    pub unilateral_claim_leaf: String,
    #[serde(rename = "unilateralRefundLeaf")]
    pub unilateral_refund_leaf: String,
    #[serde(rename = "unilateralRefundWithoutReceiverLeaf")]
    pub unilateral_refund_without_receiver_leaf: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmarineRequest {
    pub invoice: String,
    #[serde(rename = "refundPublicKey")]
    pub refund_public_key: XOnlyPublicKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmarineResponse {
    pub address: String,
    #[serde(rename = "expectedAmount")]
    pub expected_amount: u64,
    #[serde(rename = "claimPublicKey")]
    pub claim_public_key: XOnlyPublicKey,
    #[serde(rename = "timeoutBlockHeight")]
    pub timeout_block_height: u32,
    #[serde(rename = "swapTree")]
    pub swap_tree: SwapTree,
}

#[derive(Debug, Clone)]
pub struct SubmarineSwap {
    pub common: SwapCommon,
    pub request: SubmarineRequest,
    pub response: Option<SubmarineResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseRequest {
    #[serde(rename = "preimageHash")]
    pub preimage_hash: String,
    #[serde(rename = "claimPublicKey")]
    pub claim_public_key: XOnlyPublicKey,
    #[serde(rename = "invoiceAmount")]
    pub invoice_amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseResponse {
    pub invoice: String,
    #[serde(rename = "lockupAddress")]
    pub lockup_address: String,
    #[serde(rename = "refundPublicKey")]
    pub refund_public_key: XOnlyPublicKey,
    #[serde(rename = "onchainAmount")]
    pub onchain_amount: u64,
    #[serde(rename = "timeoutBlockHeight")]
    pub timeout_block_height: u32,
    #[serde(rename = "swapTree")]
    pub swap_tree: SwapTree,
}

#[derive(Debug, Clone)]
pub struct ReverseSwap {
    pub common: SwapCommon,
    /// Empty (`None`) for a swap restored from storage where the original
    /// in-memory preimage was lost; never synthesised (I5).
    pub preimage: Option<[u8; 32]>,
    pub request: ReverseRequest,
    pub response: Option<ReverseResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainDirection {
    ArkToBtc,
    BtcToArk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainRequest {
    pub direction: ChainDirection,
    #[serde(rename = "claimPublicKey")]
    pub claim_public_key: XOnlyPublicKey,
    #[serde(rename = "refundPublicKey")]
    pub refund_public_key: XOnlyPublicKey,
    #[serde(rename = "preimageHash")]
    pub preimage_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_lock_amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_lock_amount: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainLeg {
    #[serde(rename = "lockupAddress")]
    pub lockup_address: String,
    pub amount: u64,
    #[serde(rename = "timeoutBlockHeight")]
    pub timeout_block_height: u32,
    #[serde(rename = "swapTree")]
    pub swap_tree: SwapTree,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResponse {
    pub claim: ChainLeg,
    pub lockup: ChainLeg,
    #[serde(rename = "expectedAmount")]
    pub expected_amount: u64,
}

#[derive(Debug, Clone)]
pub struct ChainSwap {
    pub common: SwapCommon,
    pub direction: ChainDirection,
    /// Per-swap key the user controls; never reused across swaps.
    pub ephemeral_key: XOnlyPublicKey,
    pub preimage: Option<[u8; 32]>,
    pub request: ChainRequest,
    pub response: Option<ChainResponse>,
    pub fee_sats_per_byte: Option<f64>,
    pub to_address: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Swap {
    Submarine(SubmarineSwap),
    Reverse(ReverseSwap),
    Chain(ChainSwap),
}

impl Swap {
    pub fn common(&self) -> &SwapCommon {
        match self {
            Swap::Submarine(s) => &s.common,
            Swap::Reverse(s) => &s.common,
            Swap::Chain(s) => &s.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut SwapCommon {
        match self {
            Swap::Submarine(s) => &mut s.common,
            Swap::Reverse(s) => &mut s.common,
            Swap::Chain(s) => &mut s.common,
        }
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }

    pub fn status(&self) -> SwapStatus {
        self.common().status
    }

    pub fn kind(&self) -> SwapKind {
        match self {
            Swap::Submarine(_) => SwapKind::Submarine,
            Swap::Reverse(_) => SwapKind::Reverse,
            Swap::Chain(_) => SwapKind::Chain,
        }
    }

    /// Whether the required material for this swap's autonomous action is
    /// present (§4.4 restored-swap validation): a preimage for claim sides,
    /// the original invoice for submarine refund.
    pub fn has_action_material(&self, action: ActionKind) -> bool {
        match (self, action) {
            (Swap::Reverse(s), ActionKind::ClaimArk | ActionKind::ClaimBtc) => {
                s.preimage.is_some()
            }
            (Swap::Chain(s), ActionKind::ClaimArk | ActionKind::ClaimBtc) => s.preimage.is_some(),
            (Swap::Submarine(s), ActionKind::RefundArk) => !s.request.invoice.trim().is_empty(),
            (Swap::Chain(_), ActionKind::RefundArk) => true,
            _ => false,
        }
    }

    /// Converts to the JSON shape the repository persists (§6.2): a flat
    /// record tagged by `type`, everything else delegated to serde on the
    /// already wire-shaped request/response DTOs.
    pub fn to_record(&self) -> serde_json::Value {
        match self {
            Swap::Submarine(s) => json!({
                "id": s.common.id,
                "type": "submarine",
                "status": s.common.status,
                "createdAt": s.common.created_at,
                "request": s.request,
                "response": s.response,
            }),
            Swap::Reverse(s) => json!({
                "id": s.common.id,
                "type": "reverse",
                "status": s.common.status,
                "createdAt": s.common.created_at,
                "preimage": s.preimage.map(hex::encode),
                "request": s.request,
                "response": s.response,
            }),
            Swap::Chain(s) => json!({
                "id": s.common.id,
                "type": "chain",
                "status": s.common.status,
                "createdAt": s.common.created_at,
                "direction": s.direction,
                "ephemeralKey": s.ephemeral_key,
                "preimage": s.preimage.map(hex::encode),
                "request": s.request,
                "response": s.response,
                "feeSatsPerByte": s.fee_sats_per_byte,
                "toAddress": s.to_address,
            }),
        }
    }

    /// Inverse of [`Swap::to_record`]; used to restore swaps from storage at
    /// startup (§4.3) before handing them to the monitor.
    pub fn from_record(record: &serde_json::Value) -> Result<Swap> {
        let common = |r: &serde_json::Value| -> Result<SwapCommon> {
            Ok(SwapCommon {
                id: field_str(r, "id")?,
                status: serde_json::from_value(r["status"].clone())
                    .map_err(|e| Error::schema(format!("bad swap status: {e}")))?,
                created_at: r["createdAt"].as_u64().unwrap_or(0),
            })
        };

        let kind = field_str(record, "type")?;
        match kind.as_str() {
            "submarine" => Ok(Swap::Submarine(SubmarineSwap {
                common: common(record)?,
                request: serde_value(&record["request"], "submarine request")?,
                response: optional_value(&record["response"], "submarine response")?,
            })),
            "reverse" => Ok(Swap::Reverse(ReverseSwap {
                common: common(record)?,
                preimage: decode_preimage(&record["preimage"])?,
                request: serde_value(&record["request"], "reverse request")?,
                response: optional_value(&record["response"], "reverse response")?,
            })),
            "chain" => Ok(Swap::Chain(ChainSwap {
                common: common(record)?,
                direction: serde_value(&record["direction"], "chain direction")?,
                ephemeral_key: serde_value(&record["ephemeralKey"], "chain ephemeral key")?,
                preimage: decode_preimage(&record["preimage"])?,
                request: serde_value(&record["request"], "chain request")?,
                response: optional_value(&record["response"], "chain response")?,
                fee_sats_per_byte: record["feeSatsPerByte"].as_f64(),
                to_address: record["toAddress"].as_str().map(str::to_string),
            })),
            other => Err(Error::schema(format!("unknown swap type `{other}`"))),
        }
    }
}

fn field_str(record: &serde_json::Value, field: &str) -> Result<String> {
    record[field]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::schema(format!("swap record missing `{field}`")))
}

fn serde_value<T: for<'de> Deserialize<'de>>(value: &serde_json::Value, what: &str) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| Error::schema(format!("bad {what}: {e}")))
}

fn optional_value<T: for<'de> Deserialize<'de>>(
    value: &serde_json::Value,
    what: &str,
) -> Result<Option<T>> {
    if value.is_null() {
        Ok(None)
    } else {
        Ok(Some(serde_value(value, what)?))
    }
}

fn decode_preimage(value: &serde_json::Value) -> Result<Option<[u8; 32]>> {
    let Some(hex_str) = value.as_str() else {
        return Ok(None);
    };
    let bytes = hex::decode(hex_str).map_err(|e| Error::schema(format!("bad preimage hex: {e}")))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::schema("preimage must be 32 bytes"))?;
    Ok(Some(array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_key() -> XOnlyPublicKey {
        XOnlyPublicKey::from_str("18845781f631c48f1c9709e23092067d06837f30aa0cd0544ac887fe91ddd166").unwrap()
    }

    #[test]
    fn submarine_record_round_trips_without_response() {
        let swap = Swap::Submarine(SubmarineSwap {
            common: SwapCommon { id: "sub-1".to_string(), status: SwapStatus::SwapCreated, created_at: 1 },
            request: SubmarineRequest { invoice: "lnbc1...".to_string(), refund_public_key: sample_key() },
            response: None,
        });
        let restored = Swap::from_record(&swap.to_record()).unwrap();
        assert_eq!(restored.id(), "sub-1");
        assert_eq!(restored.status(), SwapStatus::SwapCreated);
        assert_eq!(restored.kind(), SwapKind::Submarine);
    }

    #[test]
    fn reverse_record_round_trips_preimage_as_hex() {
        let swap = Swap::Reverse(ReverseSwap {
            common: SwapCommon { id: "rev-1".to_string(), status: SwapStatus::TransactionMempool, created_at: 1 },
            preimage: Some([0x42; 32]),
            request: ReverseRequest {
                preimage_hash: "aa".repeat(20),
                claim_public_key: sample_key(),
                invoice_amount: 1000,
                description: None,
            },
            response: None,
        });
        let record = swap.to_record();
        assert_eq!(record["preimage"], "42".repeat(32));
        let restored = Swap::from_record(&record).unwrap();
        match restored {
            Swap::Reverse(r) => assert_eq!(r.preimage, Some([0x42; 32])),
            _ => panic!("expected reverse swap"),
        }
    }

    #[test]
    fn from_record_rejects_unknown_type() {
        let record = json!({"id": "x", "type": "bogus", "status": "swap.created", "createdAt": 0});
        assert!(Swap::from_record(&record).is_err());
    }

    #[test]
    fn status_wire_format_uses_dotted_tags() {
        let json = serde_json::to_string(&SwapStatus::InvoiceFailedToPay).unwrap();
        assert_eq!(json, "\"invoice.failedToPay\"");
        let parsed: SwapStatus = serde_json::from_str("\"transaction.lockupFailed\"").unwrap();
        assert_eq!(parsed, SwapStatus::TransactionLockupFailed);
    }

    #[test]
    fn terminal_statuses_match_spec_set() {
        for status in [
            SwapStatus::InvoiceSettled,
            SwapStatus::InvoiceExpired,
            SwapStatus::InvoiceFailedToPay,
            SwapStatus::SwapExpired,
            SwapStatus::TransactionClaimed,
            SwapStatus::TransactionFailed,
            SwapStatus::TransactionRefunded,
            SwapStatus::TransactionLockupFailed,
        ] {
            assert!(status.is_terminal());
        }
        assert!(!SwapStatus::TransactionMempool.is_terminal());
    }

    #[test]
    fn reverse_claim_is_actionable_only_on_claim_statuses() {
        assert_eq!(
            SwapStatus::TransactionMempool.actionable(SwapKind::Reverse),
            Some(ActionKind::ClaimArk)
        );
        assert_eq!(SwapStatus::InvoiceSet.actionable(SwapKind::Reverse), None);
    }

    #[test]
    fn submarine_refund_triggers_only_on_failure_statuses() {
        assert_eq!(
            SwapStatus::InvoiceFailedToPay.actionable(SwapKind::Submarine),
            Some(ActionKind::RefundArk)
        );
        assert_eq!(
            SwapStatus::TransactionMempool.actionable(SwapKind::Submarine),
            None
        );
    }
}
