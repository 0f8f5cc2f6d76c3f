//! Virtual Hash Time Lock Contract (VHTLC) construction.
//!
//! A VHTLC is a taproot contract with six spending leaves: the happy-path
//! collaborative claim and refund, a locktime-gated refund for when the
//! receiver disappears, and three unilateral escape hatches that need only
//! the sender's or receiver's own signature once their respective delay has
//! elapsed. See the leaf table in SPEC_FULL.md §4.1.

use crate::address::ArkAddress;
use crate::error::{Error, Result};
use crate::script;
use bitcoin::hashes::{ripemd160, Hash};
use bitcoin::opcodes::all::*;
use bitcoin::secp256k1::{Secp256k1, XOnlyPublicKey};
use bitcoin::taproot::{TaprootBuilder, TaprootSpendInfo};
use bitcoin::{Network, ScriptBuf, Sequence};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Unspendable internal key used for every VHTLC taproot output, so no
/// script-path spend can be bypassed via the key path.
pub const UNSPENDABLE_KEY: &str =
    "0250929b74c1a04954b78b4b6035e97a5e078a5a0f28ec96d547bfee9ace803ac0";

#[derive(Debug, Clone)]
struct TaprootScriptItem {
    script: ScriptBuf,
    weight: u32,
}

#[derive(Debug, Clone)]
enum TaprootTreeNode {
    Leaf { script: ScriptBuf, weight: u32 },
    Branch {
        left: Box<TaprootTreeNode>,
        right: Box<TaprootTreeNode>,
        weight: u32,
    },
}

impl TaprootTreeNode {
    fn weight(&self) -> u32 {
        match self {
            TaprootTreeNode::Leaf { weight, .. } => *weight,
            TaprootTreeNode::Branch { weight, .. } => *weight,
        }
    }
}

/// Parameters that fully determine a VHTLC's scripts, independent of
/// network: everything needed to rebuild it from a swap record alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VhtlcOptions {
    pub sender: XOnlyPublicKey,
    pub receiver: XOnlyPublicKey,
    pub server: XOnlyPublicKey,
    pub preimage_hash: ripemd160::Hash,
    pub refund_locktime: u32,
    pub unilateral_claim_delay: Sequence,
    pub unilateral_refund_delay: Sequence,
    pub unilateral_refund_without_receiver_delay: Sequence,
}

impl VhtlcOptions {
    pub fn validate(&self) -> Result<()> {
        if self.refund_locktime == 0 {
            return Err(Error::validation("refund locktime must be greater than 0"));
        }

        let delays = [
            ("unilateral claim delay", self.unilateral_claim_delay),
            ("unilateral refund delay", self.unilateral_refund_delay),
            (
                "unilateral refund without receiver delay",
                self.unilateral_refund_without_receiver_delay,
            ),
        ];
        for (name, delay) in delays {
            if !delay.is_relative_lock_time() || delay.to_consensus_u32() == 0 {
                return Err(Error::validation(format!(
                    "{name} must be a valid non-zero CSV relative lock time"
                )));
            }
        }

        // I6: refund < unilateralClaim < unilateralRefund < unilateralRefundWithoutReceiver.
        let claim = self.unilateral_claim_delay.to_consensus_u32();
        let refund = self.unilateral_refund_delay.to_consensus_u32();
        let refund_no_receiver = self.unilateral_refund_without_receiver_delay.to_consensus_u32();
        if !(self.refund_locktime < claim && claim < refund && refund < refund_no_receiver) {
            return Err(Error::validation(
                "timeouts must satisfy refund < unilateralClaim < unilateralRefund < unilateralRefundWithoutReceiver",
            ));
        }

        Ok(())
    }

    pub fn claim_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_opcode(OP_HASH160)
            .push_slice(self.preimage_hash.as_byte_array())
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_VERIFY)
            .push_x_only_key(&self.receiver)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&self.server)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    pub fn refund_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_x_only_key(&self.sender)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&self.receiver)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&self.server)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    pub fn refund_without_receiver_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_int(self.refund_locktime as i64)
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
            .push_x_only_key(&self.sender)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&self.server)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    pub fn unilateral_claim_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_opcode(OP_HASH160)
            .push_slice(self.preimage_hash.as_byte_array())
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_VERIFY)
            .push_int(self.unilateral_claim_delay.to_consensus_u32() as i64)
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP)
            .push_x_only_key(&self.receiver)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    pub fn unilateral_refund_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_int(self.unilateral_refund_delay.to_consensus_u32() as i64)
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP)
            .push_x_only_key(&self.sender)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&self.receiver)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    pub fn unilateral_refund_without_receiver_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_int(self.unilateral_refund_without_receiver_delay.to_consensus_u32() as i64)
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP)
            .push_x_only_key(&self.sender)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    fn build_taproot(&self) -> Result<TaprootSpendInfo> {
        let internal_pubkey = bitcoin::PublicKey::from_str(UNSPENDABLE_KEY)
            .context_internal("parsing unspendable internal key")?;
        let internal_key = XOnlyPublicKey::from(internal_pubkey.inner);

        // Every leaf carries equal weight today; the weighted merge still
        // keeps the tree balanced and leaves room to bias toward `claim`
        // (the common-case spend) if usage data ever motivates it.
        let scripts = vec![
            TaprootScriptItem { script: self.claim_script(), weight: 1 },
            TaprootScriptItem { script: self.refund_script(), weight: 1 },
            TaprootScriptItem { script: self.refund_without_receiver_script(), weight: 1 },
            TaprootScriptItem { script: self.unilateral_claim_script(), weight: 1 },
            TaprootScriptItem { script: self.unilateral_refund_script(), weight: 1 },
            TaprootScriptItem {
                script: self.unilateral_refund_without_receiver_script(),
                weight: 1,
            },
        ];

        let tree = Self::taproot_list_to_tree(scripts)?;
        let builder = Self::add_tree_to_builder(TaprootBuilder::new(), &tree, 0)?;

        let secp = Secp256k1::new();
        builder
            .finalize(&secp, internal_key)
            .map_err(|e| Error::Internal(anyhow::anyhow!("failed to finalize taproot: {e:?}")))
    }

    /// Weighted balanced merge: repeatedly combine the two lowest-weight
    /// nodes, following the same algorithm used for scure-btc-signer-style
    /// taproot tree construction.
    fn taproot_list_to_tree(scripts: Vec<TaprootScriptItem>) -> Result<TaprootTreeNode> {
        if scripts.is_empty() {
            return Err(Error::Internal(anyhow::anyhow!("empty script list")));
        }

        let mut nodes: Vec<TaprootTreeNode> = scripts
            .into_iter()
            .map(|item| TaprootTreeNode::Leaf {
                script: item.script,
                weight: item.weight,
            })
            .collect();

        while nodes.len() >= 2 {
            nodes.sort_by(|a, b| b.weight().cmp(&a.weight()));
            let b = nodes.pop().expect("len >= 2");
            let a = nodes.pop().expect("len >= 1 after first pop");
            let weight = a.weight() + b.weight();
            nodes.push(TaprootTreeNode::Branch {
                weight,
                left: Box::new(a),
                right: Box::new(b),
            });
        }

        Ok(nodes.into_iter().next().expect("non-empty input"))
    }

    fn add_tree_to_builder(
        builder: TaprootBuilder,
        node: &TaprootTreeNode,
        depth: u8,
    ) -> Result<TaprootBuilder> {
        match node {
            TaprootTreeNode::Leaf { script, .. } => builder
                .add_leaf(depth, script.clone())
                .map_err(|e| Error::Internal(anyhow::anyhow!("failed to add leaf: {e}"))),
            TaprootTreeNode::Branch { left, right, .. } => {
                let builder = Self::add_tree_to_builder(builder, left, depth + 1)?;
                Self::add_tree_to_builder(builder, right, depth + 1)
            }
        }
    }
}

trait ContextInternal<T> {
    fn context_internal(self, msg: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ContextInternal<T> for std::result::Result<T, E> {
    fn context_internal(self, msg: &str) -> Result<T> {
        self.map_err(|e| Error::Internal(anyhow::anyhow!("{msg}: {e}")))
    }
}

/// The built VHTLC: scripts plus the finalized taproot spend info needed to
/// produce control blocks for any leaf.
pub struct VhtlcScript {
    options: VhtlcOptions,
    taproot_spend_info: TaprootSpendInfo,
    network: Network,
}

impl VhtlcScript {
    pub fn new(options: VhtlcOptions, network: Network) -> Result<Self> {
        options.validate()?;
        let taproot_spend_info = options.build_taproot()?;
        Ok(Self {
            options,
            taproot_spend_info,
            network,
        })
    }

    pub fn options(&self) -> &VhtlcOptions {
        &self.options
    }

    pub fn taproot_spend_info(&self) -> &TaprootSpendInfo {
        &self.taproot_spend_info
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_opcode(OP_PUSHNUM_1)
            .push_slice(self.taproot_spend_info.output_key().serialize())
            .into_script()
    }

    pub fn address(&self) -> ArkAddress {
        ArkAddress::new(
            self.network,
            self.options.server,
            self.taproot_spend_info.output_key().into(),
        )
    }

    pub fn claim_script(&self) -> ScriptBuf {
        self.options.claim_script()
    }

    pub fn refund_script(&self) -> ScriptBuf {
        self.options.refund_script()
    }

    pub fn refund_without_receiver_script(&self) -> ScriptBuf {
        self.options.refund_without_receiver_script()
    }

    pub fn unilateral_claim_script(&self) -> ScriptBuf {
        self.options.unilateral_claim_script()
    }

    pub fn unilateral_refund_script(&self) -> ScriptBuf {
        self.options.unilateral_refund_script()
    }

    pub fn unilateral_refund_without_receiver_script(&self) -> ScriptBuf {
        self.options.unilateral_refund_without_receiver_script()
    }

    pub fn get_script_map(&self) -> BTreeMap<String, ScriptBuf> {
        let mut map = BTreeMap::new();
        map.insert("claim".to_string(), self.claim_script());
        map.insert("refund".to_string(), self.refund_script());
        map.insert(
            "refund_without_receiver".to_string(),
            self.refund_without_receiver_script(),
        );
        map.insert(
            "unilateral_claim".to_string(),
            self.unilateral_claim_script(),
        );
        map.insert(
            "unilateral_refund".to_string(),
            self.unilateral_refund_script(),
        );
        map.insert(
            "unilateral_refund_without_receiver".to_string(),
            self.unilateral_refund_without_receiver_script(),
        );
        map
    }

    /// Rebuilds a VHTLC purely from a provider-supplied [`crate::swap::SwapTree`]
    /// plus the pubkeys and preimage hash already known from the swap's own
    /// request/response DTOs (§4.1 restoration, used for I2 address
    /// verification). The tree carries the absolute locktime and relative
    /// delays; those aren't protocol constants; they must be parsed back out
    /// of the leaf scripts themselves.
    pub fn from_swap_tree(
        tree: &crate::swap::SwapTree,
        sender: XOnlyPublicKey,
        receiver: XOnlyPublicKey,
        server: XOnlyPublicKey,
        preimage_hash: ripemd160::Hash,
        network: Network,
    ) -> Result<Self> {
        let decode = |hex_str: &str| -> Result<ScriptBuf> {
            let bytes = hex::decode(hex_str).map_err(|e| Error::schema(format!("bad leaf hex: {e}")))?;
            Ok(ScriptBuf::from(bytes))
        };

        let refund_without_receiver = decode(&tree.refund_without_receiver_leaf)?;
        let unilateral_claim = decode(&tree.unilateral_claim_leaf)?;
        let unilateral_refund = decode(&tree.unilateral_refund_leaf)?;
        let unilateral_refund_without_receiver = decode(&tree.unilateral_refund_without_receiver_leaf)?;

        let options = VhtlcOptions {
            sender,
            receiver,
            server,
            preimage_hash,
            refund_locktime: script::extract_locktime_from_cltv_script(&refund_without_receiver)?,
            unilateral_claim_delay: script::extract_sequence_from_csv_script(&unilateral_claim)?,
            unilateral_refund_delay: script::extract_sequence_from_csv_script(&unilateral_refund)?,
            unilateral_refund_without_receiver_delay: script::extract_sequence_from_csv_script(
                &unilateral_refund_without_receiver,
            )?,
        };
        VhtlcScript::new(options, network)
    }

    pub fn tapscripts(self) -> Vec<ScriptBuf> {
        vec![
            self.claim_script(),
            self.refund_script(),
            self.refund_without_receiver_script(),
            self.unilateral_claim_script(),
            self.unilateral_refund_script(),
            self.unilateral_refund_without_receiver_script(),
        ]
    }
}

/// Relative delay encoding per BIP68: below 512 is a block count, 512 or
/// above (and a multiple of 512) is a 512-second interval count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    Blocks(u16),
    Seconds(u32),
}

impl Delay {
    pub fn to_sequence(self) -> Result<Sequence> {
        match self {
            Delay::Blocks(blocks) => {
                if blocks == 0 {
                    return Err(Error::validation("block delay must be greater than 0"));
                }
                Ok(Sequence::from_height(blocks))
            }
            Delay::Seconds(seconds) => {
                if seconds < 512 {
                    return Err(Error::validation(
                        "seconds timelock must be greater or equal to 512",
                    ));
                }
                if seconds % 512 != 0 {
                    return Err(Error::validation("seconds timelock must be multiple of 512"));
                }
                Sequence::from_seconds_ceil(seconds)
                    .map_err(|e| Error::validation(format!("invalid seconds value: {e}")))
            }
        }
    }
}

/// Timeout metadata recoverable from a provider-supplied tree of leaves
/// alone, without access to the original swap request. Never includes a
/// preimage: that can only come from the party that generated it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredTimeouts {
    pub refund_locktime: u32,
    pub unilateral_claim_delay: Sequence,
    pub unilateral_refund_delay: Sequence,
    pub unilateral_refund_without_receiver_delay: Sequence,
    pub counterparty_pubkeys: Vec<XOnlyPublicKey>,
}

/// Reconstructs timeout metadata from the four leaves that carry it. The
/// caller supplies `unilateralClaim`, `unilateralRefund`,
/// `unilateralRefundWithoutReceiver`, `refundWithoutReceiver` (for the
/// absolute locktime), and the cooperative `refund` leaf (for the
/// counterparty pubkeys); this function performs no taproot verification of
/// its own, it only parses scripts already known to belong to this swap.
pub fn restore_timeouts_from_leaves(
    unilateral_claim_script: &ScriptBuf,
    refund_without_receiver_script: &ScriptBuf,
    unilateral_refund_script: &ScriptBuf,
    unilateral_refund_without_receiver_script: &ScriptBuf,
    refund_script: &ScriptBuf,
) -> Result<RestoredTimeouts> {
    let refund_locktime = script::extract_locktime_from_cltv_script(refund_without_receiver_script)?;
    let unilateral_claim_delay = script::extract_sequence_from_csv_script(unilateral_claim_script)?;
    let unilateral_refund_delay = script::extract_sequence_from_csv_script(unilateral_refund_script)?;
    let unilateral_refund_without_receiver_delay =
        script::extract_sequence_from_csv_script(unilateral_refund_without_receiver_script)?;
    let counterparty_pubkeys = script::extract_checksig_pubkeys(refund_script);

    Ok(RestoredTimeouts {
        refund_locktime,
        unilateral_claim_delay,
        unilateral_refund_delay,
        unilateral_refund_without_receiver_delay,
        counterparty_pubkeys,
    })
}

/// `invoice = ceil((onchain - lockupMinerFee - claimMinerFee) / (1 - percentFee/100))`,
/// guarding against a non-positive denominator.
pub fn extract_invoice_amount(onchain: u64, lockup_miner_fee: u64, claim_miner_fee: u64, percent_fee: f64) -> Result<u64> {
    if !(0.0..100.0).contains(&percent_fee) {
        return Err(Error::validation("percent fee must be within [0, 100)"));
    }
    let numerator = (onchain as i64) - (lockup_miner_fee as i64) - (claim_miner_fee as i64);
    if numerator <= 0 {
        return Err(Error::validation(
            "onchain amount does not cover lockup and claim miner fees",
        ));
    }
    let denominator = 1.0 - percent_fee / 100.0;
    if denominator <= 0.0 {
        return Err(Error::validation("percent fee leaves a non-positive denominator"));
    }
    Ok((numerator as f64 / denominator).ceil() as u64)
}
