//! Low-level script helpers shared by VHTLC construction and leaf
//! restoration: x-only pubkey normalization and timelock extraction from
//! already-built scripts.

use crate::error::{Error, Result};
use bitcoin::opcodes::all::*;
use bitcoin::script::Instruction;
use bitcoin::secp256k1::PublicKey as Secp256k1PublicKey;
use bitcoin::ScriptBuf;
use bitcoin::XOnlyPublicKey;

/// Normalize a 32- or 33-byte public key to its 32-byte x-only form.
///
/// A 33-byte compressed key has its parity byte stripped; any other length
/// is a [`Error::Validation`].
pub fn normalize_pubkey(bytes: &[u8]) -> Result<XOnlyPublicKey> {
    match bytes.len() {
        32 => XOnlyPublicKey::from_slice(bytes)
            .map_err(|e| Error::validation(format!("invalid x-only pubkey: {e}"))),
        33 => {
            let full = Secp256k1PublicKey::from_slice(bytes)
                .map_err(|e| Error::validation(format!("invalid compressed pubkey: {e}")))?;
            Ok(full.x_only_public_key().0)
        }
        other => Err(Error::validation(format!(
            "public key must be 32 or 33 bytes, got {other}"
        ))),
    }
}

/// Extracts the `OP_CSV`-guarded relative [`bitcoin::Sequence`] from a script
/// built as `<sequence> OP_CSV OP_DROP ...`.
pub fn extract_sequence_from_csv_script(script: &ScriptBuf) -> Result<bitcoin::Sequence> {
    let bytes = script.to_bytes();
    let csv_index = bytes
        .windows(2)
        .position(|window| *window == [OP_CSV.to_u8(), OP_DROP.to_u8()])
        .ok_or_else(|| Error::schema("script does not contain an OP_CSV OP_DROP sequence"))?;

    let before_csv = &bytes[..csv_index];
    let push = if before_csv.len() > 1 {
        &before_csv[1..]
    } else {
        before_csv
    };

    let mut little_endian = push.to_vec();
    little_endian.reverse();

    let mut buffer = [0u8; 4];
    let start = 4usize
        .checked_sub(little_endian.len())
        .ok_or_else(|| Error::schema("CSV push wider than 4 bytes"))?;
    buffer[start..].copy_from_slice(&little_endian);

    Ok(bitcoin::Sequence::from_consensus(u32::from_be_bytes(
        buffer,
    )))
}

/// Extracts the `OP_CLTV`-guarded absolute locktime from a script built as
/// `<locktime> OP_CLTV OP_DROP ...`.
pub fn extract_locktime_from_cltv_script(script: &ScriptBuf) -> Result<u32> {
    let bytes = script.to_bytes();
    let cltv_index = bytes
        .windows(2)
        .position(|window| *window == [OP_CLTV.to_u8(), OP_DROP.to_u8()])
        .ok_or_else(|| Error::schema("script does not contain an OP_CLTV OP_DROP sequence"))?;

    let before_cltv = &bytes[..cltv_index];
    let push = if before_cltv.len() > 1 {
        &before_cltv[1..]
    } else {
        before_cltv
    };

    let mut little_endian = push.to_vec();
    little_endian.reverse();

    let mut buffer = [0u8; 4];
    let start = 4usize
        .checked_sub(little_endian.len())
        .ok_or_else(|| Error::schema("CLTV push wider than 4 bytes"))?;
    buffer[start..].copy_from_slice(&little_endian);

    Ok(u32::from_be_bytes(buffer))
}

/// Extracts every 32-byte key pushed immediately before an `OP_CHECKSIG` or
/// `OP_CHECKSIGVERIFY`, in script order. Used to recover counterparty keys
/// from a restored `refund` leaf when no other record of them survives.
pub fn extract_checksig_pubkeys(script: &ScriptBuf) -> Vec<XOnlyPublicKey> {
    let instructions: Vec<_> = script.instructions().filter_map(|inst| inst.ok()).collect();

    let mut pubkeys = Vec::new();
    for window in instructions.windows(2) {
        let (push, checksig) = (&window[0], &window[1]);
        if let Instruction::PushBytes(bytes) = push {
            if bytes.len() != 32 {
                continue;
            }
            let is_checksig = matches!(
                checksig,
                Instruction::Op(op) if *op == OP_CHECKSIG || *op == OP_CHECKSIGVERIFY
            );
            if is_checksig {
                if let Ok(pk) = XOnlyPublicKey::from_slice(bytes.as_bytes()) {
                    pubkeys.push(pk);
                }
            }
        }
    }
    pubkeys
}
