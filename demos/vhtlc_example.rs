//! Builds a VHTLC address from a handful of keys and a preimage hash, then
//! prints every script-path leaf alongside the resulting Ark address. Useful
//! for sanity-checking a provider's quoted `swapTree` against what this
//! crate would derive independently (the same check `verify_chain_swap` and
//! the submarine/reverse engines run before trusting a quote).

use ark_swap_engine::vhtlc::{VhtlcOptions, VhtlcScript};
use bitcoin::hashes::{ripemd160, sha256, Hash};
use bitcoin::hex::DisplayHex;
use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey};
use bitcoin::{Network, Sequence};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let secp = Secp256k1::new();
    let keypair_from = |byte: u8| -> Keypair {
        let secret = SecretKey::from_slice(&[byte; 32]).expect("32 non-zero bytes is a valid secret key");
        Keypair::from_secret_key(&secp, &secret)
    };

    let sender = keypair_from(0x01).x_only_public_key().0;
    let receiver = keypair_from(0x02).x_only_public_key().0;
    let server = keypair_from(0x03).x_only_public_key().0;

    let preimage = [0x42u8; 32];
    let preimage_hash = ripemd160::Hash::hash(sha256::Hash::hash(&preimage).as_byte_array());

    let options = VhtlcOptions {
        sender,
        receiver,
        server,
        preimage_hash,
        refund_locktime: 800_000,
        unilateral_claim_delay: Sequence::from_height(144),
        unilateral_refund_delay: Sequence::from_height(288),
        unilateral_refund_without_receiver_delay: Sequence::from_height(432),
    };

    let vhtlc = VhtlcScript::new(options, Network::Signet)?;

    println!("address: {}", vhtlc.address().encode());
    for (name, script) in vhtlc.get_script_map() {
        println!("{name}: {}", script.as_bytes().to_lower_hex_string());
    }

    Ok(())
}
