//! Fixed reference vectors for seed derivation, paths and signing.

use pillar_core::constants::Network;
use pillar_core::types::{TransactionPlan, TransactionTarget, Utxo};
use pillar_tests::helpers::{REFERENCE_MNEMONIC, REFERENCE_ROOT_ADDRESS, TARGET_ADDRESS, reference_wallet};
use pillar_wallet::{KeyPathDeriver, MnemonicPolicy, TransactionBuilder, root_from_mnemonic};

const ROOT_WIF: &str = "cVA5PZZkVcgdDAEmWuiBXiLh7abCyq6amQ3gT3avwj6wtMtV3VDK";
const ROOT_TPRV: &str = "tprv8ZgxMBicQKsPdN5wuuQH5xExXChNkkyV4HLSQeHaX2ceNcUg5o8koiUopqC8zS4znezXLP6d8rauuHZ5S72RBLGxpZWVFmvWsPXovD9W3vA";
const ROOT_TPUB: &str = "tpubD6NzVbkrYhZ4Wq7joZ4sVMu56EDJv6APdawDhAKswJR3D6jSiBxLzD6fzxFtqYai64eCh1UDFRBbp2e47n5JMnHy5NFYpSMvFt2dEGmp586";
const SIGNED_HEX: &str = "01000000010ed79892705baae18a0a1db042a7347b6b2a3dac6cc90573caeaeec710f7bd29010000006b483045022100dcc08ea6c74b2d2ddb36f7dc3c8cf2e4ab45ddecdef527a87d4bcd4a5c8ff9b00220270b93d079adb9b9dc981098262c074e5084a7e3ea79938b86ca0a02bf271530012102f19b94963d08b6e553e36a13f244c177c1b868e696f01049454a846ff7c3ed3bffffffff01409c0000000000001976a91416820e3913b22035ff39a4076d20a73b7191123888ac00000000";

fn derive_address(path: &str) -> String {
    let root = root_from_mnemonic(REFERENCE_MNEMONIC, "", MnemonicPolicy::Lenient, Network::Testnet).unwrap();
    KeyPathDeriver::new()
        .derive(&root, path)
        .unwrap()
        .address(Network::Testnet)
        .to_string()
}

#[test]
fn root_key_vectors() {
    let root = root_from_mnemonic(REFERENCE_MNEMONIC, "", MnemonicPolicy::Lenient, Network::Testnet).unwrap();
    assert_eq!(root.to_wif(), ROOT_WIF);
    assert_eq!(root.to_xprv(), ROOT_TPRV);
    assert_eq!(root.to_xpub(), ROOT_TPUB);
    assert_eq!(root.address(Network::Testnet).to_string(), REFERENCE_ROOT_ADDRESS);
}

#[test]
fn root_is_stable_across_calls() {
    let roots: Vec<String> = (0..3)
        .map(|_| {
            root_from_mnemonic(REFERENCE_MNEMONIC, "", MnemonicPolicy::Lenient, Network::Testnet)
                .unwrap()
                .to_xprv()
        })
        .collect();
    assert!(roots.iter().all(|r| r == ROOT_TPRV));
}

#[test]
fn target_mnemonic_root_address() {
    let root = root_from_mnemonic("target mnemonic", "", MnemonicPolicy::Lenient, Network::Testnet).unwrap();
    assert_eq!(root.address(Network::Testnet).to_string(), TARGET_ADDRESS);
}

#[test]
fn segwit_purpose_path_vector() {
    assert_eq!(derive_address("m/49'/1/0"), "mzhBnfzkgEMpKMn7VrZCi7JQ2Sn7wwfV9w");
}

#[test]
fn bip44_receive_and_change_vectors() {
    let cases = [
        ("m/44'/0'/0'/0/0", "mrheHgyAsL496PvTWVs62zCHCbJCE6bwBU"),
        ("m/44'/0'/0'/0/1", "my9Q51F7WAEukyn4HMKDc2UZ8D8SkiPVdU"),
        ("m/44'/0'/0'/1/0", "mraHVKSGgkoKx1xCQnnca4skToALVCsFeu"),
        ("m/44'/0'/0'/1/1", "mrKZLUvTBnZFwY3gXJW8AGrotcPvJPnYYL"),
    ];
    for (path, expected) in cases {
        assert_eq!(derive_address(path), expected, "{path}");
    }
}

#[test]
fn account_level_index_vectors() {
    let expected = [
        "miVfBxLzerTXpaFcQwFaPcGACzRCFBp1zb",
        "mw41t6u54dPGUG9u5LNH4w63EXPG2hCqh1",
        "mybAueCX97uxipj7veAiD6zarquTP971ZH",
        "mwUa113C72XD2fUEp5U2kCuGkm47wgRTaR",
        "mgcZyTjAeWrFRZsFJZRW4vJqeWVmVtW4Hc",
    ];
    for (i, address) in expected.iter().enumerate() {
        assert_eq!(derive_address(&format!("m/44'/60'/0'/{i}")), *address);
    }
}

#[test]
fn signed_transaction_vector() {
    let plan = TransactionPlan {
        inputs: vec![Utxo {
            address: REFERENCE_ROOT_ADDRESS.into(),
            mint_txid: "29bdf710c7eeeaca7305c96cac3d2a6b7b34a742b01d0a8ae1aa5b709298d70e".into(),
            mint_index: 1,
            script_pub_key: "76a91414a2f1bf167a7835c98510fbe79c48d52fa16c6088ac".into(),
            value: 1_000_000,
            height: -1,
            confirmations: 0,
        }],
        outputs: vec![TransactionTarget::payment(TARGET_ADDRESS, 40_000)],
        fee: 960_000,
        is_valid: true,
    };

    let root = root_from_mnemonic(REFERENCE_MNEMONIC, "", MnemonicPolicy::Lenient, Network::Testnet).unwrap();
    let resolver = move |_: &str| Some(root.clone());
    let signed = TransactionBuilder::new(Network::Testnet).build(&plan, &resolver).unwrap();
    assert_eq!(signed.raw_hex, SIGNED_HEX);

    // The wallet's own keychain resolves the root address too.
    let wallet = reference_wallet(|_| {});
    assert_eq!(wallet.build(&plan).unwrap().raw_hex, SIGNED_HEX);
}
