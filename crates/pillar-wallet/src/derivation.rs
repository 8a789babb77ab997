//! BIP-32 key derivation, path parsing and role templates.
//!
//! Paths are `/`-separated child indices with an optional leading `m`. A
//! trailing `'`, `h` or `H` marks a hardened segment. Indices are zero-based
//! and must lie in `0..2^31` for both segment kinds.

use std::fmt;
use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1, SecretKey};
use bitcoin::{Address, PrivateKey, PublicKey, ScriptBuf};

use pillar_core::constants::{BIP44_PURPOSE, HARDENED_OFFSET, Network};
use pillar_core::error::{DerivationError, SeedError};

use crate::seed::Seed;

/// A parsed derivation path.
///
/// Absolute paths (leading `m`) may only be applied to a master key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyPath {
    absolute: bool,
    children: Vec<ChildNumber>,
}

impl KeyPath {
    /// The master path `m`.
    pub fn master() -> Self {
        Self {
            absolute: true,
            children: Vec::new(),
        }
    }

    pub fn relative(children: Vec<ChildNumber>) -> Self {
        Self {
            absolute: false,
            children,
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn children(&self) -> &[ChildNumber] {
        &self.children
    }

    /// Append `other`'s segments to this path.
    pub fn extend(&self, other: &[ChildNumber]) -> Self {
        let mut children = self.children.clone();
        children.extend_from_slice(other);
        Self {
            absolute: self.absolute,
            children,
        }
    }

    /// BIP-44 account path `m/44'/coin'/account'`.
    pub fn bip44_account(coin_type: u32, account: u32) -> Result<Self, DerivationError> {
        Ok(Self {
            absolute: true,
            children: vec![
                hardened(BIP44_PURPOSE)?,
                hardened(coin_type)?,
                hardened(account)?,
            ],
        })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if self.absolute {
            f.write_str("m")?;
            first = false;
        }
        for child in &self.children {
            if !first {
                f.write_str("/")?;
            }
            first = false;
            match child {
                ChildNumber::Normal { index } => write!(f, "{index}")?,
                ChildNumber::Hardened { index } => write!(f, "{index}'")?,
            }
        }
        Ok(())
    }
}

impl FromStr for KeyPath {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DerivationError::EmptyPath);
        }
        let mut segments = s.split('/').peekable();
        let absolute = matches!(segments.peek(), Some(&"m") | Some(&"M"));
        if absolute {
            segments.next();
        }
        let children = segments.map(parse_segment).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { absolute, children })
    }
}

fn split_hardened(segment: &str) -> (&str, bool) {
    match segment
        .strip_suffix('\'')
        .or_else(|| segment.strip_suffix('h'))
        .or_else(|| segment.strip_suffix('H'))
    {
        Some(rest) => (rest, true),
        None => (segment, false),
    }
}

fn parse_segment(segment: &str) -> Result<ChildNumber, DerivationError> {
    let (digits, is_hardened) = split_hardened(segment.trim());
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DerivationError::InvalidSegment(segment.to_string()));
    }
    let index: u64 = digits
        .parse()
        .map_err(|_| DerivationError::InvalidSegment(segment.to_string()))?;
    child_number(index, is_hardened)
}

fn child_number(index: u64, is_hardened: bool) -> Result<ChildNumber, DerivationError> {
    let kind = if is_hardened { "hardened" } else { "normal" };
    if index >= u64::from(HARDENED_OFFSET) {
        return Err(DerivationError::IndexOutOfRange { index, kind });
    }
    // Bounded by the check above.
    let index = index as u32;
    let child = if is_hardened {
        ChildNumber::from_hardened_idx(index)
    } else {
        ChildNumber::from_normal_idx(index)
    };
    child.map_err(|_| DerivationError::IndexOutOfRange {
        index: u64::from(index),
        kind,
    })
}

fn hardened(index: u32) -> Result<ChildNumber, DerivationError> {
    child_number(u64::from(index), true)
}

fn normal(index: u32) -> Result<ChildNumber, DerivationError> {
    child_number(u64::from(index), false)
}

/// Which side of a connection key pair a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Source identity, published as `A`.
    Source,
    /// Target identity, published as `Ad`.
    Target,
}

impl Role {
    pub fn index(self) -> u32 {
        match self {
            Self::Source => 0,
            Self::Target => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateSegment {
    Fixed(ChildNumber),
    Role { hardened: bool },
    Index { hardened: bool },
}

/// A path with one `{role}` slot and one `{index}` slot, e.g. `m/1'/{role}/{index}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    absolute: bool,
    segments: Vec<TemplateSegment>,
}

impl PathTemplate {
    /// Substitute role and index, producing a concrete path.
    pub fn instantiate(&self, role: Role, index: u32) -> Result<KeyPath, DerivationError> {
        let children = self
            .segments
            .iter()
            .map(|segment| match segment {
                TemplateSegment::Fixed(child) => Ok(*child),
                TemplateSegment::Role { hardened: true } => hardened(role.index()),
                TemplateSegment::Role { hardened: false } => normal(role.index()),
                TemplateSegment::Index { hardened: true } => hardened(index),
                TemplateSegment::Index { hardened: false } => normal(index),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeyPath {
            absolute: self.absolute,
            children,
        })
    }
}

impl FromStr for PathTemplate {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DerivationError::EmptyPath);
        }
        let mut parts = s.split('/').peekable();
        let absolute = matches!(parts.peek(), Some(&"m") | Some(&"M"));
        if absolute {
            parts.next();
        }

        let mut segments = Vec::new();
        let (mut roles, mut indices) = (0, 0);
        for part in parts {
            let (body, is_hardened) = split_hardened(part.trim());
            let segment = match body {
                "{role}" => {
                    roles += 1;
                    TemplateSegment::Role { hardened: is_hardened }
                }
                "{index}" => {
                    indices += 1;
                    TemplateSegment::Index { hardened: is_hardened }
                }
                other if other.contains('{') || other.contains('}') => {
                    return Err(DerivationError::InvalidTemplate(format!(
                        "unknown placeholder {other}"
                    )));
                }
                _ => TemplateSegment::Fixed(parse_segment(part)?),
            };
            segments.push(segment);
        }

        if roles != 1 || indices != 1 {
            return Err(DerivationError::InvalidTemplate(format!(
                "{s}: expected exactly one {{role}} and one {{index}}"
            )));
        }
        Ok(Self { absolute, segments })
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if self.absolute {
            f.write_str("m")?;
            first = false;
        }
        for segment in &self.segments {
            if !first {
                f.write_str("/")?;
            }
            first = false;
            match segment {
                TemplateSegment::Fixed(ChildNumber::Normal { index }) => write!(f, "{index}")?,
                TemplateSegment::Fixed(ChildNumber::Hardened { index }) => write!(f, "{index}'")?,
                TemplateSegment::Role { hardened } => {
                    write!(f, "{{role}}{}", if *hardened { "'" } else { "" })?
                }
                TemplateSegment::Index { hardened } => {
                    write!(f, "{{index}}{}", if *hardened { "'" } else { "" })?
                }
            }
        }
        Ok(())
    }
}

/// A private extended key together with the path it was derived along.
///
/// Immutable once derived; every derivation produces a new value.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedKey {
    xpriv: Xpriv,
    xpub: Xpub,
    path: KeyPath,
}

impl ExtendedKey {
    pub fn depth(&self) -> u8 {
        self.xpriv.depth
    }

    pub fn is_master(&self) -> bool {
        self.xpriv.depth == 0
    }

    /// Absolute path from the master key.
    pub fn path(&self) -> &KeyPath {
        &self.path
    }

    pub fn secret_key(&self) -> SecretKey {
        self.xpriv.private_key
    }

    pub fn private_key(&self) -> PrivateKey {
        self.xpriv.to_priv()
    }

    /// Compressed public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.xpub.public_key)
    }

    /// Compressed public key, hex-encoded.
    pub fn public_key_hex(&self) -> String {
        self.public_key().to_string()
    }

    pub fn to_wif(&self) -> String {
        self.xpriv.to_priv().to_wif()
    }

    /// Base58 extended private key (`xprv`/`tprv`).
    pub fn to_xprv(&self) -> String {
        self.xpriv.to_string()
    }

    /// Base58 extended public key (`xpub`/`tpub`).
    pub fn to_xpub(&self) -> String {
        self.xpub.to_string()
    }

    /// Legacy P2PKH address of this key on `network`.
    pub fn address(&self, network: Network) -> Address {
        Address::p2pkh(self.public_key().pubkey_hash(), network.to_bitcoin())
    }

    /// The P2PKH locking script this key can spend.
    pub fn p2pkh_script(&self) -> ScriptBuf {
        ScriptBuf::new_p2pkh(&self.public_key().pubkey_hash())
    }

    /// [`p2pkh_script`](Self::p2pkh_script), hex-encoded as indexers report it.
    pub fn p2pkh_script_hex(&self) -> String {
        hex::encode(self.p2pkh_script().as_bytes())
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("path", &self.path.to_string())
            .field("xpub", &self.xpub.to_string())
            .field("xpriv", &"[REDACTED]")
            .finish()
    }
}

/// Derives child keys. Holds the secp256k1 context so it is built once.
#[derive(Clone)]
pub struct KeyPathDeriver {
    secp: Secp256k1<All>,
}

impl KeyPathDeriver {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    /// BIP-32 master key for `seed`, encoded for `network`.
    pub fn master(&self, seed: &Seed, network: Network) -> Result<ExtendedKey, SeedError> {
        let xpriv = Xpriv::new_master(network.to_bitcoin(), seed.as_bytes())
            .map_err(|e| SeedError::MasterKey(e.to_string()))?;
        Ok(ExtendedKey {
            xpub: Xpub::from_priv(&self.secp, &xpriv),
            xpriv,
            path: KeyPath::master(),
        })
    }

    /// Derive along a textual path.
    pub fn derive(&self, key: &ExtendedKey, path: &str) -> Result<ExtendedKey, DerivationError> {
        let path: KeyPath = path.parse()?;
        self.derive_path(key, &path)
    }

    /// Derive along a parsed path. Absolute paths require a master key.
    pub fn derive_path(&self, key: &ExtendedKey, path: &KeyPath) -> Result<ExtendedKey, DerivationError> {
        if path.is_absolute() && !key.is_master() {
            return Err(DerivationError::NotMaster { depth: key.depth() });
        }
        self.derive_children(key, path.children())
    }

    /// Derive a relative sequence of children from `key`.
    pub fn derive_children(
        &self,
        key: &ExtendedKey,
        children: &[ChildNumber],
    ) -> Result<ExtendedKey, DerivationError> {
        if children.is_empty() {
            return Ok(key.clone());
        }
        let xpriv = key
            .xpriv
            .derive_priv(&self.secp, &children)
            .map_err(|e| DerivationError::ChildDerivation(e.to_string()))?;
        Ok(ExtendedKey {
            xpub: Xpub::from_priv(&self.secp, &xpriv),
            xpriv,
            path: key.path.extend(children),
        })
    }

    /// Both role keys of a template at `index`.
    pub fn derive_role_pair(
        &self,
        root: &ExtendedKey,
        template: &PathTemplate,
        index: u32,
    ) -> Result<(ExtendedKey, ExtendedKey), DerivationError> {
        let source = self.derive_path(root, &template.instantiate(Role::Source, index)?)?;
        let target = self.derive_path(root, &template.instantiate(Role::Target, index)?)?;
        Ok((source, target))
    }
}

impl Default for KeyPathDeriver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyPathDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPathDeriver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{MnemonicPolicy, root_from_mnemonic};

    fn root() -> ExtendedKey {
        root_from_mnemonic("some super random words", "", MnemonicPolicy::Lenient, Network::Testnet).unwrap()
    }

    fn addr(deriver: &KeyPathDeriver, path: &str) -> String {
        deriver.derive(&root(), path).unwrap().address(Network::Testnet).to_string()
    }

    #[test]
    fn root_serializations() {
        let root = root();
        assert_eq!(root.address(Network::Testnet).to_string(), "mhQ51TfiyTdwxYDq42Wrz1LvLY7PbSEJ9w");
        assert_eq!(
            root.to_xprv(),
            "tprv8ZgxMBicQKsPdN5wuuQH5xExXChNkkyV4HLSQeHaX2ceNcUg5o8koiUopqC8zS4znezXLP6d8rauuHZ5S72RBLGxpZWVFmvWsPXovD9W3vA"
        );
        assert_eq!(
            root.to_xpub(),
            "tpubD6NzVbkrYhZ4Wq7joZ4sVMu56EDJv6APdawDhAKswJR3D6jSiBxLzD6fzxFtqYai64eCh1UDFRBbp2e47n5JMnHy5NFYpSMvFt2dEGmp586"
        );
        assert_eq!(root.path().to_string(), "m");
    }

    #[test]
    fn reference_addresses() {
        let d = KeyPathDeriver::new();
        assert_eq!(addr(&d, "m/49'/1/0"), "mzhBnfzkgEMpKMn7VrZCi7JQ2Sn7wwfV9w");
        assert_eq!(addr(&d, "m/44'/0'/0'/0/0"), "mrheHgyAsL496PvTWVs62zCHCbJCE6bwBU");
        assert_eq!(addr(&d, "m/44'/0'/0'/1/1"), "mrKZLUvTBnZFwY3gXJW8AGrotcPvJPnYYL");
        assert_eq!(addr(&d, "m/44'/60'/0'/3"), "mwUa113C72XD2fUEp5U2kCuGkm47wgRTaR");
    }

    #[test]
    fn hardened_suffixes_are_equivalent() {
        let d = KeyPathDeriver::new();
        assert_eq!(addr(&d, "m/44h/0H/0'/0/0"), "mrheHgyAsL496PvTWVs62zCHCbJCE6bwBU");
    }

    #[test]
    fn relative_derivation_matches_absolute() {
        let d = KeyPathDeriver::new();
        let account = d.derive(&root(), "m/44'/0'/0'").unwrap();
        let child = d.derive(&account, "0/1").unwrap();
        assert_eq!(child.address(Network::Testnet).to_string(), "my9Q51F7WAEukyn4HMKDc2UZ8D8SkiPVdU");
        assert_eq!(child.path().to_string(), "m/44'/0'/0'/0/1");
        assert_eq!(child.depth(), 5);
    }

    #[test]
    fn absolute_path_on_child_is_rejected() {
        let d = KeyPathDeriver::new();
        let child = d.derive(&root(), "m/1").unwrap();
        assert_eq!(d.derive(&child, "m/0").unwrap_err(), DerivationError::NotMaster { depth: 1 });
    }

    #[test]
    fn master_path_returns_same_key() {
        let d = KeyPathDeriver::new();
        let root = root();
        assert_eq!(d.derive(&root, "m").unwrap(), root);
    }

    #[test]
    fn path_errors() {
        assert_eq!("".parse::<KeyPath>().unwrap_err(), DerivationError::EmptyPath);
        assert!(matches!("m/x".parse::<KeyPath>(), Err(DerivationError::InvalidSegment(_))));
        assert!(matches!("m//1".parse::<KeyPath>(), Err(DerivationError::InvalidSegment(_))));
        assert!(matches!("m/-1".parse::<KeyPath>(), Err(DerivationError::InvalidSegment(_))));
        assert_eq!(
            "m/2147483648".parse::<KeyPath>().unwrap_err(),
            DerivationError::IndexOutOfRange { index: 2_147_483_648, kind: "normal" }
        );
        assert_eq!(
            "m/2147483648'".parse::<KeyPath>().unwrap_err(),
            DerivationError::IndexOutOfRange { index: 2_147_483_648, kind: "hardened" }
        );
        assert!("m/2147483647'".parse::<KeyPath>().is_ok());
    }

    #[test]
    fn path_display_roundtrip() {
        let path: KeyPath = "m/44h/1'/0'/1/7".parse().unwrap();
        assert_eq!(path.to_string(), "m/44'/1'/0'/1/7");
        let rel: KeyPath = "0/3".parse().unwrap();
        assert!(!rel.is_absolute());
        assert_eq!(rel.to_string(), "0/3");
    }

    #[test]
    fn bip44_account_path() {
        assert_eq!(KeyPath::bip44_account(1, 2).unwrap().to_string(), "m/44'/1'/2'");
    }

    #[test]
    fn template_instantiates_both_roles() {
        let t: PathTemplate = "m/1'/{role}/{index}".parse().unwrap();
        assert_eq!(t.instantiate(Role::Source, 9).unwrap().to_string(), "m/1'/0/9");
        assert_eq!(t.instantiate(Role::Target, 9).unwrap().to_string(), "m/1'/1/9");
        assert_eq!(t.to_string(), "m/1'/{role}/{index}");
    }

    #[test]
    fn hardened_template_slots() {
        let t: PathTemplate = "m/7'/{role}'/{index}h".parse().unwrap();
        assert_eq!(t.instantiate(Role::Target, 3).unwrap().to_string(), "m/7'/1'/3'");
    }

    #[test]
    fn template_errors() {
        for bad in ["m/1'/{index}", "m/{role}/{role}/{index}", "m/{role}/{index}/{other}"] {
            assert!(
                matches!(bad.parse::<PathTemplate>(), Err(DerivationError::InvalidTemplate(_))),
                "{bad}"
            );
        }
        let t: PathTemplate = "m/{role}/{index}".parse().unwrap();
        assert!(matches!(
            t.instantiate(Role::Source, HARDENED_OFFSET),
            Err(DerivationError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn role_pair_keys_differ() {
        let d = KeyPathDeriver::new();
        let t: PathTemplate = "m/1'/{role}/{index}".parse().unwrap();
        let (a, ad) = d.derive_role_pair(&root(), &t, 0).unwrap();
        assert_ne!(a.public_key_hex(), ad.public_key_hex());
        assert_eq!(a.public_key_hex().len(), 66);
    }

    #[test]
    fn debug_hides_private_key() {
        let root = root();
        let shown = format!("{root:?}");
        assert!(!shown.contains(&root.to_xprv()));
        assert!(shown.contains("tpub"));
    }

    #[test]
    fn root_script_hex() {
        assert_eq!(root().p2pkh_script_hex(), "76a91414a2f1bf167a7835c98510fbe79c48d52fa16c6088ac");
    }
}
