//! pillar-cli — command-line front end for the Pillar key and transaction engine.
//!
//! The wallet secret comes from `--seed-hex`, the `PILLAR_MNEMONIC`
//! environment variable, or an interactive prompt, in that order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use pillar_core::constants::Network;
use pillar_core::types::{SpeedTier, TransactionTarget, Utxo};
use pillar_wallet::{
    KeyGenStrategy, MnemonicPolicy, PoolRequest, Seed, SendOutcome, Wallet, WalletConfig,
};

/// Pillar key derivation and UTXO transaction tool.
#[derive(Parser)]
#[command(name = "pillar-cli")]
#[command(version, about = "Deterministic keys and transactions for Pillar wallets")]
struct Cli {
    /// Network (mainnet or testnet). Overrides PILLAR_NETWORK.
    #[arg(long, global = true)]
    network: Option<Network>,

    /// Mnemonic validation (lenient or strict). Overrides PILLAR_MNEMONIC_POLICY.
    #[arg(long, global = true)]
    mnemonic_policy: Option<MnemonicPolicy>,

    /// Hex-encoded BIP-32 seed to use instead of a mnemonic.
    #[arg(long, global = true)]
    seed_hex: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log format (text or json).
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the address and keys for a path or receive index.
    Address(AddressArgs),
    /// Pre-generate connection key pairs.
    Keypairs(KeypairsArgs),
    /// Run coin selection over a UTXO file.
    Plan(PlanArgs),
    /// Select, sign and optionally broadcast a payment.
    Send(SendArgs),
}

#[derive(Args)]
struct AddressArgs {
    /// Derivation path, e.g. m/44'/1'/0'/0/0. Defaults to the receive chain.
    #[arg(short, long)]
    path: Option<String>,

    /// Receive index used when no path is given.
    #[arg(short, long, default_value_t = 0)]
    index: u32,

    /// Also print the WIF private key and xprv.
    #[arg(long)]
    show_private: bool,
}

#[derive(Args)]
struct KeypairsArgs {
    /// Connections that need keys now.
    #[arg(short, long, default_value_t = 0)]
    connections: u32,

    /// Connection keys already held.
    #[arg(short, long, default_value_t = 0)]
    known: usize,

    /// Highest index already used (-1 for none).
    #[arg(short, long, default_value_t = -1, allow_hyphen_values = true)]
    last_index: i64,

    /// Generation strategy (parallel or sync). Overrides PILLAR_KEYGEN_STRATEGY.
    #[arg(short, long)]
    strategy: Option<KeyGenStrategy>,

    /// Extra keys beyond the requested connections. Overrides PILLAR_POOL_SIZE.
    #[arg(long)]
    pool_size: Option<u32>,
}

#[derive(Args)]
struct PlanArgs {
    /// JSON file holding an array of UTXOs.
    #[arg(short, long)]
    utxos: PathBuf,

    /// Recipient address.
    #[arg(short, long)]
    to: String,

    /// Amount in satoshis.
    #[arg(short, long)]
    amount: u64,

    /// Speed tier (slow, normal, fast).
    #[arg(short, long, default_value = "normal")]
    speed: SpeedTier,

    /// Change chain index for the change output.
    #[arg(long, default_value_t = 0)]
    change_index: u32,
}

#[derive(Args)]
struct SendArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// Submit the signed transaction instead of only printing it.
    #[arg(long)]
    broadcast: bool,

    /// Broadcast endpoint. Overrides PILLAR_BROADCAST_URL.
    #[arg(long)]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    let mut config = WalletConfig::from_env().context("Failed to load configuration")?;
    if let Some(network) = cli.network {
        config.network = network;
    }
    if let Some(policy) = cli.mnemonic_policy {
        config.mnemonic_policy = policy;
    }

    match cli.command {
        Commands::Address(args) => {
            let wallet = open_wallet(cli.seed_hex.as_deref(), config)?;
            show_address(&wallet, args)
        }
        Commands::Keypairs(args) => {
            if let Some(strategy) = args.strategy {
                config.pool.strategy = strategy;
            }
            if let Some(size) = args.pool_size {
                config.pool.pool_size = size;
            }
            let wallet = open_wallet(cli.seed_hex.as_deref(), config)?;
            keypairs(&wallet, args).await
        }
        Commands::Plan(args) => {
            let wallet = open_wallet(cli.seed_hex.as_deref(), config)?;
            plan(&wallet, &args)
        }
        Commands::Send(args) => {
            if let Some(endpoint) = &args.endpoint {
                config.broadcaster.endpoint = endpoint.clone();
            }
            let wallet = open_wallet(cli.seed_hex.as_deref(), config)?;
            send(&wallet, args).await
        }
    }
}

fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}

fn open_wallet(seed_hex: Option<&str>, config: WalletConfig) -> Result<Wallet> {
    if let Some(seed_hex) = seed_hex {
        let seed = Seed::from_hex(seed_hex).context("Invalid --seed-hex")?;
        return Wallet::from_seed(seed, config).context("Failed to open wallet");
    }
    let phrase = match std::env::var("PILLAR_MNEMONIC") {
        Ok(phrase) if !phrase.trim().is_empty() => phrase,
        _ => rpassword::prompt_password("Mnemonic: ").context("Failed to read mnemonic")?,
    };
    let passphrase = std::env::var("PILLAR_PASSPHRASE").unwrap_or_default();
    Wallet::from_mnemonic(&phrase, &passphrase, config).context("Failed to open wallet")
}

fn show_address(wallet: &Wallet, args: AddressArgs) -> Result<()> {
    let key = match &args.path {
        Some(path) => wallet.derive(path).context("Failed to derive path")?,
        None => wallet
            .keychain()
            .key_at(pillar_core::constants::RECEIVE_CHAIN, args.index)
            .context("Failed to derive receive key")?,
    };
    let mut out = json!({
        "path": key.path().to_string(),
        "address": key.address(wallet.network()).to_string(),
        "publicKey": key.public_key_hex(),
        "xpub": key.to_xpub(),
    });
    if args.show_private {
        out["wif"] = json!(key.to_wif());
        out["xprv"] = json!(key.to_xprv());
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn keypairs(wallet: &Wallet, args: KeypairsArgs) -> Result<()> {
    let pairs = wallet
        .connection_key_pairs(PoolRequest {
            connections_count: args.connections,
            known_count: args.known,
            last_index: args.last_index,
        })
        .await
        .context("Connection key generation failed")?;
    println!("{}", serde_json::to_string_pretty(&pairs)?);
    Ok(())
}

fn load_utxos(path: &Path) -> Result<Vec<Utxo>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid UTXO JSON in {}", path.display()))
}

fn plan(wallet: &Wallet, args: &PlanArgs) -> Result<()> {
    let utxos = load_utxos(&args.utxos)?;
    let targets = [TransactionTarget::payment(args.to.clone(), args.amount)];
    let plan = wallet.plan(&targets, args.speed, &utxos, args.change_index)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    if !plan.is_valid {
        bail!("Insufficient funds for {} satoshis at {} speed", args.amount, args.speed);
    }
    Ok(())
}

async fn send(wallet: &Wallet, args: SendArgs) -> Result<()> {
    let utxos = load_utxos(&args.plan.utxos)?;
    let targets = [TransactionTarget::payment(args.plan.to.clone(), args.plan.amount)];

    if !args.broadcast {
        let plan = wallet.plan(&targets, args.plan.speed, &utxos, args.plan.change_index)?;
        if !plan.is_valid {
            bail!("Insufficient funds for {} satoshis", args.plan.amount);
        }
        let signed = wallet.build(&plan).context("Signing failed")?;
        let out = json!({ "txid": signed.txid.to_string(), "rawTx": signed.raw_hex, "fee": plan.fee });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let outcome = wallet
        .send(&targets, args.plan.speed, &utxos, args.plan.change_index)
        .await
        .context("Signing failed")?;
    match outcome {
        SendOutcome::Invalid { .. } => bail!("Insufficient funds for {} satoshis", args.plan.amount),
        SendOutcome::Failed { raw_tx } => {
            let out = json!({ "accepted": false, "txid": raw_tx.txid.to_string(), "rawTx": raw_tx.raw_hex });
            println!("{}", serde_json::to_string_pretty(&out)?);
            bail!("Broadcast was not accepted; resubmit the raw transaction later")
        }
        SendOutcome::Accepted { txid, raw_tx } => {
            let out = json!({ "accepted": true, "txid": txid, "rawTx": raw_tx.raw_hex });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_keypairs_with_negative_index() {
        let cli = Cli::try_parse_from(["pillar-cli", "keypairs", "-c", "3", "--last-index", "-1"]).unwrap();
        let Commands::Keypairs(args) = cli.command else {
            panic!("expected keypairs");
        };
        assert_eq!(args.connections, 3);
        assert_eq!(args.last_index, -1);
    }

    #[test]
    fn parses_send_with_global_network() {
        let cli = Cli::try_parse_from([
            "pillar-cli",
            "send",
            "--utxos",
            "utxos.json",
            "--to",
            "mhZxxh9CTdtLPaZRMydmA25kDUC8mtyP2B",
            "--amount",
            "40000",
            "--speed",
            "slow",
            "--network",
            "testnet",
            "--broadcast",
        ])
        .unwrap();
        assert_eq!(cli.network, Some(Network::Testnet));
        let Commands::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.plan.speed, SpeedTier::Slow);
        assert!(args.broadcast);
    }

    #[test]
    fn rejects_unknown_speed() {
        assert!(Cli::try_parse_from([
            "pillar-cli", "plan", "--utxos", "u.json", "--to", "x", "--amount", "1", "--speed", "warp",
        ])
        .is_err());
    }
}
