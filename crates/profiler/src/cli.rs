use anyhow::{Context, Result};
use common::types::{AccountAddress, MetricVector, Position};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::persona_scoring::score;
use crate::pipeline::Pipeline;
use crate::reference_stats::compute;
use crate::sources::recent::ContractCall;
use crate::sources::ActivityApi;
use crate::wallet_store::{WalletEvaluation, WalletStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Analyze { address: String, out: Option<PathBuf> },
    Evaluate { address: String },
    Wallet { address: String },
    Stats,
    Seed { path: PathBuf },
    Group { label: String },
}

const USAGE: &str = "usage: profiler <analyze <address> [out.json] | evaluate <address> | wallet <address> | stats | seed <wallet_parameters.json> | group <label>>";

pub fn parse_args<I>(mut args: I) -> std::result::Result<Command, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let Some(cmd) = args.next() else {
        return Err(USAGE.to_string());
    };

    let mut required = |usage: &str| args.next().ok_or_else(|| format!("usage: profiler {usage}"));
    match cmd.as_str() {
        "analyze" => {
            let address = required("analyze <address> [out.json]")?;
            let out = args.next().map(PathBuf::from);
            Ok(Command::Analyze { address, out })
        }
        "evaluate" => Ok(Command::Evaluate {
            address: required("evaluate <address>")?,
        }),
        "wallet" => Ok(Command::Wallet {
            address: required("wallet <address>")?,
        }),
        "stats" => Ok(Command::Stats),
        "seed" => Ok(Command::Seed {
            path: PathBuf::from(required("seed <wallet_parameters.json>")?),
        }),
        "group" => Ok(Command::Group {
            label: required("group <label>")?,
        }),
        other => Err(format!("unknown command: {other}\n{USAGE}")),
    }
}

/// Default output file for `analyze`.
pub fn bundle_file_name(address: &AccountAddress) -> PathBuf {
    PathBuf::from(format!("{address}_wallet_data.json"))
}

pub async fn run_command<P: ActivityApi>(
    pipeline: &Pipeline<P>,
    cmd: Command,
    now_epoch: i64,
) -> Result<()> {
    match cmd {
        Command::Analyze { address, out } => {
            let bundle = pipeline.analyze(&address, now_epoch).await?;
            let path = out.unwrap_or_else(|| bundle_file_name(&bundle.wallet));
            std::fs::write(&path, serde_json::to_string_pretty(&bundle)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Analysis written to {}", path.display());
            Ok(())
        }
        Command::Evaluate { address } => {
            let evaluated = pipeline.update(&address, now_epoch).await?;
            println!("{}", serde_json::to_string_pretty(&evaluated)?);
            Ok(())
        }
        Command::Wallet { address } => {
            let address = AccountAddress::parse(&address)?;
            match pipeline.store().get(&address).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("Wallet {address}: (not in wallets table)"),
            }
            Ok(())
        }
        Command::Stats => {
            let stats = pipeline.reference_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Seed { path } => {
            let seeded = seed_from_file(pipeline.store(), &path).await?;
            println!("Seeded and scored {seeded} wallets from {}", path.display());
            Ok(())
        }
        Command::Group { label } => {
            let group: Position = label.parse().map_err(anyhow::Error::msg)?;
            let averages = pipeline.store().group_averages(group).await?;
            let popular = pipeline.store().popular_contracts(group, 10).await?;
            println!("{}", serde_json::to_string_pretty(&averages)?);
            println!("Popular contracts for {group}:");
            for c in popular {
                println!("{:>5}  {}", c.frequency, c.contract_address);
            }
            Ok(())
        }
    }
}

/// One entry of a `wallet_parameters.json` file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    #[serde(default, deserialize_with = "de_balance")]
    pub balance: u128,
    #[serde(flatten)]
    pub metrics: MetricVector,
    #[serde(default)]
    pub transactions: Vec<ContractCall>,
}

/// Balances appear as decimal strings or plain JSON numbers.
fn de_balance<'de, D>(deserializer: D) -> std::result::Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Float(f64),
        Text(String),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(v) => u128::from(v),
        Raw::Float(v) if v.is_finite() && v > 0.0 => v as u128,
        Raw::Text(s) => s.trim().parse().unwrap_or(0),
        Raw::Float(_) | Raw::Null(()) => 0,
    })
}

pub fn parse_seed_file(text: &str) -> Result<BTreeMap<String, SeedEntry>> {
    serde_json::from_str(text).context("invalid wallet parameters file")
}

/// Store every seed entry, then score each one against the baseline the seeds
/// form together and record its persona contracts. Returns the wallets scored.
pub async fn seed_wallets(
    store: &WalletStore,
    entries: BTreeMap<String, SeedEntry>,
) -> Result<usize> {
    let mut seeded = Vec::with_capacity(entries.len());
    for (raw, entry) in entries {
        let address = match AccountAddress::parse(&raw) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(wallet = %raw, error = %e, "skipping seed entry");
                continue;
            }
        };
        store
            .seed_metrics(address.as_str(), entry.balance, entry.metrics)
            .await?;
        seeded.push((address, entry));
    }

    let stats = compute(&store.population().await?)?;
    for (address, entry) in &seeded {
        let persona = score(&entry.metrics.sanitized(), &stats);
        store
            .upsert(WalletEvaluation {
                address: address.clone(),
                balance: entry.balance,
                metrics: entry.metrics.sanitized(),
                persona: Some(persona),
            })
            .await?;
        store
            .replace_persona_contracts(address, persona.position, &entry.transactions)
            .await?;
    }
    tracing::info!(seeded = seeded.len(), population = stats.population, "seed complete");
    Ok(seeded.len())
}

async fn seed_from_file(store: &WalletStore, path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match seed_wallets(store, parse_seed_file(&text)?).await {
        Err(e) if e.downcast_ref::<crate::reference_stats::StatsError>().is_some() => {
            anyhow::bail!("no valid wallets in {}", path.display())
        }
        other => other,
    }
}
