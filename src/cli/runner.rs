//! Dispatches a parsed [`Command`] against an open [`MmrStore`] and renders the
//! result in the requested [`OutputMode`] (spec SPEC_FULL §4.11).

use std::fs;

use super::command::Command;
use super::util::parse_hex;
use crate::errors::{Result, StoreError};
use crate::mmr::{self, Bundle, MmrStore};
use crate::store::container::ContainerBase;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputMode {
    Human,
    Plain,
    Json,
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string()));
}

/// Executes `cmd` against `store`, printing its result in `mode`.
///
/// # Errors
/// Returns whatever error the underlying store or MMR operation produced.
pub fn run_with_format(store: &MmrStore, cmd: Command, mode: OutputMode) -> Result<()> {
    match cmd {
        Command::ServiceCreate { name } => {
            store.open_or_create(&name)?;
            match mode {
                OutputMode::Json => print_json(&serde_json::json!({"action": "created", "service": name})),
                OutputMode::Plain => println!("created {name}"),
                OutputMode::Human => println!("service {name:?} created"),
            }
            Ok(())
        }
        Command::ServiceList => {
            // Listing is a convenience the registry does not index directly; the
            // `__services` map's iteration requires the same bucketed-iterate
            // precondition as any other KeyValueMap (spec §9's bucket-iteration
            // note) — but this map is unbucketed, so it is always well-defined.
            let names = store.list_names()?;
            match mode {
                OutputMode::Json => print_json(&serde_json::json!({"services": names})),
                OutputMode::Plain => {
                    for name in &names {
                        println!("{name}");
                    }
                }
                OutputMode::Human => println!("{} service(s): {}", names.len(), names.join(", ")),
            }
            Ok(())
        }
        Command::ServiceDelete { name } => {
            store.delete_service(&name)?;
            match mode {
                OutputMode::Json => print_json(&serde_json::json!({"action": "deleted", "service": name})),
                OutputMode::Plain => println!("deleted {name}"),
                OutputMode::Human => println!("service {name:?} deleted"),
            }
            Ok(())
        }
        Command::ServiceAppend { name, blob_hex } => {
            let blob = parse_hex(&blob_hex)?;
            let digest = mmr::hash(&blob);
            let svc = store.open_or_create(&name)?;
            svc.append(digest)?;
            svc.flush()?;
            match mode {
                OutputMode::Json => print_json(&serde_json::json!({"service": name, "leaf": hex::encode(digest)})),
                OutputMode::Plain => println!("{}", hex::encode(digest)),
                OutputMode::Human => println!("appended {} to service {name:?}", hex::encode(digest)),
            }
            Ok(())
        }
        Command::ServiceRoot { name } => {
            let svc = store.open_or_create(&name)?;
            let root = svc.global_root()?;
            let root_hex = hex::encode(&root);
            match mode {
                OutputMode::Json => print_json(&serde_json::json!({"service": name, "global_root": root_hex})),
                OutputMode::Plain => println!("{root_hex}"),
                OutputMode::Human => println!("global_root({name:?}) = {root_hex}"),
            }
            Ok(())
        }
        Command::ServiceProve { name, blob_hex } => {
            let blob = parse_hex(&blob_hex)?;
            let digest = mmr::hash(&blob);
            let svc = store.open_or_create(&name)?;
            let bundle = svc.server_inclusion(digest)?;
            print_bundle(&bundle, mode)
        }
        Command::ServiceVerify { bundle_path } => {
            let raw = fs::read_to_string(&bundle_path).map_err(StoreError::EngineError)?;
            let bundle: Bundle = serde_json::from_str(&raw).map_err(|e| StoreError::Codec(e.to_string()))?;
            let ok = mmr::verify(&bundle);
            match mode {
                OutputMode::Json => print_json(&serde_json::json!({"verified": ok})),
                OutputMode::Plain => println!("{ok}"),
                OutputMode::Human => println!("{}", if ok { "bundle verifies" } else { "bundle does NOT verify" }),
            }
            Ok(())
        }
        Command::ContainerStat { env_path, name } => {
            let env = crate::engine::Environment::open(env_path, 0, true, 2048)?;
            let base = ContainerBase::open(env, &name)?;
            let stat = base.read_stat()?;
            match mode {
                OutputMode::Json => print_json(&serde_json::json!({
                    "name": name,
                    "length": stat.length,
                    "kind": match stat.kind { crate::store::container::Kind::Sequence => "sequence", crate::store::container::Kind::Map => "map" },
                    "batching": stat.batching,
                    "batch_size": stat.batch_size,
                    "max_item_len": stat.max_item_len,
                    "constant_length": stat.constant_length,
                })),
                OutputMode::Plain => println!(
                    "length={} kind={:?} batching={} batch_size={} max_item_len={} constant_length={}",
                    stat.length, stat.kind, stat.batching, stat.batch_size, stat.max_item_len, stat.constant_length
                ),
                OutputMode::Human => println!("{name}: {stat:?}"),
            }
            Ok(())
        }
        Command::FeatureList => {
            let flags = crate::utils::feature_flags::list();
            match mode {
                OutputMode::Json => {
                    let json: Vec<_> = flags.iter().map(|f| serde_json::json!({"name": f.name, "enabled": f.enabled, "description": f.description})).collect();
                    print_json(&serde_json::json!(json));
                }
                OutputMode::Plain => {
                    for f in &flags {
                        println!("{}={}", f.name, f.enabled);
                    }
                }
                OutputMode::Human => {
                    for f in &flags {
                        println!("{} [{}]: {}", f.name, if f.enabled { "on" } else { "off" }, f.description);
                    }
                }
            }
            Ok(())
        }
        Command::FeatureEnable { name } => set_feature(&name, true, mode),
        Command::FeatureDisable { name } => set_feature(&name, false, mode),
    }
}

fn set_feature(name: &str, enabled: bool, mode: OutputMode) -> Result<()> {
    let existed = crate::utils::feature_flags::set(name, enabled);
    if !existed {
        return Err(StoreError::StoreCorrupt(format!("unknown feature flag {name:?}")));
    }
    match mode {
        OutputMode::Json => print_json(&serde_json::json!({"name": name, "enabled": enabled})),
        OutputMode::Plain => println!("{name}={enabled}"),
        OutputMode::Human => println!("feature {name:?} is now {}", if enabled { "enabled" } else { "disabled" }),
    }
    Ok(())
}

fn print_bundle(bundle: &Bundle, mode: OutputMode) -> Result<()> {
    match mode {
        OutputMode::Json => {
            let json = serde_json::to_value(bundle).map_err(|e| StoreError::Codec(e.to_string()))?;
            print_json(&json);
        }
        OutputMode::Plain => println!("{}", bundle.status),
        OutputMode::Human => {
            if bundle.status == 1 {
                println!("leaf {} included, global_root {}", bundle.leaf.as_deref().unwrap_or(""), bundle.global_root.as_deref().unwrap_or(""));
            } else {
                println!("not included: {}", bundle.detail.as_deref().unwrap_or("unknown"));
            }
        }
    }
    Ok(())
}
