// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use prometheus::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zeta_chain_types::{chain_from_id, default_chain_params};
use zeta_config::Config;
use zeta_crosschain::{AuthorityKeeper, CrosschainKeeper, MemFungibleKeeper, TssState};
use zetaclient::compliance;
use zetaclient::config::ZetaclientConfig;
use zetaclient::error::ClientError;
use zetaclient::eth_client::EvmClient;
use zetaclient::interfaces::TssSigner;
use zetaclient::metrics::ZetaclientMetrics;
use zetaclient::node::start_evm_chain_tasks;
use zetaclient::signer::TestTssSigner;
use zetaclient::store::ObserverStore;
use zetaclient::telemetry::run_telemetry_server;
use zetaclient::zetacore::InProcessZetaCore;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = "zetaclientd")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[clap(long)]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ZetaclientConfig::load(&args.config_path)?;
    config.validate()?;
    compliance::load_restricted_addresses(&config.compliance_config.restricted_addresses);

    let registry = Registry::new();
    let metrics = Arc::new(ZetaclientMetrics::new(&registry));

    // The TSS network and the ZetaCore connection are external
    // collaborators; this binary wires a local standalone setup.
    let tss: Arc<dyn TssSigner> = Arc::new(TestTssSigner::new_deterministic());
    let keeper = build_local_keeper(&config, tss.as_ref());
    let core = Arc::new(InProcessZetaCore::new(
        Arc::new(Mutex::new(keeper)),
        &config.authz_granter,
    ));

    let start_time = std::time::Instant::now();
    {
        let metrics = metrics.clone();
        tokio::spawn(async move {
            loop {
                metrics.uptime_seconds.set(start_time.elapsed().as_secs() as i64);
                tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            }
        });
    }

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();
    let mut observers = Vec::new();

    for (chain_id, chain_config) in &config.evm_chain_configs {
        let chain = chain_from_id(*chain_id)
            .ok_or_else(|| ClientError::Config(format!("unknown chain {chain_id}")))?;
        let evm = Arc::new(
            EvmClient::connect(&chain_config.endpoint, *chain_id, &chain.name, metrics.clone())
                .await?,
        );
        let store = ObserverStore::open(&config.db_path, &chain.name)?;
        let tasks = start_evm_chain_tasks(
            chain.clone(),
            config.chain_id,
            default_chain_params(*chain_id),
            evm,
            core.clone(),
            tss.clone(),
            store,
            metrics.clone(),
            chain_config.scan_from,
            cancel.clone(),
        )
        .await?;
        info!(chain = %chain, "chain tasks started");
        observers.push(tasks.observer);
        handles.extend(tasks.handles);
    }

    let telemetry = run_telemetry_server(config.telemetry_port, registry, observers);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping chain tasks");
    cancel.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            error!("task join error: {e}");
        }
    }
    telemetry.abort();
    info!("zetaclient stopped");
    Ok(())
}

/// A standalone keeper for local/dev runs: this validator is the whole
/// observer set and holds both policy groups.
fn build_local_keeper(config: &ZetaclientConfig, tss: &dyn TssSigner) -> CrosschainKeeper {
    let mut keeper = CrosschainKeeper::new(Box::new(MemFungibleKeeper::new()));
    keeper.observer_set = vec![config.authz_granter.clone()];
    keeper.authority = AuthorityKeeper::new(&config.authz_granter, &config.authz_granter);
    keeper.tss = TssState {
        tss_pubkey: tss.pubkey(),
        eth_address: format!("{:?}", tss.evm_address()),
        btc_address: tss
            .btc_address(bitcoin::Network::Testnet)
            .map(|a| a.to_string())
            .unwrap_or_default(),
    };
    for chain_id in config.evm_chain_configs.keys() {
        keeper
            .chain_params
            .insert(*chain_id, default_chain_params(*chain_id));
    }
    if let Some(btc) = &config.btc_chain_config {
        keeper
            .chain_params
            .insert(btc.chain_id, default_chain_params(btc.chain_id));
    }
    keeper
        .chain_params
        .insert(config.chain_id, default_chain_params(config.chain_id));
    keeper.begin_block(
        1,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64,
    );
    keeper
}
