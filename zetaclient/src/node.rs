// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Task topology: each enabled external chain runs a fixed set of
//! cooperative loops — inbound watcher, outbound observer, scheduler, gas
//! price reporter, rpc health — under one cancellation token, with a fault
//! boundary that restarts a chain task that dies while the rest of the
//! daemon keeps serving.

use crate::error::ClientResult;
use crate::interfaces::{EvmRpc, TssSigner, ZetaCoreClient};
use crate::metrics::ZetaclientMetrics;
use crate::observer::evm::EvmObserver;
use crate::signer::evm::EvmSigner;
use crate::signer::OutboundScheduler;
use crate::store::ObserverStore;
use crate::ticker::DynamicTicker;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use zeta_chain_types::{Chain, ChainParams};

/// Delay before the fault boundary restarts a dead task.
const TASK_RESTART_DELAY: Duration = Duration::from_secs(5);

pub struct EvmChainTasks {
    pub observer: Arc<EvmObserver>,
    pub handles: Vec<JoinHandle<()>>,
}

/// Wire and spawn every task for one EVM chain.
#[allow(clippy::too_many_arguments)]
pub async fn start_evm_chain_tasks(
    chain: Chain,
    zeta_chain_id: i64,
    params: ChainParams,
    evm: Arc<dyn EvmRpc>,
    core: Arc<dyn ZetaCoreClient>,
    tss: Arc<dyn TssSigner>,
    store: ObserverStore,
    metrics: Arc<ZetaclientMetrics>,
    scan_from: Option<u64>,
    cancel: CancellationToken,
) -> ClientResult<EvmChainTasks> {
    let observer = EvmObserver::new(
        chain.clone(),
        zeta_chain_id,
        params.clone(),
        evm.clone(),
        core.clone(),
        tss.clone(),
        store,
        metrics.clone(),
        scan_from,
    )
    .await?;
    let signer = EvmSigner::new(chain.clone(), evm, tss);
    let scheduler = Arc::new(OutboundScheduler::new(
        chain.clone(),
        signer,
        core,
        observer.clone(),
    ));

    let mut handles = Vec::new();

    // ExternalChainWatcher: inbound scan + tracker hints
    {
        let observer = observer.clone();
        let chain = chain.clone();
        let metrics = metrics.clone();
        handles.push(spawn_chain_task(
            chain.clone(),
            "external_chain_watcher",
            metrics,
            cancel.clone(),
            move |cancel| {
                let observer = observer.clone();
                let chain = chain.clone();
                async move {
                    let params = observer.chain_params().await;
                    let mut ticker =
                        DynamicTicker::new(format!("evm_in_tx_{}", chain.id), params.in_tx_ticker);
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                info!(chain = %chain, "external chain watcher stopped");
                                return;
                            }
                            _ = ticker.tick() => {
                                observer.update_chain_params().await;
                                if let Err(e) = observer.observe_in_tx().await {
                                    warn!(chain = %chain, "observe inbound: {e}");
                                }
                                if let Err(e) = observer.process_inbound_trackers().await {
                                    warn!(chain = %chain, "inbound trackers: {e}");
                                }
                                ticker.update_interval(observer.chain_params().await.in_tx_ticker);
                            }
                        }
                    }
                }
            },
        ));
    }

    // ObserveOutTx: confirm candidate hashes
    {
        let observer = observer.clone();
        let chain = chain.clone();
        let metrics = metrics.clone();
        handles.push(spawn_chain_task(
            chain.clone(),
            "observe_out_tx",
            metrics,
            cancel.clone(),
            move |cancel| {
                let observer = observer.clone();
                let chain = chain.clone();
                async move {
                    let params = observer.chain_params().await;
                    let mut ticker =
                        DynamicTicker::new(format!("evm_out_tx_{}", chain.id), params.out_tx_ticker);
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                info!(chain = %chain, "outbound observer stopped");
                                return;
                            }
                            _ = ticker.tick() => {
                                if let Err(e) = observer.observe_out_tx().await {
                                    warn!(chain = %chain, "observe outbound: {e}");
                                }
                                ticker.update_interval(observer.chain_params().await.out_tx_ticker);
                            }
                        }
                    }
                }
            },
        ));
    }

    // Outbound scheduler: sign/broadcast/vote pending CCTXs
    {
        let observer = observer.clone();
        let scheduler = scheduler.clone();
        let chain = chain.clone();
        let metrics = metrics.clone();
        handles.push(spawn_chain_task(
            chain.clone(),
            "outbound_scheduler",
            metrics,
            cancel.clone(),
            move |cancel| {
                let observer = observer.clone();
                let scheduler = scheduler.clone();
                let chain = chain.clone();
                async move {
                    let params = observer.chain_params().await;
                    let mut ticker = DynamicTicker::new(
                        format!("evm_scheduler_{}", chain.id),
                        params.outbound_tx_schedule_interval,
                    );
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                info!(chain = %chain, "outbound scheduler stopped");
                                return;
                            }
                            _ = ticker.tick() => {
                                if let Err(e) = scheduler.schedule().await {
                                    warn!(chain = %chain, "schedule outbound: {e}");
                                }
                                ticker.update_interval(
                                    observer.chain_params().await.outbound_tx_schedule_interval,
                                );
                            }
                        }
                    }
                }
            },
        ));
    }

    // WatchGasPrice
    {
        let observer = observer.clone();
        let chain = chain.clone();
        let metrics = metrics.clone();
        handles.push(spawn_chain_task(
            chain.clone(),
            "watch_gas_price",
            metrics,
            cancel.clone(),
            move |cancel| {
                let observer = observer.clone();
                let chain = chain.clone();
                async move {
                    // post once at startup so outbounds can price immediately
                    if let Err(e) = observer.post_gas_price().await {
                        warn!(chain = %chain, "post gas price: {e}");
                    }
                    let params = observer.chain_params().await;
                    let mut ticker = DynamicTicker::new(
                        format!("evm_gas_price_{}", chain.id),
                        params.gas_price_ticker,
                    );
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                info!(chain = %chain, "gas price watcher stopped");
                                return;
                            }
                            _ = ticker.tick() => {
                                if let Err(e) = observer.post_gas_price().await {
                                    warn!(chain = %chain, "post gas price: {e}");
                                }
                                ticker.update_interval(observer.chain_params().await.gas_price_ticker);
                            }
                        }
                    }
                }
            },
        ));
    }

    // RpcHealth
    {
        let observer = observer.clone();
        let chain = chain.clone();
        let metrics = metrics.clone();
        handles.push(spawn_chain_task(
            chain.clone(),
            "rpc_health",
            metrics,
            cancel.clone(),
            move |cancel| {
                let observer = observer.clone();
                let chain = chain.clone();
                async move {
                    let ticker = DynamicTicker::new(format!("evm_rpc_health_{}", chain.id), 60);
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                info!(chain = %chain, "rpc health stopped");
                                return;
                            }
                            _ = ticker.tick() => {
                                if let Err(e) = observer.rpc_status().await {
                                    error!(chain = %chain, "rpc status check: RPC down? {e}");
                                }
                            }
                        }
                    }
                }
            },
        ));
    }

    Ok(EvmChainTasks { observer, handles })
}

/// Fault boundary: run the task factory in a loop. A task body that returns
/// while the token is still live is treated as a crash and restarted, so a
/// dying chain does not take down the daemon.
fn spawn_chain_task<F, Fut>(
    chain: Chain,
    name: &'static str,
    metrics: Arc<ZetaclientMetrics>,
    cancel: CancellationToken,
    factory: F,
) -> JoinHandle<()>
where
    F: Fn(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            factory(cancel.clone()).await;
            if cancel.is_cancelled() {
                return;
            }
            error!(chain = %chain, task = name, "chain task exited unexpectedly, restarting");
            metrics
                .task_restarts
                .with_label_values(&[&chain.name, name])
                .inc();
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(TASK_RESTART_DELAY) => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use zeta_chain_types::{chain_from_id, default_chain_params};

    #[tokio::test]
    async fn test_tasks_spawn_and_cancel_cleanly() {
        let tss = Arc::new(crate::signer::TestTssSigner::new_deterministic());
        let keeper = Arc::new(tokio::sync::Mutex::new(test_keeper(&tss)));
        let core = Arc::new(crate::zetacore::InProcessZetaCore::new(keeper, OPERATOR));
        let evm = MockEvmRpc::new();
        evm.set_tip(100).await;
        let dir = tempfile::tempdir().unwrap();
        let store = ObserverStore::open(dir.path(), "goerli_testnet").unwrap();
        let cancel = CancellationToken::new();

        let tasks = start_evm_chain_tasks(
            chain_from_id(TEST_CHAIN_ID).unwrap(),
            ZETA_CHAIN_ID,
            default_chain_params(TEST_CHAIN_ID),
            evm.clone(),
            core,
            tss,
            store,
            ZetaclientMetrics::new_for_testing(),
            Some(0),
            cancel.clone(),
        )
        .await
        .unwrap();
        assert_eq!(tasks.handles.len(), 5);

        // shutdown propagates to every task
        cancel.cancel();
        for handle in tasks.handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("task did not stop on cancellation")
                .unwrap();
        }
    }
}
