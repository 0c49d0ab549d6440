//! # konfigure-operator
//!
//! Watches ManagementClusterConfiguration resources in all namespaces and
//! renders their applications' configuration into ConfigMaps and Secrets.

use anyhow::Result;
use konfigure_operator::runtime::initialization::initialize;
use konfigure_operator::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop(
        init.configs,
        init.reconciler,
        init.server_state,
        init.controller_config,
    )
    .await
}
