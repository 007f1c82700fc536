#![deny(
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_must_use,
    clippy::unwrap_used
)]

use anyhow::Result;

use mmb_core::config::{CONFIG_PATH, CREDENTIALS_PATH};
use mmb_core::lifecycle::launcher::{launch_rebalancer, InitSettings};
use mmb_core::settings::RebalancerSettings;

#[tokio::main]
async fn main() -> Result<()> {
    let init_settings = InitSettings::<RebalancerSettings>::Load {
        config_path: CONFIG_PATH.to_owned(),
        credentials_path: CREDENTIALS_PATH.to_owned(),
    };

    let bot = launch_rebalancer(init_settings).await?;
    bot.wait_for_shutdown().await;

    Ok(())
}
