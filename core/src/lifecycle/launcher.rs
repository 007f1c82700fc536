//! Wires loaded settings into a running bot (§5): one settings load, one
//! `ExchangeClient` per configured exchange, one `Rebalancer` dispatch task
//! per exchange, all tied to the same `AppLifetimeManager`/`ShutdownService`
//! pair so a Ctrl-C or a fatal error tears every task down together.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tokio::signal;

use crate::config::try_load_settings;
use crate::exchanges::client::ExchangeClient;
use crate::infrastructure::{init_lifetime_manager, spawn_future_ok};
use crate::lifecycle::app_lifetime_manager::AppLifetimeManager;
use crate::lifecycle::shutdown::ShutdownService;
use crate::settings::{AppSettings, BaseStrategySettings, ExchangeSettings, RebalancerSettings};
use crate::strategies::rebalancer::Rebalancer;
use mmb_utils::infrastructure::{init_infrastructure, SpawnFutureFlags};
use mmb_utils::logger::print_info;

/// How the caller wants its settings sourced (§10.C): already in hand, or
/// loaded from the pair of TOML files the bot was started with.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum InitSettings<StrategySettings>
where
    StrategySettings: BaseStrategySettings + Clone,
{
    Directly(AppSettings<StrategySettings>),
    Load {
        config_path: String,
        credentials_path: String,
    },
}

/// A launched bot: the dispatch tasks already run in the background; this
/// just holds the handle that lets a caller wait for their shutdown.
pub struct RunningBot {
    pub lifetime_manager: Arc<AppLifetimeManager>,
}

impl RunningBot {
    /// Resolves once graceful shutdown has been requested, whether by
    /// Ctrl-C or by a component calling `spawn_graceful_shutdown` itself.
    pub async fn wait_for_shutdown(self) {
        self.lifetime_manager.stop_token().when_cancelled().await;
    }
}

/// Loads settings, starts one client+rebalancer pair per `[[core.exchanges]]`
/// entry that matches `strategy.exchange_account_id`, and installs the
/// Ctrl-C handler. Returns once everything is spawned; the bot keeps running
/// on its own tasks until `RunningBot::wait_for_shutdown` resolves.
pub async fn launch_rebalancer(init_user_settings: InitSettings<RebalancerSettings>) -> Result<RunningBot> {
    init_infrastructure("log.txt");

    print_info("rebalancer bot is starting...");

    let settings = match init_user_settings {
        InitSettings::Directly(settings) => settings,
        InitSettings::Load {
            config_path,
            credentials_path,
        } => try_load_settings::<RebalancerSettings>(&config_path, &credentials_path)?,
    };

    if settings.core.exchanges.is_empty() {
        bail!("no exchanges configured under [[core.exchanges]]");
    }

    let exchange_settings = settings
        .core
        .exchanges
        .iter()
        .find(|exchange| exchange.exchange_account_id == settings.strategy.exchange_account_id)
        .cloned()
        .ok_or_else(|| {
            anyhow!(
                "strategy.exchange_account_id {} has no matching [[core.exchanges]] entry",
                settings.strategy.exchange_account_id
            )
        })?;

    let lifetime_manager = init_lifetime_manager();
    let shutdown_service = Arc::new(ShutdownService::default());
    lifetime_manager.setup_shutdown_service(shutdown_service);

    spawn_rebalancer(exchange_settings, settings.strategy, lifetime_manager.clone());

    let cloned_lifetime_manager = lifetime_manager.clone();
    spawn_future_ok(
        "Ctrl-C handler",
        SpawnFutureFlags::STOP_BY_TOKEN | SpawnFutureFlags::DENY_CANCELLATION,
        async move {
            if signal::ctrl_c().await.is_ok() {
                print_info("Ctrl-C received, starting graceful shutdown");
                cloned_lifetime_manager.spawn_graceful_shutdown("Ctrl-C signal was received");
            }
        },
    );

    print_info("rebalancer bot has started");

    Ok(RunningBot { lifetime_manager })
}

fn spawn_rebalancer(
    exchange_settings: ExchangeSettings,
    strategy_settings: RebalancerSettings,
    lifetime_manager: Arc<AppLifetimeManager>,
) {
    let exchange_account_id = exchange_settings.exchange_account_id;
    let marker_digit = (strategy_settings.marker > 0).then_some(strategy_settings.marker);

    let (client, events_rx) = ExchangeClient::new(
        exchange_settings,
        exchange_account_id,
        marker_digit,
        lifetime_manager.clone(),
    );
    client.start();

    let rebalancer = Rebalancer::new(strategy_settings, client);
    let stop_token = lifetime_manager.stop_token();

    spawn_future_ok(
        "rebalancer dispatch loop",
        SpawnFutureFlags::STOP_BY_TOKEN,
        rebalancer.run(events_rx, stop_token),
    );
}
