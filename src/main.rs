// shoplist - personal shopping list with live-updating views
//
// Architecture:
// - Store (rusqlite + r2d2): SQLite table, single writer thread, pooled readers
// - Live (tokio): observable values whose upstream runs only while observed
// - Query: live store queries with latest-wins filter switching
// - View model: search text, filtered and unfiltered live lists, mutations
// - CLI (clap): one-shot commands and an interactive session

mod cli;
mod commands;
mod config;
mod live;
mod logging;
mod query;
mod session;
mod share;
mod store;
mod viewmodel;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use std::sync::Arc;
use store::ItemStore;
use viewmodel::ShoppingViewModel;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config management runs before anything touches the database
    if let Some(Commands::Config {
        show,
        reset,
        edit,
        path,
    }) = cli.command
    {
        return cli::handle_config(show, reset, edit, path);
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();
    let config = Config::from_env();

    // The guard must outlive every log call so file output gets flushed
    let _log_guard = logging::init(&config.logging);

    let store = Arc::new(ItemStore::open(config.store_config())?);
    let vm = ShoppingViewModel::new(store.clone(), config.sharing_policy())?;

    let result = match cli.command {
        None => session::run(&vm, &config, None).await,
        Some(Commands::Session { search }) => session::run(&vm, &config, search).await,
        Some(command) => commands::run(&vm, &config, command).await,
    };

    // Let enqueued writes land before the writer thread stops
    vm.flush().await;
    drop(vm);
    store.shutdown();

    result
}
