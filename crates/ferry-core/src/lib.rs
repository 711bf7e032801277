pub mod api;
pub mod auth;
pub mod auto_sync;
pub mod cache;
pub mod change;
pub mod cli;
pub mod commands;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod model;
pub mod queue;
pub mod render;
pub mod session;
pub mod store;

use std::ffi::OsString;
use std::io;
use std::sync::Arc;

use anyhow::{
  Context,
  anyhow
};
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::api::{
  HttpTaskApi,
  RemoteTaskApi
};
use crate::auth::TokenStore;
use crate::connectivity::ConnectivityMonitor;
use crate::store::{
  FileStore,
  KeyValueStore
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    offline = cli.offline,
    command = cli.command.name(),
    "starting ferry CLI"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store: Arc<dyn KeyValueStore> =
    Arc::new(
      FileStore::open(&data_dir)
        .with_context(|| {
          format!(
            "failed to open store at \
             {}",
            data_dir.display()
          )
        })?
    );
  let tokens =
    TokenStore::new(store.clone());

  let token = match cfg.api_token() {
    | Some(token) => Some(token),
    | None => tokens
      .load()
      .context(
        "failed to read saved token"
      )?
  };
  if token.is_none()
    && !cli.offline
    && cli.command.touches_remote()
  {
    return Err(anyhow!(
      "no API token; run `ferry login \
       <token>` or set api.token"
    ));
  }
  debug!(
    has_token = token.is_some(),
    "resolved API token"
  );

  let api: Arc<dyn RemoteTaskApi> =
    Arc::new(HttpTaskApi::new(
      &cfg.api_url(),
      token.as_deref().unwrap_or_default(),
      cfg.api_timeout()?
    )?);
  let monitor = Arc::new(
    ConnectivityMonitor::new(
      !cli.offline
    )
  );

  let app = commands::App {
    session: session::Session::new(
      store,
      api.clone(),
      monitor.clone()
    ),
    tokens,
    renderer: render::Renderer::new(
      &cfg
    )?,
    api,
    monitor,
    auto_sync: cfg.auto_sync()
      && !cli.offline
  };

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async \
         runtime"
      )?;

  let mut out = io::stdout().lock();
  runtime.block_on(
    commands::dispatch(
      &app,
      cli.command,
      &mut out
    )
  )?;

  info!("done");
  Ok(())
}
