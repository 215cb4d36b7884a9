use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use shopsync::api::ApiClient;
use shopsync::config::ClientConfig;
use shopsync::logging;
use shopsync::prelude::*;
use shopsync::settings::{FileStorage, SettingsStore};
use shopsync::storefront::{Flags, Storefront};
use shopsync::subscription::http::QueryCache;
use shopsync::transport::ReqwestTransport;
use tracing::info;

const FRAME_RATE: u32 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = ClientConfig::from_env()?;
    let log_file = logging::init(&config.log_dir)?;

    let storage = FileStorage::open(&config.settings_path)
        .wrap_err("failed to open settings")?;
    let settings = SettingsStore::load(Arc::new(storage), &config.default_user_id);
    let transport = ReqwestTransport::new(config.timeout)?;
    let api = ApiClient::new(config.api_base.as_str(), settings, Arc::new(transport));
    let cache = QueryCache::with_config(api, config.query);

    info!(api_base = %config.api_base, log = %log_file.display(), "starting storefront");

    let runtime = Runtime::<Storefront>::new(Flags::new(cache));

    let mut terminal = ratatui::init();
    let result = runtime.run(&mut terminal, FRAME_RATE).await;
    ratatui::restore();

    result
}
