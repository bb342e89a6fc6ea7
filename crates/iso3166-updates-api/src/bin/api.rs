use iso3166_updates_api::{AppState, DEFAULT_BIND_ADDRESS, app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .write_style(env_logger::WriteStyle::Never)
        .init();

    let state = AppState::from_env();
    let address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.into());
    let tcp_listener = tokio::net::TcpListener::bind(&address).await?;

    log::info!(
        "Serving change records from {} on address: {}",
        state.data_file.display(),
        address
    );

    axum::serve(tcp_listener, app(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    Ok(())
}
