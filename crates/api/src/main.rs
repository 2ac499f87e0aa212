use capita_infra::AuthConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    capita_observability::init();

    let config = AuthConfig::from_env()?;
    let app = capita_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
