use std::sync::Arc;

use tracing::info;
use ums_mcp::{
    build_app, config::Config, domain::tools::build_user_tools, logging,
    user_client::HttpUserClient, AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let user_client = Arc::new(HttpUserClient::new(config.user_service_url.clone())?);
    let tools = build_user_tools(user_client)?;
    let tool_count = tools.len();

    let bind_socket = config.bind_socket()?;
    let state = AppState::new(tools);
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        user_service_url = %config.user_service_url,
        tools = tool_count,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
