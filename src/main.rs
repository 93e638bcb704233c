use classroom_sync::config::Config;
use classroom_sync::routes;
use classroom_sync::services::reaper::spawn_reaper_task;
use classroom_sync::state::AppState;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // A missing .env is normal outside development.
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let port = config.port;
    let sweep_interval = config.sweep_interval;
    let state = AppState::new(config);

    let _reaper = spawn_reaper_task(state.registry.clone(), sweep_interval);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "classroom-sync listening");
    axum::serve(listener, app).await
}
