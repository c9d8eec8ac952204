use tracing_subscriber::EnvFilter;

use relay::{application::Application, settings::Settings};

fn setup() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug")
    }
    tracing_subscriber::fmt::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    setup();
    let settings = Settings::from_env();
    Application::build(settings).await?.run_until_stopped().await?;
    Ok(())
}
