use freightline::config::Config;
use freightline::db::PgStore;
use freightline::engine::Engine;
use freightline::error::Error;
use freightline::external::HttpPaymentGateway;
use freightline::server::serve;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    let store = PgStore::new(&config.database_url, config.max_connections).await?;

    let mut engine = Engine::new(Box::new(store))?.with_max_retries(config.accept_max_retries);

    match config.payment {
        Some(payment) => {
            engine = engine.with_payment_gateway(Box::new(HttpPaymentGateway::new(payment)));
        }
        None => tracing::warn!("PAYMENT_API_BASE or PAYMENT_API_KEY not set, settlement disabled"),
    }

    serve(engine, config.listen_addr).await
}
