use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{invalid_input_error, Error};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub listen_addr: SocketAddr,
    pub accept_max_retries: u32,
    pub payment: Option<PaymentConfig>,
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub api_base: String,
    pub api_key: String,
}

impl Config {
    /// Reads configuration from the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();

        let payment = match (env::var("PAYMENT_API_BASE"), env::var("PAYMENT_API_KEY")) {
            (Ok(api_base), Ok(api_key)) => Some(PaymentConfig { api_base, api_key }),
            _ => None,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
            listen_addr: parse_or("LISTEN_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            accept_max_retries: parse_or("ACCEPT_MAX_RETRIES", 3)?,
            payment,
        })
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, Error> {
    match env::var(key) {
        Ok(value) => value.parse().map_err(|_| {
            tracing::error!("could not parse environment variable {}", key);
            invalid_input_error()
        }),
        Err(_) => Ok(default),
    }
}

#[test]
fn parse_or_falls_back_and_rejects_garbage() {
    env::remove_var("FREIGHTLINE_TEST_UNSET");
    assert_eq!(parse_or("FREIGHTLINE_TEST_UNSET", 7u32).unwrap(), 7);

    env::set_var("FREIGHTLINE_TEST_NUMBER", "12");
    assert_eq!(parse_or("FREIGHTLINE_TEST_NUMBER", 7u32).unwrap(), 12);

    env::set_var("FREIGHTLINE_TEST_GARBAGE", "twelve");
    assert!(parse_or("FREIGHTLINE_TEST_GARBAGE", 7u32)
        .unwrap_err()
        .is_invalid_input_error());
}
