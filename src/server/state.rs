use axum::extract::FromRef;
use std::time::Instant;

use crate::market::Marketplace;

use super::ServerConfig;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub marketplace: Marketplace,
    pub hash: String,
}

impl ServerState {
    pub fn new(config: ServerConfig, marketplace: Marketplace) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            marketplace,
            hash: env!("GIT_HASH").to_string(),
        }
    }
}

impl FromRef<ServerState> for Marketplace {
    fn from_ref(input: &ServerState) -> Self {
        input.marketplace.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
