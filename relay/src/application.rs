use actix::*;
use actix_web::{dev::Server, web, App, HttpServer};
use std::net::TcpListener;
use tracing::{info, warn};

use crate::settings::Settings;

use self::registry::Registry;

mod registry;
mod services;
mod session;
use services::{connect, health_check};

/// How many successive ports are tried when the configured one is taken.
const MAX_BIND_ATTEMPTS: u16 = 10;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("ports {base}..={last} all in use")]
    PortsExhausted { base: u16, last: u16 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(configuration: Settings) -> Result<Self, BuildError> {
        let listener = bind_with_fallback(
            &configuration.application.host,
            configuration.application.port,
        )?;
        let port = listener.local_addr()?.port();
        info!("Running on port: {port}");

        let server = create_server(listener)?;
        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

/// A taken port is not fatal right away: the next ones are tried, bounded, so
/// several instances can coexist on one machine.
fn bind_with_fallback(host: &str, base: u16) -> Result<TcpListener, BuildError> {
    let mut port = base;
    for _ in 0..MAX_BIND_ATTEMPTS {
        match TcpListener::bind((host, port)) {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && base != 0 => {
                warn!("port {port} in use, trying {}", port + 1);
                port += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(BuildError::PortsExhausted { base, last: port - 1 })
}

pub fn create_server(listener: TcpListener) -> Result<Server, BuildError> {
    let registry = web::Data::new(Registry::default().start());
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(registry.clone())
            .service(health_check)
            .service(connect)
    })
    .listen(listener)?
    .run())
}
