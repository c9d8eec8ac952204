const DEFAULT_PORT: u16 = 18080;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
    pub host: String,
}

impl Settings {
    /// `HOST`/`PORT` from the environment, with LAN-friendly defaults.
    /// A port of 0 lets the OS pick one.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Self {
            application: ApplicationSettings { host, port },
        }
    }
}
