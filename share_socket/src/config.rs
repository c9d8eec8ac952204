/// Connection settings for a [`ShareSocket`](crate::ShareSocket).
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub address: String,
    pub port: u16,
    /// Stable identity surviving reconnects. `None` lets the server assign one.
    pub client_id: Option<String>,
    pub name: String,
    pub mac: String,
    /// Accept incoming file offers immediately so transfers always progress.
    pub auto_accept: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 18080,
            client_id: None,
            name: String::new(),
            mac: String::new(),
            auto_accept: true,
        }
    }
}

impl SocketConfig {
    pub fn base_url(&self) -> String {
        format!("ws://{}:{}/", self.address, self.port)
    }
}

pub struct SocketConfigBuilder {
    config: SocketConfig,
}

impl Default for SocketConfigBuilder {
    fn default() -> Self {
        Self { config: SocketConfig::default() }
    }
}

impl SocketConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> SocketConfig {
        self.config
    }

    pub fn address<S: AsRef<str>>(mut self, address: S) -> Self {
        self.config.address = address.as_ref().to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn client_id<S: AsRef<str>>(mut self, client_id: S) -> Self {
        self.config.client_id = Some(client_id.as_ref().to_string());
        self
    }

    pub fn name<S: AsRef<str>>(mut self, name: S) -> Self {
        self.config.name = name.as_ref().to_string();
        self
    }

    pub fn mac<S: AsRef<str>>(mut self, mac: S) -> Self {
        self.config.mac = mac.as_ref().to_string();
        self
    }

    pub fn auto_accept(mut self, auto_accept: bool) -> Self {
        self.config.auto_accept = auto_accept;
        self
    }
}
