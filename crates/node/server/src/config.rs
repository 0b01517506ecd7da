use ember_net_dialer::DialerConfig;

/// Default capacity of the channel carrying new peers to the registry.
pub const DEFAULT_PEER_BUFFER: usize = 100;

/// Default capacity of the command channel.
pub const DEFAULT_COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Endpoints to listen on, one listener each, in order.
    pub listen_addrs: Vec<String>,
    /// New peers that may wait for the registry before producers block.
    pub peer_buffer: usize,
    pub command_buffer: usize,
    pub dialer: DialerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addrs: Vec::new(),
            peer_buffer: DEFAULT_PEER_BUFFER,
            command_buffer: DEFAULT_COMMAND_BUFFER,
            dialer: DialerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addrs.push(addr.into());
        self
    }
}
