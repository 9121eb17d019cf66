/// A settled connectivity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Connected(bool),
    Foreground(bool),
}

/// Last settled value of both signal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    pub connected: bool,
    pub foreground: bool,
}

impl Default for ConnectivityState {
    /// A freshly launched app is assumed reachable and in the foreground.
    fn default() -> Self {
        Self {
            connected: true,
            foreground: true,
        }
    }
}

impl ConnectivityState {
    pub fn apply(&mut self, event: ConnectivityEvent) {
        match event {
            ConnectivityEvent::Connected(connected) => self.connected = connected,
            ConnectivityEvent::Foreground(foreground) => self.foreground = foreground,
        }
    }

    /// Whether this state should be published as Online.
    pub fn is_present(&self) -> bool {
        self.connected && self.foreground
    }
}

/// Handle returned by [`super::ConnectivityMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(pub(crate) u64);
