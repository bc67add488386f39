use concierge_sessions::StatusSurface;

/// Shared state for the status routes.
pub struct GatewayState {
    pub status: StatusSurface,
    pub business_phone: String,
    pub version: &'static str,
}

impl GatewayState {
    pub fn new(status: StatusSurface, business_phone: impl Into<String>) -> Self {
        Self {
            status,
            business_phone: business_phone.into(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
