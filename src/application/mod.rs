//! Application Layer
//!
//! Route table, per-route proxies and the retrying dialer they share.

mod api_proxy;
mod retrying_dialer;
mod route_table;

pub use api_proxy::{
    strip_hop_by_hop, ApiProxy, TransportSettings, X_FORWARDED_FOR, X_FORWARDED_HOST,
    X_FORWARDED_PROTO, X_REQUEST_ID,
};
pub use retrying_dialer::{DialedConnection, RetryingDialer};
pub use route_table::{RouteSummary, RouteTable};
