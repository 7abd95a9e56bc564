pub mod notification;
pub mod provider;

pub use notification::{BroadcastNotifier, NotificationChannel};
pub use provider::{OfflineRouteProvider, RouteProvider};
