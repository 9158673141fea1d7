pub mod realtime;
pub mod store;

pub use realtime::{ChannelStatus, RealtimeReconciler};
pub use store::{NotificationStore, PageLoad};
