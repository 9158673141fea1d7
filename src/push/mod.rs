pub mod gate;
pub mod manager;
pub mod platform;

pub use manager::{PushManager, PushState};
pub use platform::{LogPlatform, PermissionState, PushDisplay, PushPlatform};
