pub mod notification;
pub mod preferences;

pub use notification::{Notification, NotificationFilter, NotificationType, RealtimeChange};
pub use preferences::{
    EmailFrequency, NotificationPreferences, PreferencesPatch, PushKeys, PushSubscription,
};
