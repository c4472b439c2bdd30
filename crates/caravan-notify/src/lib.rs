pub mod channel;
pub mod notifiers;

pub use channel::{InMemoryOutbox, Notification, NotificationChannel, TracingChannel};
pub use notifiers::{GuestNotifier, HostNotifier, ReviewRequestNotifier};
