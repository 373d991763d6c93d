mod display_name;
mod identity;
mod mail_task;
mod plan;
mod reminder_marker;
mod reminder_window;
mod subscription_status;
mod user_email;
// allow external `use` statements to skip `user_email` etc
pub use display_name::DisplayName;
pub use identity::Identity;
pub use mail_task::MailTask;
pub use mail_task::MailTemplate;
pub use plan::Plan;
pub use plan::PlanCatalog;
pub use reminder_marker::ReminderMarker;
pub use reminder_marker::ABANDONED_REGISTRATION;
pub use reminder_window::ReminderWindow;
pub use subscription_status::SubscriptionStatus;
pub use user_email::UserEmail;
