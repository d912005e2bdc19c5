// Models module - Database entity representations

pub mod access_code;
pub mod attendance_event;
pub mod gym;
pub mod member;
pub mod plan;
pub mod subscription_update;
pub mod user;

pub use access_code::AccessCode;
pub use attendance_event::AttendanceEvent;
pub use gym::Gym;
pub use member::Member;
pub use plan::Plan;
pub use subscription_update::SubscriptionUpdate;
pub use user::User;
