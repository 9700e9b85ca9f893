// Models module - Database entity representations

pub mod activity;
pub mod admin;
pub mod attendance;
pub mod comment;
pub mod event;
pub mod finance;
pub mod gallery;
pub mod member;
pub mod sermon;
pub mod visitor;

pub use activity::ActivityLog;
pub use admin::Admin;
pub use attendance::{AttendanceRecord, AttendanceToken};
pub use comment::SermonComment;
pub use event::Event;
pub use finance::{FinanceRecord, Withdrawal};
pub use gallery::{GalleryAlbum, GalleryMedia};
pub use member::Member;
pub use sermon::Sermon;
pub use visitor::Visitor;
