// Services module - Business logic

pub mod attendance_sync;
pub mod checkin_token;
pub mod description;
pub mod finance;
pub mod password;
pub mod qr_generator;
pub mod storage;
