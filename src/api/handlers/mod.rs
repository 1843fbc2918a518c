pub mod internal;
pub mod posts;
pub mod status;
pub mod users;
