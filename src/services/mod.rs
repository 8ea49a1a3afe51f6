pub mod auth;
pub mod events;
pub mod init;
pub mod routines;
pub mod tasks;
