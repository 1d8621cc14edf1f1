pub mod chat;
pub mod entities;
pub mod history;
pub mod providers;
pub mod serve;
