pub mod callback;
pub mod health;
pub mod info;
pub mod login;
pub mod refresh;
pub mod watch;
