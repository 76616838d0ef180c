pub mod auth;
pub mod capture;
pub mod config;
pub mod conn;
pub mod device;
pub mod error;
pub mod packet;
pub mod run;

#[cfg(test)]
mod test;
