pub mod client_api;
pub mod driver;
pub mod rejoin;
pub mod ring;
pub mod setup;
pub mod shutdown;
pub mod web;
