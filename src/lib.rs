pub mod auth;
pub mod compactor;
pub mod engine;
pub mod grid;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod site;
pub mod tls;
pub mod wal;
pub mod wire;
