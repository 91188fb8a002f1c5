mod rpc_server;
pub use rpc_server::*;

mod server_config;
pub use server_config::*;

pub mod utils;

pub use slicewire_rpc_endpoint::{ObjectAdapter, Servant};
