mod rpc_client;
pub use rpc_client::*;

mod ws_transport;
pub use ws_transport::*;

pub use slicewire_rpc_caller::RpcTransportState;
