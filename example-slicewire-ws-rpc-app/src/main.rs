use example_slicewire_service_definition::{
    BaseError, EchoImpl, EchoPrx, EchoServant, Graph, Node, register_types,
};
use slicewire::slicing::TypeRegistry;
use slicewire::stream::Identity;
use slicewire_tokio_rpc_client::RpcClient;
use slicewire_tokio_rpc_server::utils::bind_tcp_listener_on_random_port;
use slicewire_tokio_rpc_server::{ObjectAdapter, RpcServer, ServerConfig};
use std::sync::Arc;
use tokio::join;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut registry = TypeRegistry::new();
    register_types(&mut registry);
    let registry = Arc::new(registry);

    // Bind to a random available port
    let (listener, port) = bind_tcp_listener_on_random_port().await?;

    {
        let adapter = ObjectAdapter::new("demo").with_registry(registry.clone());
        let server = Arc::new(RpcServer::from_adapter(adapter, ServerConfig::default()));
        server
            .adapter()
            .add(
                Identity::new("echo"),
                Arc::new(EchoServant::new(Arc::new(EchoImpl::new()))),
            )
            .await?;

        let _server_task = tokio::spawn(async move {
            if let Err(error) = server.serve_with_listener(listener).await {
                tracing::error!(%error, "server stopped");
            }
        });
    }

    let rpc_client = RpcClient::new("127.0.0.1", port).await?;
    rpc_client.set_state_change_handler(|state| tracing::info!(?state, "transport state changed"));

    let Some(echo) =
        EchoPrx::checked_cast(rpc_client.proxy(Identity::new("echo")).with_registry(registry))
            .await?
    else {
        return Err("`echo` does not implement ::Test::Echo".into());
    };

    // `join!` will await all responses before proceeding
    let (sum, optional, bytes) = join!(
        echo.add(1, 2),
        echo.op_optional(7, Some("seven")),
        echo.echo_bytes(b"hello slicewire"),
    );
    println!("add(1, 2) = {}", sum?);
    println!("opOptional(7, \"seven\") = {:?}", optional?);
    println!("echoBytes = {:?}", String::from_utf8_lossy(&bytes?));

    let Graph { graph, root } = echo.get_cycle().await?;
    if let Some(first) = root.and_then(|root| graph.downcast::<Node>(root)) {
        let second = first.next.and_then(|next| graph.downcast::<Node>(next));
        println!(
            "getCycle: {} -> {:?} -> back to root: {}",
            first.value,
            second.map(|node| node.value),
            second.and_then(|node| node.next) == root
        );
    }

    match echo.raise(1).await {
        Err(error) => match error.user_exception::<BaseError>() {
            Some(base) => println!("raise(1) threw a BaseError: {}", base.reason),
            None => println!("raise(1) failed: {error}"),
        },
        Ok(()) => println!("raise(1) returned normally"),
    }

    Ok(())
}
