use broker::listener::{self, Subscription};
use broker::publish::RedisEventSink;
use broker::queue::RedisTaskQueue;
use broker::status::RedisAgentStatusStore;
use events::{channels, EventPublisher};
use log::*;
use service::{config::Config, logging::Logger};
use std::sync::Arc;
use ws::EnvelopeHandler;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
        std::process::exit(1);
    }

    info!(
        "Starting realtime node [{}] with broker {}",
        config.runtime_env(),
        config.redis_url()
    );

    let broker_client = match broker::connect(config.redis_url()) {
        Ok(client) => client,
        Err(e) => {
            error!("Invalid broker configuration: {e}");
            std::process::exit(1);
        }
    };

    // No upstream feed, no node.
    let subscription = match Subscription::open(&broker_client, &channels::ALL).await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!("Failed to subscribe to broker channels: {e}");
            std::process::exit(1);
        }
    };

    let connection = match broker::open_connection(&broker_client).await {
        Ok(connection) => connection,
        Err(e) => {
            error!("Failed to open broker connection: {e}");
            std::process::exit(1);
        }
    };

    let ws_manager = Arc::new(ws::Manager::new());
    let publisher =
        EventPublisher::new().with_handler(Arc::new(EnvelopeHandler::new(ws_manager.clone())));

    let app_state = web::AppState::new(
        config,
        ws_manager,
        Arc::new(RedisTaskQueue::new(connection.clone())),
        Arc::new(RedisEventSink::new(connection.clone())),
        Arc::new(RedisAgentStatusStore::new(connection)),
    );

    let mut listener_task = tokio::spawn(listener::run(subscription.into_stream(), publisher));
    let server = web::init_server(app_state, shutdown_signal());

    tokio::select! {
        result = server => {
            listener_task.abort();
            match result {
                Ok(()) => info!("Server shut down gracefully"),
                Err(e) => {
                    error!("Server error: {e}");
                    std::process::exit(1);
                }
            }
        }
        _ = &mut listener_task => {
            error!("Lost the broker subscription, shutting down");
            std::process::exit(1);
        }
    }
}

/// Resolves on ctrl-c, or on SIGTERM from a process supervisor.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install ctrl-c handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Interrupt received, shutting down gracefully"),
        _ = terminate => info!("SIGTERM received, shutting down gracefully"),
    }
}
