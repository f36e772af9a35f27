use dotenvy::dotenv;
use tracing::info;

use planning_payments::infra::{
    app::create_app,
    reconciliation_worker::run_reconciliation_loop,
    setup::{init_app_state, init_tracing},
};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let app_state = init_app_state().await?;

    // Read what the worker and listener need before moving app_state
    let bind_addr = app_state.config.bind_addr;
    let reconcile_every = app_state.config.reconcile_interval_secs;

    tokio::spawn(run_reconciliation_loop(
        app_state.payments.clone(),
        reconcile_every,
    ));

    let app = create_app(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Payments backend listening at {}", &listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
