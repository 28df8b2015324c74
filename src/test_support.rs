use axum::Router;
use tokio_util::sync::CancellationToken;

pub(crate) struct StubServer {
    port: u16,
    shutdown: CancellationToken,
}

impl StubServer {
    pub(crate) fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub(crate) async fn spawn_router(app: Router) -> StubServer {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind stub listener");
    let port = listener.local_addr().expect("stub local addr").port();
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled_owned().await })
                .await;
        }
    });

    StubServer { port, shutdown }
}
