//! Local HTTP server standing in for a vendor API

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// A running mock vendor; the server task stops when the test runtime ends
pub struct MockVendor {
    addr: SocketAddr,
}

impl MockVendor {
    /// Serve `router` on an ephemeral localhost port
    pub async fn start(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock vendor");
        let addr = listener.local_addr().expect("mock vendor address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Self { addr }
    }

    /// Base URL to hand to an adapter
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}
