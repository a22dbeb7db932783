// crates/aligned-operator/src/http.rs
//
// reqwest client construction shared by the chain RPC client and the
// aggregator client.

use std::time::Duration;

/// Build a client whose requests time out after `timeout`.
///
/// If the builder fails the default client is used instead. That client has
/// no request timeout, so the fallback is logged.
pub fn client_with_timeout(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(
                "Failed to build HTTP client with {:?} timeout: {}. Falling back to no timeout.",
                timeout,
                e
            );
            reqwest::Client::new()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_client_applies_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept the connection and never answer.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let client = client_with_timeout(Duration::from_millis(100));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.get(format!("http://{}/", addr)).send(),
        )
        .await
        .expect("client ignored its timeout");

        let err = result.unwrap_err();
        assert!(err.is_timeout(), "{}", err);
        server.abort();
    }
}
