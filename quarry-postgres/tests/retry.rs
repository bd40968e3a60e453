#[cfg(test)]
mod tests {
    use quarry_postgres::{Backoff, PostgresConfig, PostgresConnection, RetryPolicy};
    use std::time::{Duration, Instant};

    /// With a persistently failing endpoint the adapter sleeps the backoff
    /// between attempts, so the elapsed time bounds the retry count from
    /// below: 3 attempts mean at least 2 backoff sleeps.
    #[tokio::test]
    async fn connect_retries_follow_the_configured_backoff() {
        let _ = env_logger::builder().is_test(true).try_init();
        // Port 1 is practically never listening; the connect fails fast.
        let config = PostgresConfig::new("127.0.0.1", "nobody", "nodb")
            .connect_retry(RetryPolicy {
                attempts: 3,
                backoff: Backoff::Fixed(Duration::from_millis(60)),
            });
        let config = PostgresConfig { port: 1, ..config };
        let started = Instant::now();
        let result = PostgresConnection::connect_with(config).await;
        assert!(result.is_err());
        assert!(
            started.elapsed() >= Duration::from_millis(120),
            "expected two backoff sleeps before surfacing the error"
        );
    }

    /// A disabled policy surfaces the first failure without sleeping.
    #[tokio::test]
    async fn disabled_retry_fails_on_the_first_attempt() {
        let config = PostgresConfig::new("127.0.0.1", "nobody", "nodb");
        let config = PostgresConfig { port: 1, ..config };
        let started = Instant::now();
        let result = PostgresConnection::connect_with(config).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
