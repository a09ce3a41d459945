#[cfg(test)]
pub mod tests {
    use std::sync::mpsc;
    use std::thread;

    use proxy_console::http::RestClient;
    use proxy_console::{ConsoleConfig, ConsoleError, Level, LookBack, MetricSeries};
    use tiny_http::{Header, Response, Server};

    struct Seen {
        url: String,
        authorization: Option<String>,
    }

    /// Serves the given responses in order, one per request, and reports what
    /// each request looked like.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, mpsc::Receiver<Seen>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for (status, body) in responses {
                let request = match server.recv() {
                    Ok(request) => request,
                    Err(_) => return,
                };
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_string());
                let _ = tx.send(Seen {
                    url: request.url().to_string(),
                    authorization,
                });

                let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                    .unwrap();
                let response = Response::from_string(body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        (format!("http://127.0.0.1:{port}"), rx)
    }

    fn client(base_url: String, token: Option<&str>) -> RestClient {
        let config = ConsoleConfig {
            base_url,
            token: token.map(str::to_string),
            ..ConsoleConfig::default()
        };
        RestClient::new(&config)
    }

    #[test]
    fn test_fetch_log_tail_sends_bearer_and_line_count() {
        let (base, seen) = serve(vec![(
            200,
            r#"{"logs":[
                {"timestamp":"2025-03-01T12:00:00","level":"ERROR","pid":7,"message":"read failed"},
                {"timestamp":"2025-03-01T12:00:01","level":"CONNECT","message":"Connect 10.0.0.1"}
            ],"count":2}"#,
        )]);

        let logs = client(base, Some("secret")).fetch_log_tail(50).unwrap();

        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].level, Level::Error);
        assert_eq!(logs[0].pid, Some(7));
        assert_eq!(logs[1].message, "Connect 10.0.0.1");

        let request = seen.recv().unwrap();
        assert_eq!(request.url, "/api/logs/tail?lines=50");
        assert_eq!(request.authorization.as_deref(), Some("Bearer secret"));
    }

    #[test]
    fn test_fetch_log_tail_clamps_lines_and_omits_missing_token() {
        let (base, seen) = serve(vec![(200, r#"{"logs":[]}"#)]);

        let logs = client(base, None).fetch_log_tail(5_000).unwrap();

        assert!(logs.is_empty());
        let request = seen.recv().unwrap();
        assert_eq!(request.url, "/api/logs/tail?lines=1000");
        assert_eq!(request.authorization, None);
    }

    #[test]
    fn test_fetch_metrics_history_skips_samples_without_time() {
        let (base, seen) = serve(vec![(
            200,
            r#"[
                {"timestamp":"2025-03-01T12:00:00","cpu":{"percent":12.5},"memory":{"percent":40}},
                {"cpu":{"percent":99}},
                {"timestamp":"2025-03-01T12:00:05","cpu":{"percent":14.0}}
            ]"#,
        )]);

        let samples = client(base, None)
            .fetch_metrics_history(MetricSeries::System, 300)
            .unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].get("cpu.percent"), Some(12.5));
        assert_eq!(samples[0].get("memory.percent"), Some(40.0));
        assert_eq!(samples[1].get("cpu.percent"), Some(14.0));
        assert_eq!(seen.recv().unwrap().url, "/api/system/metrics/history?seconds=300");
    }

    #[test]
    fn test_fetch_aggregated_accepts_wrapped_buckets() {
        let (base, seen) = serve(vec![(
            200,
            r#"{"buckets":[
                {"bucket":"2025-03-01T12:00:00","throughput":120.0},
                {"bucket":"2025-03-01T12:05:00","throughput":80.0}
            ]}"#,
        )]);

        let buckets = client(base, None)
            .fetch_aggregated(LookBack::SixHours)
            .unwrap();

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[1].get("throughput"), Some(80.0));
        assert_eq!(
            seen.recv().unwrap().url,
            "/api/performance/metrics/aggregated?hours=6&interval_minutes=5"
        );
    }

    #[test]
    fn test_server_error_is_reported() {
        let (base, _seen) = serve(vec![(500, r#"{"detail":"boom"}"#)]);

        let err = client(base, None).fetch_log_tail(10).unwrap_err();

        assert!(matches!(err, ConsoleError::Http { .. }), "got {err:?}");
    }

    #[test]
    fn test_malformed_body_is_reported() {
        let (base, _seen) = serve(vec![(200, "not json")]);

        let result = client(base, None).fetch_metrics_history(MetricSeries::Performance, 60);

        assert!(result.is_err());
    }
}
