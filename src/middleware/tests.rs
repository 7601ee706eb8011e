#[cfg(test)]
mod tests {
    use hyper::{HeaderMap, Method, StatusCode};
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use crate::middleware::{is_cache_hit, log_proxied, mark_cache_hit, ResponseSource};

    #[test]
    fn test_mark_cache_hit() {
        let mut headers = HeaderMap::new();
        assert!(!is_cache_hit(&headers));

        mark_cache_hit(&mut headers);

        assert_eq!(headers.get("x-offline-cache").unwrap(), "hit");
        assert!(is_cache_hit(&headers));
    }

    #[test]
    fn test_other_cache_values_are_not_hits() {
        let mut headers = HeaderMap::new();
        headers.insert("x-offline-cache", "miss".parse().unwrap());
        assert!(!is_cache_hit(&headers));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_proxied_summary_names_source() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            log_proxied(
                &Method::GET,
                "/blogs",
                StatusCode::OK,
                ResponseSource::Cache,
                Instant::now(),
            );
        });

        let line = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(line.contains("/blogs"), "{}", line);
        assert!(line.contains("status=200"), "{}", line);
        assert!(line.contains("source=cache"), "{}", line);
    }

    #[test]
    fn test_response_source_names() {
        assert_eq!(ResponseSource::Network.to_string(), "network");
        assert_eq!(ResponseSource::PassThrough.to_string(), "pass-through");
        assert_eq!(ResponseSource::Error.to_string(), "error");
    }
}
