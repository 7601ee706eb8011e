#[cfg(test)]
mod tests {
    use hyper::{HeaderMap, header::AUTHORIZATION};
    use warp::http::StatusCode;
    use crate::errors::StoreError;
    use crate::handlers::{handle_rejection, is_authenticated, request_uri};
    use crate::GatewayError;
    use warp::Reply;

    #[tokio::test]
    async fn test_handle_not_found_rejection() {
        let rejection = warp::reject::not_found();
        let response = handle_rejection(rejection).await.unwrap();
        assert_eq!(response.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_handle_upstream_rejection() {
        let rejection = warp::reject::custom(GatewayError::Upstream("refused".to_string()));
        let response = handle_rejection(rejection).await.unwrap();
        assert_eq!(response.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_handle_timeout_rejection() {
        let rejection = warp::reject::custom(GatewayError::Timeout);
        let response = handle_rejection(rejection).await.unwrap();
        assert_eq!(response.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_handle_store_rejection() {
        let err = StoreError::Io(std::io::Error::other("disk gone"));
        let rejection = warp::reject::custom(GatewayError::Store(err));
        let response = handle_rejection(rejection).await.unwrap();
        assert_eq!(response.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_handle_bad_request_rejection() {
        let rejection = warp::reject::custom(GatewayError::BadRequest("bad host".to_string()));
        let response = handle_rejection(rejection).await.unwrap();
        assert_eq!(response.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_authentication() {
        let mut headers = HeaderMap::new();
        assert!(!is_authenticated(&headers, Some("secret")));

        headers.insert(AUTHORIZATION, "Invalid".parse().unwrap());
        assert!(!is_authenticated(&headers, Some("secret")));

        headers.insert(AUTHORIZATION, "Bearer wrong".parse().unwrap());
        assert!(!is_authenticated(&headers, Some("secret")));

        headers.insert(AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert!(is_authenticated(&headers, Some("secret")));

        // no configured token disables admin access
        assert!(!is_authenticated(&headers, None));
    }

    #[test]
    fn test_request_uri_uses_forwarded_proto() {
        let mut headers = HeaderMap::new();
        headers.insert("host", "blog.example".parse().unwrap());
        let uri = request_uri(&headers, "/blogs", "page=2").unwrap();
        assert_eq!(uri.to_string(), "http://blog.example/blogs?page=2");

        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        let uri = request_uri(&headers, "/", "").unwrap();
        assert_eq!(uri.scheme_str(), Some("https"));
    }

    #[test]
    fn test_request_uri_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("host", "blog.example".parse().unwrap());

        headers.insert("x-forwarded-proto", "https,http".parse().unwrap());
        let uri = request_uri(&headers, "/blogs", "").unwrap();
        assert_eq!(uri.to_string(), "https://blog.example/blogs");

        headers.insert("x-forwarded-proto", " HTTPS , http".parse().unwrap());
        let uri = request_uri(&headers, "/blogs", "").unwrap();
        assert_eq!(uri.scheme_str(), Some("https"));

        headers.insert("x-forwarded-proto", "not a scheme".parse().unwrap());
        let uri = request_uri(&headers, "/blogs", "").unwrap();
        assert_eq!(uri.scheme_str(), Some("http"));
    }
}
