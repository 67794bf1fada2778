use super::*;

#[test]
fn rag_errors_map_to_status_codes() {
    let cases = [
        (
            RagError::InvalidQuery("empty".to_string()),
            StatusCode::BAD_REQUEST,
        ),
        (
            RagError::Retrieval(Box::new(RagError::IndexUnavailable("down".to_string()))),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (
            RagError::Generation("timeout".to_string()),
            StatusCode::BAD_GATEWAY,
        ),
        (RagError::IngestionInProgress, StatusCode::CONFLICT),
        (
            RagError::Database("locked".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, expected) in cases {
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), expected);
    }
}
