use super::*;

#[test]
fn test_add_folder_request_camel_case() {
    let req: AddFolderRequest =
        serde_json::from_str(r#"{"folderPath": "/proj", "description": "demo"}"#).unwrap();
    assert_eq!(req.folder_path, "/proj");
    assert_eq!(req.description.as_deref(), Some("demo"));
    assert!(req.validate().is_ok());

    let req: AddFolderRequest = serde_json::from_str(r#"{"folderPath": "  "}"#).unwrap();
    assert!(req.validate().unwrap_err().contains("folderPath"));
}

#[test]
fn test_search_request_defaults() {
    let req: SearchRequest = serde_json::from_str(r#"{"query": "parse config"}"#).unwrap();
    assert_eq!(req.retrieve, RetrieveMode::Chunk);
    assert!(req.limit.is_none());
    assert!(req.folder_path.is_none());
    assert_eq!(req.effective_limit(10, MAX_SEARCH_LIMIT), 10);
}

#[test]
fn test_search_request_full_mode() {
    let req: SearchRequest = serde_json::from_str(
        r#"{"query": "q", "limit": 5, "folderPath": "/proj", "retrieve": "full"}"#,
    )
    .unwrap();
    assert_eq!(req.retrieve, RetrieveMode::Full);
    assert_eq!(req.effective_limit(10, 50), 5);
    assert_eq!(req.folder_path.as_deref(), Some("/proj"));
}

#[test]
fn test_search_request_rejects_unknown_mode() {
    let result: Result<SearchRequest, _> =
        serde_json::from_str(r#"{"query": "q", "retrieve": "everything"}"#);
    assert!(result.is_err());
}

#[test]
fn test_search_limit_clamped() {
    let mut req: SearchRequest = serde_json::from_str(r#"{"query": "q", "limit": 500}"#).unwrap();
    assert_eq!(req.effective_limit(10, MAX_SEARCH_LIMIT), 50);

    req.limit = Some(0);
    assert!(req.validate().is_err());
}

#[test]
fn test_search_request_empty_query() {
    let req: SearchRequest = serde_json::from_str(r#"{"query": ""}"#).unwrap();
    assert!(req.validate().unwrap_err().contains("query"));
}

#[test]
fn test_scan_response_serializes_camel_case() {
    let response = ScanResponse {
        folder_path: "/proj".into(),
        files_indexed: 2,
        ..Default::default()
    };
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["filesIndexed"], 2);
    assert_eq!(json["filesUpdated"], 0);
    assert_eq!(json["filesSkipped"], 0);
    assert!(json["errors"].as_array().unwrap().is_empty());
}

#[test]
fn test_folder_status_lowercase() {
    assert_eq!(serde_json::to_value(FolderStatus::Active).unwrap(), "active");
    assert_eq!(serde_json::to_value(RetrieveMode::Full).unwrap(), "full");
}
