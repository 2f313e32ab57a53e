use greentext_core::store::CredentialStore;
use greentext_core::LlmProviderKind;
use tempfile::TempDir;

#[test]
fn credential_file_uses_two_provider_schema() {
    let dir = TempDir::new().expect("temp dir");
    let store = CredentialStore::new(dir.path().join("keys").join("saved_keys.json"));
    store
        .save(&LlmProviderKind::Anthropic, "claude", "sk-ant-123456")
        .expect("save");

    let raw = std::fs::read_to_string(store.path()).expect("read");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert!(value["openai"].as_object().expect("openai").is_empty());
    let entry = &value["anthropic"]["claude"];
    assert_eq!(entry["key"], "sk-ant-123456");
    assert_eq!(entry["hash"].as_str().map(str::len), Some(10));
}

#[test]
fn delete_of_unknown_name_reports_failure() {
    let dir = TempDir::new().expect("temp dir");
    let store = CredentialStore::new(dir.path().join("saved_keys.json"));
    store
        .save(&LlmProviderKind::OpenAi, "k1", "sk-x")
        .expect("save");
    let before = std::fs::read(store.path()).expect("read");

    assert!(!store
        .delete(&LlmProviderKind::OpenAi, "missing")
        .expect("delete"));
    assert_eq!(std::fs::read(store.path()).expect("read"), before);

    assert!(store.delete(&LlmProviderKind::OpenAi, "k1").expect("delete"));
    assert!(store.load().openai.is_empty());
}
