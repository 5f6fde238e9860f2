//! Integration tests for provider files and the provider registry.

use claimmap_auth::MappingProvider;
use claimmap_config::{ConfigError, ProviderRegistry};
use claimmap_core::ClaimStore;
use serde_json::json;
use tempfile::TempDir;

const PROVIDERS: &str = r#"
[[oidc_providers]]
idp_id = "midata"
idp_name = "MIDATA"

[oidc_providers.user_mapping_provider]
module = "template"

[oidc_providers.user_mapping_provider.config]
subject_claim = "entry[0].resource.identifier[0].value"
localpart_template = "{{ user.entry[0].resource.name[0].family }}"
required_fields = ["localpart"]
max_localpart_length = 8

[[oidc_providers]]
idp_id = "github"

[oidc_providers.user_mapping_provider.config]
subject_claim = "id"
localpart_template = "{{ user.login }}"
display_name_template = "{{ user.name }}"
"#;

fn write_providers(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("providers.toml");
    std::fs::write(&path, content).expect("Failed to write provider file");
    path
}

#[tokio::test]
async fn test_registry_serves_mapping_providers() {
    let dir = TempDir::new().unwrap();
    let registry = ProviderRegistry::load(write_providers(&dir, PROVIDERS)).unwrap();
    let providers = registry.snapshot();

    let midata = providers.get("midata").unwrap();
    let claims = ClaimStore::from_value(json!({
        "entry": [{ "resource": {
            "identifier": [{ "value": "p-1" }],
            "name": [{ "family": "Vonlanthen" }]
        } }]
    }))
    .unwrap();
    assert_eq!(midata.mapping.get_remote_user_id(&claims).unwrap(), "p-1");
    let result = midata.mapping.map_user_attributes(&claims, 3).await.unwrap();
    assert_eq!(result.localpart.as_deref(), Some("vonlanth3"));

    let github = providers.get("github").unwrap();
    let claims = ClaimStore::from_value(json!({ "id": 583231, "login": "octocat", "name": "The Octocat" })).unwrap();
    assert_eq!(github.mapping.get_remote_user_id(&claims).unwrap(), "583231");
    let result = github.mapping.map_user_attributes(&claims, 0).await.unwrap();
    assert_eq!(result.display_name.as_deref(), Some("The Octocat"));
}

#[tokio::test]
async fn test_required_localpart_from_file() {
    let dir = TempDir::new().unwrap();
    let registry = ProviderRegistry::load(write_providers(&dir, PROVIDERS)).unwrap();
    let midata = registry.get("midata").unwrap();

    let claims = ClaimStore::from_value(json!({
        "entry": [{ "resource": { "identifier": [{ "value": "p-2" }] } }]
    }))
    .unwrap();
    let err = midata.mapping.map_user_attributes(&claims, 0).await.unwrap_err();
    assert!(err.to_string().contains("localpart"));
}

#[test]
fn test_bad_reload_is_reported_with_path() {
    let dir = TempDir::new().unwrap();
    let path = write_providers(&dir, PROVIDERS);
    let registry = ProviderRegistry::load(&path).unwrap();

    std::fs::write(
        &path,
        PROVIDERS.replace("max_localpart_length = 8", "max_localpart_length = \"eight\""),
    )
    .unwrap();

    match registry.reload() {
        Err(ConfigError::Mapping(err)) => assert_eq!(
            err.path_string(),
            "oidc_providers[0].user_mapping_provider.config.max_localpart_length"
        ),
        other => panic!("unexpected reload result {other:?}"),
    }
    assert_eq!(registry.snapshot().len(), 2);
}
