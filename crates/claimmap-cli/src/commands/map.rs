use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use claimmap_auth::federation::provisioning::{
    AccountProvisioner, LoginOutcome, ProvisioningConfig, ProvisioningError, RegistrationOutcome,
    RegistrationRequest, SsoLoginService,
};
use claimmap_auth::{MappingProvider, MappingResult};
use claimmap_config::ProviderSet;
use claimmap_core::ClaimStore;
use serde_json::json;

use crate::cli::{MapArgs, OutputFormat};
use crate::output::{print_fields, print_json, print_success, print_table, print_warning};

pub async fn map(providers_path: &Path, args: &MapArgs, format: OutputFormat) -> Result<()> {
    let providers = ProviderSet::load(providers_path)
        .with_context(|| format!("Invalid provider file {}", providers_path.display()))?;
    let provider = providers.get(&args.idp).with_context(|| {
        format!(
            "No enabled provider `{}` in {}",
            args.idp,
            providers_path.display()
        )
    })?;

    let claims = read_claims(args.claims.as_deref())?;
    let mapping = provider.mapping.as_ref();
    let subject = mapping.get_remote_user_id(&claims)?;

    if args.taken.is_empty() {
        let result = mapping.map_user_attributes(&claims, args.failures).await?;
        match format {
            OutputFormat::Json => print_json(&json!({ "subject": subject, "attributes": result }))?,
            OutputFormat::Table => print_mapping(&subject, &result),
        }
        return Ok(());
    }

    let service = SsoLoginService::new(
        DryRunAccounts::new(&args.taken, &args.server_name),
        ProvisioningConfig::default(),
    );
    let outcome = service.complete_login(&args.idp, mapping, &claims).await?;
    match format {
        OutputFormat::Json => print_json(&login_summary(&subject, &outcome))?,
        OutputFormat::Table => print_login(&subject, &outcome),
    }
    Ok(())
}

fn read_claims(path: Option<&Path>) -> Result<ClaimStore> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read claims from {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read claims from stdin")?;
            buf
        }
    };
    ClaimStore::from_json_str(&content).context("Invalid claims document")
}

fn print_mapping(subject: &str, result: &MappingResult) {
    print_fields(&[
        ("Subject", Some(subject)),
        ("Localpart", result.localpart.as_deref()),
        ("Display name", result.display_name.as_deref()),
        ("Email", result.emails.first().map(String::as_str)),
    ]);
    let rows: Vec<[String; 2]> = result
        .extra
        .iter()
        .map(|(name, value)| [name.clone(), value.clone()])
        .collect();
    print_table(["Attribute", "Value"], &rows, "No extra attributes.");
}

fn print_login(subject: &str, outcome: &LoginOutcome) {
    match outcome {
        LoginOutcome::Registered {
            user_id,
            localpart,
            failures,
        } => {
            print_success(&format!(
                "Would register {user_id} (localpart `{localpart}` after {failures} taken)"
            ));
        }
        LoginOutcome::ExistingUser { user_id } => {
            print_success(&format!("Would log in existing user {user_id}"));
        }
        LoginOutcome::LocalpartRequired { attributes, .. } => {
            print_warning("No localpart could be mapped, the user would be asked to pick one");
            print_mapping(subject, attributes);
        }
    }
}

fn login_summary(subject: &str, outcome: &LoginOutcome) -> serde_json::Value {
    match outcome {
        LoginOutcome::Registered {
            user_id,
            localpart,
            failures,
        } => json!({
            "subject": subject,
            "outcome": outcome.to_string(),
            "user_id": user_id,
            "localpart": localpart,
            "failures": failures,
        }),
        LoginOutcome::ExistingUser { user_id } => json!({
            "subject": subject,
            "outcome": outcome.to_string(),
            "user_id": user_id,
        }),
        LoginOutcome::LocalpartRequired { attributes, .. } => json!({
            "subject": subject,
            "outcome": outcome.to_string(),
            "attributes": attributes,
        }),
    }
}

/// Account store for simulated logins: nothing is linked yet and the given
/// localparts are registered.
struct DryRunAccounts {
    taken: HashSet<String>,
    server_name: String,
}

impl DryRunAccounts {
    fn new(taken: &[String], server_name: &str) -> Self {
        Self {
            taken: taken.iter().cloned().collect(),
            server_name: server_name.to_string(),
        }
    }
}

#[async_trait]
impl AccountProvisioner for DryRunAccounts {
    async fn find_by_external_id(
        &self,
        _provider_id: &str,
        _subject: &str,
    ) -> Result<Option<String>, ProvisioningError> {
        Ok(None)
    }

    async fn try_register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationOutcome, ProvisioningError> {
        if self.taken.contains(&request.localpart) {
            return Ok(RegistrationOutcome::LocalpartTaken);
        }
        Ok(RegistrationOutcome::Registered {
            user_id: format!("@{}:{}", request.localpart, self.server_name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDERS: &str = r#"
[[oidc_providers]]
idp_id = "midata"

[oidc_providers.user_mapping_provider.config]
localpart_template = "{{ user.preferred_username }}"
"#;

    fn write_fixture(dir: &tempfile::TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
        let providers = dir.path().join("providers.toml");
        let claims = dir.path().join("claims.json");
        std::fs::write(&providers, PROVIDERS).unwrap();
        std::fs::write(&claims, r#"{"sub": "abc123", "preferred_username": "Jane.Doe"}"#).unwrap();
        (providers, claims)
    }

    fn args(claims: &Path, taken: &[&str]) -> MapArgs {
        MapArgs {
            idp: "midata".into(),
            claims: Some(claims.to_path_buf()),
            failures: 0,
            taken: taken.iter().map(|t| t.to_string()).collect(),
            server_name: "example.org".into(),
        }
    }

    #[tokio::test]
    async fn test_dry_run_accounts() {
        let accounts = DryRunAccounts::new(&["jane".to_string()], "example.org");
        let mut request = RegistrationRequest {
            provider_id: "midata".into(),
            subject: "abc".into(),
            localpart: "jane".into(),
            attributes: MappingResult::default(),
        };
        assert_eq!(
            accounts.try_register(&request).await.unwrap(),
            RegistrationOutcome::LocalpartTaken
        );

        request.localpart = "jane1".into();
        assert_eq!(
            accounts.try_register(&request).await.unwrap(),
            RegistrationOutcome::Registered {
                user_id: "@jane1:example.org".into()
            }
        );
        assert_eq!(accounts.find_by_external_id("midata", "abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_map_command() {
        let dir = tempfile::TempDir::new().unwrap();
        let (providers, claims) = write_fixture(&dir);
        map(&providers, &args(&claims, &[]), OutputFormat::Json)
            .await
            .unwrap();
        map(&providers, &args(&claims, &["jane.doe"]), OutputFormat::Table)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_map_unknown_idp() {
        let dir = tempfile::TempDir::new().unwrap();
        let (providers, claims) = write_fixture(&dir);
        let mut args = args(&claims, &[]);
        args.idp = "github".into();

        let err = map(&providers, &args, OutputFormat::Json).await.unwrap_err();
        assert!(err.to_string().contains("github"));
    }

    #[test]
    fn test_login_summary() {
        let outcome = LoginOutcome::Registered {
            user_id: "@jane.doe1:example.org".into(),
            localpart: "jane.doe1".into(),
            failures: 1,
        };
        let summary = login_summary("abc123", &outcome);
        assert_eq!(summary["outcome"], "registered");
        assert_eq!(summary["localpart"], "jane.doe1");
        assert_eq!(summary["failures"], 1);
    }
}
