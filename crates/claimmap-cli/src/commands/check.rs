use std::path::Path;

use anyhow::{Context, Result};
use claimmap_auth::MappingProvider;
use claimmap_config::{LoadedProvider, ProviderSet};
use serde_json::{Value, json};

use crate::cli::OutputFormat;
use crate::output::{print_json, print_success, print_table};

const HEADER: [&str; 6] = [
    "IdP",
    "Name",
    "Enabled",
    "Subject claim",
    "Localpart template",
    "Extra attributes",
];

pub fn check(path: &Path, format: OutputFormat) -> Result<()> {
    let providers = ProviderSet::load(path)
        .with_context(|| format!("Invalid provider file {}", path.display()))?;

    match format {
        OutputFormat::Json => print_json(&summary(&providers))?,
        OutputFormat::Table => {
            print_success(&format!(
                "{} is valid ({} providers, {} enabled)",
                path.display(),
                providers.len(),
                providers.enabled().count()
            ));
            print_table(HEADER, &rows(&providers), "No providers configured.");
        }
    }
    Ok(())
}

fn rows(providers: &ProviderSet) -> Vec<[String; 6]> {
    providers.iter().map(row).collect()
}

fn row(provider: &LoadedProvider) -> [String; 6] {
    let config = provider.mapping_config();
    let extras: Vec<&str> = config.extra_attributes.keys().map(String::as_str).collect();
    [
        provider.idp_id.clone(),
        provider.idp_name.clone(),
        if provider.enabled { "yes" } else { "no" }.to_string(),
        config.subject_claim.to_string(),
        config
            .localpart_template
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string),
        if extras.is_empty() {
            "-".to_string()
        } else {
            extras.join(", ")
        },
    ]
}

fn summary(providers: &ProviderSet) -> Value {
    let entries: Vec<Value> = providers
        .iter()
        .map(|provider| {
            json!({
                "idp_id": provider.idp_id,
                "idp_name": provider.idp_name,
                "enabled": provider.enabled,
                "module": provider.mapping.module_name(),
                "config": provider.mapping_config(),
            })
        })
        .collect();
    json!({ "valid": true, "providers": entries })
}
