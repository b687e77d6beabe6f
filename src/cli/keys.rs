//! Keys command implementation

use crate::app::Gateway;
use crate::cli::output::{format_credentials_table, wrap_json};
use crate::cli::{KeyIdArgs, KeysAddArgs, KeysListArgs};
use crate::resolver::ProviderRef;
use crate::vault::{mask, NewCredential};
use chrono::{Duration, Utc};

/// Handle `relay keys add`
pub async fn handle_keys_add(
    args: &KeysAddArgs,
    gateway: &Gateway,
) -> Result<String, Box<dyn std::error::Error>> {
    if args.key.trim().is_empty() {
        return Err("API key cannot be empty".into());
    }
    if let Some(days) = args.expires_in_days {
        if days <= 0 {
            return Err("--expires-in-days must be positive".into());
        }
    }

    let provider = gateway
        .resolver
        .resolve_provider_id(&ProviderRef::from(args.provider.as_str()))
        .await;
    let slug = gateway.resolver.provider_slug(provider).await;

    let id = gateway
        .vault
        .store(NewCredential {
            tenant_id: args.tenant,
            provider,
            label: args.label.clone(),
            key: args.key.clone(),
            is_default: args.default,
            expires_at: args.expires_in_days.map(|d| Utc::now() + Duration::days(d)),
        })
        .await?;

    let mut message = format!("✓ Stored key {} for {} as credential {}", mask(&args.key), slug, id);
    if args.default {
        message.push_str(" (default)");
    }
    Ok(message)
}

/// Handle `relay keys list`
pub async fn handle_keys_list(
    args: &KeysListArgs,
    gateway: &Gateway,
) -> Result<String, Box<dyn std::error::Error>> {
    let credentials = gateway.vault.list(args.tenant).await?;

    if args.json {
        return Ok(wrap_json("credentials", &credentials)?);
    }
    if credentials.is_empty() {
        return Ok(format!("No keys stored for tenant {}", args.tenant));
    }
    Ok(format_credentials_table(&credentials))
}

/// Handle `relay keys promote`
pub async fn handle_keys_promote(
    args: &KeyIdArgs,
    gateway: &Gateway,
) -> Result<String, Box<dyn std::error::Error>> {
    gateway.vault.promote(args.tenant, args.id).await?;
    Ok(format!("✓ Credential {} is now the default", args.id))
}

/// Handle `relay keys revoke`
pub async fn handle_keys_revoke(
    args: &KeyIdArgs,
    gateway: &Gateway,
) -> Result<String, Box<dyn std::error::Error>> {
    let outcome = gateway.vault.revoke(args.tenant, args.id).await?;

    let mut message = format!("✓ Revoked credential {}", args.id);
    match outcome.promoted {
        Some(promoted) => message.push_str(&format!("; credential {} is now the default", promoted)),
        None if outcome.was_default => message.push_str("; no key left for this provider"),
        None => {}
    }
    Ok(message)
}
