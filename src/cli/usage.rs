//! Usage command implementation

use crate::app::Gateway;
use crate::cli::output::{format_usage_table, wrap_json};
use crate::cli::UsageArgs;
use colored::Colorize;

/// Handle `relay usage`
pub async fn handle_usage(
    args: &UsageArgs,
    gateway: &Gateway,
) -> Result<String, Box<dyn std::error::Error>> {
    let rows = gateway.ledger.usage_for(args.tenant, args.date).await?;

    if args.json {
        return Ok(wrap_json("usage", &rows)?);
    }
    if rows.is_empty() {
        return Ok(format!("No usage recorded for tenant {}", args.tenant));
    }

    let total: i64 = rows.iter().map(|r| r.value).sum();
    Ok(format!(
        "{}\n{} {}",
        format_usage_table(&rows),
        "Total:".bold(),
        total
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::metering::{today, CredentialType, UsageContext, UsageSource};
    use crate::resolver::ProviderId;
    use crate::vault::EnvCredentials;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_usage_json_and_table() {
        let mut config = RelayConfig::default();
        config.database.path = ":memory:".to_string();
        let gateway = Gateway::builder(config)
            .secret("cli test secret")
            .env_credentials(EnvCredentials::default())
            .build()
            .await
            .unwrap();

        let context = UsageContext {
            provider: ProviderId::PRIMARY,
            model: Some("gpt-4o-mini".to_string()),
            credential_type: CredentialType::Tenant,
            source: UsageSource::Chat,
        };
        gateway.ledger.record_usage(3, 40, &context).await;
        gateway.ledger.record_usage(3, 2, &context).await;

        let mut args = UsageArgs {
            tenant: 3,
            date: Some(today()),
            json: true,
            config: PathBuf::from("relay.toml"),
        };
        let json = handle_usage(&args, &gateway).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["usage"][0]["value"], 42);
        assert_eq!(parsed["usage"][0]["source"], "chat");

        args.json = false;
        let table = handle_usage(&args, &gateway).await.unwrap();
        assert!(table.contains("42"));

        args.tenant = 4;
        let empty = handle_usage(&args, &gateway).await.unwrap();
        assert!(empty.contains("No usage"));
    }
}
