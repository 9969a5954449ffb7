//! Webhook notifications of bootstrap results.

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info};

use crate::error::BootstrapError;
use crate::lifecycle::ReconcileReport;

const USERNAME: &str = "Larch";

/// Embed descriptions are cut off by the receiving side past this length.
const MAX_DESCRIPTION: usize = 4000;

#[derive(Serialize, Debug)]
struct WebhookEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

#[derive(Serialize, Debug)]
struct WebhookPayload {
    username: String,
    embeds: Vec<WebhookEmbed>,
}

pub struct Webhook {
    url: String,
    client: reqwest::Client,
}

impl Webhook {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    pub async fn send_notification(
        &self,
        title: &str,
        description: &str,
        success: bool,
    ) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&payload(title, description, success))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            error!("Failed to send webhook notification: {}", error_text);
            anyhow::bail!("Webhook notification failed: {}", error_text);
        }

        info!("Sent webhook notification: {}", title);
        Ok(())
    }

    /// Report a finished bootstrap. Delivery problems are logged only.
    pub async fn report(&self, result: &Result<Vec<ReconcileReport>, BootstrapError>) {
        let (title, description, success) = match result {
            Ok(reports) => ("Index bootstrap complete", describe_reports(reports), true),
            Err(e) => ("Index bootstrap failed", e.to_string(), false),
        };

        if let Err(e) = self.send_notification(title, &description, success).await {
            error!("Bootstrap notification not delivered: {}", e);
        }
    }
}

fn payload(title: &str, description: &str, success: bool) -> WebhookPayload {
    let color = if success { 0x00FF00 } else { 0xFF0000 };
    let description: String = description.chars().take(MAX_DESCRIPTION).collect();

    WebhookPayload {
        username: USERNAME.to_string(),
        embeds: vec![WebhookEmbed {
            title: title.to_string(),
            description,
            color,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }],
    }
}

fn describe_reports(reports: &[ReconcileReport]) -> String {
    if reports.is_empty() {
        return "No resources configured".to_string();
    }
    reports
        .iter()
        .map(|r| format!("`{}` -> `{}`: {}", r.alias, r.index, r.outcome))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ReconcileOutcome;

    #[test]
    fn test_describe_reports() {
        let reports = vec![
            ReconcileReport {
                alias: "risk_score".to_string(),
                index: "risk_score-12".to_string(),
                outcome: ReconcileOutcome::Created,
            },
            ReconcileReport {
                alias: "purchase_order".to_string(),
                index: "purchase_order-7".to_string(),
                outcome: ReconcileOutcome::UpToDate,
            },
        ];
        assert_eq!(
            describe_reports(&reports),
            "`risk_score` -> `risk_score-12`: created\n`purchase_order` -> `purchase_order-7`: up to date"
        );
        assert_eq!(describe_reports(&[]), "No resources configured");
    }

    #[test]
    fn test_payload_shape() {
        let failed = payload("Index bootstrap failed", &"x".repeat(5000), false);
        assert_eq!(failed.embeds[0].color, 0xFF0000);
        assert_eq!(failed.embeds[0].description.len(), MAX_DESCRIPTION);

        let json = serde_json::to_value(payload("ok", "fine", true)).unwrap();
        assert_eq!(json["username"], "Larch");
        assert_eq!(json["embeds"][0]["color"], 0x00FF00);
    }
}
