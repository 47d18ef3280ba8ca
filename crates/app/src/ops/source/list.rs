//! List configured data sources

use clap::Args;
use serde::Serialize;
use std::fmt;

use rmount::StateError;

use super::add::display_or_default;
use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "List configured S3 data sources")]
pub struct List {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Data source without its secret
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRow {
    name: String,
    endpoint: String,
    region: String,
    bucket: String,
    access_key: String,
    description: String,
}

#[derive(Debug)]
pub struct ListOutput {
    rows: Vec<SourceRow>,
    json: bool,
}

impl fmt::Display for ListOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.json {
            writeln!(f, "{}", serde_json::to_string_pretty(&self.rows).unwrap_or_default())
        } else if self.rows.is_empty() {
            writeln!(f, "No data sources configured. Use 'rmount source add' to create one.")
        } else {
            writeln!(f, "{:<20}  {:<36}  {:<12}  {:<20}", "NAME", "ENDPOINT", "REGION", "BUCKET")?;
            writeln!(f, "{}", "-".repeat(94))?;
            for row in &self.rows {
                writeln!(
                    f,
                    "{:<20}  {:<36}  {:<12}  {:<20}",
                    row.name,
                    display_or_default(&row.endpoint, "AWS"),
                    display_or_default(&row.region, "us-east-1"),
                    display_or_default(&row.bucket, "-"),
                )?;
            }
            Ok(())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl Op for List {
    type Error = ListError;
    type Output = ListOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        let rows = state
            .list_sources()
            .await
            .into_iter()
            .map(|ds| SourceRow {
                name: ds.name,
                endpoint: ds.endpoint,
                region: ds.region,
                bucket: ds.bucket,
                access_key: ds.access_key,
                description: ds.description,
            })
            .collect();
        Ok(ListOutput {
            rows,
            json: self.json,
        })
    }
}
