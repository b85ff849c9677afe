//! Log store commands

use super::Context;
use crate::remote::model::{Collection, ListQuery};
use anyhow::{Context as _, Result};
use clap::Subcommand;
use serde_json::Value;

#[derive(Subcommand, Debug)]
pub enum LogsCommand {
    /// List log groups
    ListGroups {
        /// Only groups whose name starts with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// List the streams of a log group
    ListStreams {
        group: String,
        /// Only streams whose name starts with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Print the events of a log group that match a pattern
    FilterEvents {
        group: String,
        pattern: String,
        /// Earliest event time (RFC 3339 or epoch milliseconds)
        #[arg(long)]
        start: Option<String>,
        /// Latest event time (RFC 3339 or epoch milliseconds)
        #[arg(long)]
        stop: Option<String>,
        /// Stop after this many events
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Parse an RFC 3339 timestamp or epoch milliseconds into epoch milliseconds
pub fn parse_time(value: &str) -> Result<i64> {
    if let Ok(millis) = value.trim().parse::<i64>() {
        return Ok(millis);
    }
    let parsed = chrono::DateTime::parse_from_rfc3339(value.trim()).with_context(|| {
        format!("Invalid time '{value}': expected RFC 3339 or epoch milliseconds")
    })?;
    Ok(parsed.timestamp_millis())
}

pub async fn run(ctx: &Context, command: &LogsCommand) -> Result<Value> {
    match command {
        LogsCommand::ListGroups { prefix } => {
            let query = ListQuery::new(Collection::LogGroups {
                prefix: prefix.clone(),
            });
            let groups = ctx.lister().collect_all(&query, None).await?;
            tracing::info!("Found {} log groups", groups.len());
            Ok(Value::Array(groups))
        }
        LogsCommand::ListStreams { group, prefix } => {
            let query = ListQuery::new(Collection::LogStreams {
                group: group.clone(),
                prefix: prefix.clone(),
            });
            let streams = ctx
                .lister()
                .collect_all(&query, None)
                .await
                .with_context(|| format!("Failed to list streams of {group}"))?;
            Ok(Value::Array(streams))
        }
        LogsCommand::FilterEvents {
            group,
            pattern,
            start,
            stop,
            limit,
        } => {
            let start = start.as_deref().map(parse_time).transpose()?;
            let end = stop.as_deref().map(parse_time).transpose()?;
            if let (Some(s), Some(e)) = (start, end) {
                if e < s {
                    anyhow::bail!("--stop must not be earlier than --start");
                }
            }

            let query = ListQuery::new(Collection::LogEvents {
                group: group.clone(),
                pattern: pattern.clone(),
                start,
                end,
            });
            let events = ctx
                .lister()
                .collect_all(&query, *limit)
                .await
                .with_context(|| format!("Failed to filter events of {group}"))?;
            tracing::info!("{} events matched '{}'", events.len(), pattern);
            Ok(Value::Array(events))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(parse_time("1700000000000").unwrap(), 1_700_000_000_000);
        assert_eq!(parse_time("1970-01-01T00:00:01Z").unwrap(), 1000);
        assert_eq!(parse_time("1970-01-01T01:00:00+01:00").unwrap(), 0);
        assert!(parse_time("yesterday").is_err());
    }
}
