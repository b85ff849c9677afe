//! Notification commands

use super::Context;
use crate::remote::model::{Action, Collection, ListQuery, ResourceRef};
use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use serde_json::{json, Value};

/// Protocol used for phone subscriptions
const SMS_PROTOCOL: &str = "sms";

/// Paging flags shared by the list commands
#[derive(Args, Debug, Clone, Default)]
pub struct PageArgs {
    /// Continue a previous listing from this token
    #[arg(long)]
    pub next_token: Option<String>,
    /// Follow every page instead of printing one
    #[arg(long, conflicts_with = "next_token")]
    pub all: bool,
}

#[derive(Subcommand, Debug)]
pub enum TopicsCommand {
    /// Create a topic
    Create { name: String },
    /// List topics
    List {
        #[command(flatten)]
        page: PageArgs,
    },
    /// List subscriptions
    ListSubscriptions {
        /// Only subscriptions of this topic
        #[arg(long)]
        topic: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Subscribe a mobile number to a topic
    Subscribe { topic_arn: String, mobile_number: String },
    /// Publish a message to a topic
    Publish {
        topic_arn: String,
        message: String,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Remove a subscription
    Unsubscribe { subscription_arn: String },
    /// Delete a topic and all of its subscriptions
    Delete { topic_arn: String },
}

/// One page (or all pages) of a listing, as `{ <field>: [...], nextToken }`
async fn list(ctx: &Context, collection: Collection, field: &str, page: &PageArgs) -> Result<Value> {
    let query = ListQuery::new(collection);

    if page.all {
        let items = ctx.lister().collect_all(&query, None).await?;
        return Ok(json!({ field: items, "nextToken": null }));
    }

    let result = ctx.lister().list_page(&query, page.next_token.as_deref()).await?;
    Ok(json!({ field: result.items, "nextToken": result.next.token() }))
}

pub async fn run(ctx: &Context, command: &TopicsCommand) -> Result<Value> {
    match command {
        TopicsCommand::Create { name } => {
            let params = json!({ "Name": name });
            let (topic, created) = ctx
                .lifecycle()
                .get_or_create(&ResourceRef::topic(name), Some(&params), ctx.timeout)
                .await?;
            let arn = topic
                .attributes
                .get("topicArn")
                .or_else(|| topic.attributes.get("TopicArn"))
                .cloned()
                .unwrap_or_else(|| json!(name));
            tracing::info!("Topic ready: {}", name);
            Ok(json!({ "topic": name, "topicArn": arn, "created": created }))
        }
        TopicsCommand::List { page } => list(ctx, Collection::Topics, "topics", page).await,
        TopicsCommand::ListSubscriptions { topic, page } => {
            let collection = Collection::Subscriptions {
                topic: topic.clone(),
            };
            list(ctx, collection, "subscriptions", page).await
        }
        TopicsCommand::Subscribe {
            topic_arn,
            mobile_number,
        } => {
            let action = Action::Subscribe {
                protocol: SMS_PROTOCOL.to_string(),
                endpoint: mobile_number.clone(),
            };
            let response = ctx
                .service()
                .invoke(&ResourceRef::topic(topic_arn), &action)
                .await
                .with_context(|| format!("Failed to subscribe {mobile_number} to {topic_arn}"))?;
            tracing::info!("Mobile number {} now subscribed to {}", mobile_number, topic_arn);
            Ok(response)
        }
        TopicsCommand::Publish {
            topic_arn,
            message,
            subject,
        } => {
            let action = Action::Publish {
                message: message.clone(),
                subject: subject.clone(),
            };
            let response = ctx
                .service()
                .invoke(&ResourceRef::topic(topic_arn), &action)
                .await
                .with_context(|| format!("Failed to publish to {topic_arn}"))?;
            tracing::info!("Message sent to {}", topic_arn);
            Ok(response)
        }
        TopicsCommand::Unsubscribe { subscription_arn } => {
            let target = ResourceRef::Subscription {
                arn: subscription_arn.clone(),
            };
            ctx.service()
                .delete(&target)
                .await
                .with_context(|| format!("Failed to unsubscribe {subscription_arn}"))?;
            tracing::info!("Unsubscribed: {}", subscription_arn);
            Ok(json!({ "unsubscribed": subscription_arn }))
        }
        TopicsCommand::Delete { topic_arn } => {
            ctx.lifecycle()
                .delete_and_wait(&ResourceRef::topic(topic_arn), ctx.timeout)
                .await?;
            tracing::info!("Topic deleted: {}", topic_arn);
            Ok(json!({ "topic": topic_arn, "deleted": true }))
        }
    }
}
