//! Table store commands

use super::Context;
use crate::remote::model::{Action, BatchItem, BatchRequest, Collection, ListQuery, ResourceRef};
use crate::resource::{classify, ErrorKind};
use anyhow::{Context as _, Result};
use clap::Subcommand;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Most items a single batch write request accepts
pub const BATCH_WRITE_LIMIT: NonZeroUsize = match NonZeroUsize::new(25) {
    Some(n) => n,
    None => unreachable!(),
};

/// Key attributes of the items handled by put/update/delete-item
const CATEGORY: &str = "category";
const SKU: &str = "sku";

#[derive(Subcommand, Debug)]
pub enum TablesCommand {
    /// Create a table (or reuse it) and wait until it is active
    Create {
        name: String,
        /// Key attribute as name:type[:HASH|RANGE], type is S, N or B
        #[arg(long = "key", required = true)]
        keys: Vec<String>,
    },
    /// Describe an existing table
    Get { name: String },
    /// Write an item and print it back
    Put {
        table: String,
        category: String,
        sku: String,
        /// Extra attributes as name=value
        attributes: Vec<String>,
    },
    /// Set attributes on an item and print it back
    Update {
        table: String,
        category: String,
        sku: String,
        #[arg(required = true)]
        attributes: Vec<String>,
    },
    /// Delete an item
    DeleteItem {
        table: String,
        category: String,
        sku: String,
    },
    /// Write every item of a JSON array file
    BatchWrite {
        table: String,
        file: PathBuf,
        /// Key attributes; later items with the same key replace earlier ones
        #[arg(long = "key")]
        keys: Vec<String>,
    },
    /// Query items with a key condition
    Query {
        table: String,
        key_condition: String,
        #[arg(long)]
        filter: Option<String>,
    },
    /// Scan every item matching a filter
    Scan { table: String, filter: String },
    /// Delete a table and wait until it is gone
    Delete { name: String },
}

/// Parse `name:type[:HASH|RANGE]` key specs into create parameters
pub fn key_schema(specs: &[String]) -> Result<Value> {
    let mut schema = Vec::new();
    let mut definitions = Vec::new();

    for (i, spec) in specs.iter().enumerate() {
        let parts: Vec<&str> = spec.split(':').collect();
        let (name, kind, role) = match parts.as_slice() {
            [name, kind] => (*name, *kind, if i == 0 { "HASH" } else { "RANGE" }),
            [name, kind, role] => (*name, *kind, *role),
            _ => anyhow::bail!("Invalid key '{spec}': expected name:type[:HASH|RANGE]"),
        };
        if name.is_empty() {
            anyhow::bail!("Invalid key '{spec}': missing attribute name");
        }

        let kind = kind.to_ascii_uppercase();
        if !matches!(kind.as_str(), "S" | "N" | "B") {
            anyhow::bail!("Invalid key type '{kind}' for {name}: expected S, N or B");
        }
        let role = role.to_ascii_uppercase();
        if !matches!(role.as_str(), "HASH" | "RANGE") {
            anyhow::bail!("Invalid key role '{role}' for {name}: expected HASH or RANGE");
        }

        schema.push(json!({ "AttributeName": name, "KeyType": role }));
        definitions.push(json!({ "AttributeName": name, "AttributeType": kind }));
    }

    let count = |role: &str| schema.iter().filter(|k| k["KeyType"] == role).count();
    if count("HASH") != 1 || count("RANGE") > 1 {
        anyhow::bail!("A table needs exactly one HASH key and at most one RANGE key");
    }

    Ok(json!({
        "KeySchema": schema,
        "AttributeDefinitions": definitions,
        "ProvisionedThroughput": { "ReadCapacityUnits": 5, "WriteCapacityUnits": 5 },
    }))
}

/// Parse `name=value` pairs; values that read as JSON keep their type
pub fn parse_assignments(pairs: &[String]) -> Result<BTreeMap<String, Value>> {
    pairs
        .iter()
        .map(|pair| {
            let (name, raw) = pair
                .split_once('=')
                .with_context(|| format!("Invalid attribute '{pair}': expected name=value"))?;
            if name.is_empty() {
                anyhow::bail!("Invalid attribute '{pair}': missing name");
            }
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            Ok((name.to_string(), value))
        })
        .collect()
}

fn item_ref(table: &str, category: &str, sku: &str) -> ResourceRef {
    ResourceRef::item(table, [(CATEGORY, category), (SKU, sku)])
}

/// Key identifying `item` within its table
fn item_key(item: &Value, keys: &[String]) -> String {
    if keys.is_empty() {
        return item.to_string();
    }
    let key: BTreeMap<&str, &Value> = keys
        .iter()
        .map(|k| (k.as_str(), item.get(k).unwrap_or(&Value::Null)))
        .collect();
    serde_json::to_string(&key).unwrap_or_default()
}

/// Drop earlier items whose key repeats later in the list
pub fn dedupe_by_keys(items: Vec<Value>, keys: &[String]) -> Vec<(String, Value)> {
    let keyed: Vec<(String, Value)> = items
        .into_iter()
        .map(|item| (item_key(&item, keys), item))
        .collect();

    let mut last_index = BTreeMap::new();
    for (i, (key, _)) in keyed.iter().enumerate() {
        last_index.insert(key.clone(), i);
    }

    keyed
        .into_iter()
        .enumerate()
        .filter(|(i, (key, _))| last_index.get(key) == Some(i))
        .map(|(_, entry)| entry)
        .collect()
}

async fn read_item(ctx: &Context, target: &ResourceRef) -> Result<Value> {
    let item = ctx
        .service()
        .get(target)
        .await
        .with_context(|| format!("Failed to read {target}"))?;
    Ok(item.attributes)
}

pub async fn run(ctx: &Context, command: &TablesCommand) -> Result<Value> {
    match command {
        TablesCommand::Create { name, keys } => {
            let params = key_schema(keys)?;
            let target = ResourceRef::table(name);
            let (table, created) = ctx
                .lifecycle()
                .get_or_create(&target, Some(&params), ctx.timeout)
                .await?;
            Ok(json!({
                "table": name,
                "created": created,
                "state": table.state,
                "attributes": table.attributes,
            }))
        }
        TablesCommand::Get { name } => {
            let (table, _) = ctx
                .lifecycle()
                .get_or_create(&ResourceRef::table(name), None, ctx.timeout)
                .await?;
            Ok(table.attributes)
        }
        TablesCommand::Put {
            table,
            category,
            sku,
            attributes,
        } => {
            let mut item: Map<String, Value> = parse_assignments(attributes)?.into_iter().collect();
            item.insert(CATEGORY.to_string(), json!(category));
            item.insert(SKU.to_string(), json!(sku));

            let target = item_ref(table, category, sku);
            ctx.service()
                .create(&target, &Value::Object(item))
                .await
                .with_context(|| format!("Failed to put {target}"))?;
            tracing::info!("Put {}", target);
            read_item(ctx, &target).await
        }
        TablesCommand::Update {
            table,
            category,
            sku,
            attributes,
        } => {
            let attributes = parse_assignments(attributes)?;
            let target = item_ref(table, category, sku);
            ctx.service()
                .invoke(&target, &Action::Update { attributes })
                .await
                .with_context(|| format!("Failed to update {target}"))?;
            read_item(ctx, &target).await
        }
        TablesCommand::DeleteItem {
            table,
            category,
            sku,
        } => {
            let target = item_ref(table, category, sku);
            let deleted = match ctx.service().delete(&target).await {
                Ok(()) => true,
                Err(err) if classify(&err).kind == ErrorKind::NotFound => {
                    tracing::warn!("{} did not exist", target);
                    false
                }
                Err(err) => {
                    tracing::error!("There was an error when deleting {}: {}", target, err);
                    return Err(err).with_context(|| format!("Failed to delete {target}"));
                }
            };
            Ok(json!({ "item": target.to_string(), "deleted": deleted }))
        }
        TablesCommand::BatchWrite { table, file, keys } => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let items: Vec<Value> = serde_json::from_str(&content)
                .with_context(|| format!("{} must hold a JSON array of items", file.display()))?;

            let entries = dedupe_by_keys(items, keys);
            let request = BatchRequest::new(
                ResourceRef::table(table),
                entries
                    .into_iter()
                    .map(|(key, item)| BatchItem::put(key, item))
                    .collect(),
            );
            let result = ctx.batch().submit(&request, BATCH_WRITE_LIMIT).await;

            let failures: Vec<Value> = result
                .failures()
                .map(|(i, reason)| {
                    tracing::warn!("Item {} not written: {}", request.items[i].key, reason);
                    json!({ "key": request.items[i].key, "reason": reason.to_string() })
                })
                .collect();
            Ok(json!({
                "table": table,
                "submitted": result.len(),
                "applied": result.applied(),
                "failed": result.failed(),
                "failures": failures,
            }))
        }
        TablesCommand::Query {
            table,
            key_condition,
            filter,
        } => {
            let query = ListQuery::new(Collection::TableQuery {
                table: table.clone(),
                key_condition: key_condition.clone(),
                filter: filter.clone(),
            });
            Ok(Value::Array(ctx.lister().collect_all(&query, None).await?))
        }
        TablesCommand::Scan { table, filter } => {
            let query = ListQuery::new(Collection::TableScan {
                table: table.clone(),
                filter: Some(filter.clone()),
            });
            Ok(Value::Array(ctx.lister().collect_all(&query, None).await?))
        }
        TablesCommand::Delete { name } => {
            ctx.lifecycle()
                .delete_and_wait(&ResourceRef::table(name), ctx.timeout)
                .await?;
            Ok(json!({ "table": name, "deleted": true }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_key_schema_defaults_roles() {
        let params = key_schema(&strings(&["category:S", "sku:S"])).unwrap();
        assert_eq!(params["KeySchema"][0]["KeyType"], "HASH");
        assert_eq!(params["KeySchema"][1]["KeyType"], "RANGE");
        assert_eq!(params["AttributeDefinitions"][1]["AttributeType"], "S");
    }

    #[test]
    fn test_key_schema_rejects_bad_specs() {
        assert!(key_schema(&strings(&["id"])).is_err());
        assert!(key_schema(&strings(&["id:X"])).is_err());
        assert!(key_schema(&strings(&["a:S:RANGE"])).is_err());
        assert!(key_schema(&strings(&["a:S:HASH", "b:S:HASH"])).is_err());
    }

    #[test]
    fn test_assignments_keep_json_types() {
        let attrs = parse_assignments(&strings(&["price=12.5", "name=Rust Book", "stock=true"])).unwrap();
        assert_eq!(attrs["price"], json!(12.5));
        assert_eq!(attrs["name"], json!("Rust Book"));
        assert_eq!(attrs["stock"], json!(true));
        assert!(parse_assignments(&strings(&["novalue"])).is_err());
    }

    #[test]
    fn test_dedupe_keeps_last() {
        let items = vec![
            json!({"category": "a", "sku": "1", "v": 1}),
            json!({"category": "a", "sku": "2", "v": 2}),
            json!({"category": "a", "sku": "1", "v": 3}),
        ];
        let kept = dedupe_by_keys(items, &strings(&["category", "sku"]));
        let values: Vec<i64> = kept.iter().map(|(_, item)| item["v"].as_i64().unwrap()).collect();
        assert_eq!(values, vec![2, 3]);
    }

    #[test]
    fn test_dedupe_without_keys_only_drops_identical_items() {
        let items = vec![json!({"a": 1}), json!({"a": 1}), json!({"a": 2})];
        assert_eq!(dedupe_by_keys(items, &[]).len(), 2);
    }
}
