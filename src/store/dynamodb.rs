//! DynamoDB-backed lock table.
//!
//! Every conditional write is a single `PutItem`/`DeleteItem`/`UpdateItem`
//! with a `ConditionExpression`; a `ConditionalCheckFailedException` is the
//! store saying "condition not met" and maps to `Ok(false)`. Any other SDK
//! failure is surfaced as `StoreUnavailable`, never retried here.
//!
//! # Item layout
//!
//! | attribute     | type | value                                   |
//! |---------------|------|-----------------------------------------|
//! | key attribute | S    | lock name (default `ResourceId`)        |
//! | `owner`       | S    | holder identity                         |
//! | `expires_at`  | N    | expiry, epoch milliseconds              |
//! | `acquired_at` | N    | acquisition time, epoch milliseconds    |
//! | `operation`   | S    | optional description                    |
//! | `ttl`         | N    | expiry in epoch seconds, for native TTL |
//!
//! The SDK is async; this store owns a current-thread Tokio runtime and
//! blocks on it, so it must not be called from inside another runtime.

use super::LockStore;
use crate::error::{LockError, Result};
use crate::lock::LockRecord;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use tokio::runtime::Runtime;

pub const DEFAULT_KEY_ATTRIBUTE: &str = "ResourceId";

const OWNER: &str = "owner";
const EXPIRES_AT: &str = "expires_at";
const ACQUIRED_AT: &str = "acquired_at";
const OPERATION: &str = "operation";
const TTL: &str = "ttl";

type Item = HashMap<String, AttributeValue>;

/// Where the lock table lives.
#[derive(Debug, Clone)]
pub struct DynamoDbSettings {
    pub table_name: String,
    pub key_attribute: String,
    pub region: Option<String>,
    /// Override for DynamoDB Local and similar.
    pub endpoint_url: Option<String>,
}

impl DynamoDbSettings {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            key_attribute: DEFAULT_KEY_ATTRIBUTE.to_string(),
            region: None,
            endpoint_url: None,
        }
    }
}

#[derive(Debug)]
pub struct DynamoDbStore {
    client: Client,
    table_name: String,
    key_attribute: String,
    runtime: Runtime,
}

impl DynamoDbStore {
    /// Load AWS configuration from the environment and connect.
    pub fn connect(settings: &DynamoDbSettings) -> Result<Self> {
        let runtime = build_runtime()?;

        let client = runtime.block_on(async {
            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(region) = &settings.region {
                loader = loader.region(Region::new(region.clone()));
            }
            if let Some(url) = &settings.endpoint_url {
                loader = loader.endpoint_url(url);
            }
            Client::new(&loader.load().await)
        });

        tracing::debug!(
            table = %settings.table_name,
            region = ?client.config().region(),
            "created dynamodb client"
        );

        Ok(Self {
            client,
            table_name: settings.table_name.clone(),
            key_attribute: settings.key_attribute.clone(),
            runtime,
        })
    }

    /// Use an already configured client.
    pub fn from_client(
        client: Client,
        table_name: impl Into<String>,
        key_attribute: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client,
            table_name: table_name.into(),
            key_attribute: key_attribute.into(),
            runtime: build_runtime()?,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn key(&self, name: &str) -> (String, AttributeValue) {
        (self.key_attribute.clone(), AttributeValue::S(name.to_string()))
    }

    /// Whether the lock table exists.
    pub fn exists(&self) -> Result<bool> {
        let result = self.block_on(
            self.client
                .describe_table()
                .table_name(&self.table_name)
                .send(),
        );
        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Ok(false)
            }
            Err(err) => Err(unavailable("DescribeTable", err)),
        }
    }

    /// Delete the lock table. A missing table is not an error.
    pub fn delete_table(&self) -> Result<()> {
        let result = self.block_on(
            self.client
                .delete_table()
                .table_name(&self.table_name)
                .send(),
        );
        match result {
            Ok(_) => {
                tracing::info!(table = %self.table_name, "deleted lock table");
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                tracing::debug!(table = %self.table_name, "lock table already gone");
                Ok(())
            }
            Err(err) => Err(unavailable("DeleteTable", err)),
        }
    }
}

impl LockStore for DynamoDbStore {
    fn put_if_absent_or_expired(&self, record: &LockRecord, now: DateTime<Utc>) -> Result<bool> {
        tracing::debug!(table = %self.table_name, lock = %record.name, "PutItem");
        let result = self.block_on(
            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(record_to_item(&self.key_attribute, record)))
                .condition_expression("attribute_not_exists(#key) OR #expires_at <= :now")
                .expression_attribute_names("#key", &self.key_attribute)
                .expression_attribute_names("#expires_at", EXPIRES_AT)
                .expression_attribute_values(":now", millis(now))
                .send(),
        );
        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(err) => Err(unavailable("PutItem", err)),
        }
    }

    fn delete_if_owner(&self, name: &str, owner: &str) -> Result<bool> {
        tracing::debug!(table = %self.table_name, lock = name, "DeleteItem (owner-conditional)");
        let (key, value) = self.key(name);
        let result = self.block_on(
            self.client
                .delete_item()
                .table_name(&self.table_name)
                .key(key, value)
                .condition_expression("#owner = :owner")
                .expression_attribute_names("#owner", OWNER)
                .expression_attribute_values(":owner", AttributeValue::S(owner.to_string()))
                .send(),
        );
        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(err) => Err(unavailable("DeleteItem", err)),
        }
    }

    fn update_if_owner(
        &self,
        name: &str,
        owner: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        tracing::debug!(table = %self.table_name, lock = name, "UpdateItem");
        let (key, value) = self.key(name);
        let result = self.block_on(
            self.client
                .update_item()
                .table_name(&self.table_name)
                .key(key, value)
                .update_expression("SET #expires_at = :expires_at, #ttl = :ttl")
                .condition_expression("#owner = :owner AND #expires_at < :expires_at")
                .expression_attribute_names("#owner", OWNER)
                .expression_attribute_names("#expires_at", EXPIRES_AT)
                .expression_attribute_names("#ttl", TTL)
                .expression_attribute_values(":owner", AttributeValue::S(owner.to_string()))
                .expression_attribute_values(":expires_at", millis(new_expires_at))
                .expression_attribute_values(":ttl", ttl_seconds(new_expires_at))
                .send(),
        );
        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(err) => Err(unavailable("UpdateItem", err)),
        }
    }

    fn get(&self, name: &str) -> Result<Option<LockRecord>> {
        let (key, value) = self.key(name);
        let output = self
            .block_on(
                self.client
                    .get_item()
                    .table_name(&self.table_name)
                    .key(key, value)
                    .consistent_read(true)
                    .send(),
            )
            .map_err(|err| unavailable("GetItem", err))?;

        output
            .item()
            .map(|item| item_to_record(&self.key_attribute, item))
            .transpose()
    }

    fn list(&self) -> Result<Vec<LockRecord>> {
        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .block_on(
                    self.client
                        .scan()
                        .table_name(&self.table_name)
                        .consistent_read(true)
                        .set_exclusive_start_key(start_key.take())
                        .send(),
                )
                .map_err(|err| unavailable("Scan", err))?;

            for item in output.items() {
                match item_to_record(&self.key_attribute, item) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::warn!(error = %e, "skipping malformed lock item"),
                }
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(records)
    }

    fn delete(&self, name: &str) -> Result<Option<LockRecord>> {
        let (key, value) = self.key(name);
        let output = self
            .block_on(
                self.client
                    .delete_item()
                    .table_name(&self.table_name)
                    .key(key, value)
                    .return_values(ReturnValue::AllOld)
                    .send(),
            )
            .map_err(|err| unavailable("DeleteItem", err))?;

        match output.attributes() {
            Some(item) if !item.is_empty() => match item_to_record(&self.key_attribute, item) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    tracing::warn!(error = %e, "removed malformed lock item");
                    Ok(None)
                }
            },
            _ => Ok(None),
        }
    }
}

fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| LockError::StoreUnavailable(format!("failed to start async runtime: {}", e)))
}

fn unavailable(operation: &str, err: impl std::error::Error) -> LockError {
    LockError::StoreUnavailable(format!("{} failed: {}", operation, DisplayErrorContext(err)))
}

fn millis(t: DateTime<Utc>) -> AttributeValue {
    AttributeValue::N(t.timestamp_millis().to_string())
}

/// DynamoDB TTL works in whole seconds; round up so native cleanup never
/// fires before the lock has actually expired.
fn ttl_seconds(t: DateTime<Utc>) -> AttributeValue {
    let ms = t.timestamp_millis();
    let mut seconds = ms.div_euclid(1000);
    if ms.rem_euclid(1000) != 0 {
        seconds += 1;
    }
    AttributeValue::N(seconds.to_string())
}

/// Convert a record to a DynamoDB item.
pub fn record_to_item(key_attribute: &str, record: &LockRecord) -> Item {
    let mut item = Item::new();
    item.insert(key_attribute.to_string(), AttributeValue::S(record.name.clone()));
    item.insert(OWNER.to_string(), AttributeValue::S(record.owner.clone()));
    item.insert(EXPIRES_AT.to_string(), millis(record.expires_at));
    item.insert(ACQUIRED_AT.to_string(), millis(record.acquired_at));
    item.insert(TTL.to_string(), ttl_seconds(record.expires_at));
    if let Some(operation) = &record.operation {
        item.insert(OPERATION.to_string(), AttributeValue::S(operation.clone()));
    }
    item
}

/// Convert a DynamoDB item back to a record.
pub fn item_to_record(key_attribute: &str, item: &Item) -> Result<LockRecord> {
    Ok(LockRecord {
        name: string_attr(item, key_attribute)?,
        owner: string_attr(item, OWNER)?,
        expires_at: time_attr(item, EXPIRES_AT)?,
        acquired_at: time_attr(item, ACQUIRED_AT)?,
        operation: match item.get(OPERATION) {
            Some(value) => Some(
                value
                    .as_s()
                    .map_err(|_| malformed(OPERATION, "expected a string"))?
                    .clone(),
            ),
            None => None,
        },
    })
}

fn string_attr(item: &Item, name: &str) -> Result<String> {
    item.get(name)
        .ok_or_else(|| malformed(name, "missing"))?
        .as_s()
        .map(Clone::clone)
        .map_err(|_| malformed(name, "expected a string"))
}

fn time_attr(item: &Item, name: &str) -> Result<DateTime<Utc>> {
    let raw = item
        .get(name)
        .ok_or_else(|| malformed(name, "missing"))?
        .as_n()
        .map_err(|_| malformed(name, "expected a number"))?;
    let ms: i64 = raw
        .parse()
        .map_err(|_| malformed(name, "expected epoch milliseconds"))?;
    DateTime::from_timestamp_millis(ms).ok_or_else(|| malformed(name, "timestamp out of range"))
}

fn malformed(attribute: &str, problem: &str) -> LockError {
    LockError::StoreUnavailable(format!(
        "malformed lock item: attribute '{}' {}",
        attribute, problem
    ))
}
