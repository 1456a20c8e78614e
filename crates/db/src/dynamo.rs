//! [`Backend`] implementation for DynamoDB.

use crate::{
    attr::{Key, Row, Value},
    backend::{Backend, KeySchema, TableStatus},
    error::{Error, Result},
};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::{
        AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType, PutRequest, ScalarAttributeType,
        TimeToLiveSpecification, TimeToLiveStatus, WriteRequest,
    },
    Client,
};
use std::collections::HashMap;

type Item = HashMap<String, AttributeValue>;

/// Logs the full error chain and collapses it into [`Error::NotFound`] or [`Error::Unavailable`].
fn classify<E, R>(context: &str, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: core::fmt::Debug,
{
    let code = err.as_service_error().and_then(ProvideErrorMetadata::code);
    if code == Some("ResourceNotFoundException") {
        return Error::NotFound;
    }

    log::error!("{context}: {}", DisplayErrorContext(&err));
    Error::Unavailable
}

fn to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::Text(text) => AttributeValue::S(text),
        Value::Number(num) => AttributeValue::N(num.to_string()),
    }
}

fn from_item(item: Item) -> Result<Row> {
    item.into_iter()
        .map(|(name, value)| {
            let value = match value {
                AttributeValue::S(text) => Value::Text(text),
                AttributeValue::N(num) => Value::Number(num.parse().map_err(|_| Error::Malformed)?),
                _ => {
                    log::error!("attribute {name} has an unsupported type");
                    return Err(Error::Malformed);
                }
            };
            Ok((name, value))
        })
        .collect()
}

/// Shared, immutable handle to the DynamoDB service.
#[derive(Clone)]
pub struct DynamoBackend(Client);

impl From<Client> for DynamoBackend {
    fn from(client: Client) -> Self {
        Self(client)
    }
}

impl DynamoBackend {
    /// Loads credentials and region from the standard AWS provider chain. The `endpoint` overrides
    /// the service URL, which is useful against DynamoDB Local.
    pub async fn from_env(endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(url) = endpoint {
            loader = loader.endpoint_url(url);
        }
        let config = loader.load().await;
        Client::new(&config).into()
    }
}

impl Backend for DynamoBackend {
    async fn describe_table(&self, table: &str) -> Result<Option<TableStatus>> {
        let output = match self.0.describe_table().table_name(table).send().await {
            Ok(output) => output,
            Err(err) => {
                return match classify("cannot describe table", err) {
                    Error::NotFound => Ok(None),
                    err => Err(err),
                };
            }
        };

        use aws_sdk_dynamodb::types::TableStatus as Status;
        let status = output.table().and_then(|desc| desc.table_status()).ok_or(Error::Malformed)?;
        Ok(Some(match status {
            Status::Creating => TableStatus::Creating,
            Status::Active => TableStatus::Active,
            Status::Updating => TableStatus::Updating,
            Status::Deleting => TableStatus::Deleting,
            other => {
                log::warn!("table {table} is in unusable state {}", other.as_str());
                TableStatus::Unusable
            }
        }))
    }

    async fn create_table(&self, table: &str, schema: KeySchema) -> Result<bool> {
        let definitions = [(schema.partition, ScalarAttributeType::S), (schema.range, ScalarAttributeType::N)]
            .into_iter()
            .map(|(name, kind)| AttributeDefinition::builder().attribute_name(name).attribute_type(kind).build())
            .collect::<core::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::Fatal)?;
        let keys = [(schema.partition, KeyType::Hash), (schema.range, KeyType::Range)]
            .into_iter()
            .map(|(name, kind)| KeySchemaElement::builder().attribute_name(name).key_type(kind).build())
            .collect::<core::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::Fatal)?;

        let result = self
            .0
            .create_table()
            .table_name(table)
            .set_attribute_definitions(Some(definitions))
            .set_key_schema(Some(keys))
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|err| err.is_resource_in_use_exception()) => Ok(false),
            Err(err) => Err(classify("cannot create table", err)),
        }
    }

    async fn delete_table(&self, table: &str) -> Result<bool> {
        match self.0.delete_table().table_name(table).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|err| err.is_resource_in_use_exception()) => Ok(false),
            Err(err) => match classify("cannot delete table", err) {
                Error::NotFound => Ok(false),
                err => Err(err),
            },
        }
    }

    async fn describe_ttl(&self, table: &str) -> Result<Option<String>> {
        let output = self
            .0
            .describe_time_to_live()
            .table_name(table)
            .send()
            .await
            .map_err(|err| classify("cannot describe expiry", err))?;

        let Some(desc) = output.time_to_live_description() else {
            return Ok(None);
        };

        let enabled = matches!(desc.time_to_live_status(), Some(TimeToLiveStatus::Enabled | TimeToLiveStatus::Enabling));
        Ok(desc.attribute_name().filter(|_| enabled).map(String::from))
    }

    async fn enable_ttl(&self, table: &str, attribute: &str) -> Result<()> {
        let spec = TimeToLiveSpecification::builder()
            .attribute_name(attribute)
            .enabled(true)
            .build()
            .map_err(|_| Error::Fatal)?;
        self.0
            .update_time_to_live()
            .table_name(table)
            .time_to_live_specification(spec)
            .send()
            .await
            .map_err(|err| classify("cannot enable expiry", err))?;
        Ok(())
    }

    async fn batch_put(&self, table: &str, rows: Vec<Row>) -> Result<()> {
        let requests = rows
            .into_iter()
            .map(|row| {
                let item = row.into_iter().map(|(name, value)| (name, to_attribute(value))).collect();
                let put = PutRequest::builder().set_item(Some(item)).build().map_err(|_| Error::Fatal)?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .0
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(|err| classify("cannot write batch", err))?;

        // The batch is not retried, so leftovers mean a partial write.
        let leftover: usize = output.unprocessed_items().map_or(0, |items| items.values().map(Vec::len).sum());
        if leftover > 0 {
            log::error!("{leftover} rows of the batch for table {table} were left unprocessed");
            return Err(Error::Unavailable);
        }

        Ok(())
    }

    async fn query(&self, table: &str, partition: &str) -> Result<Vec<Row>> {
        let items = self
            .0
            .query()
            .table_name(table)
            .key_condition_expression("#pk = :pk")
            .expression_attribute_names("#pk", crate::attr::SURVEY_ID)
            .expression_attribute_values(":pk", AttributeValue::S(partition.into()))
            .consistent_read(true)
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .map_err(|err| classify("cannot query partition", err))?;
        items.into_iter().map(from_item).collect()
    }

    async fn increment(&self, table: &str, key: Key<'_>, attribute: &str, delta: i64) -> Result<()> {
        // `SET a = a + :d` refuses to operate on a missing attribute, which pins down the behavior
        // for absent rows and answers alike. The same exception also covers a non-numeric attribute,
        // so both surface as `NotFound`.
        let result = self
            .0
            .update_item()
            .table_name(table)
            .key(crate::attr::SURVEY_ID, AttributeValue::S(key.survey.into()))
            .key(crate::attr::QUESTION_ID, AttributeValue::N(key.question.to_string()))
            .update_expression("SET #attr = #attr + :delta")
            .expression_attribute_names("#attr", attribute)
            .expression_attribute_values(":delta", AttributeValue::N(delta.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().and_then(ProvideErrorMetadata::code) == Some("ValidationException") => {
                log::warn!("rejected increment of {attribute} on {key:?}: {}", DisplayErrorContext(&err));
                Err(Error::NotFound)
            }
            Err(err) => Err(classify("cannot increment counter", err)),
        }
    }
}
