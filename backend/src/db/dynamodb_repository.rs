use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, WriteRequest};
use chrono::{DateTime, SecondsFormat, Utc};
use shared::{ImageReference, ModelChoice, Prediction, ScanReport, ThemePreference};
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use uuid::Uuid;

use super::models::User;
use super::{ReportStore, RepositoryError, UserStore};

type Item = HashMap<String, AttributeValue>;

const BATCH_WRITE_LIMIT: usize = 25;

#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    users_table: String,
    reports_table: String,
}

impl DynamoDbRepository {
    pub fn new(client: Client, users_table: String, reports_table: String) -> Self {
        Self {
            client,
            users_table,
            reports_table,
        }
    }

    /// Logs the status of both tables. Missing tables are reported, not fatal.
    pub async fn verify_tables(&self) {
        for table in [&self.users_table, &self.reports_table] {
            match self.client.describe_table().table_name(table).send().await {
                Ok(response) => {
                    log::info!(
                        "DynamoDB table '{}' exists with status: {:?}",
                        table,
                        response.table().and_then(|t| t.table_status())
                    );
                }
                Err(e) => {
                    log::error!(
                        "DynamoDB table '{}' does not exist or is not accessible: {:?}",
                        table,
                        e
                    );
                }
            }
        }
    }

    fn sort_key(report: &ScanReport) -> String {
        // Fixed-width timestamps keep lexical order equal to time order.
        format!(
            "{}#{}",
            report.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            report.id
        )
    }

    async fn query_owner_keys(&self, owner_id: Uuid) -> Result<Vec<Item>, RepositoryError> {
        let mut keys = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.reports_table)
                .key_condition_expression("owner_id = :owner_id")
                .expression_attribute_values(":owner_id", AttributeValue::S(owner_id.to_string()))
                .projection_expression("owner_id, sort_key")
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;

            keys.extend(output.items.unwrap_or_default());

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(keys)
    }

    fn report_to_item(report: &ScanReport) -> Item {
        let mut item = HashMap::new();
        item.insert("owner_id".to_string(), AttributeValue::S(report.owner_id.to_string()));
        item.insert("sort_key".to_string(), AttributeValue::S(Self::sort_key(report)));
        item.insert("id".to_string(), AttributeValue::S(report.id.to_string()));
        item.insert(
            "image_reference".to_string(),
            AttributeValue::S(report.image_reference.as_str().to_string()),
        );
        item.insert(
            "model_used".to_string(),
            AttributeValue::S(report.model_used.to_string()),
        );
        item.insert(
            "class_index".to_string(),
            AttributeValue::N(report.prediction.class_index.to_string()),
        );
        item.insert(
            "label".to_string(),
            AttributeValue::S(report.prediction.label.clone()),
        );
        item.insert(
            "confidence".to_string(),
            AttributeValue::N(report.prediction.confidence.to_string()),
        );
        if let Some(narrative) = &report.narrative_report {
            item.insert(
                "narrative_report".to_string(),
                AttributeValue::S(narrative.clone()),
            );
        }
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(report.created_at.to_rfc3339()),
        );
        item
    }

    fn user_to_item(user: &User) -> Item {
        let mut item = HashMap::new();
        item.insert("id".to_string(), AttributeValue::S(user.id.to_string()));

        // Cognito fields
        item.insert(
            "cognito_sub".to_string(),
            AttributeValue::S(user.cognito_sub.clone()),
        );
        if let Some(username) = &user.cognito_username {
            item.insert(
                "cognito_username".to_string(),
                AttributeValue::S(username.clone()),
            );
        }
        if let Some(cognito_access_token) = &user.cognito_access_token {
            item.insert(
                "cognito_access_token".to_string(),
                AttributeValue::S(cognito_access_token.clone()),
            );
        }
        if let Some(cognito_refresh_token) = &user.cognito_refresh_token {
            item.insert(
                "cognito_refresh_token".to_string(),
                AttributeValue::S(cognito_refresh_token.clone()),
            );
        }

        // Common fields
        item.insert("email".to_string(), AttributeValue::S(user.email.clone()));
        item.insert("name".to_string(), AttributeValue::S(user.name.clone()));
        if let Some(picture_url) = &user.picture_url {
            item.insert(
                "picture_url".to_string(),
                AttributeValue::S(picture_url.clone()),
            );
        }
        item.insert("theme".to_string(), AttributeValue::S(user.theme.to_string()));
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(user.created_at.to_rfc3339()),
        );
        item.insert(
            "updated_at".to_string(),
            AttributeValue::S(user.updated_at.to_rfc3339()),
        );
        if let Some(last_login) = &user.last_login {
            item.insert(
                "last_login".to_string(),
                AttributeValue::S(last_login.to_rfc3339()),
            );
        }
        item.insert("is_active".to_string(), AttributeValue::Bool(user.is_active));
        item
    }

    // Helper methods for parsing DynamoDB items
    fn parse_report_from_item(item: &Item) -> Result<ScanReport, RepositoryError> {
        let id = parse_uuid(item, "id")?;
        let owner_id = parse_uuid(item, "owner_id")?;

        let image_reference = ImageReference::from(required_s(item, "image_reference")?);

        let model_used = item
            .get("model_used")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| ModelChoice::from_str(s).ok())
            .ok_or_else(|| RepositoryError::InvalidData("Invalid model_used".to_string()))?;

        let class_index = item
            .get("class_index")
            .and_then(|v| v.as_n().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| RepositoryError::InvalidData("Invalid class_index".to_string()))?;

        let label = required_s(item, "label")?;

        let confidence = item
            .get("confidence")
            .and_then(|v| v.as_n().ok())
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|c| (0.0..=1.0).contains(c))
            .ok_or_else(|| RepositoryError::InvalidData("Invalid confidence".to_string()))?;

        let narrative_report = item
            .get("narrative_report")
            .and_then(|v| v.as_s().ok())
            .cloned();

        let created_at = parse_timestamp(item, "created_at")
            .ok_or_else(|| RepositoryError::InvalidData("Invalid created_at".to_string()))?;

        Ok(ScanReport {
            id,
            owner_id,
            image_reference,
            model_used,
            prediction: Prediction {
                class_index,
                label,
                confidence,
            },
            narrative_report,
            created_at,
        })
    }

    fn parse_user_from_item(item: &Item) -> Result<User, RepositoryError> {
        let id = parse_uuid(item, "id")?;
        let cognito_sub = required_s(item, "cognito_sub")?;
        let cognito_username = optional_s(item, "cognito_username");
        let cognito_access_token = optional_s(item, "cognito_access_token");
        let cognito_refresh_token = optional_s(item, "cognito_refresh_token");

        let email = required_s(item, "email")?;
        let name = required_s(item, "name")?;
        let picture_url = optional_s(item, "picture_url");

        let theme = item
            .get("theme")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| ThemePreference::from_str(s).ok())
            .unwrap_or_default();

        let created_at = parse_timestamp(item, "created_at")
            .ok_or_else(|| RepositoryError::InvalidData("Invalid created_at".to_string()))?;
        let updated_at = parse_timestamp(item, "updated_at").unwrap_or(created_at);
        let last_login = parse_timestamp(item, "last_login");

        let is_active = *item
            .get("is_active")
            .and_then(|v| v.as_bool().ok())
            .unwrap_or(&true);

        Ok(User {
            id,
            cognito_sub,
            cognito_username,
            cognito_access_token,
            cognito_refresh_token,
            email,
            name,
            picture_url,
            theme,
            created_at,
            updated_at,
            last_login,
            is_active,
        })
    }
}

fn required_s(item: &Item, field: &str) -> Result<String, RepositoryError> {
    item.get(field)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| RepositoryError::InvalidData(format!("Invalid {}", field)))
}

fn optional_s(item: &Item, field: &str) -> Option<String> {
    item.get(field).and_then(|v| v.as_s().ok()).cloned()
}

fn parse_uuid(item: &Item, field: &str) -> Result<Uuid, RepositoryError> {
    item.get(field)
        .and_then(|v| v.as_s().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| RepositoryError::InvalidData(format!("Invalid {}", field)))
}

fn parse_timestamp(item: &Item, field: &str) -> Option<DateTime<Utc>> {
    item.get(field)
        .and_then(|v| v.as_s().ok())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Follows `LastEvaluatedKey` until a page yields an item or the table ends.
/// Filtered scans can return empty pages before the match.
async fn first_item_across_pages<F, Fut>(mut fetch_page: F) -> Result<Option<Item>, RepositoryError>
where
    F: FnMut(Option<Item>) -> Fut,
    Fut: Future<Output = Result<(Vec<Item>, Option<Item>), RepositoryError>>,
{
    let mut start_key: Option<Item> = None;
    loop {
        let (items, last_evaluated_key) = fetch_page(start_key.take()).await?;
        if let Some(item) = items.into_iter().next() {
            return Ok(Some(item));
        }
        match last_evaluated_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => return Ok(None),
        }
    }
}

#[async_trait]
impl ReportStore for DynamoDbRepository {
    async fn save(&self, report: &ScanReport) -> Result<Uuid, RepositoryError> {
        let item = Self::report_to_item(report);

        match self
            .client
            .put_item()
            .table_name(&self.reports_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(sort_key)")
            .send()
            .await
        {
            Ok(_) => {
                log::info!("Saved report {} for owner {}", report.id, report.owner_id);
                Ok(report.id)
            }
            Err(e) => {
                log::error!("DynamoDB put_item failed for report {}: {:?}", report.id, e);
                Err(RepositoryError::StoreUnavailable(e.to_string()))
            }
        }
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<ScanReport>, RepositoryError> {
        let mut reports = Vec::new();
        if limit == Some(0) {
            return Ok(reports);
        }

        let mut start_key: Option<Item> = None;
        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.reports_table)
                .key_condition_expression("owner_id = :owner_id")
                .expression_attribute_values(":owner_id", AttributeValue::S(owner_id.to_string()))
                .scan_index_forward(false)
                .set_exclusive_start_key(start_key.take());

            if let Some(limit) = limit {
                let remaining = limit.saturating_sub(reports.len());
                request = request.limit(i32::try_from(remaining).unwrap_or(i32::MAX));
            }

            let output = request
                .send()
                .await
                .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;

            for item in output.items.unwrap_or_default() {
                reports.push(Self::parse_report_from_item(&item)?);
            }

            if limit.is_some_and(|limit| reports.len() >= limit) {
                break;
            }
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        log::debug!("Fetched {} reports for owner {}", reports.len(), owner_id);
        Ok(reports)
    }

    async fn delete_all_by_owner(&self, owner_id: Uuid) -> Result<usize, RepositoryError> {
        let keys = self.query_owner_keys(owner_id).await?;
        let total = keys.len();
        let mut deleted = 0;
        let mut failure: Option<String> = None;

        for chunk in keys.chunks(BATCH_WRITE_LIMIT) {
            let mut requests = Vec::with_capacity(chunk.len());
            for key in chunk {
                let delete = DeleteRequest::builder()
                    .set_key(Some(key.clone()))
                    .build()
                    .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;
                requests.push(WriteRequest::builder().delete_request(delete).build());
            }

            match self
                .client
                .batch_write_item()
                .request_items(&self.reports_table, requests)
                .send()
                .await
            {
                Ok(output) => {
                    let unprocessed = output
                        .unprocessed_items()
                        .and_then(|items| items.get(&self.reports_table))
                        .map(|pending| pending.len())
                        .unwrap_or(0);
                    deleted += chunk.len() - unprocessed;
                    if unprocessed > 0 {
                        failure = Some(format!("{} items left unprocessed", unprocessed));
                    }
                }
                Err(e) => {
                    log::error!("DynamoDB batch delete failed for owner {}: {:?}", owner_id, e);
                    failure = Some(e.to_string());
                }
            }
        }

        match failure {
            None => {
                log::info!("Deleted {} reports for owner {}", deleted, owner_id);
                Ok(deleted)
            }
            Some(reason) => Err(RepositoryError::PartialDelete {
                deleted,
                total,
                reason,
            }),
        }
    }
}

#[async_trait]
impl UserStore for DynamoDbRepository {
    async fn create_user(&self, user: &User) -> Result<(), RepositoryError> {
        log::info!(
            "Creating user in DynamoDB table '{}': {}",
            self.users_table,
            user.email
        );

        match self
            .client
            .put_item()
            .table_name(&self.users_table)
            .set_item(Some(Self::user_to_item(user)))
            .send()
            .await
        {
            Ok(_) => {
                log::info!("Successfully created user in DynamoDB: {}", user.email);
                Ok(())
            }
            Err(e) => {
                log::error!("DynamoDB put_item failed for user {}: {:?}", user.email, e);
                Err(RepositoryError::StoreUnavailable(e.to_string()))
            }
        }
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.users_table)
            .key("id", AttributeValue::S(user_id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;

        result
            .item
            .map(|item| Self::parse_user_from_item(&item))
            .transpose()
    }

    async fn get_user_by_cognito_sub(
        &self,
        cognito_sub: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let found = first_item_across_pages(|start_key| async move {
            let output = self
                .client
                .scan()
                .table_name(&self.users_table)
                .filter_expression("cognito_sub = :cognito_sub")
                .expression_attribute_values(
                    ":cognito_sub",
                    AttributeValue::S(cognito_sub.to_string()),
                )
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;
            Ok((output.items.unwrap_or_default(), output.last_evaluated_key))
        })
        .await?;

        found
            .map(|item| Self::parse_user_from_item(&item))
            .transpose()
    }

    async fn update_user(&self, user: &User) -> Result<(), RepositoryError> {
        log::info!("Updating user in DynamoDB: {}", user.email);

        let mut set_parts = Vec::new();
        let mut remove_parts = Vec::new();
        let mut expression_attribute_values = HashMap::new();
        let mut expression_attribute_names = HashMap::new();

        // Tokens are removed on logout, so absent values clear the attribute.
        for (field, value) in [
            ("cognito_access_token", &user.cognito_access_token),
            ("cognito_refresh_token", &user.cognito_refresh_token),
            ("cognito_username", &user.cognito_username),
            ("picture_url", &user.picture_url),
        ] {
            match value {
                Some(value) => {
                    set_parts.push(format!("{field} = :{field}"));
                    expression_attribute_values
                        .insert(format!(":{field}"), AttributeValue::S(value.clone()));
                }
                None => remove_parts.push(field.to_string()),
            }
        }

        set_parts.push("email = :email".to_string());
        expression_attribute_values
            .insert(":email".to_string(), AttributeValue::S(user.email.clone()));

        set_parts.push("#name = :name".to_string());
        expression_attribute_names.insert("#name".to_string(), "name".to_string());
        expression_attribute_values
            .insert(":name".to_string(), AttributeValue::S(user.name.clone()));

        set_parts.push("theme = :theme".to_string());
        expression_attribute_values
            .insert(":theme".to_string(), AttributeValue::S(user.theme.to_string()));

        set_parts.push("updated_at = :updated_at".to_string());
        expression_attribute_values.insert(
            ":updated_at".to_string(),
            AttributeValue::S(user.updated_at.to_rfc3339()),
        );

        if let Some(last_login) = &user.last_login {
            set_parts.push("last_login = :last_login".to_string());
            expression_attribute_values.insert(
                ":last_login".to_string(),
                AttributeValue::S(last_login.to_rfc3339()),
            );
        }

        set_parts.push("is_active = :is_active".to_string());
        expression_attribute_values
            .insert(":is_active".to_string(), AttributeValue::Bool(user.is_active));

        let mut update_expression = format!("SET {}", set_parts.join(", "));
        if !remove_parts.is_empty() {
            update_expression.push_str(&format!(" REMOVE {}", remove_parts.join(", ")));
        }
        log::debug!("Update expression: {}", update_expression);

        match self
            .client
            .update_item()
            .table_name(&self.users_table)
            .key("id", AttributeValue::S(user.id.to_string()))
            .update_expression(update_expression)
            .set_expression_attribute_values(Some(expression_attribute_values))
            .set_expression_attribute_names(Some(expression_attribute_names))
            .send()
            .await
        {
            Ok(_) => {
                log::info!("Successfully updated user: {}", user.email);
                Ok(())
            }
            Err(e) => {
                log::error!(
                    "DynamoDB update_item failed for user {}: {:?}",
                    user.email,
                    e
                );

                let error_msg = if let Some(service_err) = e.as_service_error() {
                    format!("Service error: {:?}", service_err)
                } else {
                    format!("SDK error: {}", e)
                };

                Err(RepositoryError::StoreUnavailable(error_msg))
            }
        }
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        self.client
            .delete_item()
            .table_name(&self.users_table)
            .key("id", AttributeValue::S(user_id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;

        log::info!("Deleted user record {}", user_id);
        Ok(())
    }
}
