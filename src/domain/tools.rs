//! User management tools exposed via Model Context Protocol
//!
//! Provides `get_user_by_id`, `search_users`, `add_user`, `update_user` and `delete_user`
//! by delegating to a shared [`UserClient`].

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::domain::registry::{RegistryError, Tool, ToolError, ToolRegistry};
use crate::user_client::{NewUser, UserClient, UserPatch, UserSearch};

pub const VALID_GENDERS: [&str; 2] = ["male", "female"];
const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

pub fn build_user_tools(client: Arc<dyn UserClient>) -> Result<ToolRegistry, RegistryError> {
    ToolRegistry::builder()
        .register(GetUserByIdTool::new(Arc::clone(&client)))
        .register(SearchUsersTool::new(Arc::clone(&client)))
        .register(AddUserTool::new(Arc::clone(&client)))
        .register(UpdateUserTool::new(Arc::clone(&client)))
        .register(DeleteUserTool::new(client))
        .build()
}

pub struct GetUserByIdTool {
    client: Arc<dyn UserClient>,
}

impl GetUserByIdTool {
    pub fn new(client: Arc<dyn UserClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetUserByIdTool {
    fn name(&self) -> &'static str {
        "get_user_by_id"
    }

    fn description(&self) -> &'static str {
        "Provides full user information by user_id"
    }

    fn input_schema(&self) -> Value {
        id_schema("User ID")
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let id = user_id(&arguments)?;
        Ok(self.client.get(id).await?)
    }
}

pub struct SearchUsersTool {
    client: Arc<dyn UserClient>,
}

impl SearchUsersTool {
    pub fn new(client: Arc<dyn UserClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for SearchUsersTool {
    fn name(&self) -> &'static str {
        "search_users"
    }

    fn description(&self) -> &'static str {
        "Searches users by name, surname, email, and gender"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "User name" },
                "surname": { "type": "string", "description": "User surname" },
                "email": { "type": "string", "description": "User email" },
                "gender": {
                    "type": "string",
                    "description": "User gender",
                    "enum": VALID_GENDERS
                }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let filters: UserSearch = parse_arguments(Value::Object(arguments))?;
        validate_gender(filters.gender.as_deref())?;
        Ok(self.client.search(filters).await?)
    }
}

pub struct AddUserTool {
    client: Arc<dyn UserClient>,
}

impl AddUserTool {
    pub fn new(client: Arc<dyn UserClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for AddUserTool {
    fn name(&self) -> &'static str {
        "add_user"
    }

    fn description(&self) -> &'static str {
        "Adds new user into the system"
    }

    fn input_schema(&self) -> Value {
        let mut schema = user_fields_schema();
        schema["required"] = json!(["name", "surname", "email"]);
        schema
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let user: NewUser = parse_arguments(Value::Object(arguments))?;
        validate_email(&user.email)?;
        validate_gender(user.gender.as_deref())?;
        Ok(self.client.add(user).await?)
    }
}

pub struct UpdateUserTool {
    client: Arc<dyn UserClient>,
}

impl UpdateUserTool {
    pub fn new(client: Arc<dyn UserClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for UpdateUserTool {
    fn name(&self) -> &'static str {
        "update_user"
    }

    fn description(&self) -> &'static str {
        "Updates user info"
    }

    fn input_schema(&self) -> Value {
        let mut schema = id_schema("User ID that should be updated.");
        schema["properties"]["new_info"] = user_fields_schema();
        schema
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let id = user_id(&arguments)?;
        let patch: UserPatch = match arguments.get("new_info") {
            Some(new_info) => parse_arguments(new_info.clone())?,
            None => {
                return Err(ToolError::InvalidArguments(
                    "missing required argument `new_info`".to_string(),
                ))
            }
        };

        if let Some(email) = patch.email.as_deref() {
            validate_email(email)?;
        }
        validate_gender(patch.gender.as_deref())?;

        Ok(self.client.update(id, patch).await?)
    }
}

pub struct DeleteUserTool {
    client: Arc<dyn UserClient>,
}

impl DeleteUserTool {
    pub fn new(client: Arc<dyn UserClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for DeleteUserTool {
    fn name(&self) -> &'static str {
        "delete_user"
    }

    fn description(&self) -> &'static str {
        "Deletes user by user_id"
    }

    fn input_schema(&self) -> Value {
        id_schema("User ID")
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let id = user_id(&arguments)?;
        Ok(self.client.delete(id).await?)
    }
}

fn id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "number", "description": description }
        },
        "required": ["id"]
    })
}

fn user_fields_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "surname": { "type": "string" },
            "email": { "type": "string" },
            "phone": { "type": "string" },
            "date_of_birth": { "type": "string", "description": "Date of birth, YYYY-MM-DD" },
            "address": {
                "type": "object",
                "properties": {
                    "country": { "type": "string" },
                    "city": { "type": "string" },
                    "street": { "type": "string" },
                    "flat_house": { "type": "string" }
                }
            },
            "gender": { "type": "string", "enum": VALID_GENDERS },
            "company": { "type": "string" },
            "salary": { "type": "number" },
            "about_me": { "type": "string" }
        },
        "required": []
    })
}

/// Reads `id` as an integer, accepting integral floats since schemas advertise `number`.
pub fn user_id(arguments: &Map<String, Value>) -> Result<i64, ToolError> {
    let value = arguments
        .get("id")
        .ok_or_else(|| ToolError::InvalidArguments("missing required argument `id`".to_string()))?;

    if let Some(id) = value.as_i64() {
        return Ok(id);
    }

    match value.as_f64() {
        Some(id) if id.fract() == 0.0 && id.abs() < i64::MAX as f64 => Ok(id as i64),
        _ => Err(ToolError::InvalidArguments(format!(
            "`id` must be an integer, got {value}"
        ))),
    }
}

fn parse_arguments<T: DeserializeOwned>(value: Value) -> Result<T, ToolError> {
    serde_json::from_value(value).map_err(|err| ToolError::InvalidArguments(err.to_string()))
}

fn validate_email(email: &str) -> Result<(), ToolError> {
    let pattern = Regex::new(EMAIL_PATTERN)
        .map_err(|err| ToolError::InvalidArguments(format!("email pattern is invalid: {err}")))?;

    if pattern.is_match(email.trim()) {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(format!(
            "`{email}` is not a valid email address"
        )))
    }
}

fn validate_gender(gender: Option<&str>) -> Result<(), ToolError> {
    match gender {
        None => Ok(()),
        Some(value) if VALID_GENDERS.contains(&value) => Ok(()),
        Some(value) => Err(ToolError::InvalidArguments(format!(
            "gender must be one of: male, female (got `{value}`)"
        ))),
    }
}
