use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum UserClientError {
    #[error("user service request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("user service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected user service response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat_house: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub surname: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about_me: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about_me: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSearch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

/// Backend capability the user tools delegate to. Every operation renders its outcome as text.
#[async_trait]
pub trait UserClient: Send + Sync {
    async fn add(&self, user: NewUser) -> Result<String, UserClientError>;
    async fn get(&self, id: i64) -> Result<String, UserClientError>;
    async fn search(&self, filters: UserSearch) -> Result<String, UserClientError>;
    async fn update(&self, id: i64, patch: UserPatch) -> Result<String, UserClientError>;
    async fn delete(&self, id: i64) -> Result<String, UserClientError>;
}

/// REST client for the user management service.
#[derive(Debug, Clone)]
pub struct HttpUserClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUserClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UserClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn users_url(&self) -> String {
        format!("{}/v1/users", self.base_url)
    }

    fn user_url(&self, id: i64) -> String {
        format!("{}/v1/users/{id}", self.base_url)
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, UserClientError> {
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), "user service response");

        if !status.is_success() {
            return Err(UserClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|err| UserClientError::Decode(err.to_string()))
    }
}

#[async_trait]
impl UserClient for HttpUserClient {
    async fn add(&self, user: NewUser) -> Result<String, UserClientError> {
        let response = self.http.post(self.users_url()).json(&user).send().await?;
        let created = Self::read_json(response).await?;
        Ok(format!("User successfully added: {}", render_user(&created)))
    }

    async fn get(&self, id: i64) -> Result<String, UserClientError> {
        let response = self.http.get(self.user_url(id)).send().await?;
        let user = Self::read_json(response).await?;
        Ok(format!("User {id}: {}", render_user(&user)))
    }

    async fn search(&self, filters: UserSearch) -> Result<String, UserClientError> {
        let response = self
            .http
            .get(format!("{}/search", self.users_url()))
            .query(&filters)
            .send()
            .await?;
        let found = Self::read_json(response).await?;

        let users = found.as_array().cloned().unwrap_or_default();
        if users.is_empty() {
            return Ok("No users found".to_string());
        }

        let rendered = users
            .iter()
            .map(render_user)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("Found {} users:\n{rendered}", users.len()))
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<String, UserClientError> {
        let response = self.http.put(self.user_url(id)).json(&patch).send().await?;
        let updated = Self::read_json(response).await?;
        Ok(format!("User {id} successfully updated: {}", render_user(&updated)))
    }

    async fn delete(&self, id: i64) -> Result<String, UserClientError> {
        let response = self.http.delete(self.user_url(id)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(UserClientError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                body: format!("user {id} not found"),
            });
        }
        Self::read_json(response).await?;
        Ok(format!("User {id} successfully deleted"))
    }
}

fn render_user(user: &Value) -> String {
    match user {
        Value::Object(fields) => fields
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| match value {
                Value::String(text) => format!("{key}: {text}"),
                other => format!("{key}: {other}"),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        extract::{Path, Query},
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    use super::*;

    async fn create_user(Json(mut user): Json<Value>) -> Response {
        user["id"] = json!(7);
        (StatusCode::CREATED, Json(user)).into_response()
    }

    async fn search_users(Query(filters): Query<HashMap<String, String>>) -> Json<Value> {
        match filters.get("name").map(String::as_str) {
            Some("Ada") => Json(json!([
                {"id": 1, "name": "Ada", "surname": "Lovelace"},
                {"id": 4, "name": "Ada", "surname": "Byron"}
            ])),
            _ => Json(json!([])),
        }
    }

    async fn fetch_user(Path(id): Path<i64>) -> Response {
        if id == 1 {
            Json(json!({"id": 1, "name": "Ada", "company": null})).into_response()
        } else {
            (StatusCode::NOT_FOUND, "missing").into_response()
        }
    }

    async fn replace_user(Path(id): Path<i64>, Json(mut patch): Json<Value>) -> Json<Value> {
        patch["id"] = json!(id);
        Json(patch)
    }

    async fn remove_user(Path(id): Path<i64>) -> Response {
        match id {
            1 => StatusCode::NO_CONTENT.into_response(),
            2 => StatusCode::NOT_FOUND.into_response(),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        }
    }

    async fn spawn_backend() -> HttpUserClient {
        let router = Router::new()
            .route("/v1/users", post(create_user))
            .route("/v1/users/search", get(search_users))
            .route(
                "/v1/users/{id}",
                get(fetch_user).put(replace_user).delete(remove_user),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind backend listener");
        let addr = listener.local_addr().expect("backend address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        HttpUserClient::new(format!("http://{addr}/")).expect("client")
    }

    #[tokio::test]
    async fn add_posts_to_users_collection() {
        let client = spawn_backend().await;

        let text = client
            .add(NewUser {
                name: "Ada".to_string(),
                surname: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
                date_of_birth: None,
                address: None,
                gender: None,
                company: None,
                salary: None,
                about_me: None,
            })
            .await
            .expect("add user");

        assert!(text.starts_with("User successfully added: "));
        assert!(text.contains("email: ada@example.com"));
        assert!(text.contains("id: 7"));
    }

    #[tokio::test]
    async fn get_renders_user_and_maps_missing_to_status() {
        let client = spawn_backend().await;

        let text = client.get(1).await.expect("get user");
        assert_eq!(text, "User 1: id: 1, name: Ada");

        match client.get(9).await {
            Err(UserClientError::Status { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "missing");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_sends_filters_as_query() {
        let client = spawn_backend().await;

        let found = client
            .search(UserSearch {
                name: Some("Ada".to_string()),
                ..UserSearch::default()
            })
            .await
            .expect("search");
        assert!(found.starts_with("Found 2 users:\n"));
        assert!(found.contains("surname: Byron"));

        let none = client
            .search(UserSearch {
                name: Some("Grace".to_string()),
                ..UserSearch::default()
            })
            .await
            .expect("empty search");
        assert_eq!(none, "No users found");
    }

    #[tokio::test]
    async fn update_puts_patch_to_user() {
        let client = spawn_backend().await;

        let text = client
            .update(
                3,
                UserPatch {
                    company: Some("Analytical Engines".to_string()),
                    ..UserPatch::default()
                },
            )
            .await
            .expect("update user");

        assert_eq!(
            text,
            "User 3 successfully updated: company: Analytical Engines, id: 3"
        );
    }

    #[tokio::test]
    async fn delete_distinguishes_missing_users_from_failures() {
        let client = spawn_backend().await;

        assert_eq!(
            client.delete(1).await.expect("delete user"),
            "User 1 successfully deleted"
        );

        match client.delete(2).await {
            Err(UserClientError::Status { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "user 2 not found");
            }
            other => panic!("unexpected result {other:?}"),
        }

        match client.delete(5).await {
            Err(UserClientError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn renders_user_fields_skipping_nulls() {
        let rendered = render_user(&json!({
            "id": 1,
            "name": "Ada",
            "company": null
        }));

        assert_eq!(rendered, "id: 1, name: Ada");
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let client = HttpUserClient::new("http://localhost:8041/").expect("client");

        assert_eq!(client.user_url(5), "http://localhost:8041/v1/users/5");
    }

    #[test]
    fn search_filters_skip_absent_fields() {
        let value = serde_json::to_value(UserSearch {
            name: Some("Ada".to_string()),
            ..UserSearch::default()
        })
        .expect("serialize");

        assert_eq!(value, json!({ "name": "Ada" }));
    }
}
