use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// SQLSTATE for unique_violation, surfaced by PostgREST in the error body.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: StatusCode, body: String },

    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),
}

impl DatabaseError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DatabaseError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// PostgREST error body, when it is JSON.
    fn error_body(&self) -> Option<Value> {
        match self {
            DatabaseError::Api { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }

    /// SQLSTATE reported in the `code` field of the error body.
    pub fn sqlstate(&self) -> Option<String> {
        let parsed = self.error_body()?;
        Some(parsed.get("code")?.as_str()?.to_string())
    }

    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate().as_deref() == Some(UNIQUE_VIOLATION)
    }

    /// Name of the violated constraint, when PostgREST reports one.
    pub fn violated_constraint(&self) -> Option<String> {
        let parsed = self.error_body()?;
        let message = parsed.get("message")?.as_str()?;
        let start = message.find("constraint \"")? + "constraint \"".len();
        let rest = &message[start..];
        let end = rest.find('"')?;
        Some(rest[..end].to_string())
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key).map_err(|_| DatabaseError::InvalidHeader("apikey"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Service calls fall back to the anon key as bearer.
        let bearer = auth_token.unwrap_or(&self.anon_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer))
                .map_err(|_| DatabaseError::InvalidHeader("authorization"))?,
        );

        Ok(headers)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            if status == StatusCode::CONFLICT {
                debug!("API conflict ({}): {}", status, body);
            } else {
                error!("API error ({}): {}", status, body);
            }
            return Err(DatabaseError::Api { status, body });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Header map asking PostgREST to echo written rows.
    pub fn return_representation() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SupabaseClient {
        let config = AppConfig {
            supabase_url: server.uri(),
            supabase_anon_key: "anon".to_string(),
            ..AppConfig::default()
        };
        SupabaseClient::new(&config)
    }

    #[tokio::test]
    async fn sends_apikey_and_decodes_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/things"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer anon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
            .mount(&server)
            .await;

        let rows: Vec<Value> = client_for(&server)
            .request(Method::GET, "/rest/v1/things", None, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn conflict_is_reported_as_unique_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/things"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint \"things_key\""
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .request_with_headers::<Vec<Value>>(
                Method::POST,
                "/rest/v1/things",
                Some("user-token"),
                Some(json!({ "id": 1 })),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .unwrap_err();

        assert!(err.is_unique_violation());
        assert_eq!(err.violated_constraint().as_deref(), Some("things_key"));
        assert_matches!(err, DatabaseError::Api { status, .. } if status == StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn server_error_is_not_a_unique_violation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .request::<Value>(Method::GET, "/rest/v1/things", None, None)
            .await
            .unwrap_err();

        assert!(!err.is_unique_violation());
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn only_sqlstate_23505_counts_as_unique_violation() {
        let foreign_key = DatabaseError::Api {
            status: StatusCode::CONFLICT,
            body: json!({
                "code": "23503",
                "details": "Key (doctor_id)=(00000000-0000-0000-0000-000000023505) is not present",
                "message": "insert or update violates foreign key constraint \"appointments_doctor_fkey\""
            })
            .to_string(),
        };
        assert_eq!(foreign_key.sqlstate().as_deref(), Some("23503"));
        assert!(!foreign_key.is_unique_violation());

        let plain_conflict = DatabaseError::Api {
            status: StatusCode::CONFLICT,
            body: "23505".to_string(),
        };
        assert!(!plain_conflict.is_unique_violation());
    }
}
