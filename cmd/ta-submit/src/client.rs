//! Thin client over the `/ta/v1` API with a cookie session.

use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::error::SubmitError;
use crate::report::LocalPhoto;

const API_PREFIX: &str = "/ta/v1";
const NONCE_HEADER: &str = "X-TA-Nonce";

pub struct Client {
    http: reqwest::Client,
    base: String,
    nonce: String,
}

impl Client {
    pub fn new(server: &str) -> Result<Self, SubmitError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(concat!("ta-submit/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: format!("{}{API_PREFIX}", server.trim_end_matches('/')),
            nonce: String::new(),
        })
    }

    async fn json(resp: reqwest::Response) -> Result<Value, SubmitError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SubmitError::from_response(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|_| SubmitError::Server {
            status: status.as_u16(),
            message: "response was not JSON".to_string(),
        })
    }

    /// Returns the display name of the logged-in user.
    pub async fn login(&mut self, login: &str, password: &str) -> Result<String, SubmitError> {
        let resp = self
            .http
            .post(format!("{}/auth/login", self.base))
            .json(&serde_json::json!({ "login": login, "password": password }))
            .send()
            .await?;
        let body = Self::json(resp).await?;
        self.nonce = body["nonce"].as_str().unwrap_or_default().to_string();
        Ok(body["user"]["display_name"].as_str().unwrap_or(login).to_string())
    }

    /// Uploads one photo and returns its attachment id.
    pub async fn upload(&self, photo: &LocalPhoto) -> Result<i64, SubmitError> {
        let part = Part::bytes(photo.data.clone())
            .file_name(photo.file_name.clone())
            .mime_str(&photo.mime)?;
        let resp = self
            .http
            .post(format!("{}/media", self.base))
            .header(NONCE_HEADER, &self.nonce)
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        let body = Self::json(resp).await?;
        body["id"].as_i64().ok_or_else(|| SubmitError::Server {
            status: 201,
            message: "upload response had no attachment id".to_string(),
        })
    }

    /// Posts the report and returns its id.
    pub async fn submit(&self, report: &Value) -> Result<i64, SubmitError> {
        let resp = self
            .http
            .post(format!("{}/report", self.base))
            .header(NONCE_HEADER, &self.nonce)
            .json(report)
            .send()
            .await?;
        let body = Self::json(resp).await?;
        body["id"].as_i64().ok_or_else(|| SubmitError::Server {
            status: 201,
            message: "report response had no id".to_string(),
        })
    }
}
