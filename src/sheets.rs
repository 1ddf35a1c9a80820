#![cfg(feature = "web")]
//! Operation log kept in a hosted Google spreadsheet.
//!
//! The workbook is looked up by name through the Drive API and created (and
//! shared with anyone as writer) when missing. Worksheets are handled with
//! the Sheets v4 API. Calls are blocking and are not retried.

use crate::error::{LogbookError, Result};
use crate::journal::{OperationLog, records_from_rows};
use crate::record::{LOG_HEADER, OperationRecord, is_worksheet_key};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use log::{debug, info};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_SPREADSHEET_NAME: &str = "suivi des opérations";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

const NEW_SHEET_ROWS: u32 = 1000;
const NEW_SHEET_COLS: u32 = 20;

/// Lifetime requested for the signed assertion.
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before they expire.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

impl From<reqwest::Error> for LogbookError {
    fn from(e: reqwest::Error) -> Self {
        LogbookError::Remote(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for LogbookError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        LogbookError::Credentials(e.to_string())
    }
}

/// The fields of a Google service-account JSON key that are used here.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LogbookError::Credentials(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            LogbookError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

fn assertion_claims(key: &ServiceAccountKey, now: i64) -> AssertionClaims<'_> {
    AssertionClaims {
        iss: &key.client_email,
        scope: SCOPES,
        aud: &key.token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Drive search expression matching a spreadsheet by exact name.
fn name_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escaped, SPREADSHEET_MIME
    )
}

/// A1 range covering a whole worksheet, URL-encoded for a path segment.
fn sheet_range(title: &str) -> String {
    let quoted = format!("'{}'", title.replace('\'', "''"));
    urlencoding::encode(&quoted).into_owned()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Blocking client for one named spreadsheet.
#[derive(Debug)]
pub struct SheetsClient {
    http: Client,
    key: ServiceAccountKey,
    spreadsheet_name: String,
    token: Mutex<Option<CachedToken>>,
    spreadsheet_id: Mutex<Option<String>>,
}

impl SheetsClient {
    pub fn new(key: ServiceAccountKey, spreadsheet_name: impl Into<String>) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(SheetsClient {
            http,
            key,
            spreadsheet_name: spreadsheet_name.into(),
            token: Mutex::new(None),
            spreadsheet_id: Mutex::new(None),
        })
    }

    pub fn spreadsheet_name(&self) -> &str {
        &self.spreadsheet_name
    }

    fn access_token(&self) -> Result<String> {
        let mut cached = self
            .token
            .lock()
            .map_err(|_| LogbookError::Remote("token cache poisoned".into()))?;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let claims = assertion_claims(&self.key, chrono::Utc::now().timestamp());
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()?;
        let token: TokenResponse = check(response, "token exchange")?.json()?;
        debug!("obtained access token for {}", self.key.client_email);

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request.bearer_auth(self.access_token()?))
    }

    /// Id of the configured spreadsheet, creating and sharing it if needed.
    pub fn spreadsheet_id(&self) -> Result<String> {
        let mut cached = self
            .spreadsheet_id
            .lock()
            .map_err(|_| LogbookError::Remote("spreadsheet id cache poisoned".into()))?;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = match self.find_spreadsheet()? {
            Some(id) => id,
            None => self.create_spreadsheet()?,
        };
        *cached = Some(id.clone());
        Ok(id)
    }

    fn find_spreadsheet(&self) -> Result<Option<String>> {
        let request = self.http.get(DRIVE_FILES_URL).query(&[
            ("q", name_query(&self.spreadsheet_name)),
            ("fields", "files(id,name)".to_string()),
        ]);
        let body: Value = check(self.authed(request)?.send()?, "spreadsheet lookup")?.json()?;
        Ok(body["files"]
            .as_array()
            .and_then(|files| files.first())
            .and_then(|f| f["id"].as_str())
            .map(str::to_string))
    }

    fn create_spreadsheet(&self) -> Result<String> {
        let request = self
            .http
            .post(SHEETS_URL)
            .json(&json!({ "properties": { "title": self.spreadsheet_name } }));
        let body: Value = check(self.authed(request)?.send()?, "spreadsheet creation")?.json()?;
        let id = body["spreadsheetId"]
            .as_str()
            .ok_or_else(|| LogbookError::Remote("spreadsheet created without an id".into()))?
            .to_string();

        let share = self
            .http
            .post(format!("{}/{}/permissions", DRIVE_FILES_URL, id))
            .json(&json!({ "type": "anyone", "role": "writer" }));
        check(self.authed(share)?.send()?, "spreadsheet sharing")?;

        info!("created spreadsheet {:?} ({})", self.spreadsheet_name, id);
        Ok(id)
    }

    pub fn worksheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>> {
        let request = self
            .http
            .get(format!("{}/{}", SHEETS_URL, spreadsheet_id))
            .query(&[("fields", "sheets.properties.title")]);
        let body: Value = check(self.authed(request)?.send()?, "worksheet listing")?.json()?;
        Ok(body["sheets"]
            .as_array()
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s["properties"]["title"].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn add_worksheet(&self, spreadsheet_id: &str, title: &str) -> Result<()> {
        let request = self
            .http
            .post(format!("{}/{}:batchUpdate", SHEETS_URL, spreadsheet_id))
            .json(&json!({
                "requests": [{
                    "addSheet": {
                        "properties": {
                            "title": title,
                            "gridProperties": {
                                "rowCount": NEW_SHEET_ROWS,
                                "columnCount": NEW_SHEET_COLS
                            }
                        }
                    }
                }]
            }));
        check(self.authed(request)?.send()?, "worksheet creation")?;
        info!("created worksheet {} in {:?}", title, self.spreadsheet_name);
        Ok(())
    }

    pub fn append_row(&self, spreadsheet_id: &str, title: &str, row: &[String]) -> Result<()> {
        let request = self
            .http
            .post(format!(
                "{}/{}/values/{}:append",
                SHEETS_URL,
                spreadsheet_id,
                sheet_range(title)
            ))
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": [row] }));
        check(self.authed(request)?.send()?, "row append")?;
        Ok(())
    }

    pub fn values(&self, spreadsheet_id: &str, title: &str) -> Result<Vec<Vec<String>>> {
        let request = self.http.get(format!(
            "{}/{}/values/{}",
            SHEETS_URL,
            spreadsheet_id,
            sheet_range(title)
        ));
        let body: Value = check(self.authed(request)?.send()?, "value read")?.json()?;
        Ok(body["values"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| cells.iter().map(cell_text).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Turns a non-success HTTP status into a [`LogbookError::Remote`].
fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(LogbookError::Remote(format!("{} failed with {}: {}", what, status, body)))
}

/// [`OperationLog`] backed by [`SheetsClient`].
#[derive(Debug)]
pub struct GoogleSheetsLog {
    client: SheetsClient,
}

impl GoogleSheetsLog {
    pub fn new(client: SheetsClient) -> Self {
        GoogleSheetsLog { client }
    }
}

impl OperationLog for GoogleSheetsLog {
    fn append(&self, key: &str, row: &[String]) -> Result<()> {
        let id = self.client.spreadsheet_id()?;
        let titles = self.client.worksheet_titles(&id)?;
        if !titles.iter().any(|t| t == key) {
            self.client.add_worksheet(&id, key)?;
            let header: Vec<String> = LOG_HEADER.iter().map(|h| h.to_string()).collect();
            self.client.append_row(&id, key, &header)?;
        }
        self.client.append_row(&id, key, row)
    }

    fn read_all(&self) -> Result<Vec<OperationRecord>> {
        let id = self.client.spreadsheet_id()?;
        let mut records = Vec::new();
        for title in self.client.worksheet_titles(&id)? {
            if !is_worksheet_key(&title) {
                continue;
            }
            let rows = self.client.values(&id, &title)?;
            records.extend(records_from_rows(&rows));
        }
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("Google spreadsheet {:?}", self.client.spreadsheet_name())
    }
}
