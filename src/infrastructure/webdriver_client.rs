//! W3C WebDriver adapter
//!
//! Talks HTTP/JSON to a chromedriver-compatible endpoint. Only the commands
//! the audit needs are implemented.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::FutureExt;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::browser_driver::{
    BrowserDriver, BrowserSession, DriverError, DriverResult, ElementRef, Locator,
};
use super::config::BrowserConfig;
use super::wait::poll_until;

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a07c-00bb7c6f1313";
const ENTER_KEY: &str = "\u{E007}";
const READY_POLL: Duration = Duration::from_millis(250);

fn map_transport(err: &reqwest::Error) -> DriverError {
    if err.is_timeout() {
        DriverError::Timeout(err.to_string())
    } else {
        DriverError::Transport(err.to_string())
    }
}

/// Maps a W3C error payload (`{"error": ..., "message": ...}`).
fn map_w3c_error(value: &Value) -> DriverError {
    let code = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match code {
        "no such element" => DriverError::NoSuchElement(message),
        "stale element reference" => DriverError::StaleElement,
        "element not interactable" | "element click intercepted" => DriverError::NotInteractable(message),
        "timeout" | "script timeout" => DriverError::Timeout(message),
        "invalid session id" => DriverError::SessionInvalid(message),
        other => DriverError::Other(format!("{other}: {message}")),
    }
}

fn element_id(value: &Value) -> Option<ElementRef> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
}

fn element_arg(element: &ElementRef) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

async fn send(http: &Client, method: Method, url: String, body: Option<Value>) -> DriverResult<Value> {
    let mut request = http.request(method, &url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.map_err(|e| map_transport(&e))?;
    let status = response.status();
    let payload: Value = response.json().await.map_err(|e| map_transport(&e))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        Ok(value)
    } else {
        Err(map_w3c_error(&value))
    }
}

/// Chrome session factory
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    http: Client,
    endpoint: String,
    config: BrowserConfig,
}

impl WebDriverClient {
    pub fn new(config: &BrowserConfig) -> DriverResult<Self> {
        // navigations may legitimately take the whole page-load timeout
        let http = Client::builder()
            .timeout(Duration::from_secs(config.page_load_timeout_secs + 30))
            .build()
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.webdriver_url.trim_end_matches('/').to_string(),
            config: config.clone(),
        })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec![
            "--disable-dev-shm-usage".to_string(),
            "--no-sandbox".to_string(),
            "--disable-notifications".to_string(),
            "--disable-gpu".to_string(),
            "--start-maximized".to_string(),
            format!("--force-device-scale-factor={}", self.config.window_zoom),
        ];
        if self.config.headless {
            args.push("--headless=new".to_string());
            args.push("--window-size=1920,1080".to_string());
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "pageLoadStrategy": "normal",
                    "timeouts": {
                        "pageLoad": self.config.page_load_timeout_secs * 1000,
                        "script": self.config.script_timeout_secs * 1000,
                        "implicit": 0
                    },
                    "goog:chromeOptions": {
                        "args": args,
                        "excludeSwitches": ["enable-automation"],
                        "useAutomationExtension": false
                    }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserDriver for WebDriverClient {
    type Session = WebDriverSession;

    async fn open_session(&self) -> DriverResult<WebDriverSession> {
        let value = send(
            &self.http,
            Method::POST,
            format!("{}/session", self.endpoint),
            Some(self.capabilities()),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Other("new session response without sessionId".into()))?
            .to_string();

        info!("🌐 WebDriver session opened: {}", session_id);
        Ok(WebDriverSession {
            http: self.http.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            zoom: self.config.window_zoom,
            closed: false,
        })
    }
}

/// One live Chrome session
#[derive(Debug)]
pub struct WebDriverSession {
    http: Client,
    base: String,
    zoom: f64,
    closed: bool,
}

impl WebDriverSession {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        send(&self.http, method, format!("{}{}", self.base, path), body).await
    }

    async fn post(&self, path: &str, body: Value) -> DriverResult<Value> {
        self.command(Method::POST, path, Some(body)).await
    }

    async fn get(&self, path: &str) -> DriverResult<Value> {
        self.command(Method::GET, path, None).await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> DriverResult<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args })).await
    }

    async fn get_string(&self, path: &str) -> DriverResult<String> {
        Ok(self.get(path).await?.as_str().unwrap_or_default().to_string())
    }

    /// CSS zoom is reset by every document load.
    async fn apply_zoom(&self) -> DriverResult<()> {
        if (self.zoom - 1.0).abs() < f64::EPSILON {
            return Ok(());
        }
        let percent = (self.zoom * 100.0).round();
        let script = format!("if (document.body) {{ document.body.style.zoom = '{percent}%'; }}");
        match self.execute(&script, Vec::new()).await {
            Err(e) if e.is_session_invalid() => Err(e),
            Err(e) => {
                debug!("Zoom not applied: {}", e);
                Ok(())
            }
            Ok(_) => Ok(()),
        }
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.post("/url", json!({ "url": url })).await?;
        self.apply_zoom().await
    }

    async fn refresh(&mut self) -> DriverResult<()> {
        self.post("/refresh", json!({})).await?;
        self.apply_zoom().await
    }

    async fn wait_until_loaded(&mut self, timeout: Duration) -> DriverResult<bool> {
        let ready = poll_until(self, timeout, READY_POLL, |s| {
            async move {
                let state = s.execute("return document.readyState", Vec::new()).await?;
                Ok::<_, DriverError>((state.as_str() == Some("complete")).then_some(()))
            }
            .boxed()
        })
        .await?;
        if ready.is_some() {
            self.apply_zoom().await?;
        }
        Ok(ready.is_some())
    }

    async fn find_displayed(&mut self, locator: Locator) -> DriverResult<Option<ElementRef>> {
        for element in self.find_all(locator).await? {
            match self.is_displayed(&element).await {
                Ok(true) => return Ok(Some(element)),
                Ok(false) | Err(DriverError::StaleElement) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn find_all(&mut self, locator: Locator) -> DriverResult<Vec<ElementRef>> {
        let (using, value) = locator.strategy();
        let found = self.post("/elements", json!({ "using": using, "value": value })).await?;
        Ok(found
            .as_array()
            .map(|items| items.iter().filter_map(element_id).collect())
            .unwrap_or_default())
    }

    async fn find_within(&mut self, parent: &ElementRef, locator: Locator) -> DriverResult<Option<ElementRef>> {
        let (using, value) = locator.strategy();
        let path = format!("/element/{}/element", parent.0);
        match self.post(&path, json!({ "using": using, "value": value })).await {
            Ok(found) => Ok(element_id(&found)),
            Err(DriverError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn click(&mut self, element: &ElementRef) -> DriverResult<()> {
        self.post(&format!("/element/{}/click", element.0), json!({})).await?;
        Ok(())
    }

    async fn clear(&mut self, element: &ElementRef) -> DriverResult<()> {
        self.post(&format!("/element/{}/clear", element.0), json!({})).await?;
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> DriverResult<()> {
        self.post(&format!("/element/{}/value", element.0), json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn press_enter(&mut self, element: &ElementRef) -> DriverResult<()> {
        self.type_text(element, ENTER_KEY).await
    }

    async fn submit_form(&mut self, element: &ElementRef) -> DriverResult<()> {
        let script = "var f = arguments[0].form || arguments[0].closest('form'); \
                      if (f) { if (f.requestSubmit) { f.requestSubmit(); } else { f.submit(); } }";
        self.execute(script, vec![element_arg(element)]).await?;
        Ok(())
    }

    async fn read_text(&mut self, element: &ElementRef) -> DriverResult<String> {
        self.get_string(&format!("/element/{}/text", element.0)).await
    }

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        let value = self.get(&format!("/element/{}/attribute/{}", element.0, name)).await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn is_enabled(&mut self, element: &ElementRef) -> DriverResult<bool> {
        Ok(self
            .get(&format!("/element/{}/enabled", element.0))
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn is_displayed(&mut self, element: &ElementRef) -> DriverResult<bool> {
        Ok(self
            .get(&format!("/element/{}/displayed", element.0))
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        self.get_string("/url").await
    }

    async fn page_title(&mut self) -> DriverResult<String> {
        self.get_string("/title").await
    }

    async fn page_source(&mut self) -> DriverResult<String> {
        self.get_string("/source").await
    }

    async fn capture_snapshot(&mut self, path: &Path) -> DriverResult<()> {
        let encoded = self.get_string("/screenshot").await?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| DriverError::Other(format!("screenshot decode failed: {e}")))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| DriverError::Other(format!("screenshot write failed: {e}")))
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.command(Method::DELETE, "", None).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("⚠️ Session close failed: {}", e);
                Err(e)
            }
        }
    }
}
