use anyhow::{Context, Result};
use serde::Deserialize;
use serde::Serialize;
use std::fs::read_to_string;
use std::path::Path;

/// アプリケーション全体の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// アプリケーション全般の設定
    #[serde(default)]
    pub general: GeneralConfig,

    /// スケジューリングWebhookの設定
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Google OAuth の設定（オプション、未設定時はサインイン無効）
    pub google: Option<GoogleConfig>,

    /// Gemini要約エンドポイントの設定（オプション、未設定時はローカル整形）
    pub gemini: Option<GeminiConfig>,
}

/// 一般設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// watchモードでの再取得間隔（秒）
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

/// Webhook設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// 送信先URL
    #[serde(default = "default_webhook_url")]
    pub url: String,

    /// 共有シークレット（x-webhook-secretヘッダー、オプション）
    #[serde(default)]
    pub secret: Option<String>,
}

/// Google OAuth 設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// クライアントID
    pub client_id: String,

    /// クライアントシークレット（デスクトップアプリの場合のみ）
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Gemini要約エンドポイント設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// APIキー
    pub api_key: String,

    /// 生成エンドポイントURL
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,
}

impl GeminiConfig {
    /// APIキーだけ指定して既定のエンドポイントで作る
    pub fn with_api_key(api_key: String) -> Self {
        Self {
            api_key,
            endpoint: default_gemini_endpoint(),
        }
    }
}

// デフォルト値
fn default_refresh_interval() -> u64 {
    300 // 5分
}

fn default_webhook_url() -> String {
    "https://agentx2026.app.n8n.cloud/webhook/time-assistant".to_string()
}

fn default_gemini_endpoint() -> String {
    "https://generativeai.googleapis.com/v1beta2/models/text-bison-001:generate".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: default_webhook_url(),
            secret: None,
        }
    }
}

/// 設定ファイルを読み込む
///
/// ファイルが存在しない場合はエラーにせず、デフォルト設定から開始する。
/// 読み込み後に環境変数による上書きを適用する。
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let mut config = if path.as_ref().exists() {
        let config_str = read_to_string(&path)
            .context("Failed to read config file")?;

        toml::from_str(&config_str)
            .context("Failed to parse config file")?
    } else {
        log::info!("Config file not found at {:?}, using defaults", path.as_ref());
        create_default_config()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// デフォルトの設定を作成する
pub fn create_default_config() -> AppConfig {
    AppConfig {
        general: GeneralConfig::default(),
        webhook: WebhookConfig::default(),
        google: None,
        gemini: None,
    }
}

/// 環境変数による設定の上書きを適用する
pub fn apply_env_overrides(config: &mut AppConfig) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

fn apply_overrides_from<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("AGENTA_WEBHOOK_URL") {
        config.webhook.url = url;
    }
    if let Some(secret) = lookup("AGENTA_WEBHOOK_SECRET") {
        config.webhook.secret = Some(secret);
    }
    if let Some(client_id) = lookup("AGENTA_GOOGLE_CLIENT_ID") {
        let client_secret = lookup("AGENTA_GOOGLE_CLIENT_SECRET")
            .or_else(|| config.google.as_ref().and_then(|g| g.client_secret.clone()));
        config.google = Some(GoogleConfig {
            client_id,
            client_secret,
        });
    } else if let (Some(google), Some(secret)) = (
        config.google.as_mut(),
        lookup("AGENTA_GOOGLE_CLIENT_SECRET"),
    ) {
        google.client_secret = Some(secret);
    }
    if let Some(api_key) = lookup("AGENTA_GEMINI_API_KEY") {
        let endpoint = config
            .gemini
            .as_ref()
            .map(|g| g.endpoint.clone())
            .unwrap_or_else(default_gemini_endpoint);
        config.gemini = Some(GeminiConfig { api_key, endpoint });
    }
}
