use anyhow::{Context, Result};
use log::debug;
use serde_json::{json, Value};

use crate::config::WebhookConfig;

/// スケジューリングWebhookのクライアント
///
/// 自由テキストのプロンプトをPOSTし、応答をそのまま表示用文字列として返す。
/// 失敗はユーザー起点の操作なのでインラインのエラー文字列として表面化する。
#[derive(Debug, Clone)]
pub struct WebhookClient {
    url: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl WebhookClient {
    /// 設定からクライアントを作成
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            url: config.url.clone(),
            secret: config.secret.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// プロンプトを送信して表示用の応答文字列を得る
    ///
    /// 2xx以外は`HTTP <status> <body>`形式のエラーになる。再試行はしない
    /// （ユーザーが再送信する）。
    pub async fn submit(&self, prompt: &str) -> Result<String> {
        debug!("POST {} prompt={}", self.url, prompt);

        let mut request = self.client.post(&self.url).json(&json!({ "prompt": prompt }));
        if let Some(secret) = &self.secret {
            request = request.header("x-webhook-secret", secret);
        }

        let response = request
            .send()
            .await
            .context("Webhookリクエストの送信に失敗しました")?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("");
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "{}",
                error_message(status.as_u16(), reason, &body)
            ));
        }

        Ok(render_response_body(status.as_u16(), reason, &body))
    }
}

/// 非2xx応答のエラー文字列
fn error_message(status: u16, reason: &str, body: &str) -> String {
    let detail = if body.is_empty() { reason } else { body };
    format!("HTTP {} {}", status, detail)
}

/// 2xx応答の表示用文字列を作る
///
/// ボディが空ならステータスのメタ情報をJSONで、JSONとして解釈できれば
/// 整形して、それ以外は生テキストをそのまま返す。
fn render_response_body(status: u16, reason: &str, body: &str) -> String {
    if body.is_empty() {
        let meta = json!({ "status": status, "statusText": reason });
        return serde_json::to_string_pretty(&meta).unwrap_or_else(|_| format!("HTTP {}", status));
    }

    match serde_json::from_str::<Value>(body) {
        Ok(value) => {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string())
        }
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_includes_status_and_body() {
        assert_eq!(
            error_message(500, "Internal Server Error", "error"),
            "HTTP 500 error"
        );
        assert_eq!(
            error_message(503, "Service Unavailable", ""),
            "HTTP 503 Service Unavailable"
        );
    }

    #[test]
    fn test_render_json_body_is_pretty_printed() {
        let rendered = render_response_body(200, "OK", r#"{"reply":"done","items":[1,2]}"#);
        assert!(rendered.contains("\"reply\": \"done\""));
        assert!(rendered.lines().count() > 1);
    }

    #[test]
    fn test_render_non_json_body_is_raw() {
        let rendered = render_response_body(200, "OK", "booked your meeting for Tuesday");
        assert_eq!(rendered, "booked your meeting for Tuesday");
    }

    #[test]
    fn test_render_empty_body_shows_status_metadata() {
        let rendered = render_response_body(204, "No Content", "");
        assert!(rendered.contains("\"status\": 204"));
        assert!(rendered.contains("\"statusText\": \"No Content\""));
    }
}
