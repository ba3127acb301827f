use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use log::{debug, error, warn};
use regex::Regex;
use reqwest;
use serde::Deserialize;
use std::sync::OnceLock;
use url::Url;

use crate::normalize;

/// ミーティング関連メールの検索クエリ
const MAIL_SEARCH_QUERY: &str = r#"meeting OR invite OR zoom OR "google meet" OR webinar"#;

/// 1回のリフレッシュで取得するメールの上限
const MAIL_RESULT_CAP: usize = 20;

/// Google APIクライアントのエラー
#[derive(Debug, thiserror::Error)]
pub enum GoogleApiError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Access token expired or revoked")]
    AuthExpired,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Google タスク
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    /// タスクID
    #[serde(default)]
    pub id: String,

    /// タイトル
    #[serde(default)]
    pub title: String,

    /// 状態（needsAction / completed）
    #[serde(default)]
    pub status: String,

    /// 期限（RFC3339、オプション）
    pub due: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TasksResponse {
    #[serde(default)]
    items: Vec<Task>,
}

/// カレンダーイベントの開始・終了時刻
#[derive(Debug, Clone, Deserialize)]
pub struct EventTime {
    #[serde(rename = "dateTime")]
    pub date_time: Option<String>,
    pub date: Option<String>,
}

/// カレンダーイベント
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarEvent {
    /// イベントID
    #[serde(default)]
    pub id: String,

    /// タイトル
    pub summary: Option<String>,

    /// 開始時刻（日時または終日イベントの日付）
    pub start: Option<EventTime>,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

// Gmail APIのレスポンス構造体
#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageDetail {
    #[serde(default)]
    id: String,

    #[serde(default)]
    snippet: String,

    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,

    body: Option<PayloadBody>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    #[serde(default)]
    name: String,

    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct PayloadBody {
    data: Option<String>,
}

/// ミーティング候補として取り出したメール
#[derive(Debug, Clone)]
pub struct MeetingMessage {
    /// メッセージID
    pub id: String,

    /// 件名
    pub subject: String,

    /// 送信者（Fromヘッダー）
    pub from: Option<String>,

    /// スニペット
    pub snippet: String,

    /// 本文テキスト（構造化ボディがなければスニペット）
    pub body: String,

    /// 本文から抽出したリンク
    pub links: Vec<String>,

    /// Dateヘッダー（未解釈の生文字列）
    pub date_header: Option<String>,
}

/// Google APIクライアント
#[derive(Debug, Clone)]
pub struct GoogleClient {
    access_token: String,
    client: reqwest::Client,
}

impl GoogleClient {
    /// 新しいクライアントを作成
    pub fn new(access_token: impl Into<String>) -> Self {
        let client = reqwest::Client::new();
        Self {
            access_token: access_token.into(),
            client,
        }
    }

    /// 共通のGETリクエスト関数
    async fn api_get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, GoogleApiError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GoogleApiError::AuthExpired);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("Google API error: HTTP {} - {}", status.as_u16(), message);
            return Err(GoogleApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }

    /// デフォルトのタスクリストから未完了タスクを取得
    ///
    /// completed状態のタスクと、期限が現在以前のタスクは除外する。
    pub async fn fetch_open_tasks(&self, now: DateTime<Local>) -> Result<Vec<Task>, GoogleApiError> {
        let url = Url::parse("https://www.googleapis.com/tasks/v1/lists/@default/tasks")?;
        let response: TasksResponse = self.api_get(url).await?;

        let tasks = filter_open_tasks(response.items, now);
        debug!("Retrieved {} open tasks", tasks.len());
        Ok(tasks)
    }

    /// 選択日のカレンダーイベントを取得
    ///
    /// ローカルタイムの0:00から23:59:59.999までを対象に、繰り返しイベントは
    /// 展開して時刻順で返す。
    pub async fn fetch_events_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, GoogleApiError> {
        let start = date
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| Local.from_local_datetime(&naive).single())
            .ok_or_else(|| GoogleApiError::Api {
                status: 0,
                message: format!("Invalid local day start for {}", date),
            })?;
        let end = date
            .and_hms_milli_opt(23, 59, 59, 999)
            .and_then(|naive| Local.from_local_datetime(&naive).single())
            .ok_or_else(|| GoogleApiError::Api {
                status: 0,
                message: format!("Invalid local day end for {}", date),
            })?;

        let mut url = Url::parse("https://www.googleapis.com/calendar/v3/calendars/primary/events")?;
        url.query_pairs_mut()
            .append_pair("timeMin", &start.to_rfc3339())
            .append_pair("timeMax", &end.to_rfc3339())
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime");

        let response: EventsResponse = self.api_get(url).await?;
        debug!(
            "Retrieved {} calendar events for {}",
            response.items.len(),
            date
        );
        Ok(response.items)
    }

    /// ミーティング関連メールを検索して詳細を取得
    ///
    /// 検索は1回のリストコール、その後メッセージごとに詳細を取得する。
    /// 個々の詳細取得の失敗はそのメッセージのスキップに留める。
    pub async fn fetch_meeting_messages(&self) -> Result<Vec<MeetingMessage>, GoogleApiError> {
        let mut url = Url::parse("https://www.googleapis.com/gmail/v1/users/me/messages")?;
        url.query_pairs_mut()
            .append_pair("q", MAIL_SEARCH_QUERY)
            .append_pair("maxResults", &MAIL_RESULT_CAP.to_string());

        let list: MessageListResponse = self.api_get(url).await?;

        let mut messages = Vec::with_capacity(list.messages.len().min(MAIL_RESULT_CAP));
        for stub in list.messages.iter().take(MAIL_RESULT_CAP) {
            match self.fetch_message_detail(&stub.id).await {
                Ok(message) => messages.push(message),
                Err(GoogleApiError::AuthExpired) => return Err(GoogleApiError::AuthExpired),
                Err(e) => {
                    warn!("Skipping message {}: {}", stub.id, e);
                }
            }
        }

        debug!("Retrieved {} meeting messages", messages.len());
        Ok(messages)
    }

    /// メッセージ1件の詳細を取得
    async fn fetch_message_detail(&self, message_id: &str) -> Result<MeetingMessage, GoogleApiError> {
        let endpoint = format!(
            "https://www.googleapis.com/gmail/v1/users/me/messages/{}",
            urlencoding::encode(message_id)
        );
        let mut url = Url::parse(&endpoint)?;
        url.query_pairs_mut().append_pair("format", "full");

        let detail: MessageDetail = self.api_get(url).await?;
        Ok(message_from_detail(detail))
    }
}

/// 未完了かつ期限切れでないタスクだけを残す
fn filter_open_tasks(items: Vec<Task>, now: DateTime<Local>) -> Vec<Task> {
    items
        .into_iter()
        .filter(|task| {
            if task.status == "completed" {
                return false;
            }
            if let Some(due) = task.due.as_deref().and_then(normalize::parse_structured) {
                // 期限が現在以前のものはスキップ
                if due <= now {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// Gmailの詳細レスポンスからミーティング候補レコードを組み立てる
fn message_from_detail(detail: MessageDetail) -> MeetingMessage {
    let headers = detail
        .payload
        .as_ref()
        .map(|p| &p.headers[..])
        .unwrap_or(&[]);

    let subject =
        header_value(headers, "Subject").unwrap_or_else(|| "(no subject)".to_string());
    let from = header_value(headers, "From");
    let date_header = header_value(headers, "Date");

    let body = detail
        .payload
        .as_ref()
        .and_then(|p| p.body.as_ref())
        .and_then(|b| b.data.as_deref())
        .and_then(decode_body_data)
        .unwrap_or_else(|| detail.snippet.clone());

    let links = extract_links(&body);

    MeetingMessage {
        id: detail.id,
        subject,
        from,
        snippet: detail.snippet,
        body,
        links,
        date_header,
    }
}

/// ヘッダー値を名前で検索（大文字小文字無視）
fn header_value(headers: &[MessageHeader], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// base64url形式の本文データをデコード
fn decode_body_data(data: &str) -> Option<String> {
    let bytes = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// テキストからhttp(s)リンクを抽出
fn extract_links(text: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"https?://[\w\-./?=&%#]+").unwrap());

    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}
