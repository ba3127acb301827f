use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Value};

use crate::config::GeminiConfig;
use crate::pipeline::{DisplayLine, NormalizedRecord};

/// 要約の対象に応じたプロンプトの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    /// カレンダーイベント（タイトル — 時刻 の短い行に整形）
    CalendarEvents,

    /// メール件名（3語以内の短いタイトルに圧縮）
    MailSubjects,
}

/// 表示候補を外部の生成エンドポイントで書き換えるアダプター
///
/// 失敗はこの境界を越えない。設定がない場合・呼び出しに失敗した場合は
/// Noneを返し、呼び出し側がローカル整形にフォールバックする。
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        records: &[NormalizedRecord],
        mode: SummaryMode,
    ) -> Option<Vec<DisplayLine>>;
}

/// Gemini互換エンドポイントを使う要約アダプター
pub struct GeminiSummarizer {
    config: Option<GeminiConfig>,
    client: reqwest::Client,
}

impl GeminiSummarizer {
    /// 設定から作成する（未設定なら常にNoneを返すアダプターになる）
    pub fn from_config(config: Option<GeminiConfig>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn call_endpoint(&self, config: &GeminiConfig, prompt: &str) -> Option<String> {
        let endpoint = format!(
            "{}?key={}",
            config.endpoint,
            urlencoding::encode(&config.api_key)
        );
        let body = json!({
            "prompt": { "text": prompt },
            "temperature": 0.2,
            "maxOutputTokens": 200,
        });

        let response = match self.client.post(&endpoint).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Summarizer call failed, falling back to local formatting: {}", e);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(
                "Summarizer returned HTTP {}, falling back to local formatting",
                status.as_u16()
            );
            return None;
        }

        let value: Value = match response.json().await {
            Ok(value) => value,
            Err(e) => {
                warn!("Summarizer response was not JSON: {}", e);
                return None;
            }
        };

        extract_output_text(&value)
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(
        &self,
        records: &[NormalizedRecord],
        mode: SummaryMode,
    ) -> Option<Vec<DisplayLine>> {
        let config = self.config.as_ref()?;
        if records.is_empty() {
            return None;
        }

        let prompt = build_prompt(records, mode);
        debug!("Summarizer prompt:\n{}", prompt);

        let output = self.call_endpoint(config, &prompt).await?;
        let lines = pair_lines(records, &output);
        if lines.is_empty() {
            warn!("Summarizer returned no usable lines, falling back to local formatting");
            return None;
        }
        Some(lines)
    }
}

/// バッチ1回分のプロンプトを構築する
///
/// レコードごとに「タイトル | 時刻」の1行を並べ、入力と同じ順序で
/// 1行ずつ出力するよう指示する。
fn build_prompt(records: &[NormalizedRecord], mode: SummaryMode) -> String {
    let instruction = match mode {
        SummaryMode::CalendarEvents => {
            "Summarize these calendar events into short lines: title — time \
             (use format YYYY-MM-DD HH:MM). Return exactly one line per input line, \
             in the same order. Input lines:"
        }
        SummaryMode::MailSubjects => {
            "For each line, produce a very short title (3 words max) followed by \
             \" — \" and the date in format YYYY-MM-DD HH:MM. Return exactly one line \
             per input line, in the same order. Input lines:"
        }
    };

    let mut prompt = String::from(instruction);
    prompt.push('\n');
    for record in records {
        prompt.push_str(&format!("{} | {}\n", record.title, record.display_time));
    }
    prompt
}

/// 既知のレスポンス形状から出力テキストを取り出す
///
/// candidates[0].content → output[0].content の順に探す。どちらも
/// なければ失敗として扱う。
fn extract_output_text(value: &Value) -> Option<String> {
    let text = value
        .pointer("/candidates/0/content")
        .and_then(Value::as_str)
        .or_else(|| value.pointer("/output/0/content").and_then(Value::as_str))?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// 出力行をレコードに位置で対応付ける
///
/// 行数がレコード数より多い場合は切り詰める。少ない場合は先頭N件だけが
/// 対応付けられ、残りは対応なしになる。
fn pair_lines(records: &[NormalizedRecord], output: &str) -> Vec<DisplayLine> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(records.len())
        .enumerate()
        .map(|(i, line)| DisplayLine {
            id: records[i].id.clone(),
            text: line.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, time: &str) -> NormalizedRecord {
        NormalizedRecord {
            id: id.to_string(),
            title: title.to_string(),
            start: None,
            display_time: time.to_string(),
        }
    }

    #[test]
    fn test_build_prompt_one_row_per_record() {
        let records = vec![
            record("a", "Standup", "2026-09-14 10:30"),
            record("b", "Design review", "2026-09-14 15:00"),
        ];

        let prompt = build_prompt(&records, SummaryMode::CalendarEvents);
        assert!(prompt.contains("Standup | 2026-09-14 10:30"));
        assert!(prompt.contains("Design review | 2026-09-14 15:00"));
        assert!(prompt.starts_with("Summarize these calendar events"));

        let mail_prompt = build_prompt(&records, SummaryMode::MailSubjects);
        assert!(mail_prompt.contains("3 words max"));
    }

    #[test]
    fn test_extract_output_text_known_shapes() {
        let candidates = serde_json::json!({
            "candidates": [{"content": "line one\nline two"}]
        });
        assert_eq!(
            extract_output_text(&candidates).as_deref(),
            Some("line one\nline two")
        );

        let output = serde_json::json!({
            "output": [{"content": "only line"}]
        });
        assert_eq!(extract_output_text(&output).as_deref(), Some("only line"));

        let unknown = serde_json::json!({"something": "else"});
        assert!(extract_output_text(&unknown).is_none());

        let empty = serde_json::json!({"candidates": [{"content": "   "}]});
        assert!(extract_output_text(&empty).is_none());
    }

    #[test]
    fn test_pair_lines_matches_by_position_and_clips() {
        let records = vec![
            record("a", "Standup", "t1"),
            record("b", "Review", "t2"),
        ];

        // レコード数より多い行は切り詰める
        let lines = pair_lines(&records, "first\nsecond\nthird");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].id, "a");
        assert_eq!(lines[0].text, "first");
        assert_eq!(lines[1].id, "b");
        assert_eq!(lines[1].text, "second");

        // 少ない場合は先頭のレコードだけが対応付けられる
        let short = pair_lines(&records, "only one\n\n");
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].id, "a");
    }
}
