use chrono::{DateTime, Local};
use log::debug;

use crate::classify;
use crate::google::{CalendarEvent, MeetingMessage};
use crate::normalize;
use crate::summarize::{Summarizer, SummaryMode};

/// 正規化済みレコード
///
/// 取得のたびに生データから再計算され、永続化はしない。
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    /// 元のイベント/メッセージのID
    pub id: String,

    /// タイトルまたは件名
    pub title: String,

    /// 正規化した開始時刻（Noneは不明）
    pub start: Option<DateTime<Local>>,

    /// 表示用の時刻文字列
    pub display_time: String,
}

/// 最終的に1項目あたり1行で表示する文字列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    pub id: String,
    pub text: String,
}

/// カレンダーイベントを正規化して未来のものだけ残す
///
/// 入力順は保持する。開始が解決できない、または過去のイベントは落とす。
pub fn normalize_calendar(events: &[CalendarEvent], now: DateTime<Local>) -> Vec<NormalizedRecord> {
    events
        .iter()
        .filter_map(|event| {
            let title = event
                .summary
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("(no title)")
                .to_string();

            let start = event.start.as_ref().and_then(|t| {
                t.date_time
                    .as_deref()
                    .or(t.date.as_deref())
                    .and_then(normalize::parse_structured)
            });

            if !classify::is_actionable_start(start, now) {
                return None;
            }

            let display_time = start
                .map(|ts| normalize::format_display(&ts))
                .unwrap_or_else(|| "time unknown".to_string());

            Some(NormalizedRecord {
                id: event.id.clone(),
                title,
                start,
                display_time,
            })
        })
        .collect()
}

/// メールを分類・正規化して未来のミーティング候補だけ残す
///
/// オンライン（リンクあり）でもオフライン（対面キーワード）でもないメール、
/// および日時が解決できないか過去のメールは落とす。入力順は保持する。
pub fn normalize_mail(messages: &[MeetingMessage], now: DateTime<Local>) -> Vec<NormalizedRecord> {
    messages
        .iter()
        .filter_map(|message| {
            classify::classify_message(message)?;

            let start =
                normalize::resolve_mail_timestamp(message.date_header.as_deref(), &message.body, now);
            if !classify::is_actionable_start(start, now) {
                return None;
            }

            let display_time = start
                .map(|ts| normalize::format_display(&ts))
                .unwrap_or_else(|| "time unknown".to_string());

            Some(NormalizedRecord {
                id: message.id.clone(),
                title: message.subject.clone(),
                start,
                display_time,
            })
        })
        .collect()
}

/// カレンダーの表示行を作る
pub async fn calendar_display_lines(
    events: &[CalendarEvent],
    summarizer: &dyn Summarizer,
    now: DateTime<Local>,
) -> Vec<DisplayLine> {
    let records = normalize_calendar(events, now);
    display_lines_for(records, summarizer, SummaryMode::CalendarEvents, local_calendar_line).await
}

/// メールの表示行を作る
pub async fn mail_display_lines(
    messages: &[MeetingMessage],
    summarizer: &dyn Summarizer,
    now: DateTime<Local>,
) -> Vec<DisplayLine> {
    let records = normalize_mail(messages, now);
    display_lines_for(records, summarizer, SummaryMode::MailSubjects, local_mail_line).await
}

/// 共通部分: 要約アダプターを試し、だめならローカル整形にフォールバック
async fn display_lines_for(
    records: Vec<NormalizedRecord>,
    summarizer: &dyn Summarizer,
    mode: SummaryMode,
    local_format: fn(&NormalizedRecord) -> String,
) -> Vec<DisplayLine> {
    if records.is_empty() {
        // レコードが残らなければ要約呼び出し自体を行わない
        return Vec::new();
    }

    if let Some(mut lines) = summarizer.summarize(&records, mode).await {
        // アダプターが切り詰め済みでも、レコード数を上限に防御的に切り詰める
        lines.truncate(records.len());
        debug!("Summarizer produced {} of {} lines", lines.len(), records.len());
        return lines;
    }

    records
        .iter()
        .map(|record| DisplayLine {
            id: record.id.clone(),
            text: local_format(record),
        })
        .collect()
}

fn local_calendar_line(record: &NormalizedRecord) -> String {
    format!("{} — {}", record.title, record.display_time)
}

fn local_mail_line(record: &NormalizedRecord) -> String {
    let collapsed = record.title.split_whitespace().collect::<Vec<_>>().join(" ");
    let clipped: String = collapsed.chars().take(60).collect();
    format!("{} — {}", clipped, record.display_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::EventTime;
    use crate::summarize::SummaryMode;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    /// 固定の結果を返すテスト用アダプター
    struct StubSummarizer {
        result: Option<Vec<DisplayLine>>,
    }

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(
            &self,
            _records: &[NormalizedRecord],
            _mode: SummaryMode,
        ) -> Option<Vec<DisplayLine>> {
            self.result.clone()
        }
    }

    fn none_summarizer() -> StubSummarizer {
        StubSummarizer { result: None }
    }

    fn fixed_now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 9, 1, 12, 0, 0)
            .single()
            .unwrap()
    }

    fn event(id: &str, summary: &str, start: Option<EventTime>) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: Some(summary.to_string()),
            start,
        }
    }

    fn at(dt: DateTime<Local>) -> Option<EventTime> {
        Some(EventTime {
            date_time: Some(dt.to_rfc3339()),
            date: None,
        })
    }

    fn message(id: &str, subject: &str, body: &str, links: Vec<&str>, date_header: Option<&str>) -> MeetingMessage {
        MeetingMessage {
            id: id.to_string(),
            subject: subject.to_string(),
            from: None,
            snippet: String::new(),
            body: body.to_string(),
            links: links.into_iter().map(|l| l.to_string()).collect(),
            date_header: date_header.map(|d| d.to_string()),
        }
    }

    #[test]
    fn test_calendar_excludes_past_and_unparseable_preserving_order() {
        let now = fixed_now();
        let events = vec![
            event("past", "Yesterday", at(now - Duration::hours(24))),
            event("f1", "First", at(now + Duration::hours(1))),
            event(
                "broken",
                "Unparseable",
                Some(EventTime {
                    date_time: Some("not-a-date".to_string()),
                    date: None,
                }),
            ),
            event("missing", "No start", None),
            event("f2", "Second", at(now + Duration::hours(2))),
        ];

        let records = normalize_calendar(&events, now);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2"]);
    }

    #[test]
    fn test_mail_requires_category_match() {
        let now = fixed_now();
        let header = "Mon, 14 Sep 2026 10:30:00 +0000";
        let messages = vec![
            message("online", "Sync", "join us", vec!["https://meet.example.com/x"], Some(header)),
            message("offline", "Planning", "in the office, room 2", vec![], Some(header)),
            message("neither", "Newsletter", "articles this week", vec![], Some(header)),
        ];

        let records = normalize_mail(&messages, now);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["online", "offline"]);
    }

    #[test]
    fn test_mail_with_past_date_is_excluded_even_if_qualifying() {
        let now = fixed_now();
        let messages = vec![message(
            "old",
            "Old invite",
            "meet in the office",
            vec!["https://meet.example.com/x"],
            Some("Tue, 1 Sep 2020 10:00:00 +0000"),
        )];

        assert!(normalize_mail(&messages, now).is_empty());
    }

    #[test]
    fn test_mail_falls_back_to_body_timestamp_then_drops() {
        let now = fixed_now();
        let messages = vec![
            message("body-time", "Kickoff", "kickoff 2026-09-14 10:30 in room 1", vec![], None),
            message("no-time", "Kickoff", "kickoff soon in room 1", vec![], None),
        ];

        let records = normalize_mail(&messages, now);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "body-time");
        assert_eq!(records[0].display_time, "2026-09-14 10:30");
    }

    #[tokio::test]
    async fn test_pipeline_is_idempotent_for_fixed_clock() {
        let now = fixed_now();
        let events = vec![
            event("f1", "First", at(now + Duration::hours(1))),
            event("f2", "Second", at(now + Duration::hours(2))),
        ];

        let a = calendar_display_lines(&events, &none_summarizer(), now).await;
        let b = calendar_display_lines(&events, &none_summarizer(), now).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_empty_input_yields_empty_output() {
        let now = fixed_now();
        let lines = calendar_display_lines(&[], &none_summarizer(), now).await;
        assert!(lines.is_empty());

        let lines = mail_display_lines(&[], &none_summarizer(), now).await;
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_short_summarizer_output_is_used_as_is() {
        let now = fixed_now();
        let events = vec![
            event("f1", "First", at(now + Duration::hours(1))),
            event("f2", "Second", at(now + Duration::hours(2))),
            event("f3", "Third", at(now + Duration::hours(3))),
        ];

        let stub = StubSummarizer {
            result: Some(vec![DisplayLine {
                id: "f1".to_string(),
                text: "First — soon".to_string(),
            }]),
        };

        let lines = calendar_display_lines(&events, &stub, now).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].id, "f1");
    }

    #[tokio::test]
    async fn test_summarizer_failure_formats_every_record_locally() {
        let now = fixed_now();
        let events = vec![
            event("f1", "First", at(now + Duration::hours(1))),
            event("f2", "Second", at(now + Duration::hours(2))),
        ];

        let lines = calendar_display_lines(&events, &none_summarizer(), now).await;
        assert_eq!(lines.len(), 2);
        assert!(lines[0].text.starts_with("First — "));
        assert!(lines[1].text.starts_with("Second — "));
    }

    #[tokio::test]
    async fn test_standup_scenario_local_line() {
        let now = fixed_now();
        let start = now + Duration::hours(1);
        let events = vec![event("s1", "Standup", at(start))];

        let lines = calendar_display_lines(&events, &none_summarizer(), now).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0].text,
            format!("Standup — {}", normalize::format_display(&start))
        );
    }

    #[tokio::test]
    async fn test_long_mail_subject_is_collapsed_and_clipped() {
        let now = fixed_now();
        let long_subject =
            "Re:   Fwd: Quarterly   planning session for the entire organization and all teams involved";
        let messages = vec![message(
            "m1",
            long_subject,
            "meet in the office 2026-09-14 10:30",
            vec![],
            None,
        )];

        let lines = mail_display_lines(&messages, &none_summarizer(), now).await;
        assert_eq!(lines.len(), 1);
        let text = &lines[0].text;
        assert!(text.ends_with(" — 2026-09-14 10:30"));
        // 件名部分は空白連続の折り畳み後60文字まで
        let subject_part = text.split(" — ").next().unwrap();
        assert!(subject_part.chars().count() <= 60);
        assert!(subject_part.starts_with("Re: Fwd: Quarterly planning"));
    }
}
