use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::OnceLock;

use crate::google::MeetingMessage;

/// 対面ミーティングを示すキーワード（単語境界・大文字小文字無視）
fn offline_keywords() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(in[- ]?person|room|office|meet at|on-site|onsite|location|address|addr)\b")
            .unwrap()
    })
}

/// ミーティングの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingKind {
    /// リンク付き（オンライン開催）
    Online,

    /// 対面キーワードにマッチ（オフライン開催）
    Offline,
}

/// カレンダーイベントとして表示対象になるか
///
/// 開始時刻が解決できて、かつ未来のものだけを残す。
pub fn is_actionable_start(start: Option<DateTime<Local>>, now: DateTime<Local>) -> bool {
    match start {
        Some(ts) => ts > now,
        None => false,
    }
}

/// メールをミーティング候補として分類する
///
/// リンクを1つ以上含むものはオンライン、本文が対面キーワードにマッチするものは
/// オフライン。どちらでもないメールは候補にならない。
pub fn classify_message(message: &MeetingMessage) -> Option<MeetingKind> {
    if !message.links.is_empty() {
        return Some(MeetingKind::Online);
    }

    let haystack = format!("{} {}", message.body, message.links.join(" "));
    if offline_keywords().is_match(&haystack) {
        return Some(MeetingKind::Offline);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(body: &str, links: Vec<&str>) -> MeetingMessage {
        MeetingMessage {
            id: "m1".to_string(),
            subject: "Quarterly planning".to_string(),
            from: Some("alice@example.com".to_string()),
            snippet: String::new(),
            body: body.to_string(),
            links: links.into_iter().map(|l| l.to_string()).collect(),
            date_header: None,
        }
    }

    #[test]
    fn test_message_with_link_is_online() {
        let msg = message("join here", vec!["https://meet.example.com/abc"]);
        assert_eq!(classify_message(&msg), Some(MeetingKind::Online));
    }

    #[test]
    fn test_message_with_location_keyword_is_offline() {
        let msg = message("We will meet in Room 4B at the office", vec![]);
        assert_eq!(classify_message(&msg), Some(MeetingKind::Offline));

        let msg = message("This one is in-person, see the address below", vec![]);
        assert_eq!(classify_message(&msg), Some(MeetingKind::Offline));
    }

    #[test]
    fn test_keyword_match_requires_word_boundary() {
        // "bathroom"の中の"room"のような部分一致は拾わない
        let msg = message("the bathroom renovation newsletter", vec![]);
        assert_eq!(classify_message(&msg), None);
    }

    #[test]
    fn test_message_matching_neither_is_dropped() {
        let msg = message("weekly digest: 10 articles you missed", vec![]);
        assert_eq!(classify_message(&msg), None);
    }

    #[test]
    fn test_link_takes_precedence_over_keywords() {
        let msg = message(
            "hybrid: join online or come to the office",
            vec!["https://zoom.example.com/j/1"],
        );
        assert_eq!(classify_message(&msg), Some(MeetingKind::Online));
    }

    #[test]
    fn test_actionable_start_requires_future_timestamp() {
        let now = Local.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).single().unwrap();
        let past = Local.with_ymd_and_hms(2026, 9, 1, 11, 0, 0).single().unwrap();
        let future = Local.with_ymd_and_hms(2026, 9, 1, 13, 0, 0).single().unwrap();

        assert!(is_actionable_start(Some(future), now));
        assert!(!is_actionable_start(Some(past), now));
        assert!(!is_actionable_start(Some(now), now));
        assert!(!is_actionable_start(None, now));
    }
}
