use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;
use std::sync::OnceLock;

// 構造化フィールドを持たないメール本文などから拾う日時パターン。
// パターン1（YYYY-MM-DD HH:MM形式）を優先し、なければパターン2（H:MM AM/PM形式）を試す。
fn datetime_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4}-\d{2}-\d{2})[ T](\d{2}):(\d{2})").unwrap()
    })
}

fn clock_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2}):(\d{2})\s?([AaPp][Mm])?\b").unwrap()
    })
}

/// 構造化された日時表現を解釈する
///
/// 優先順位: RFC3339日時 → ISO日付のみ（ローカル深夜0時として扱う）→
/// RFC2822メールヘッダー。どれにも当てはまらなければNone。
pub fn parse_structured(value: &str) -> Option<DateTime<Local>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Local));
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        // 終日イベント等、日付のみの場合は0:00として処理
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Local.from_local_datetime(&naive).single();
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Local));
    }

    None
}

/// 自由テキストから日時を抽出する
///
/// `YYYY-MM-DD HH:MM`形式の最初のマッチを試し、なければ`H:MM`（AM/PM付き可）を
/// `now`と同じ日付の時刻として解釈する。マッチしなければNone。
pub fn extract_from_text(text: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    if let Some(caps) = datetime_pattern().captures(text) {
        let candidate = format!("{} {}:{}", &caps[1], &caps[2], &caps[3]);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&candidate, "%Y-%m-%d %H:%M") {
            return Local.from_local_datetime(&naive).single();
        }
    }

    if let Some(caps) = clock_pattern().captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        let hour = match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
            Some(meridiem) => {
                if hour == 0 || hour > 12 {
                    return None;
                }
                if meridiem == "pm" {
                    hour % 12 + 12
                } else {
                    hour % 12
                }
            }
            None => hour,
        };
        if hour > 23 || minute > 59 {
            return None;
        }
        let naive = now.date_naive().and_hms_opt(hour, minute, 0)?;
        return Local.from_local_datetime(&naive).single();
    }

    None
}

/// メールの日時を解決する
///
/// 構造化されたDateヘッダーを優先し、なければ本文から抽出する。
pub fn resolve_mail_timestamp(
    header: Option<&str>,
    body: &str,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    if let Some(parsed) = header.and_then(parse_structured) {
        return Some(parsed);
    }
    extract_from_text(body, now)
}

/// 表示用の正規形式（YYYY-MM-DD HH:MM、24時間、ローカルタイムゾーン）
pub fn format_display(ts: &DateTime<Local>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .single()
            .unwrap()
    }

    #[test]
    fn test_parse_structured_rfc3339() {
        let parsed = parse_structured("2026-09-14T10:30:00+00:00").unwrap();
        assert_eq!(
            parsed.with_timezone(&chrono::Utc).to_rfc3339(),
            "2026-09-14T10:30:00+00:00"
        );
    }

    #[test]
    fn test_parse_structured_date_only_is_local_midnight() {
        let parsed = parse_structured("2026-09-14").unwrap();
        assert_eq!(parsed.hour(), 0);
        assert_eq!(parsed.minute(), 0);
        assert_eq!(parsed.date_naive().to_string(), "2026-09-14");
    }

    #[test]
    fn test_parse_structured_rfc2822_mail_header() {
        let parsed = parse_structured("Mon, 14 Sep 2026 10:30:00 +0000").unwrap();
        assert_eq!(
            parsed.with_timezone(&chrono::Utc).to_rfc3339(),
            "2026-09-14T10:30:00+00:00"
        );
    }

    #[test]
    fn test_parse_structured_garbage_is_unknown() {
        assert!(parse_structured("next Tuesday-ish").is_none());
        assert!(parse_structured("").is_none());
    }

    #[test]
    fn test_extract_iso_like_pattern_space_and_t() {
        let now = local(2026, 9, 1, 8, 0);
        let a = extract_from_text("kickoff on 2026-09-14 10:30 in the office", now).unwrap();
        assert_eq!(format_display(&a), "2026-09-14 10:30");

        let b = extract_from_text("starts 2026-09-14T10:30 sharp", now).unwrap();
        assert_eq!(format_display(&b), "2026-09-14 10:30");
    }

    #[test]
    fn test_extract_clock_pattern_resolves_to_today() {
        let now = local(2026, 9, 1, 8, 0);
        let pm = extract_from_text("let's sync at 3:45 PM", now).unwrap();
        assert_eq!(format_display(&pm), "2026-09-01 15:45");

        let am = extract_from_text("call at 9:05am", now).unwrap();
        assert_eq!(format_display(&am), "2026-09-01 09:05");

        let plain = extract_from_text("room booked for 17:20", now).unwrap();
        assert_eq!(format_display(&plain), "2026-09-01 17:20");
    }

    #[test]
    fn test_extract_prefers_full_datetime_over_clock() {
        let now = local(2026, 9, 1, 8, 0);
        let parsed =
            extract_from_text("at 9:00 AM, i.e. 2026-09-14 10:30", now).unwrap();
        assert_eq!(format_display(&parsed), "2026-09-14 10:30");
    }

    #[test]
    fn test_extract_rejects_invalid_clock_values() {
        let now = local(2026, 9, 1, 8, 0);
        assert!(extract_from_text("score was 27:99 somehow", now).is_none());
        assert!(extract_from_text("13:30 PM is not a time", now).is_none());
        assert!(extract_from_text("no time here", now).is_none());
    }

    #[test]
    fn test_resolve_mail_timestamp_header_wins_over_body() {
        let now = local(2026, 9, 1, 8, 0);
        let resolved = resolve_mail_timestamp(
            Some("Mon, 14 Sep 2026 10:30:00 +0000"),
            "see you 2026-12-01 09:00",
            now,
        )
        .unwrap();
        assert_eq!(
            resolved.with_timezone(&chrono::Utc).to_rfc3339(),
            "2026-09-14T10:30:00+00:00"
        );
    }

    #[test]
    fn test_resolve_mail_timestamp_falls_back_to_body() {
        let now = local(2026, 9, 1, 8, 0);
        let resolved =
            resolve_mail_timestamp(Some("not a date"), "see you 2026-12-01 09:00", now).unwrap();
        assert_eq!(format_display(&resolved), "2026-12-01 09:00");

        assert!(resolve_mail_timestamp(None, "no times at all", now).is_none());
    }

    #[test]
    fn test_format_display_zero_padded() {
        let ts = local(2026, 1, 5, 7, 3);
        assert_eq!(format_display(&ts), "2026-01-05 07:03");
    }
}
