//! Human-relative time formatting and date bucketing, shared by the
//! conversation engine and the notification feed.

use chrono::{DateTime, Datelike, Duration, Utc};

/// "just now" under a minute, then minutes/hours/days with pluralization,
/// falling back to a short absolute date past a week.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(then);

    if diff < Duration::minutes(1) {
        return "just now".to_string();
    }
    if diff < Duration::hours(1) {
        let minutes = diff.num_minutes();
        return format!("{} minute{} ago", minutes, plural(minutes));
    }
    if diff < Duration::days(1) {
        let hours = diff.num_hours();
        return format!("{} hour{} ago", hours, plural(hours));
    }
    if diff < Duration::days(7) {
        let days = diff.num_days();
        return format!("{} day{} ago", days, plural(days));
    }

    then.format("%b %-d").to_string()
}

/// Day label for date separators: "Today", "Yesterday", or a short date
/// (with the year appended when it differs from the current one).
pub fn day_label(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let day = date.date_naive();
    let today = now.date_naive();

    if day == today {
        return "Today".to_string();
    }
    if today.pred_opt() == Some(day) {
        return "Yesterday".to_string();
    }
    if day.year() == today.year() {
        date.format("%b %-d").to_string()
    } else {
        date.format("%b %-d, %Y").to_string()
    }
}

/// Bucket items into day-labeled groups. Buckets come out in chronological
/// order and items inside each bucket are ascending by timestamp.
pub fn group_by_day<T, F>(items: &[T], timestamp: F, now: DateTime<Utc>) -> Vec<(String, Vec<&T>)>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    let mut ordered: Vec<&T> = items.iter().collect();
    ordered.sort_by_key(|item| timestamp(item));

    let mut groups: Vec<(String, Vec<&T>)> = Vec::new();
    for item in ordered {
        let label = day_label(timestamp(item), now);
        match groups.last_mut() {
            Some((last_label, bucket)) if *last_label == label => bucket.push(item),
            _ => groups.push((label, vec![item])),
        }
    }
    groups
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
