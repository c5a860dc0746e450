//! 请求日志解析：分段 URL 形如 `.../{BookId}-Part07.mp3?...`。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::ObservedRequest;

static RE_PART: OnceLock<Regex> = OnceLock::new();

fn re_part() -> &'static Regex {
    RE_PART.get_or_init(|| Regex::new(r"(?i)Part(\d+)\.mp3").expect("compile RE_PART"))
}

/// 已出现在请求日志里的分段，只在一轮循环内有效。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    pub part_num: u32,
    pub url: String,
}

pub fn part_number(url: &str) -> Option<u32> {
    re_part()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|n| *n > 0)
}

/// 收集已拿到响应的分段请求，同一分段保留第一次出现的 URL。
pub fn part_urls(requests: &[ObservedRequest]) -> BTreeMap<u32, String> {
    let mut urls = BTreeMap::new();
    for request in requests.iter().filter(|r| r.has_response) {
        if let Some(n) = part_number(&request.url) {
            urls.entry(n).or_insert_with(|| request.url.clone());
        }
    }
    urls
}

pub fn part_records(requests: &[ObservedRequest]) -> Vec<PartRecord> {
    part_urls(requests)
        .into_iter()
        .map(|(part_num, url)| PartRecord { part_num, url })
        .collect()
}

/// 封面取最后一次出现的、来自 `host` 的 jpg 请求。
pub fn cover_url(requests: &[ObservedRequest], host: &str) -> Option<String> {
    requests
        .iter()
        .rev()
        .filter(|r| r.has_response)
        .find(|r| {
            let path = r.url.split('?').next().unwrap_or(&r.url);
            path.to_ascii_lowercase().ends_with(".jpg") && r.url.contains(host)
        })
        .map(|r| r.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(url: &str, has_response: bool) -> ObservedRequest {
        ObservedRequest {
            url: url.to_string(),
            has_response,
        }
    }

    #[test]
    fn part_number_reads_zero_padded_suffix() {
        assert_eq!(
            part_number("https://cdn.example/odm/Book-Part07.mp3?e=1&h=abc"),
            Some(7)
        );
        assert_eq!(part_number("https://cdn.example/x/part112.MP3"), Some(112));
        assert_eq!(part_number("https://cdn.example/x/Part00.mp3"), None);
        assert_eq!(part_number("https://cdn.example/x/cover.jpg"), None);
    }

    #[test]
    fn part_urls_keeps_first_answered_url_per_part() {
        let log = vec![
            req("https://a/Book-Part02.mp3?sig=pending", false),
            req("https://a/Book-Part01.mp3?sig=1", true),
            req("https://a/Book-Part02.mp3?sig=2", true),
            req("https://a/Book-Part02.mp3?sig=3", true),
        ];
        let urls = part_urls(&log);
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[&2], "https://a/Book-Part02.mp3?sig=2");

        let records = part_records(&log);
        assert_eq!(records[0].part_num, 1);
        assert_eq!(records[1].part_num, 2);
    }

    #[test]
    fn cover_url_prefers_latest_image_from_host() {
        let log = vec![
            req("https://listen.overdrive.com/img/old.jpg", true),
            req("https://ads.example/banner.jpg", true),
            req("https://listen.overdrive.com/img/new.JPG?w=300", true),
            req("https://listen.overdrive.com/img/unanswered.jpg", false),
        ];
        assert_eq!(
            cover_url(&log, "listen.overdrive.com").as_deref(),
            Some("https://listen.overdrive.com/img/new.JPG?w=300")
        );
        assert_eq!(cover_url(&log, "nowhere.example"), None);
    }
}
