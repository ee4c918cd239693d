use std::collections::BTreeSet;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::datetime::{DateRange, local_date, resolve};
use crate::model::{Channel, QueueItem, QueueStatus};

pub const PAGE_SIZE: usize = 10;

/// Constraints applied to the outbound queue. `None` means unconstrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueFilter {
    pub range: DateRange,
    pub channel: Option<Channel>,
    pub provider: Option<String>,
    pub status: Option<QueueStatus>,
}

impl QueueFilter {
    pub fn matches(&self, item: &QueueItem, today: NaiveDate, timezone: Tz) -> bool {
        if let Some(channel) = self.channel
            && item.channel != channel
        {
            return false;
        }

        if let Some(provider) = self.provider.as_deref()
            && item.provider != provider
        {
            return false;
        }

        if let Some(status) = self.status
            && item.status != status
        {
            return false;
        }

        if let Some(bounds) = resolve(self.range, today)
            && !bounds.contains(local_date(item.created_at, timezone))
        {
            return false;
        }

        true
    }

    /// Key used to tell whether a fetched result still belongs to the
    /// current selection.
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.range.as_key(),
            self.channel.map(Channel::as_key).unwrap_or(""),
            self.provider.as_deref().unwrap_or(""),
            self.status.map(QueueStatus::as_key).unwrap_or("")
        )
    }
}

#[tracing::instrument(skip(items, filter), fields(total = items.len()))]
pub fn filter_queue(
    items: &[QueueItem],
    filter: &QueueFilter,
    today: NaiveDate,
    timezone: Tz,
) -> Vec<QueueItem> {
    let matched: Vec<QueueItem> = items
        .iter()
        .filter(|item| filter.matches(item, today, timezone))
        .cloned()
        .collect();
    tracing::debug!(matched = matched.len(), "filtered outbound queue");
    matched
}

pub fn failed_items(items: &[QueueItem]) -> Vec<&QueueItem> {
    items
        .iter()
        .filter(|item| item.status == QueueStatus::Failed)
        .collect()
}

/// Distinct provider names across the live queue and the history, sorted.
/// Names are kept exactly as stored so every option matches under the
/// provider filter.
pub fn provider_options(queue: &[QueueItem], history: &[QueueItem]) -> Vec<String> {
    queue
        .iter()
        .chain(history)
        .map(|item| item.provider.as_str())
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    pub current: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

pub fn page_count(total_items: usize) -> usize {
    total_items.div_ceil(PAGE_SIZE)
}

/// Returns the `page`-th slice (1-based). Out of range pages are clamped.
pub fn paginate<T>(items: &[T], page: usize) -> Page<'_, T> {
    let total_pages = page_count(items.len());
    let current = page.clamp(1, total_pages.max(1));
    let start = ((current - 1) * PAGE_SIZE).min(items.len());
    let end = (current * PAGE_SIZE).min(items.len());

    Page {
        items: &items[start..end],
        current,
        total_pages,
        total_items: items.len(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMarker {
    Page(usize),
    Ellipsis,
}

pub fn page_numbers(current: usize, total: usize) -> Vec<PageMarker> {
    use PageMarker::{Ellipsis, Page};

    if total <= 5 {
        return (1..=total).map(Page).collect();
    }

    if current <= 3 {
        let mut out: Vec<PageMarker> = (1..=4).map(Page).collect();
        out.push(Ellipsis);
        out.push(Page(total));
        return out;
    }

    if current >= total - 2 {
        let mut out = vec![Page(1), Ellipsis];
        out.extend((total - 3..=total).map(Page));
        return out;
    }

    vec![
        Page(1),
        Ellipsis,
        Page(current - 1),
        Page(current),
        Page(current + 1),
        Ellipsis,
        Page(total),
    ]
}

pub fn render_page_markers(markers: &[PageMarker], current: usize) -> String {
    markers
        .iter()
        .map(|marker| match marker {
            PageMarker::Page(n) if *n == current => format!("[{n}]"),
            PageMarker::Page(n) => n.to_string(),
            PageMarker::Ellipsis => "...".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn item(id: usize, channel: Channel, provider: &str, status: QueueStatus) -> QueueItem {
        QueueItem {
            id: format!("q-{id}"),
            appointment_id: format!("apt-{id}"),
            patient_name: "Ada Obi".to_string(),
            clinician_name: "Dr. Hale".to_string(),
            channel,
            provider: provider.to_string(),
            status,
            attempts: 1,
            next_retry_at: None,
            created_at: at(2026, 10, 19),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 21).expect("valid date")
    }

    fn sample() -> Vec<QueueItem> {
        let mut items = vec![
            item(1, Channel::Email, "sendgrid", QueueStatus::Sent),
            item(2, Channel::Sms, "twilio", QueueStatus::Failed),
            item(3, Channel::Voice, "twilio", QueueStatus::Queued),
            item(4, Channel::Sms, "vonage", QueueStatus::Failed),
            item(5, Channel::Email, "sendgrid", QueueStatus::Failed),
        ];
        items[3].created_at = at(2026, 9, 30);
        items
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let items = sample();
        let out = filter_queue(&items, &QueueFilter::default(), today(), chrono_tz::UTC);
        assert_eq!(out, items);
    }

    #[test]
    fn filters_combine_with_and() {
        let items = sample();
        let filter = QueueFilter {
            range: DateRange::Month,
            channel: Some(Channel::Sms),
            provider: None,
            status: Some(QueueStatus::Failed),
        };
        let out = filter_queue(&items, &filter, today(), chrono_tz::UTC);
        let ids: Vec<_> = out.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["q-2"]);
    }

    #[test]
    fn filter_order_does_not_matter() {
        let items = sample();
        let dims = [
            QueueFilter {
                channel: Some(Channel::Sms),
                ..QueueFilter::default()
            },
            QueueFilter {
                provider: Some("twilio".to_string()),
                ..QueueFilter::default()
            },
            QueueFilter {
                status: Some(QueueStatus::Failed),
                ..QueueFilter::default()
            },
            QueueFilter {
                range: DateRange::Week,
                ..QueueFilter::default()
            },
        ];
        let combined = QueueFilter {
            range: DateRange::Week,
            channel: Some(Channel::Sms),
            provider: Some("twilio".to_string()),
            status: Some(QueueStatus::Failed),
        };
        let expected = filter_queue(&items, &combined, today(), chrono_tz::UTC);

        for order in [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1]] {
            let mut current = items.clone();
            for idx in order {
                current = filter_queue(&current, &dims[idx], today(), chrono_tz::UTC);
            }
            assert_eq!(current, expected);
        }
        assert_eq!(expected.len(), 1);
    }

    #[test]
    fn providers_are_deduplicated_and_sorted() {
        let queue = sample();
        let history = vec![item(9, Channel::Email, "amazon-ses", QueueStatus::Sent)];
        assert_eq!(
            provider_options(&queue, &history),
            vec!["amazon-ses", "sendgrid", "twilio", "vonage"]
        );
    }

    #[test]
    fn every_provider_option_selects_its_items() {
        let mut queue = sample();
        queue[1].provider = "twilio ".to_string();
        queue.push(item(6, Channel::Email, "  ", QueueStatus::Sent));
        let options = provider_options(&queue, &[]);
        assert_eq!(options, vec!["sendgrid", "twilio", "twilio ", "vonage"]);

        for option in options {
            let filter = QueueFilter {
                provider: Some(option.clone()),
                ..QueueFilter::default()
            };
            let matched = filter_queue(&queue, &filter, today(), chrono_tz::UTC);
            assert!(!matched.is_empty(), "option {option:?} matched nothing");
            assert!(matched.iter().all(|item| item.provider == option));
        }
    }

    #[test]
    fn third_page_of_twenty_three() {
        let items: Vec<usize> = (1..=23).collect();
        let page = paginate(&items, 3);
        assert_eq!(page.items, &[21, 22, 23]);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_items, 23);
    }

    #[test]
    fn pages_concatenate_to_the_full_list() {
        for n in [0usize, 1, 9, 10, 11, 20, 57] {
            let items: Vec<usize> = (0..n).collect();
            let pages = page_count(n);
            assert_eq!(pages, n.div_ceil(10));
            let mut joined = Vec::new();
            for p in 1..=pages {
                joined.extend_from_slice(paginate(&items, p).items);
            }
            assert_eq!(joined, items);
        }
    }

    #[test]
    fn out_of_range_page_is_clamped() {
        let items: Vec<usize> = (1..=12).collect();
        assert_eq!(paginate(&items, 0).current, 1);
        assert_eq!(paginate(&items, 9).items, &[11, 12]);
        let empty: Vec<usize> = vec![];
        let page = paginate(&empty, 4);
        assert!(page.items.is_empty());
        assert_eq!(page.current, 1);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn page_markers_compress_with_ellipsis() {
        use PageMarker::{Ellipsis, Page};

        assert_eq!(page_numbers(2, 4), vec![Page(1), Page(2), Page(3), Page(4)]);
        assert_eq!(
            page_numbers(2, 10),
            vec![Page(1), Page(2), Page(3), Page(4), Ellipsis, Page(10)]
        );
        assert_eq!(
            page_numbers(9, 10),
            vec![Page(1), Ellipsis, Page(7), Page(8), Page(9), Page(10)]
        );
        assert_eq!(
            page_numbers(5, 10),
            vec![Page(1), Ellipsis, Page(4), Page(5), Page(6), Ellipsis, Page(10)]
        );
        assert_eq!(
            render_page_markers(&page_numbers(5, 10), 5),
            "1 ... 4 [5] 6 ... 10"
        );
    }

    #[test]
    fn failed_items_selects_only_failures() {
        let items = sample();
        assert_eq!(failed_items(&items).len(), 3);
    }

    #[test]
    fn cache_key_tracks_every_dimension() {
        let a = QueueFilter::default();
        let b = QueueFilter {
            provider: Some("twilio".to_string()),
            ..QueueFilter::default()
        };
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "all|||");
    }
}
