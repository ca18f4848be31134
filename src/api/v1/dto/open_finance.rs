/*
 * Responsibility
 * - Open Finance の response envelope ({data, links, meta}) と page query
 * - resource 本体は services 側の型をそのまま data に載せる (camelCase)
 */
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::services::cache::Page;
use crate::services::open_finance::BookingWindow;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub from_booking_date_time: Option<DateTime<Utc>>,
    pub to_booking_date_time: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl TransactionQuery {
    pub fn window(&self) -> BookingWindow {
        BookingWindow {
            from: self.from_booking_date_time,
            to: self.to_booking_date_time,
        }
    }

    /// Collection URI carrying the booking filter, so page links keep it.
    pub fn link_base(&self, htu: &str) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        let bounds = [
            ("fromBookingDateTime", self.from_booking_date_time),
            ("toBookingDateTime", self.to_booking_date_time),
        ];
        for (name, at) in bounds {
            if let Some(at) = at {
                query.append_pair(name, &at.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
        }
        let query = query.finish();
        if query.is_empty() {
            htu.to_string()
        } else {
            format!("{htu}?{query}")
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ItemResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub links: Links,
    pub meta: Meta,
}

#[derive(Debug, Serialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub page: u32,
    pub page_size: u32,
    pub total_records: u64,
    pub total_pages: u32,
}

impl<T> ListResponse<T> {
    /// `base` is the absolute collection URI, optionally with filter parameters.
    pub fn from_page(page: Page<T>, base: &str) -> Self {
        let sep = if base.contains('?') { '&' } else { '?' };
        let link = |n: u32| format!("{base}{sep}page={n}&pageSize={}", page.page_size);
        let links = Links {
            self_link: link(page.page),
            next: page.next_page().map(link),
        };
        let meta = Meta {
            page: page.page,
            page_size: page.page_size,
            total_records: page.total_records,
            total_pages: page.total_pages,
        };

        ListResponse {
            data: page.items,
            links,
            meta,
        }
    }
}
