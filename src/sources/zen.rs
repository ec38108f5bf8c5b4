//! Zen Planner calendar pages.
//!
//! The week view lists class items per day without times; each item links to an
//! enrollment page whose `Time` row carries `<start> - <end>`.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use crate::identity::ZEN_CLASS_ID_ATTR;
use crate::model::Gym;
use super::{element_attrs, element_text, DaySchedule, ScrapedEntry};

pub const ITEM_CLASS_ATTR: &str = "item-class";

static DAY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div[date]").expect("valid selector"));
static ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.item").expect("valid selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static BOLD_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td.bold").expect("valid selector"));

// onclick="checkLoggedId('enrollment.cfm?appointmentId=<id>')"
static QUOTED_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'([^']+)'").expect("valid pattern"));
static APPOINTMENT_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"appointmentId=([^&']+)").expect("valid pattern"));

#[derive(Clone, PartialEq, Debug)]
pub struct CalendarItem {
    pub name: String,
    pub enrollment_link: String,
    pub attrs: BTreeMap<String, String>,
}
impl CalendarItem {
    pub fn into_entry(self, gym: Gym, date: NaiveDate, start: String, end: String) -> ScrapedEntry {
        ScrapedEntry {
            gym,
            category: None,
            name: self.name,
            date,
            start,
            end,
            attrs: self.attrs,
        }
    }
}

pub fn calendar_url(base: &str, date: NaiveDate) -> String {
    format!("{base}?DATE={}&VIEW=WEEK", date.format("%Y-%m-%d"))
}

/// Enrollment links are relative to the calendar page.
pub fn detail_url(calendar_url: &str, link: &str) -> anyhow::Result<String> {
    let base = Url::parse(calendar_url).with_context(|| format!("calendar url '{calendar_url}'"))?;
    Ok(base.join(link)?.to_string())
}

/// Items with an enrollment link, and a day schedule holding the ones without.
pub fn parse_calendar_page(html: &str, date: NaiveDate) -> anyhow::Result<(Vec<CalendarItem>, DaySchedule)> {
    let date_str = date.format("%Y-%m-%d").to_string();
    let document = Html::parse_document(html);
    let day = document.select(&DAY)
        .find(|el| el.value().attr("date") == Some(date_str.as_str()))
        .ok_or_else(|| anyhow!("Calendar page has no column for {date_str}"))?;

    let mut items = Vec::new();
    let mut schedule = DaySchedule::default();
    for item in day.select(&ITEM) {
        let name = element_text(item);
        let onclick = item.value().attr("onclick").unwrap_or_default();
        let Some(link) = QUOTED_LINK.captures(onclick).map(|c| c[1].to_string()) else {
            warn!("{date_str}: calendar item '{name}' has no enrollment link, skipping");
            schedule.unreadable(name, "no enrollment link".to_string());
            continue;
        };
        let mut attrs = element_attrs(item);
        if let Some(id) = APPOINTMENT_ID.captures(&link) {
            attrs.insert(ZEN_CLASS_ID_ATTR.to_string(), id[1].to_string());
        }
        // the third class token names the program, e.g. "item event program-bjj"
        if let Some(token) = item.value().attr("class").and_then(|c| c.split_whitespace().nth(2)) {
            attrs.insert(ITEM_CLASS_ATTR.to_string(), token.to_string());
        }
        items.push(CalendarItem { name, enrollment_link: link, attrs });
    }
    Ok((items, schedule))
}

/// Start and end time strings from an enrollment page.
pub fn parse_detail_time(html: &str) -> anyhow::Result<(String, String)> {
    let document = Html::parse_document(html);
    let time = document.select(&ROW)
        .find(|row| row.select(&CELL).next().map(element_text).as_deref() == Some("Time"))
        .and_then(|row| row.select(&BOLD_CELL).next())
        .map(element_text)
        .ok_or_else(|| anyhow!("Enrollment page has no Time row"))?;
    let (start, end) = time.split_once(" - ")
        .ok_or_else(|| anyhow!("Unexpected class time format: '{time}'"))?;
    Ok((start.trim().to_string(), end.trim().to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    const CALENDAR: &str = r#"
<html><body>
<div date="2025-03-31"><div class="item event program-bjj" onclick="checkLoggedId('enrollment.cfm?appointmentId=OLD')">Monday class</div></div>
<div date="2025-04-01">
  <div class="item event program-kids" onclick="checkLoggedId('enrollment.cfm?appointmentId=AB-12')">
    Kids Martial Arts
  </div>
  <div class="item event program-bjj" onclick="checkLoggedId('enrollment.cfm?appointmentId=CD-34&amp;x=1')">No-Gi Drilling</div>
  <div class="item event">Holiday, no link</div>
</div>
</body></html>
"#;

    #[test]
    fn test_calendar_items_for_day() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let (items, schedule) = parse_calendar_page(CALENDAR, date).unwrap();
        assert_eq!(items.len(), 2);
        assert!(schedule.entries.is_empty());
        assert_eq!(schedule.unreadable.len(), 1);
        assert_eq!(schedule.unreadable[0].name, "Holiday, no link");
        assert_eq!(schedule.unreadable[0].reason, "no enrollment link");
        assert_eq!(items[0].name, "Kids Martial Arts");
        assert_eq!(items[0].enrollment_link, "enrollment.cfm?appointmentId=AB-12");
        assert_eq!(items[0].attrs.get(ZEN_CLASS_ID_ATTR).map(String::as_str), Some("AB-12"));
        assert_eq!(items[0].attrs.get(ITEM_CLASS_ATTR).map(String::as_str), Some("program-kids"));
        assert_eq!(items[1].attrs.get(ZEN_CLASS_ID_ATTR).map(String::as_str), Some("CD-34"));

        let entry = items[1].clone().into_entry(Gym::Thornton, date, "6:00 PM".into(), "7:00 PM".into());
        assert_eq!(entry.category, None);
        assert_eq!(entry.name, "No-Gi Drilling");
    }

    #[test]
    fn test_missing_day_column() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 2).unwrap();
        assert!(parse_calendar_page(CALENDAR, date).is_err());
    }

    #[test]
    fn test_detail_time() {
        let html = r#"<table>
            <tr><td>Date</td><td class="bold">Tuesday, April 1</td></tr>
            <tr><td>Time</td><td class="bold">6:00 PM - 7:15 PM</td></tr>
        </table>"#;
        assert_eq!(parse_detail_time(html).unwrap(), ("6:00 PM".to_string(), "7:15 PM".to_string()));
        assert!(parse_detail_time("<table><tr><td>Date</td></tr></table>").is_err());
        assert!(parse_detail_time(r#"<table><tr><td>Time</td><td class="bold">TBD</td></tr></table>"#).is_err());
    }

    #[test]
    fn test_urls() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let base = "https://eastonbjjnorth.sites.zenplanner.com/calendar.cfm";
        assert_eq!(calendar_url(base, date), "https://eastonbjjnorth.sites.zenplanner.com/calendar.cfm?DATE=2025-04-01&VIEW=WEEK");
        assert_eq!(
            detail_url(base, "enrollment.cfm?appointmentId=AB-12").unwrap(),
            "https://eastonbjjnorth.sites.zenplanner.com/enrollment.cfm?appointmentId=AB-12"
        );
    }
}
