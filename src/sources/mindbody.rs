//! Schedules published through the healcode (MindBody) widget.
//!
//! The gym's schedule page only embeds a widget id; the classes themselves come
//! from the widget's printable day view, a table where divider rows name the
//! category of the class rows that follow them.

use std::sync::LazyLock;
use anyhow::anyhow;
use chrono::NaiveDate;
use scraper::{Html, Selector};
use crate::model::Gym;
use super::{element_attrs, element_text, DaySchedule, ScrapedEntry};

pub const PRINT_VIEW_BASE: &str = "https://widgets.healcode.com/widgets/schedules";

static WIDGET: LazyLock<Selector> = LazyLock::new(|| Selector::parse("healcode-widget[data-widget-id]").expect("valid selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static CLASS_NAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.classname").expect("valid selector"));
static START_TIME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.hc_starttime").expect("valid selector"));
static END_TIME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.hc_endtime").expect("valid selector"));

pub fn parse_widget_id(html: &str) -> anyhow::Result<String> {
    let document = Html::parse_document(html);
    document.select(&WIDGET)
        .filter_map(|el| el.value().attr("data-widget-id"))
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("No healcode-widget with a data-widget-id on the schedule page"))
}

pub fn print_url(widget_id: &str, date: NaiveDate) -> String {
    format!("{PRINT_VIEW_BASE}/{widget_id}/print?options%5Bstart_date%5D={}", date.format("%Y-%m-%d"))
}

pub fn parse_print_page(html: &str, gym: Gym, date: NaiveDate) -> DaySchedule {
    let document = Html::parse_document(html);
    let mut category: Option<String> = None;
    let mut day = DaySchedule::default();
    for row in document.select(&ROW) {
        let is_row = |class: &str| row.value().classes().any(|c| c == class);
        if is_row("group_by_class_type") {
            category = row.select(&CELL).next()
                .map(element_text)
                .filter(|s| !s.is_empty());
            continue;
        }
        if !is_row("hc_class") {
            continue;
        }
        let span = |sel: &Selector| row.select(sel).next().map(element_text);
        let (Some(name), Some(start), Some(end)) = (span(&CLASS_NAME), span(&START_TIME), span(&END_TIME)) else {
            let text = element_text(row);
            warn!("{gym} {date}: class row without name or times, skipping: {text}");
            day.unreadable(text, "class row without name or times".to_string());
            continue;
        };
        day.entries.push(ScrapedEntry {
            gym,
            category: category.clone(),
            name,
            date,
            start,
            end,
            attrs: element_attrs(row),
        });
    }
    debug!("{gym} {date}: {} classes on the print view", day.entries.len());
    day
}
