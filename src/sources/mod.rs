use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use chrono::NaiveDate;
use itertools::Itertools;
use rocket::tokio::sync::Mutex;
use scraper::ElementRef;
use crate::model::{Gym, GymSource, SourceType};

pub mod mindbody;
pub mod zen;

/// One class row as read from a schedule page, before any interpretation.
#[derive(Clone, PartialEq, Debug)]
pub struct ScrapedEntry {
    pub gym: Gym,
    /// Category label, when the source publishes one.
    pub category: Option<String>,
    pub name: String,
    pub date: NaiveDate,
    pub start: String,
    pub end: String,
    pub attrs: BTreeMap<String, String>,
}

/// A class the page listed but that could not be read into an entry.
#[derive(Clone, PartialEq, Debug)]
pub struct UnreadableEntry {
    pub name: String,
    pub reason: String,
}

/// Everything one schedule page yielded for a day.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DaySchedule {
    pub entries: Vec<ScrapedEntry>,
    pub unreadable: Vec<UnreadableEntry>,
}
impl DaySchedule {
    fn unreadable(&mut self, name: impl Into<String>, reason: String) {
        self.unreadable.push(UnreadableEntry { name: name.into(), reason });
    }
}
impl From<Vec<ScrapedEntry>> for DaySchedule {
    fn from(entries: Vec<ScrapedEntry>) -> Self {
        Self { entries, unreadable: vec![] }
    }
}

#[rocket::async_trait]
pub trait ScheduleFetcher: Send + Sync {
    /// Called once before a retrieval run touches any gym.
    async fn start_run(&self) {}
    async fn fetch_day(&self, source: &GymSource, date: NaiveDate) -> anyhow::Result<DaySchedule>;
}

fn element_text(el: ElementRef) -> String {
    el.text().flat_map(str::split_whitespace).join(" ")
}

fn element_attrs(el: ElementRef) -> BTreeMap<String, String> {
    el.value().attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub struct HttpScheduleFetcher {
    client: reqwest::Client,
    widget_ids: Mutex<HashMap<Gym, String>>,
}
impl HttpScheduleFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, widget_ids: Mutex::new(HashMap::new()) })
    }

    async fn get_text(&self, url: &str) -> anyhow::Result<String> {
        debug!("GET {url}");
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }

    async fn mindbody_widget_id(&self, source: &GymSource) -> anyhow::Result<String> {
        if let Some(id) = self.widget_ids.lock().await.get(&source.gym) {
            return Ok(id.clone());
        }
        let html = self.get_text(&source.url).await?;
        let id = mindbody::parse_widget_id(&html)?;
        info!("{} schedule widget id: {id}", source.gym);
        self.widget_ids.lock().await.insert(source.gym, id.clone());
        Ok(id)
    }

    async fn fetch_mindbody_day(&self, source: &GymSource, date: NaiveDate) -> anyhow::Result<DaySchedule> {
        let widget_id = self.mindbody_widget_id(source).await?;
        let html = self.get_text(&mindbody::print_url(&widget_id, date)).await?;
        Ok(mindbody::parse_print_page(&html, source.gym, date))
    }

    async fn fetch_zen_times(&self, source: &GymSource, item: &zen::CalendarItem) -> anyhow::Result<(String, String)> {
        let url = zen::detail_url(&source.url, &item.enrollment_link)?;
        let html = self.get_text(&url).await?;
        zen::parse_detail_time(&html)
    }

    async fn fetch_zen_day(&self, source: &GymSource, date: NaiveDate) -> anyhow::Result<DaySchedule> {
        let html = self.get_text(&zen::calendar_url(&source.url, date)).await?;
        let (items, mut day) = zen::parse_calendar_page(&html, date)?;
        for item in items {
            match self.fetch_zen_times(source, &item).await {
                Ok((start, end)) => day.entries.push(item.into_entry(source.gym, date, start, end)),
                Err(err) => {
                    warn!("{} {date}: no times for '{}': {err:#}", source.gym, item.name);
                    day.unreadable(item.name, format!("{err:#}"));
                }
            }
        }
        Ok(day)
    }
}

#[rocket::async_trait]
impl ScheduleFetcher for HttpScheduleFetcher {
    async fn start_run(&self) {
        self.widget_ids.lock().await.clear();
    }
    async fn fetch_day(&self, source: &GymSource, date: NaiveDate) -> anyhow::Result<DaySchedule> {
        match source.source {
            SourceType::MindBody => self.fetch_mindbody_day(source, date).await,
            SourceType::Zen => self.fetch_zen_day(source, date).await,
        }
    }
}
