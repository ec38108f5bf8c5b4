use std::sync::Arc;
use std::time::Duration;
use anyhow::anyhow;
use chrono::NaiveDate;
use chrono_tz::Tz;
use rocket::fairing::AdHoc;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::serde::Serialize;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{context, Template};
use crate::classify::{classify, matched_rules, Classification};
use crate::classtime::{normalize_times, ClassTime};
use crate::identity::ClassIdSelector;
use crate::model::{Category, Gym, GymSource, NormalizedClass, Requirement};
use crate::reconcile::{Outcome, SharedReconciler};
use crate::sources::{HttpScheduleFetcher, ScheduleFetcher, ScrapedEntry, UnreadableEntry};
use crate::util::anyhow_to_custom_error;
use crate::AppConfig;

#[derive(Serialize, Clone, Debug)]
pub struct ProcessedEntry {
    pub gym: Gym,
    pub class_id: String,
    pub name: String,
    pub category: Category,
    pub requirement: Requirement,
    pub start_time: ClassTime,
    pub end_time: ClassTime,
    pub outcome: Outcome,
}

#[derive(Serialize, Clone, Debug)]
pub struct FetchFailure {
    pub gym: Gym,
    pub date: NaiveDate,
    pub error: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct SkippedEntry {
    pub gym: Gym,
    pub date: NaiveDate,
    pub name: String,
    pub reason: String,
}

/// Summary of one retrieval run; `finished_at` is the time the data was last refreshed.
#[derive(Serialize, Clone, Debug)]
pub struct RetrievalReport {
    pub started_at: ClassTime,
    pub finished_at: ClassTime,
    pub first_day: NaiveDate,
    pub days: u32,
    pub fetches: usize,
    pub failures: Vec<FetchFailure>,
    pub skipped: Vec<SkippedEntry>,
    pub entries: Vec<ProcessedEntry>,
    pub inserted: usize,
    pub updated: usize,
}
impl RetrievalReport {
    fn new(started_at: ClassTime, first_day: NaiveDate, days: u32) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            first_day,
            days,
            fetches: 0,
            failures: vec![],
            skipped: vec![],
            entries: vec![],
            inserted: 0,
            updated: 0,
        }
    }
    fn record(&mut self, class: NormalizedClass, outcome: Outcome) {
        match outcome {
            Outcome::Inserted => self.inserted += 1,
            Outcome::Updated => self.updated += 1,
        }
        self.entries.push(ProcessedEntry {
            gym: class.gym,
            class_id: class.class_id,
            name: class.name,
            category: class.category,
            requirement: class.requirement,
            start_time: class.start_time,
            end_time: class.end_time,
            outcome,
        });
    }
    fn skip(&mut self, entry: &ScrapedEntry, reason: &anyhow::Error) {
        self.skipped.push(SkippedEntry {
            gym: entry.gym,
            date: entry.date,
            name: entry.name.clone(),
            reason: format!("{reason:#}"),
        });
    }
    fn unreadable(&mut self, gym: Gym, date: NaiveDate, entry: UnreadableEntry) {
        self.skipped.push(SkippedEntry { gym, date, name: entry.name, reason: entry.reason });
    }
    pub fn all_fetches_failed(&self) -> bool {
        self.fetches > 0 && self.failures.len() == self.fetches
    }
}

pub struct Retriever {
    sources: Vec<GymSource>,
    fetcher: Arc<dyn ScheduleFetcher>,
    reconciler: SharedReconciler,
    class_ids: ClassIdSelector,
    tz: Tz,
}
pub type SharedRetriever = Arc<Retriever>;

impl Retriever {
    pub fn new(sources: Vec<GymSource>, fetcher: Arc<dyn ScheduleFetcher>, reconciler: SharedReconciler, tz: Tz) -> Self {
        let class_ids = ClassIdSelector::new(&sources);
        Self { sources, fetcher, reconciler, class_ids, tz }
    }
    pub fn today(&self) -> NaiveDate {
        ClassTime::now(self.tz).0.date_naive()
    }

    /// Scrapes `days` days starting at `first_day` for every configured gym and
    /// reconciles what was found. Gym/day fetch failures and unusable entries are
    /// recorded in the report; the run only fails when no fetch succeeded.
    pub async fn retrieve(&self, first_day: NaiveDate, days: u32) -> anyhow::Result<RetrievalReport> {
        info!("Retrieving {days} day(s) of classes from {first_day} for {} gym(s)", self.sources.len());
        let mut report = RetrievalReport::new(ClassTime::now(self.tz), first_day, days);
        self.fetcher.start_run().await;
        for source in &self.sources {
            for date in first_day.iter_days().take(days as usize) {
                report.fetches += 1;
                let day = match self.fetcher.fetch_day(source, date).await {
                    Ok(day) => day,
                    Err(err) => {
                        error!("{} {date}: fetch of {} failed: {err:#}", source.gym, source.url);
                        report.failures.push(FetchFailure { gym: source.gym, date, error: format!("{err:#}") });
                        continue;
                    }
                };
                debug!("{} {date}: {} entries, {} unreadable", source.gym, day.entries.len(), day.unreadable.len());
                for entry in day.unreadable {
                    report.unreadable(source.gym, date, entry);
                }
                for entry in day.entries {
                    self.process(entry, &mut report).await;
                }
            }
        }
        report.finished_at = ClassTime::now(self.tz);
        info!("Retrieval finished: {} inserted, {} updated, {} skipped, {} of {} fetches failed",
            report.inserted, report.updated, report.skipped.len(), report.failures.len(), report.fetches);
        if report.all_fetches_failed() {
            let first = report.failures.first().map(|f| f.error.as_str()).unwrap_or_default();
            return Err(anyhow!("All {} schedule fetches failed, first error: {first}", report.fetches));
        }
        Ok(report)
    }

    async fn process(&self, entry: ScrapedEntry, report: &mut RetrievalReport) {
        let class = match self.normalize(&entry) {
            Ok(class) => class,
            Err(err) => {
                warn!("{} {}: skipping '{}': {err:#}", entry.gym, entry.date, entry.name);
                report.skip(&entry, &err);
                return;
            }
        };
        match self.reconciler.reconcile(&class).await {
            Ok(outcome) => report.record(class, outcome),
            Err(err) => {
                error!("{} {}: storing '{}' failed: {err:#}", entry.gym, entry.date, entry.name);
                report.skip(&entry, &err);
            }
        }
    }

    fn normalize(&self, entry: &ScrapedEntry) -> anyhow::Result<NormalizedClass> {
        let key = self.class_ids.identity(entry)?;
        let (start_time, end_time) = normalize_times(entry.date, &entry.start, &entry.end, self.tz)?;
        let Classification { category, requirement } = classify(entry.category.as_deref(), &entry.name);
        if log::log_enabled!(log::Level::Debug) {
            debug!("{key} {:?} / '{}' -> {category:?}, {requirement:?} by {:?}",
                entry.category, entry.name, matched_rules(entry.category.as_deref(), &entry.name));
        }
        Ok(NormalizedClass {
            gym: key.gym,
            category,
            requirement,
            class_id: key.class_id,
            name: entry.name.clone(),
            start_time,
            end_time,
            canceled: false,
        })
    }
}

async fn run_retrieval(retriever: &Retriever, days: Option<u32>, cfg: &AppConfig) -> Result<RetrievalReport, Custom<String>> {
    let days = days.unwrap_or(cfg.retrieval_days);
    retriever.retrieve(retriever.today(), days).await.map_err(anyhow_to_custom_error)
}

#[get("/retrieve?<days>")]
async fn get_retrieve(days: Option<u32>, retriever: &State<SharedRetriever>, cfg: &State<AppConfig>) -> Result<Template, Custom<String>> {
    let report = run_retrieval(retriever, days, cfg).await?;
    Ok(Template::render("retrieve", context! {
        report,
    }))
}

#[post("/api/retrieve?<days>")]
async fn api_retrieve(days: Option<u32>, retriever: &State<SharedRetriever>, cfg: &State<AppConfig>) -> Result<Json<RetrievalReport>, Custom<String>> {
    let report = run_retrieval(retriever, days, cfg).await?;
    Ok(Json(report))
}

/// Builds the managed [`Retriever`]. A fetcher managed before ignition replaces the HTTP one.
pub fn fairing() -> AdHoc {
    AdHoc::try_on_ignite("Class Retriever", |rocket| async move {
        let Some(cfg) = rocket.state::<AppConfig>().cloned() else {
            error!("Application config is not loaded");
            return Err(rocket);
        };
        let Some(reconciler) = rocket.state::<SharedReconciler>().cloned() else {
            error!("Class store is not available");
            return Err(rocket);
        };
        let tz = match cfg.time_zone() {
            Ok(tz) => tz,
            Err(err) => {
                error!("{err:#}");
                return Err(rocket);
            }
        };
        let managed_fetcher = rocket.state::<Arc<dyn ScheduleFetcher>>().cloned();
        let fetcher: Arc<dyn ScheduleFetcher> = match managed_fetcher {
            Some(fetcher) => fetcher,
            None => match HttpScheduleFetcher::new(&cfg.user_agent, Duration::from_secs(cfg.request_timeout_secs)) {
                Ok(fetcher) => Arc::new(fetcher),
                Err(err) => {
                    error!("HTTP client error: {err:#}");
                    return Err(rocket);
                }
            },
        };
        let sources = cfg.gym_sources();
        info!("Schedule sources: {}", sources.iter().map(|s| format!("{} ({})", s.gym, s.source)).collect::<Vec<_>>().join(", "));
        let retriever: SharedRetriever = Arc::new(Retriever::new(sources, fetcher, reconciler, tz));
        Ok(rocket.manage(retriever))
    })
}

fn retrieval_period(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

/// Re-runs retrieval every `retrieval_interval_minutes` when that is configured.
pub fn periodic_fairing() -> AdHoc {
    AdHoc::on_liftoff("Periodic Retrieval", |rocket| Box::pin(async move {
        let Some(cfg) = rocket.state::<AppConfig>() else {
            return;
        };
        let Some(minutes) = cfg.retrieval_interval_minutes.filter(|m| *m > 0) else {
            return;
        };
        let Some(retriever) = rocket.state::<SharedRetriever>().cloned() else {
            return;
        };
        let days = cfg.retrieval_days;
        info!("Retrieving schedules every {minutes} minute(s)");
        rocket::tokio::spawn(async move {
            let mut interval = rocket::tokio::time::interval(retrieval_period(minutes));
            loop {
                interval.tick().await;
                if let Err(err) = retriever.retrieve(retriever.today(), days).await {
                    error!("Periodic retrieval failed: {err:#}");
                }
            }
        });
    }))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
        get_retrieve,
        api_retrieve,
    ])
}
