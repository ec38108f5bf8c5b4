use std::collections::BTreeMap;
use std::sync::Arc;
use anyhow::bail;
use chrono::NaiveDate;
use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;
use crate::model::{Category, ClassRecord, Gym, GymSource, Requirement};
use crate::reconcile::SharedReconciler;
use crate::sources::{DaySchedule, ScheduleFetcher, ScrapedEntry};

struct FakeFetcher;

fn entry(gym: Gym, date: NaiveDate, category: Option<&str>, name: &str, start: &str, end: &str, id: (&str, String)) -> ScrapedEntry {
    ScrapedEntry {
        gym,
        category: category.map(str::to_string),
        name: name.to_string(),
        date,
        start: start.to_string(),
        end: end.to_string(),
        attrs: BTreeMap::from([(id.0.to_string(), id.1)]),
    }
}

#[rocket::async_trait]
impl ScheduleFetcher for FakeFetcher {
    async fn fetch_day(&self, source: &GymSource, date: NaiveDate) -> anyhow::Result<DaySchedule> {
        let mbo_id = |n: u32| ("data-hc-mbo-class-id", format!("{date}-{n}"));
        Ok(match source.gym {
            Gym::Denver => vec![
                entry(Gym::Denver, date, Some("BJJ"), "BJJ Advanced", "6:00 PM", "- 7:00 PM", mbo_id(1)),
                entry(Gym::Denver, date, Some("Striking"), "Muay Thai - blue shirt", "7:00 AM", "- 8:00 AM", mbo_id(2)),
            ],
            Gym::Thornton => vec![
                entry(Gym::Thornton, date, None, "Kids Martial Arts", "4:00 PM", "4:45 PM", ("appointmentId", format!("Z{date}"))),
                entry(Gym::Thornton, date, None, "Open Mat", "TBD", "TBD", ("appointmentId", format!("O{date}"))),
            ],
            _ => vec![],
        }.into())
    }
}

struct DownFetcher;
#[rocket::async_trait]
impl ScheduleFetcher for DownFetcher {
    async fn fetch_day(&self, _source: &GymSource, _date: NaiveDate) -> anyhow::Result<DaySchedule> {
        bail!("connection refused")
    }
}

fn create_test_server(fetcher: Arc<dyn ScheduleFetcher>) -> Client {
    Client::tracked(super::rocket().manage(fetcher)).unwrap()
}

fn create_loaded_server() -> Client {
    let client = create_test_server(Arc::new(FakeFetcher));
    let resp = client.post("/api/retrieve?days=2").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert_eq!(resp.content_type(), Some(ContentType::JSON));
    let report = resp.into_json::<serde_json::Value>().unwrap();
    assert_eq!(report["inserted"], 6);
    assert_eq!(report["fetches"], 16);
    assert_eq!(report["skipped"].as_array().map(Vec::len), Some(2));
    client
}

fn get_classes(client: &Client, query: &str) -> Vec<ClassRecord> {
    let resp = client.get(format!("/api/classes{query}")).dispatch();
    assert_eq!(resp.status(), Status::Ok, "{query}");
    resp.into_json::<Vec<ClassRecord>>().unwrap()
}

#[test]
fn select_page_lists_choices() {
    let client = create_test_server(Arc::new(FakeFetcher));
    let resp = client.get("/").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body = resp.into_string().unwrap();
    assert!(body.contains("Castle Rock"));
    assert!(body.contains("Kids BJJ"));
    assert!(body.contains("Grey/white belt"));
}

#[test]
fn retrieved_classes_are_sorted_and_filtered() {
    let client = create_loaded_server();

    let all = get_classes(&client, "");
    assert_eq!(all.len(), 6);
    assert!(all.windows(2).all(|w| w[0].start_time <= w[1].start_time));
    assert_eq!(all[0].name, "Muay Thai - blue shirt");

    let striking = get_classes(&client, "?gym=DE&class-type=STR");
    assert_eq!(striking.len(), 2);
    assert!(striking.iter().all(|c| c.requirement == Requirement::BlueShirt));

    let kids = get_classes(&client, "?gym=Thornton&gym=Denver&class-type=Kids%20BJJ&requirements=None");
    assert_eq!(kids.len(), 2);
    assert!(kids.iter().all(|c| c.gym == Gym::Thornton && c.category == Category::KidsBjj));

    assert!(get_classes(&client, "?gym=AR").is_empty());

    let resp = client.get("/classes?gym=DE").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body = resp.into_string().unwrap();
    assert!(body.contains("BJJ Advanced"));
    assert!(!body.contains("Kids Martial Arts"));
}

#[test]
fn retrieval_is_idempotent() {
    let client = create_loaded_server();
    let resp = client.post("/api/retrieve?days=2").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let report = resp.into_json::<serde_json::Value>().unwrap();
    assert_eq!(report["inserted"], 0);
    assert_eq!(report["updated"], 6);
    assert_eq!(get_classes(&client, "").len(), 6);
}

#[test]
fn unknown_filter_value_is_bad_request() {
    let client = create_test_server(Arc::new(FakeFetcher));
    for query in ["?gym=Paris", "?class-type=Knitting", "?requirements=tall"] {
        let resp = client.get(format!("/api/classes{query}")).dispatch();
        assert_eq!(resp.status(), Status::BadRequest, "{query}");
    }
    let resp = client.get("/classes?gym=Paris").dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
}

#[test]
fn canceled_flag_survives_retrieval() {
    let client = create_loaded_server();
    let class = get_classes(&client, "?gym=DE&class-type=BJJ").remove(0);

    let resp = client.post(format!("/api/classes/DE/{}/canceled?value=true", class.class_id)).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert!(resp.into_json::<ClassRecord>().unwrap().canceled);

    let resp = client.post("/api/retrieve?days=2").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let after = get_classes(&client, "?gym=DE&class-type=BJJ");
    let same = after.iter().find(|c| c.class_id == class.class_id).unwrap();
    assert!(same.canceled);
    assert_eq!(same.id, class.id);

    let resp = client.post(format!("/api/classes/DE/{}/canceled?value=false", class.class_id)).dispatch();
    assert!(!resp.into_json::<ClassRecord>().unwrap().canceled);

    let resp = client.post("/api/classes/DE/no-such-class/canceled").dispatch();
    assert_eq!(resp.status(), Status::NotFound);
    let resp = client.post(format!("/api/classes/Paris/{}/canceled", class.class_id)).dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
}

#[test]
fn retrieve_page_reports_run() {
    let client = create_test_server(Arc::new(FakeFetcher));
    let resp = client.get("/retrieve?days=1").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body = resp.into_string().unwrap();
    assert!(body.contains("Kids Martial Arts"));
    assert!(body.contains("Inserted: 3, updated: 0, skipped: 1"));
}

#[test]
fn retrieval_fails_when_every_fetch_fails() {
    let client = create_test_server(Arc::new(DownFetcher));
    let resp = client.post("/api/retrieve?days=1").dispatch();
    assert_eq!(resp.status(), Status::InternalServerError);
    let resp = client.get("/retrieve").dispatch();
    assert_eq!(resp.status(), Status::InternalServerError);
}

#[test]
fn class_store_is_reachable_through_reconciler() {
    let client = create_test_server(Arc::new(FakeFetcher));
    assert!(client.rocket().state::<SharedReconciler>().is_some());
    assert!(get_classes(&client, "").is_empty());
}
