#[macro_use] extern crate rocket;

use anyhow::anyhow;
use chrono_tz::Tz;
use rocket::fairing::AdHoc;
use rocket_dyn_templates::{Template, handlebars};
use rocket_dyn_templates::handlebars::{Handlebars, Helper};
use serde::Deserialize;
use crate::classtime::display_time;
use crate::db::DbPoolFairing;
use crate::model::{default_gym_sources, GymSource};

#[cfg(test)]
mod tests;
mod db;
mod model;
mod classtime;
mod classify;
mod identity;
mod sources;
mod store;
mod reconcile;
mod retriever;
mod classes;
mod util;

fn default_retrieval_days() -> u32 { 7 }
fn default_time_zone() -> String { "America/Denver".to_string() }
fn default_user_agent() -> String { concat!("classfinder/", env!("CARGO_PKG_VERSION")).to_string() }
fn default_request_timeout_secs() -> u64 { 30 }

#[derive(Deserialize, Clone, Debug)]
struct AppConfig {
    #[serde(default = "default_retrieval_days")]
    retrieval_days: u32,
    #[serde(default = "default_time_zone")]
    time_zone: String,
    #[serde(default = "default_user_agent")]
    user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default)]
    retrieval_interval_minutes: Option<u64>,
    #[serde(default)]
    gyms: Option<Vec<GymSource>>,
}
impl AppConfig {
    fn time_zone(&self) -> anyhow::Result<Tz> {
        self.time_zone.parse::<Tz>().map_err(|e| anyhow!("Invalid time_zone '{}': {e}", self.time_zone))
    }
    fn gym_sources(&self) -> Vec<GymSource> {
        self.gyms.clone().unwrap_or_else(default_gym_sources)
    }
}

#[launch]
fn rocket() -> _ {
    let rocket = rocket::build()
        .attach(Template::custom(|engines| {
            let handlebars = &mut engines.handlebars;

            handlebars.register_helper("classtime",
                                       Box::new(|h: &Helper, _r: &Handlebars, _: &handlebars::Context, _rc: &mut handlebars::RenderContext, out: &mut dyn handlebars::Output| -> handlebars::HelperResult {
                                           let val = h.param(0).ok_or(handlebars::RenderErrorReason::ParamNotFoundForIndex("classtime", 0))?.value();
                                           let s = display_time(val.as_str());
                                           out.write(&s)?;
                                           Ok(())
                                       }));
        }))
        .attach(AdHoc::config::<AppConfig>())
        .attach(DbPoolFairing())
        .attach(retriever::fairing())
        .attach(retriever::periodic_fairing());
    let rocket = classes::extend(rocket);
    retriever::extend(rocket)
}
