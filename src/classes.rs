use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::serde::Serialize;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{context, Template};
use crate::classtime::ClassTime;
use crate::identity::IdentityKey;
use crate::model::{Category, ClassRecord, Gym, Requirement};
use crate::reconcile::SharedReconciler;
use crate::store::ClassFilter;
use crate::util::{anyhow_to_custom_error, bad_request_error};

#[derive(FromForm, Default, Debug)]
pub struct ClassSelection {
    #[field(default = Vec::new())]
    pub gym: Vec<String>,
    #[field(name = "class-type", default = Vec::new())]
    pub class_type: Vec<String>,
    #[field(default = Vec::new())]
    pub requirements: Vec<String>,
}
impl ClassSelection {
    pub fn to_filter(&self) -> anyhow::Result<ClassFilter> {
        ClassFilter::resolve(&self.gym, &self.class_type, &self.requirements)
    }
}

#[derive(Serialize, Debug)]
struct SelectOption {
    value: &'static str,
    label: &'static str,
}
fn select_options<T: Copy>(all: &[T], value: fn(T) -> &'static str, label: fn(T) -> &'static str) -> Vec<SelectOption> {
    all.iter().map(|v| SelectOption { value: value(*v), label: label(*v) }).collect()
}

#[derive(Serialize, Debug)]
struct ClassView {
    gym: &'static str,
    gym_code: &'static str,
    category: &'static str,
    requirement: &'static str,
    class_id: String,
    name: String,
    start_time: ClassTime,
    end_time: ClassTime,
    canceled: bool,
}
impl From<ClassRecord> for ClassView {
    fn from(rec: ClassRecord) -> Self {
        Self {
            gym: rec.gym.label(),
            gym_code: rec.gym.code(),
            category: rec.category.label(),
            requirement: rec.requirement.label(),
            class_id: rec.class_id,
            name: rec.name,
            start_time: rec.start_time,
            end_time: rec.end_time,
            canceled: rec.canceled,
        }
    }
}

async fn query_classes(selection: &ClassSelection, reconciler: &SharedReconciler) -> Result<Vec<ClassRecord>, Custom<String>> {
    let filter = selection.to_filter().map_err(bad_request_error)?;
    reconciler.store().query(&filter).await.map_err(anyhow_to_custom_error)
}

#[get("/")]
fn select_page() -> Template {
    Template::render("select", context! {
        gyms: select_options(Gym::ALL, Gym::code, Gym::label),
        categories: select_options(Category::ALL, Category::code, Category::label),
        requirements: select_options(Requirement::ALL, Requirement::code, Requirement::label),
    })
}

#[get("/classes?<selection..>")]
async fn get_classes(selection: ClassSelection, reconciler: &State<SharedReconciler>) -> Result<Template, Custom<String>> {
    let records = query_classes(&selection, reconciler).await?;
    let classes = records.into_iter().map(ClassView::from).collect::<Vec<_>>();
    Ok(Template::render("classes", context! {
        classes,
    }))
}

#[get("/api/classes?<selection..>")]
async fn api_get_classes(selection: ClassSelection, reconciler: &State<SharedReconciler>) -> Result<Json<Vec<ClassRecord>>, Custom<String>> {
    let records = query_classes(&selection, reconciler).await?;
    Ok(Json(records))
}

#[post("/api/classes/<gym>/<class_id>/canceled?<value>")]
async fn api_set_canceled(gym: &str, class_id: &str, value: Option<bool>, reconciler: &State<SharedReconciler>) -> Result<Json<ClassRecord>, Custom<String>> {
    let gym = gym.parse::<Gym>().map_err(bad_request_error)?;
    let key = IdentityKey::new(gym, class_id);
    let canceled = value.unwrap_or(true);
    let store = reconciler.store();
    if !store.set_canceled(&key, canceled).await.map_err(anyhow_to_custom_error)? {
        return Err(Custom(Status::NotFound, format!("Class {key} not found")));
    }
    info!("Class {key} canceled: {canceled}");
    let record = store.get(&key).await
        .map_err(anyhow_to_custom_error)?
        .ok_or_else(|| Custom(Status::NotFound, format!("Class {key} not found")))?;
    Ok(Json(record))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
        select_page,
        get_classes,
        api_get_classes,
        api_set_canceled,
    ])
}
