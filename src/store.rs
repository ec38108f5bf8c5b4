use std::str::FromStr;
use anyhow::Context;
use sqlx::{query_as, QueryBuilder, Sqlite, SqlitePool};
use crate::identity::IdentityKey;
use crate::model::{Category, ClassRecord, Gym, NormalizedClass, Requirement};
use crate::util::sqlx_to_anyhow;

/// Which classes a query returns; every list must be non-empty to match anything.
#[derive(Clone, PartialEq, Debug)]
pub struct ClassFilter {
    pub gyms: Vec<Gym>,
    pub categories: Vec<Category>,
    pub requirements: Vec<Requirement>,
}
impl ClassFilter {
    pub fn all() -> Self {
        Self {
            gyms: Gym::ALL.to_vec(),
            categories: Category::ALL.to_vec(),
            requirements: Requirement::ALL.to_vec(),
        }
    }
    /// Builds a filter from user selections; an empty selection means every known value.
    pub fn resolve<S: AsRef<str>>(gyms: &[S], categories: &[S], requirements: &[S]) -> anyhow::Result<Self> {
        Ok(Self {
            gyms: resolve_values(gyms, Gym::ALL).context("gym")?,
            categories: resolve_values(categories, Category::ALL).context("class-type")?,
            requirements: resolve_values(requirements, Requirement::ALL).context("requirements")?,
        })
    }
    fn is_empty(&self) -> bool {
        self.gyms.is_empty() || self.categories.is_empty() || self.requirements.is_empty()
    }
}

fn resolve_values<S, T>(values: &[S], all: &[T]) -> anyhow::Result<Vec<T>>
where
    S: AsRef<str>,
    T: FromStr<Err = anyhow::Error> + Copy + PartialEq,
{
    let mut resolved: Vec<T> = Vec::new();
    for s in values.iter().map(|s| s.as_ref().trim()).filter(|s| !s.is_empty()) {
        let value = T::from_str(s)?;
        if !resolved.contains(&value) {
            resolved.push(value);
        }
    }
    if resolved.is_empty() {
        resolved = all.to_vec();
    }
    Ok(resolved)
}

#[rocket::async_trait]
pub trait ClassStore: Send + Sync {
    async fn get(&self, key: &IdentityKey) -> anyhow::Result<Option<ClassRecord>>;
    async fn insert(&self, class: &NormalizedClass) -> anyhow::Result<i64>;
    /// Writes back everything a scrape owns; the canceled flag is left alone.
    async fn update(&self, record: &ClassRecord) -> anyhow::Result<()>;
    /// Matching classes ordered by start time.
    async fn query(&self, filter: &ClassFilter) -> anyhow::Result<Vec<ClassRecord>>;
    /// Returns false when no class has the key.
    async fn set_canceled(&self, key: &IdentityKey, canceled: bool) -> anyhow::Result<bool>;
}

pub struct SqliteClassStore {
    pool: SqlitePool,
}
impl SqliteClassStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn push_in_list<'args, T>(qb: &mut QueryBuilder<'args, Sqlite>, column: &str, values: &[T])
where
    T: 'args + Copy + sqlx::Encode<'args, Sqlite> + sqlx::Type<Sqlite>,
{
    qb.push(column);
    qb.push(" IN (");
    let mut list = qb.separated(", ");
    for value in values {
        list.push_bind(*value);
    }
    qb.push(")");
}

#[rocket::async_trait]
impl ClassStore for SqliteClassStore {
    async fn get(&self, key: &IdentityKey) -> anyhow::Result<Option<ClassRecord>> {
        query_as::<_, ClassRecord>("SELECT * FROM classes WHERE gym=? AND class_id=?")
            .bind(key.gym)
            .bind(&key.class_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_anyhow)
    }

    async fn insert(&self, class: &NormalizedClass) -> anyhow::Result<i64> {
        let id: (i64, ) = query_as("INSERT INTO classes
                (gym, category, class_id, name, requirement, start_time, end_time, canceled)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id")
            .bind(class.gym)
            .bind(class.category)
            .bind(&class.class_id)
            .bind(&class.name)
            .bind(class.requirement)
            .bind(class.start_time)
            .bind(class.end_time)
            .bind(class.canceled)
            .fetch_one(&self.pool)
            .await.map_err(sqlx_to_anyhow)?;
        Ok(id.0)
    }

    async fn update(&self, record: &ClassRecord) -> anyhow::Result<()> {
        sqlx::query("UPDATE classes SET gym=?, category=?, name=?, requirement=?, start_time=?, end_time=? WHERE id=?")
            .bind(record.gym)
            .bind(record.category)
            .bind(&record.name)
            .bind(record.requirement)
            .bind(record.start_time)
            .bind(record.end_time)
            .bind(record.id)
            .execute(&self.pool)
            .await.map_err(sqlx_to_anyhow)?;
        Ok(())
    }

    async fn query(&self, filter: &ClassFilter) -> anyhow::Result<Vec<ClassRecord>> {
        if filter.is_empty() {
            return Ok(vec![]);
        }
        let mut qb = QueryBuilder::new("SELECT * FROM classes WHERE ");
        push_in_list(&mut qb, "gym", &filter.gyms);
        qb.push(" AND ");
        push_in_list(&mut qb, "category", &filter.categories);
        qb.push(" AND ");
        push_in_list(&mut qb, "requirement", &filter.requirements);
        qb.push(" ORDER BY id");
        let mut records = qb.build_query_as::<ClassRecord>()
            .fetch_all(&self.pool)
            .await.map_err(sqlx_to_anyhow)?;
        // stored offsets differ across DST, so order by instant rather than by text
        records.sort_by_key(|r| r.start_time);
        Ok(records)
    }

    async fn set_canceled(&self, key: &IdentityKey, canceled: bool) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE classes SET canceled=? WHERE gym=? AND class_id=?")
            .bind(canceled)
            .bind(key.gym)
            .bind(&key.class_id)
            .execute(&self.pool)
            .await.map_err(sqlx_to_anyhow)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use chrono::NaiveDate;
    use super::*;
    use crate::classtime::ClassTime;
    use crate::db::open_pool;

    pub(crate) fn class_at(gym: Gym, class_id: &str, name: &str, day: u32, hour: u32) -> NormalizedClass {
        let tz = chrono_tz::America::Denver;
        let date = NaiveDate::from_ymd_opt(2025, 4, day).unwrap();
        NormalizedClass {
            gym,
            category: Category::Bjj,
            requirement: Requirement::None,
            class_id: class_id.to_string(),
            name: name.to_string(),
            start_time: ClassTime::from_local(date.and_hms_opt(hour, 0, 0).unwrap(), tz).unwrap(),
            end_time: ClassTime::from_local(date.and_hms_opt(hour + 1, 0, 0).unwrap(), tz).unwrap(),
            canceled: false,
        }
    }

    async fn memory_store() -> SqliteClassStore {
        SqliteClassStore::new(open_pool("sqlite::memory:").await.unwrap())
    }

    #[test]
    fn test_resolve_filter() {
        let empty: [&str; 0] = [];
        assert_eq!(ClassFilter::resolve(&empty, &empty, &empty).unwrap(), ClassFilter::all());

        let filter = ClassFilter::resolve(&["DE", "Boulder", "DE"], &["Kids BJJ"], &["", "  "]).unwrap();
        assert_eq!(filter.gyms, vec![Gym::Denver, Gym::Boulder]);
        assert_eq!(filter.categories, vec![Category::KidsBjj]);
        assert_eq!(filter.requirements, Requirement::ALL.to_vec());

        let err = ClassFilter::resolve(&["Paris"], &empty, &empty).unwrap_err();
        assert!(format!("{err:#}").contains("Paris"));
        assert!(ClassFilter::resolve(&empty, &["Knitting"], &empty).is_err());
    }

    #[rocket::async_test]
    async fn test_insert_get_update() {
        let store = memory_store().await;
        let class = class_at(Gym::Denver, "101", "BJJ Fundamentals", 1, 18);
        let id = store.insert(&class).await.unwrap();

        let key = IdentityKey::new(Gym::Denver, "101");
        let mut rec = store.get(&key).await.unwrap().unwrap();
        assert_eq!(rec.id, id);
        assert_eq!(rec.name, "BJJ Fundamentals");
        assert_eq!(rec.start_time, class.start_time);
        assert!(store.get(&IdentityKey::new(Gym::Aurora, "101")).await.unwrap().is_none());

        rec.name = "BJJ All Levels".to_string();
        rec.canceled = true;
        store.update(&rec).await.unwrap();
        let rec = store.get(&key).await.unwrap().unwrap();
        assert_eq!(rec.name, "BJJ All Levels");
        assert!(!rec.canceled, "update must not write the canceled flag");
    }

    #[rocket::async_test]
    async fn test_query_filters_and_order() {
        let store = memory_store().await;
        store.insert(&class_at(Gym::Denver, "3", "Late", 2, 19)).await.unwrap();
        store.insert(&class_at(Gym::Boulder, "1", "Early", 1, 6)).await.unwrap();
        let mut kids = class_at(Gym::Denver, "2", "Tigers", 1, 16);
        kids.category = Category::KidsBjj;
        store.insert(&kids).await.unwrap();

        let names = |recs: Vec<ClassRecord>| recs.into_iter().map(|r| r.name).collect::<Vec<_>>();
        assert_eq!(names(store.query(&ClassFilter::all()).await.unwrap()), vec!["Early", "Tigers", "Late"]);

        let filter = ClassFilter::resolve(&["DE"], &["BJJ"], &[]).unwrap();
        assert_eq!(names(store.query(&filter).await.unwrap()), vec!["Late"]);

        let filter = ClassFilter { gyms: vec![], ..ClassFilter::all() };
        assert!(store.query(&filter).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn test_set_canceled() {
        let store = memory_store().await;
        store.insert(&class_at(Gym::Littleton, "9", "Open Mat", 1, 10)).await.unwrap();
        let key = IdentityKey::new(Gym::Littleton, "9");
        assert!(store.set_canceled(&key, true).await.unwrap());
        assert!(store.get(&key).await.unwrap().unwrap().canceled);
        assert!(!store.set_canceled(&IdentityKey::new(Gym::Littleton, "10"), true).await.unwrap());
    }
}
