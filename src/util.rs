use std::backtrace::Backtrace;
use anyhow::anyhow;
use rocket::http::Status;
use rocket::response::status::Custom;

pub(crate) fn sqlx_to_anyhow(err: sqlx::Error) -> anyhow::Error {
    error!("SQL Error: {err}\nbacktrace: {}", Backtrace::capture());
    anyhow!("SQL error: {}", err)
}
pub(crate) fn sqlx_to_custom_error(err: sqlx::Error) -> Custom<String> {
    error!("SQL Error: {err}\nbacktrace: {}", Backtrace::capture());
    Custom(Status::InternalServerError, format!("SQLx error: {}", err))
}
pub(crate) fn anyhow_to_custom_error(err: anyhow::Error) -> Custom<String> {
    error!("Error: {err:#}\nbacktrace: {}", Backtrace::capture());
    Custom(Status::InternalServerError, format!("Error: {err:#}"))
}
pub(crate) fn bad_request_error(err: anyhow::Error) -> Custom<String> {
    warn!("Bad request: {err:#}");
    Custom(Status::BadRequest, format!("{err:#}"))
}
