//! API response data models.

pub mod uploads;
