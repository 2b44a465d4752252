//! KoboToolbox source
//!
//! - [`client`] authenticated HTTP client implementing [`Paginator`]
//! - [`paginator`] page requests and the link-following stream
//! - [`resources`] forms, submissions and attachments as a cascade plan
//! - [`hooks`] HTTP response logging

pub mod client;
pub mod hooks;
pub mod models;
pub mod paginator;
pub mod resources;

pub use client::KoboClient;
pub use paginator::{paginate, Page, PageRequest, Paginator};
pub use resources::{kobo_plan, ATTACHMENTS_RESOURCE, FORMS_RESOURCE, SUBMISSIONS_RESOURCE};
