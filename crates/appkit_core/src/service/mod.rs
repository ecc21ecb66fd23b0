//! Service contracts.
//!
//! # Responsibility
//! - Describe the services and deferred service builders an application
//!   stores by id.
//!
//! # See also
//! - `app::Application::add`

pub mod webservice;

pub use webservice::{
    BuiltCallback, Service, ServiceBuilder, ServiceRef, Webservice, WebserviceBuilder,
};
