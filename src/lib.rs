mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod schema;
    pub mod serializers;
    pub mod validators;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
pub mod api {
    pub mod recipes;
    pub mod routes;
    pub mod tags;
    pub mod users;
}
pub mod cache {
    pub mod cache;

    pub use self::cache::*;
}
pub mod config;
pub mod constants;
pub mod fixtures;
pub mod media;
pub mod state;

pub use authentication::*;
pub use database::*;
