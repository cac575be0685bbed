pub mod advisor;
pub mod auth;
pub mod connections;
pub mod engagement;
pub mod health;
pub mod messages;
pub mod models;
pub mod news;
pub mod notifications;
pub mod posts;
pub mod profiles;
pub mod websocket;
