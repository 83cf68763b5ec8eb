pub mod access;
pub mod auth;
pub mod billing;
pub mod building_events;
pub mod buildings;
pub mod contractors;
pub mod documents;
pub mod health;
pub mod messages;
pub mod organizations;
pub mod subscriptions;
pub mod units;
