pub mod access;
pub mod building;
pub mod building_event;
pub mod contractor;
pub mod document;
pub mod message;
pub mod organization;
pub mod subscription;
pub mod unit;
pub mod user;
