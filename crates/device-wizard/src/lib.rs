//! Building blocks of the device wizard console: platform configuration,
//! device-type templates and the forms derived from them, and thin clients
//! for the FIWARE context broker, the IoT agent and the device identity store.

pub mod auth;
pub mod config;
pub mod datamodel;
pub mod error;
pub mod fiware;
pub mod forms;
pub mod idm;
pub mod telemetry;
