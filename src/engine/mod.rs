//! Patient clinical record reconciliation.

pub mod appointments;
pub mod cache;
pub mod cascade;
pub mod commit;
pub mod directory;
pub mod form;
pub mod normalize;
pub mod resolver;
pub mod session;
pub mod status;
pub mod therapist;
pub mod weight;
