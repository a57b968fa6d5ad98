// Library root for the pick'em season engine.

pub mod db;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod model;
pub mod payout;
pub mod picks;
pub mod resolution;
pub mod standings;
