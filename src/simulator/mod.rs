//! Delivery of committed shots to the external simulator.

pub mod delivery;
pub mod link;
pub mod protocol;

pub use delivery::{create_delivery_queue, DeliveryQueue, DeliveryStats, DeliveryWorker};
pub use link::{ConnectionState, SimulatorLink};
pub use protocol::{encode_heartbeat, encode_shot, OutboundShot, SimulatorResponse};
