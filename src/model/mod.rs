pub mod inventory;
pub mod queues;
pub mod scenario;
