pub mod implementations;
pub mod optimization;
pub mod risk;
pub mod search;
pub mod space;
pub mod traits;
