pub mod document;
pub mod rfq;
pub mod target_rate;
pub mod vendor;
