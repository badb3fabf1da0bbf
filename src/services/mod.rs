// Commerce services
pub mod commerce;
