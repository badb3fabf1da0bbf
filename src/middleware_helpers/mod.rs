pub mod experiments;
pub mod request_id;

pub use experiments::experiment_context_middleware;
pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
