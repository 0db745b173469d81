pub mod error;
pub mod retry;
pub mod router;
pub mod sink;
pub mod transform;
pub mod validation;
pub mod window;
